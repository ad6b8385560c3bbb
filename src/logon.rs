//! Logging in to Compass and switching roles.
//!
//! Compass sessions are an `ASP.NET_SessionId` cookie plus two headers set
//! from the portal page: `Authorization: {cn}~{mrn}` and `SID`. The portal
//! page's `ctl00$_POST_CTRL` field carries the user properties, and the role
//! selector lists every role the member holds.

use log::{debug, info};
use scraper::Html;
use std::sync::Arc;

use crate::client::{AuthIds, Client, Reply};
use crate::error::{CompassError, Result};
use crate::models::logon::{CompassProps, CompassPropsMasterUser, Roles, split_role_label};
use crate::parser::Form;
use crate::settings::Settings;
use crate::utility::maybe_int;

const SESSION_COOKIE: &str = "ASP.NET_SessionId";
const PROPS_FIELD: &str = "ctl00$_POST_CTRL";
const ROLES_FIELD: &str = "ctl00$UserTitleMenu$cboUCRoles";

/// Creates a client holding a fresh session cookie.
///
/// A `HEAD` request is enough for Compass to hand out the cookie.
///
/// # Errors
/// Returns [`CompassError::Compass`] if no cookie was set.
pub fn create_session(settings: Settings) -> Result<Client> {
    let client = Client::new(settings);
    client.head(&client.settings().url("/"))?;

    if !client.has_cookies() {
        return Err(CompassError::Compass(
            "Could not create a session with Compass".to_string(),
        ));
    }
    Ok(client)
}

/// Posts the login form. Compass answers 200 whether or not the
/// credentials were right; only the portal page tells.
pub fn post_credentials(client: &Client, credentials: (&str, &str)) -> Result<Reply> {
    let settings = client.settings();
    let (username, password) = credentials;
    let form = [
        ("EM".to_string(), username.to_string()),
        ("PW".to_string(), password.to_string()),
        ("ON".to_string(), settings.org_number.to_string()),
    ];
    // Login fails without the referer
    let referer = settings.url("login/User/Login");

    info!("Logging in");
    client
        .post_form(&settings.url("Login.ashx"), &form, &[("Referer", referer.as_str())])?
        .error_for_server_status()
}

/// Logs in and confirms the login succeeded.
pub fn logon_remote(client: &Client, credentials: (&str, &str)) -> Result<(Reply, CompassProps, Roles)> {
    let reply = post_credentials(client, credentials)?;
    let (props, roles) = check_login(client)?;
    Ok((reply, props, roles))
}

/// Confirms the session is logged in and reads the user properties and roles.
///
/// # Errors
/// Returns [`CompassError::Authentication`] if Compass redirects away from
/// the portal page.
pub fn check_login(client: &Client) -> Result<(CompassProps, Roles)> {
    let portal = portal_page(client)?;
    Ok((portal.props, portal.roles))
}

/// Properties, roles and selected role read from the portal page.
struct PortalPage {
    props: CompassProps,
    roles: Roles,
    active_role: Option<i64>,
}

fn portal_page(client: &Client) -> Result<PortalPage> {
    let portal_url = client.settings().url("ScoutsPortal.aspx");
    let reply = client.get(&portal_url)?.error_for_server_status()?;
    if reply.url != portal_url {
        return Err(CompassError::Authentication("Login has failed".to_string()));
    }
    parse_portal(&reply.text())
}

fn parse_portal(html: &str) -> Result<PortalPage> {
    let document = Html::parse_document(html);
    let form = Form::first(&document)?;

    let props = CompassProps::from_post_ctrl(form.field(PROPS_FIELD).unwrap_or_default())?;
    let roles_control = form
        .control(ROLES_FIELD)
        .ok_or_else(|| CompassError::Parse("Role selector missing from portal page".to_string()))?;
    let roles = roles_control
        .options
        .iter()
        .filter_map(|option| Some((maybe_int(&option.value)?, split_role_label(&option.text))))
        .collect();

    Ok(PortalPage {
        props,
        roles,
        active_role: form.field(ROLES_FIELD).and_then(maybe_int),
    })
}

/// A logged-in Compass session.
#[derive(Debug, Clone)]
pub struct Logon {
    client: Arc<Client>,
    props: CompassProps,
    roles: Roles,
    current_role: (String, String),
    membership_number: i64,
    role_number: i64,
    jk: String,
    session_id: String,
    asp_net_id: String,
}

impl Logon {
    /// Logs in, optionally switching to the role with the given title.
    ///
    /// `location` picks between roles that share a title.
    ///
    /// # Errors
    /// - [`CompassError::Compass`] if no session could be created, the role
    ///   doesn't exist, or Compass didn't switch roles
    /// - [`CompassError::Authentication`] if the login or role change failed
    pub fn login(
        settings: Settings,
        credentials: (&str, &str),
        role: Option<&str>,
        location: Option<&str>,
    ) -> Result<Self> {
        let client = create_session(settings)?;
        let (_, props, roles) = logon_remote(&client, credentials)?;
        let asp_net_id = client.cookie(SESSION_COOKIE).unwrap_or_default();

        let mut logon = Logon {
            client: Arc::new(client),
            props: CompassProps::default(),
            roles: Roles::new(),
            current_role: (String::new(), String::new()),
            membership_number: 0,
            role_number: 0,
            jk: String::new(),
            session_id: String::new(),
            asp_net_id,
        };
        logon.update_authorisation(props, roles)?;

        if let Some(role) = role {
            logon.change_role(role, location)?;
        } else {
            info!("Not changing role");
        }
        Ok(logon)
    }

    /// Rebuilds a session from stored identifiers, without contacting Compass.
    pub fn from_session(
        settings: Settings,
        asp_net_id: &str,
        user_props: CompassPropsMasterUser,
        session_id: &str,
        current_role: (String, String),
    ) -> Result<Self> {
        let client = Client::new(settings);
        client.set_cookie(SESSION_COOKIE, asp_net_id)?;

        let membership_number = user_props.cn.ok_or_else(|| {
            CompassError::Authentication("Stored session has no membership number".to_string())
        })?;
        let role_number = user_props.mrn.ok_or_else(|| {
            CompassError::Authentication("Stored session has no role number".to_string())
        })?;

        let mut props = CompassProps::default();
        props.master.sys.session_id = Some(session_id.to_string());
        props.master.user = user_props;

        let logon = Logon {
            client: Arc::new(client),
            jk: props.master.user.jk.clone().unwrap_or_default(),
            props,
            roles: Roles::new(),
            current_role,
            membership_number,
            role_number,
            session_id: session_id.to_string(),
            asp_net_id: asp_net_id.to_string(),
        };
        logon.set_auth_headers();
        Ok(logon)
    }

    /// Switches to the role with the given title (and location, if given).
    pub fn change_role(&mut self, title: &str, location: Option<&str>) -> Result<()> {
        let title = title.trim();
        let location = location.map(str::trim);
        let role_number = self
            .roles
            .iter()
            .find(|(_, (role_title, role_location))| {
                role_title == title && location.is_none_or(|l| l == role_location)
            })
            .map(|(number, _)| *number)
            .ok_or_else(|| {
                CompassError::Compass(format!("Role '{}' not found in Compass", title))
            })?;

        info!("Changing role");
        self.client.post_json(
            &self.client.settings().url("API/ChangeRole"),
            &serde_json::json!({"MRN": role_number.to_string()}),
        )?;

        debug!("Confirming role has been changed");
        let portal = portal_page(&self.client)?;
        if portal.active_role != Some(role_number) {
            return Err(CompassError::Compass(
                "Role failed to update in Compass".to_string(),
            ));
        }
        self.update_authorisation(portal.props, portal.roles)?;

        if self.role_number != role_number {
            return Err(CompassError::Authentication(
                "Compass Authentication failed to update".to_string(),
            ));
        }
        info!(
            "Role updated successfully! Role is now {} - {}.",
            self.current_role.0, self.current_role.1
        );
        Ok(())
    }

    fn update_authorisation(&mut self, props: CompassProps, roles: Roles) -> Result<()> {
        let user = &props.master.user;
        self.membership_number = user.cn.ok_or_else(|| {
            CompassError::Authentication("Compass did not return a membership number".to_string())
        })?;
        self.role_number = user.mrn.ok_or_else(|| {
            CompassError::Authentication("Compass did not return a role number".to_string())
        })?;
        self.jk = user.jk.clone().unwrap_or_default();
        self.session_id = props.master.sys.session_id.clone().unwrap_or_default();
        self.current_role = roles.get(&self.role_number).cloned().ok_or_else(|| {
            CompassError::Authentication(format!(
                "Role {} missing from the role selector",
                self.role_number
            ))
        })?;
        self.props = props;
        self.roles = roles;

        self.set_auth_headers();
        debug!("Using Role: {} - {}", self.current_role.0, self.current_role.1);
        Ok(())
    }

    fn set_auth_headers(&self) {
        self.client.set_header(
            "Authorization",
            &format!("{}~{}", self.membership_number, self.role_number),
        );
        self.client.set_header("SID", &self.session_id);
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    pub fn settings(&self) -> &Settings {
        self.client.settings()
    }

    pub fn props(&self) -> &CompassProps {
        &self.props
    }

    /// Role number → (title, location) for every role the member holds.
    pub fn roles(&self) -> &Roles {
        &self.roles
    }

    /// (title, location) of the active role
    pub fn current_role(&self) -> &(String, String) {
        &self.current_role
    }

    pub fn membership_number(&self) -> i64 {
        self.membership_number
    }

    pub fn role_number(&self) -> i64 {
        self.role_number
    }

    pub fn jk(&self) -> &str {
        &self.jk
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn asp_net_id(&self) -> &str {
        &self.asp_net_id
    }

    pub fn auth_ids(&self) -> AuthIds {
        AuthIds {
            membership_number: self.membership_number,
            role_number: self.role_number,
            jk: self.jk.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTAL: &str = r#"
        <html><body><form action="./ScoutsPortal.aspx">
          <input type="hidden" name="ctl00$_POST_CTRL" value="Master.User.CN#10000000~Master.User.MRN#9000000~Master.User.JK#abc~Master.Sys.SessionID#sid-1">
          <select name="ctl00$UserTitleMenu$cboUCRoles">
            <option value="6857721">TSA Council Member - Nominated Member (18-24)&nbsp;-&nbsp;The Scout Association</option>
            <option value="9000000" selected="selected">Regional Administrator&nbsp;-&nbsp;Wessex</option>
          </select>
        </form></body></html>"#;

    #[test]
    fn portal_page_yields_props_and_roles() {
        let portal = parse_portal(PORTAL).unwrap();
        assert_eq!(portal.props.master.user.cn, Some(10000000));
        assert_eq!(portal.active_role, Some(9000000));
        assert_eq!(
            portal.roles.get(&6857721),
            Some(&(
                "TSA Council Member - Nominated Member (18-24)".to_string(),
                "The Scout Association".to_string()
            ))
        );
        assert_eq!(
            portal.roles.get(&9000000),
            Some(&("Regional Administrator".to_string(), "Wessex".to_string()))
        );
    }

    #[test]
    fn portal_without_role_selector_is_rejected() {
        let page = r#"<html><body><form action="x"><input name="ctl00$_POST_CTRL" value=""></form></body></html>"#;
        assert!(matches!(parse_portal(page), Err(CompassError::Parse(_))));
    }
}
