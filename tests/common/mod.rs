//! A fake Compass portal for integration tests.
//!
//! Serves canned pages from `tests/fixtures` on a random local port and keeps
//! just enough session state (login, active role, last search) to walk the
//! real login, role change, member, hierarchy and report flows.

#![allow(dead_code)]

use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tiny_http::{Header, Method, Request, Response, Server};

use compass_interface_core::{Logon, Settings};

pub const USERNAME: &str = "test.user";
pub const PASSWORD: &str = "correct horse";
pub const ASP_NET_ID: &str = "fake-session-cookie";
pub const MEMBERSHIP_NUMBER: i64 = 10000000;
pub const JK: &str = "9b65d68f4aca0138b5bae4492e7cdfae";
pub const SESSION_ID: &str = "d6c76537-1b6c-3910-c3d4-d21d4e6453a6";

/// Role selected when logging in
pub const ADMIN_ROLE: i64 = 9000000;
pub const COUNCIL_ROLE: i64 = 6857721;
/// Compass ignores requests to switch to this role
pub const STUCK_ROLE: i64 = 1234567;
/// Compass switches the selector to this role but keeps the old session role
pub const HALF_ROLE: i64 = 7654321;

/// Members and roles the fake refuses access to
pub const DENIED_NUMBER: i64 = 1;
/// Unit whose searches fail
pub const BROKEN_UNIT: i64 = 999;
/// Unit whose hierarchy requests are refused
pub const FORBIDDEN_UNIT: i64 = 666;

pub const REPORT_CSV: &str = "Membership Number,Forenames,Surname\n10000000,John,Smith\n";

const PORTAL: &str = include_str!("../fixtures/portal.html");
const LOGIN_PAGE: &str = include_str!("../fixtures/login.html");
const ACCESS_DENIED: &str = include_str!("../fixtures/access_denied.html");
const PERSONAL: &str = include_str!("../fixtures/personal.html");
const ROLES: &str = include_str!("../fixtures/roles.html");
const PERMITS: &str = include_str!("../fixtures/permits.html");
const TRAINING: &str = include_str!("../fixtures/training.html");
const AWARDS: &str = include_str!("../fixtures/awards.html");
const DISCLOSURES: &str = include_str!("../fixtures/disclosures.html");
const ROLE_POPUP: &str = include_str!("../fixtures/role_popup.html");
const SEARCH_RESULTS: &str = include_str!("../fixtures/search_results.html");
const REPORT_PAGE: &str = include_str!("../fixtures/report.html");

const LOGIN_SUCCESS: &str = "<script>window.location.href='/ScoutsPortal.aspx'</script>";
const LOGIN_FAILURE: &str = "<p>The email address or password you entered is incorrect.</p>";

type Reply = Response<Cursor<Vec<u8>>>;

/// Session state shared with the server thread.
#[derive(Debug, Default)]
pub struct State {
    pub logged_in: bool,
    /// Role shown as selected in the role selector
    pub selected_role: i64,
    /// Role number in the session properties
    pub session_role: i64,
    pub search_unit: Option<i64>,
    pub preflights: usize,
    /// Decoded report form post-backs
    pub report_posts: Vec<HashMap<String, String>>,
}

pub struct FakeCompass {
    pub base_url: String,
    pub state: Arc<Mutex<State>>,
}

impl FakeCompass {
    pub fn start() -> Self {
        let server = Server::http("127.0.0.1:0").expect("bind fake Compass");
        let address = server
            .server_addr()
            .to_ip()
            .expect("fake Compass listens on an IP address");
        let state = Arc::new(Mutex::new(State {
            selected_role: ADMIN_ROLE,
            session_role: ADMIN_ROLE,
            ..State::default()
        }));

        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for request in server.incoming_requests() {
                handle(request, &shared);
            }
        });

        FakeCompass {
            base_url: format!("http://{}", address),
            state,
        }
    }

    pub fn settings(&self) -> Settings {
        Settings::with_base_url(self.base_url.as_str())
    }

    pub fn login(&self) -> Logon {
        Logon::login(self.settings(), (USERNAME, PASSWORD), None, None)
            .expect("login to fake Compass")
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn handle(mut request: Request, state: &Mutex<State>) {
    let mut body = String::new();
    let _ = request.as_reader().read_to_string(&mut body);

    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .map(|h| {
            (
                h.field.as_str().as_str().to_ascii_lowercase(),
                h.value.as_str().to_string(),
            )
        })
        .collect();
    let (path, query) = match request.url().split_once('?') {
        Some((path, query)) => (path.to_string(), pairs(query)),
        None => (request.url().to_string(), HashMap::new()),
    };

    let method = request.method().clone();
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    let response = route(&method, &path, &query, &headers, &body, &mut state);
    drop(state);
    let _ = request.respond(response);
}

fn route(
    method: &Method,
    path: &str,
    query: &HashMap<String, String>,
    headers: &HashMap<String, String>,
    body: &str,
    state: &mut State,
) -> Reply {
    match (method, path) {
        (Method::Head, "/") => html("").with_header(header(
            "Set-Cookie",
            &format!("ASP.NET_SessionId={}; path=/; HttpOnly", ASP_NET_ID),
        )),
        (Method::Head, "/_testing/no-cookie/") => html(""),

        (Method::Post, "/Login.ashx") => {
            let form = pairs(body);
            let referred = headers
                .get("referer")
                .is_some_and(|r| r.ends_with("/login/User/Login"));
            let valid = form.get("EM").map(String::as_str) == Some(USERNAME)
                && form.get("PW").map(String::as_str) == Some(PASSWORD);
            if referred && valid {
                state.logged_in = true;
                html(LOGIN_SUCCESS)
            } else {
                html(LOGIN_FAILURE)
            }
        }
        (Method::Get, "/login/User/Login") => html(LOGIN_PAGE),
        (Method::Get, "/ScoutsPortal.aspx") => {
            if state.logged_in {
                html(&portal(state))
            } else {
                redirect("/login/User/Login")
            }
        }
        (Method::Post, "/API/ChangeRole") => {
            let requested = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("MRN").and_then(Value::as_str).map(str::to_string))
                .and_then(|mrn| mrn.parse::<i64>().ok());
            match requested {
                Some(HALF_ROLE) => state.selected_role = HALF_ROLE,
                Some(role) if role == ADMIN_ROLE || role == COUNCIL_ROLE => {
                    state.selected_role = role;
                    state.session_role = role;
                }
                _ => {}
            }
            json_reply(&json!(true))
        }

        (Method::Get, "/MemberProfile.aspx") => member_profile(query),
        (Method::Get, "/Popups/Profile/AssignNewRole.aspx") => {
            if query.get("VIEW").map(String::as_str) == Some("1") {
                html(&ACCESS_DENIED.replace("{ACTION}", "./ScoutsPortal.aspx?Invalid=Access"))
            } else {
                html(ROLE_POPUP)
            }
        }

        (Method::Post, p) if p.starts_with("/hierarchy/") => {
            let parent = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("ParentID").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default();
            json_reply(&hierarchy_units(p.trim_start_matches("/hierarchy"), &parent))
        }
        (Method::Post, "/Search/Members") => {
            let unit = serde_json::from_str::<Vec<Value>>(body)
                .unwrap_or_default()
                .into_iter()
                .find(|pair| pair["Key"] == "OrganisationNumber")
                .and_then(|pair| pair["Value"].as_str().and_then(|v| v.parse().ok()));
            state.search_unit = unit;
            json_reply(&json!({"d": "ok"}))
        }
        (Method::Get, "/SearchResults.aspx") => search_results(state.search_unit),

        (Method::Post, "/System/Preflight") => {
            state.preflights += 1;
            json_reply(&json!({"d": ""}))
        }
        (Method::Get, "/JSon.svc/ReportToken") => {
            let authenticated = headers.contains_key("auth")
                && ["x1", "x2", "x3"].iter().all(|k| query.contains_key(*k));
            let token = if !authenticated {
                "-1"
            } else {
                match query.get("pReportNumber").map(String::as_str) {
                    Some("37") => "Reports/Run.aspx?ReportID=37",
                    Some("84") => "Reports/Broken.aspx?ReportID=84",
                    Some("52") => "-4",
                    Some("76") => "-1",
                    _ => "-3",
                }
            };
            json_reply(&json!({"d": token}))
        }
        (Method::Get, "/Reports/Run.aspx" | "/Reports/Broken.aspx") => html(REPORT_PAGE),
        (Method::Post, "/Reports/Run.aspx") => {
            state.report_posts.push(pairs(body));
            html("1|#||4|updatePanel|ReportViewer1|")
        }
        (Method::Post, "/Reports/Broken.aspx") => {
            html("49|pageRedirect||http%3a%2f%2f127.0.0.1%2fError.aspx|")
        }
        (Method::Get, "/Reserved.ReportViewerWebControl.axd") => {
            if query.get("Format").map(String::as_str) == Some("CSV")
                && query.get("ReportSession").map(String::as_str) == Some("abc123")
            {
                Response::from_data(REPORT_CSV.as_bytes().to_vec())
                    .with_header(header("Content-Type", "text/csv"))
            } else {
                Response::from_string("Bad export request").with_status_code(400)
            }
        }

        _ => Response::from_string("Not Found").with_status_code(404),
    }
}

fn member_profile(query: &HashMap<String, String>) -> Reply {
    if query.get("CN").map(String::as_str) == Some("1") {
        return html(&ACCESS_DENIED.replace("{ACTION}", "./ScoutsPortal.aspx?Invalid=AccessCN"));
    }
    let page = match query.get("Page").map(String::as_str) {
        None => PERSONAL,
        Some("ROLES") => ROLES,
        Some("PERMITS") => PERMITS,
        Some("TRAINING") => TRAINING,
        Some("AWARDS") => AWARDS,
        Some("DISCLOSURES") => DISCLOSURES,
        Some(_) => return Response::from_string("Not Found").with_status_code(404),
    };
    html(page)
}

fn portal(state: &State) -> String {
    let roles = [
        (
            COUNCIL_ROLE,
            "TSA Council Member - Nominated Member (18-24)&nbsp;-&nbsp;The Scout Association",
        ),
        (ADMIN_ROLE, "Regional Administrator&nbsp;-&nbsp;Wessex"),
        (HALF_ROLE, "Regional Administrator&nbsp;-&nbsp;Thames Valley"),
        (STUCK_ROLE, "Broken Role&nbsp;-&nbsp;Nowhere"),
    ];
    let options: Vec<String> = roles
        .iter()
        .map(|(number, label)| {
            let selected = if *number == state.selected_role {
                r#" selected="selected""#
            } else {
                ""
            };
            format!(r#"      <option value="{}"{}>{}</option>"#, number, selected, label)
        })
        .collect();
    PORTAL
        .replace("{MRN}", &state.session_role.to_string())
        .replace("{OPTIONS}", &options.join("\n"))
}

fn unit(id: i64, name: &str, parent: i64, section_type: Option<&str>) -> Value {
    let mut tag = json!({"org_status": "Active", "address": "Scout Hut, Town", "Members": 12});
    if let Some(section_type) = section_type {
        tag["SectionTypeDesc"] = json!(section_type);
    }
    json!({
        "Value": id.to_string(),
        "Description": name,
        "Parent": parent.to_string(),
        "Tag": json!([tag]).to_string(),
    })
}

/// A district (100) with one district section and two groups; the first
/// group has two sections of its own.
fn hierarchy_units(endpoint: &str, parent: &str) -> Value {
    if parent == FORBIDDEN_UNIT.to_string() {
        return json!({"Message": "Authorization has been denied for this request."});
    }
    match (endpoint, parent) {
        ("/district/sections", "100") => json!([unit(101, "District Explorers", 100, Some("Explorers"))]),
        ("/groups", "100") => json!([unit(200, "1st Town", 100, None), unit(300, "2nd Town", 100, None)]),
        ("/group/sections", "200") => json!([
            unit(201, "1st Town Beavers", 200, Some("Beavers")),
            unit(202, "1st Town Cubs", 200, Some("Cubs")),
        ]),
        _ => json!([]),
    }
}

fn search_results(unit: Option<i64>) -> Reply {
    let page = SEARCH_RESULTS.replace("{ACTION}", "./SearchResults.aspx");
    match unit {
        Some(BROKEN_UNIT) => html(
            &SEARCH_RESULTS
                .replace("{ACTION}", "./ScoutsPortal.aspx?Invalid=SearchError")
                .replace("{DATA}", ""),
        ),
        Some(300) => html(&page.replace("{DATA}", "")),
        Some(unit) => {
            let members = json!([
                {
                    "contact_number": (unit * 1000).to_string(),
                    "name": format!("Leader of {}", unit),
                    "visibility_status": "Y",
                    "address": "1 High Street",
                    "role": "Section Leader",
                    "email": format!("leader{}@example.com", unit),
                },
                {
                    "contact_number": (unit * 1000 + 1).to_string(),
                    "name": format!("Helper of {}", unit),
                    "visibility_status": "Y",
                    "address": "2 High Street",
                    "role": "Assistant",
                    "phone": "01632 960001",
                }
            ]);
            let escaped = members.to_string().replace('&', "&amp;").replace('"', "&quot;");
            html(&page.replace("{DATA}", &escaped))
        }
        None => html(&page.replace("{DATA}", "")),
    }
}

/// Decodes `a=1&b=2` pairs, as sent in query strings and form bodies.
fn pairs(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect()
}

fn decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                    Ok(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    Err(_) => out.push(b'%'),
                }
            }
            byte => out.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("valid header")
}

fn html(body: &str) -> Reply {
    Response::from_string(body).with_header(header("Content-Type", "text/html; charset=utf-8"))
}

fn json_reply(value: &Value) -> Reply {
    Response::from_string(value.to_string())
        .with_header(header("Content-Type", "application/json; charset=utf-8"))
}

fn redirect(location: &str) -> Reply {
    Response::from_string("")
        .with_status_code(302)
        .with_header(header("Location", location))
}
