//! Report export steps.
//!
//! Exporting runs in four steps: get a report token from the JSON service,
//! fetch the report page the token points to, post the report form back with
//! every location selected, then download the CSV export.

use log::{debug, info};
use regex::Regex;
use scraper::Html;
use serde_json::Value;
use std::sync::LazyLock;

use crate::client::{AuthIds, Client};
use crate::error::{CompassError, Result};
use crate::parser::{Form, selector, text_content};

static EXPORT_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""ExportUrlBase":"(.*?)""#).expect("Invalid regex pattern"));

/// Redirect to the error page inside an async post-back reply, on any host.
const ERROR_PAGE_MARKER: &str = "%2fError.aspx|";

/// Where to download a report export from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportUrl {
    /// Path relative to the portal root
    pub path: String,
    /// Query parameters, still URL-encoded as Compass sent them
    pub query: Vec<(String, String)>,
}

impl ExportUrl {
    pub fn to_url(&self, base_url: &str) -> String {
        let query: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}/{}?{}", base_url, self.path, query.join("&"))
    }
}

/// Asks Compass for a token to run report `report_number` as the current role.
///
/// The token is the relative URL of the report page.
///
/// # Errors
/// - [`CompassError::Report`] if Compass answers with an error code
/// - [`CompassError::ReportPermission`] if the role may not run the report
pub fn report_token(client: &Client, auth: &AuthIds, report_number: u32) -> Result<String> {
    let url = format!("{}/ReportToken", client.settings().web_service_path());
    let params = [
        ("pReportNumber", report_number.to_string()),
        ("pMemberRoleNumber", auth.role_number.to_string()),
    ];
    let reply = client
        .get_with_auth(&url, auth, &params)?
        .error_for_server_status()?;
    let body: Value = reply.json()?;
    let token = body
        .get("d")
        .and_then(Value::as_str)
        .ok_or_else(|| CompassError::Report("Report token missing from response".to_string()))?;

    match token {
        "-1" => Err(CompassError::Report("Report aborted: SESSION Expired".into())),
        "-2" => Err(CompassError::Report("Report aborted: MRN Missing".into())),
        "-3" => Err(CompassError::Report("Report aborted: Report No Missing".into())),
        "-4" => Err(CompassError::ReportPermission(
            "Report aborted: USER DOES NOT HAVE PERMISSION".into(),
        )),
        token => {
            debug!("Got report token for report {}", report_number);
            Ok(token.to_string())
        }
    }
}

/// Initial report page, holding the export URL and the location parameters.
pub fn report_page(client: &Client, run_report_url: &str) -> Result<Vec<u8>> {
    let url = client.settings().url(run_report_url);
    Ok(client.get(&url)?.error_for_server_status()?.body)
}

/// Form data for the report post-back, with every location level selected.
///
/// Compass leaves some organisational levels unselected by default; a full
/// export needs all of them ticked.
pub fn report_form_data(report_page: &str) -> Result<Vec<(String, String)>> {
    let document = Html::parse_document(report_page);
    let form = Form::first(&document)?;

    let mut data: Vec<(String, String)> = form
        .controls
        .iter()
        .filter(|c| c.kind != "checkbox" && c.kind != "image")
        .filter_map(|c| c.value.clone().map(|v| (c.name.clone(), v)))
        .collect();

    for dropdown in document.select(&selector("div[id$='_divDropDown']")) {
        let Some(prefix) = dropdown
            .value()
            .id()
            .and_then(|id| id.strip_suffix("_divDropDown"))
            .map(|id| id.replace('_', "$"))
        else {
            continue;
        };
        let labels: Vec<String> = dropdown
            .select(&selector("label"))
            .map(|label| text_content(label).trim().to_string())
            .filter(|label| label != "(Select All)")
            .collect();
        let indices: Vec<String> = (0..labels.len()).map(|i| i.to_string()).collect();

        set_field(&mut data, &format!("{}$divDropDown$ctl01$HiddenIndices", prefix), indices.join(","));
        set_field(&mut data, &format!("{}$txtValue", prefix), labels.join(", "));
    }

    set_field(&mut data, "__EVENTTARGET", String::new());
    set_field(&mut data, "__ASYNCPOST", "true".to_string());
    Ok(data)
}

fn set_field(data: &mut Vec<(String, String)>, name: &str, value: String) {
    match data.iter_mut().find(|(k, _)| k == name) {
        Some(entry) => entry.1 = value,
        None => data.push((name.to_string(), value)),
    }
}

/// Posts the report form back so that every location is included.
pub fn update_form_data(client: &Client, report_page: &[u8], run_report_url: &str) -> Result<()> {
    let data = report_form_data(&String::from_utf8_lossy(report_page))?;
    let url = client.settings().url(run_report_url);
    let reply = client.post_form(&url, &data, &[])?.error_for_server_status()?;

    if redirects_to_error_page(&reply.text()) {
        return Err(CompassError::Report("Compass Error!".to_string()));
    }
    Ok(())
}

fn redirects_to_error_page(reply: &str) -> bool {
    reply.contains(ERROR_PAGE_MARKER)
}

/// Export URL from the report page script, with the format forced to CSV.
pub fn report_export_url(report_page: &str) -> Result<ExportUrl> {
    let raw = EXPORT_URL_RE
        .captures(report_page)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| CompassError::Report("Export URL not found in report page".to_string()))?;
    let unescaped = raw.replace("\\u0026", "&").replace("\\/", "/");

    let (path, query) = unescaped.split_once('?').unwrap_or((unescaped.as_str(), ""));
    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k.to_string(), v.to_string())
        })
        .collect();
    set_field(&mut params, "Format", "CSV".to_string());

    Ok(ExportUrl {
        path: path.trim_start_matches('/').to_string(),
        query: params,
    })
}

/// Downloads the export, allowing for Compass's long report run times.
pub fn download_report(client: &Client, export: &ExportUrl) -> Result<Vec<u8>> {
    info!("Exporting report");
    let url = export.to_url(&client.settings().base_url);
    let reply = client.download(&url, &[])?.error_for_server_status()?;
    debug!("Report export finished ({} bytes)", reply.body.len());
    Ok(reply.body)
}
