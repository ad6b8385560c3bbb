//! Report exports.
//!
//! Exporting a report is surprisingly involved:
//!
//! 1. Get a report token from the Compass backend. This also checks the
//!    report exists and that the current role may run it.
//! 2. Fetch the report page the token points to. It holds the export URL
//!    and the location parameters.
//! 3. Post the report form back with every location level selected, as
//!    Compass leaves some unset by default.
//! 4. Download the export as CSV.
//!
//! Compass sniffs user agents during the export and soft-times out after ten
//! minutes; very large reports can simply fail with an out of memory page.

use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::client::{AuthIds, Client};
use crate::error::{CompassError, Result};
use crate::logon::Logon;
use crate::scrapers::reports::{
    download_report, report_export_url, report_page, report_token, update_form_data,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportType {
    MemberDirectory,
    Appointments,
    Permit,
    Disclosure,
    Training,
    DisclosureManagement,
}

impl ReportType {
    pub const ALL: [ReportType; 6] = [
        ReportType::MemberDirectory,
        ReportType::Appointments,
        ReportType::Permit,
        ReportType::Disclosure,
        ReportType::Training,
        ReportType::DisclosureManagement,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReportType::MemberDirectory => "Region Member Directory",
            ReportType::Appointments => "Region Appointments Report",
            ReportType::Permit => "Region Permit Report",
            ReportType::Disclosure => "Region Disclosure Report",
            ReportType::Training => "Region Training Report",
            ReportType::DisclosureManagement => "Region Disclosure Management Report",
        }
    }

    /// Compass's internal report number.
    pub fn number(self) -> u32 {
        match self {
            ReportType::MemberDirectory => 37,
            ReportType::Appointments => 52,
            ReportType::Permit => 72,
            ReportType::Disclosure => 76,
            ReportType::Training => 84,
            ReportType::DisclosureManagement => 100,
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReportType {
    type Err = CompassError;

    fn from_str(s: &str) -> Result<Self> {
        ReportType::ALL
            .into_iter()
            .find(|report| report.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let types: Vec<&str> = ReportType::ALL.iter().map(|r| r.name()).collect();
                CompassError::Report(format!(
                    "{} is not a valid report type. Valid report types are {:?}",
                    s, types
                ))
            })
    }
}

#[derive(Debug, Clone)]
pub struct Reports {
    client: Arc<Client>,
    auth: AuthIds,
    current_role: (String, String),
}

impl Reports {
    pub fn new(logon: &Logon) -> Self {
        Reports {
            client: logon.client().clone(),
            auth: logon.auth_ids(),
            current_role: logon.current_role().clone(),
        }
    }

    /// Exports a report as CSV bytes.
    ///
    /// # Errors
    /// - [`CompassError::Report`] if Compass returns an error code or the
    ///   form post-back lands on the error page
    /// - [`CompassError::ReportPermission`] if the role may not run the report
    /// - [`CompassError::Network`] on transport failures or HTTP 5xx
    pub fn get_report(&self, report_type: ReportType) -> Result<Vec<u8>> {
        let run_report_url = report_token(&self.client, &self.auth, report_type.number())?;
        let page = report_page(&self.client, &run_report_url)?;
        update_form_data(&self.client, &page, &run_report_url)?;
        let export = report_export_url(&String::from_utf8_lossy(&page))?;
        download_report(&self.client, &export)
    }

    /// Default file name for an export run now.
    pub fn report_filename(&self) -> String {
        report_filename(
            Local::now().naive_local(),
            self.auth.membership_number,
            &self.current_role,
        )
    }
}

/// `{timestamp} - {membership number} ({role title} - {role location}).csv`
///
/// Colons are illegal in Windows file names, so the time uses hyphens.
pub fn report_filename(time: NaiveDateTime, membership_number: i64, role: &(String, String)) -> String {
    format!(
        "{} - {} ({} - {}).csv",
        time.format("%Y-%m-%d %H-%M-%S"),
        membership_number,
        role.0,
        role.1
    )
}
