//! Member data scraped from Compass's MemberProfile pages.
//!
//! MemberProfile.aspx has thirteen tabs, of which these carry data:
//! Personal Details (no key), Roles, Permits, Training, Awards, Emergency,
//! Communications, Visibility (own profile only) and Disclosures. Children,
//! Youth Badges, Event Invitations and Parents/Guardians are disabled.
//!
//! Role approvals and Getting Started modules come from the role popup at
//! `/Popups/Profile/AssignNewRole.aspx`.

use chrono::{Local, NaiveDate};
use log::debug;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use crate::client::Client;
use crate::error::{CompassError, Result};
use crate::models::member::{
    AddressData, GettingStartedModule, MemberAward, MemberDetails, MemberDisclosure,
    MemberMandatoryTraining, MemberPermit, MemberRoleCore, MemberRoleDetail, MemberRolePopup,
    MemberRolesCollection, MemberTrainingTab, OngoingLearning, RoleHierarchy, RoleStatus,
    TrainingModule, TrainingRole,
};
use crate::models::validation::Validate;
use crate::parser::{
    Form, child_elements, has_class, labelled_cell, normalize_space, row_cells, selector,
    table_rows, text_content,
};
use crate::utility::{maybe_int, parse_date, validation_errors_logging};

const ACCESS_DENIED_MEMBER: &str = "./ScoutsPortal.aspx?Invalid=AccessCN";
const ACCESS_DENIED_ROLE: &str = "./ScoutsPortal.aspx?Invalid=Access";

/// Role titles that aren't volunteer appointments: occasional helpers,
/// council members, staff and network members.
const NON_VOLUNTEER_TITLES: [&str; 17] = [
    "group occasional helper",
    "group occasional helper.",
    "district occasional helper",
    "county occasional helper",
    "pvg",
    "occasional helper",
    "county scout council member",
    "county scout council member - nominated representative",
    "county scout council member - nominated youth representative",
    "county scout council member - nominated member (18-24)",
    "district staff",
    "county staff",
    "network member",
    "scout network member",
    "county scout network member",
    "district scout network",
    "district scout network member",
];

/// Getting Started module names → short codes
const MODULE_NAMES: [(&str, &str); 8] = [
    ("Essential Information", "M01"),
    ("Trustee Introduction", "TRST"),
    ("Personal Learning Plan", "M02"),
    ("Tools for the Role (Section Leaders)", "M03"),
    ("Tools for the Role (Managers and Supporters)", "M04"),
    ("General Data Protection Regulations", "GDPR"),
    ("Safety Training", "SFTY"),
    ("Safeguarding Training", "SAFE"),
];

/// Module codes used by the popup → output keys
const RENAMED_MODULES: [(&str, &str); 8] = [
    ("001", "module_01"),
    ("TRST", "trustee_intro"),
    ("002", "module_02"),
    ("003", "module_03"),
    ("004", "module_04"),
    ("GDPR", "GDPR"),
    ("SFTY", "safety"),
    ("SAFE", "safeguarding"),
];

const RENAMED_LEVELS: [(&str, &str); 1] = [(
    "County / Area / Scottish Region / Overseas Branch",
    "County",
)];

const UNSET_VALUES: [&str; 3] = [
    "--- Not Selected ---",
    "--- No Items Available ---",
    "--- No Line Manager ---",
];

const REFERENCE_CODES: [(&str, &str); 5] = [
    ("NC", "Not Complete"),
    ("NR", "Not Required"),
    ("RR", "References Requested"),
    ("S", "References Satisfactory"),
    ("U", "References Unsatisfactory"),
];

static MODULE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z0-9]+) - (.+)$").expect("Invalid regex pattern"));

/// Tabs of MemberProfile.aspx that hold member data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileTab {
    Personal,
    Roles,
    Permits,
    Training,
    Awards,
    Emergency,
    Comms,
    Visibility,
    Disclosures,
}

impl ProfileTab {
    pub const ALL: [ProfileTab; 9] = [
        ProfileTab::Personal,
        ProfileTab::Roles,
        ProfileTab::Permits,
        ProfileTab::Training,
        ProfileTab::Awards,
        ProfileTab::Emergency,
        ProfileTab::Comms,
        ProfileTab::Visibility,
        ProfileTab::Disclosures,
    ];

    /// `Page=` key for the tab.
    pub fn key(self) -> &'static str {
        match self {
            ProfileTab::Personal => "PERSONAL",
            ProfileTab::Roles => "ROLES",
            ProfileTab::Permits => "PERMITS",
            ProfileTab::Training => "TRAINING",
            ProfileTab::Awards => "AWARDS",
            ProfileTab::Emergency => "EMERGENCY",
            ProfileTab::Comms => "COMMS",
            ProfileTab::Visibility => "VISIBILITY",
            ProfileTab::Disclosures => "DISCLOSURES",
        }
    }
}

impl fmt::Display for ProfileTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ProfileTab {
    type Err = CompassError;

    fn from_str(s: &str) -> Result<Self> {
        ProfileTab::ALL
            .into_iter()
            .find(|tab| tab.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let tabs: Vec<&str> = ProfileTab::ALL.iter().map(|t| t.key()).collect();
                CompassError::Parse(format!(
                    "Specified member profile tab {} is invalid. Allowed values are {:?}",
                    s, tabs
                ))
            })
    }
}

/// Scrapes member data. All methods return typed records.
#[derive(Debug, Clone)]
pub struct PeopleScraper {
    client: Arc<Client>,
}

impl PeopleScraper {
    pub fn new(client: Arc<Client>) -> Self {
        PeopleScraper { client }
    }

    fn strict(&self) -> bool {
        self.client.settings().validation_errors
    }

    /// Raw HTML of a profile tab.
    pub fn profile_tab(&self, membership_num: i64, tab: ProfileTab) -> Result<Vec<u8>> {
        let mut url = self
            .client
            .settings()
            .url(&format!("MemberProfile.aspx?CN={}", membership_num));
        if tab != ProfileTab::Personal {
            url.push_str(&format!("&Page={}&TAB", tab.key()));
        }
        Ok(self.client.get(&url)?.error_for_server_status()?.body)
    }

    fn profile_document(&self, membership_num: i64, tab: ProfileTab) -> Result<Html> {
        let body = self.profile_tab(membership_num, tab)?;
        Ok(Html::parse_document(&String::from_utf8_lossy(&body)))
    }

    /// Personal Details tab.
    ///
    /// Only fields the current role may see are filled in.
    ///
    /// # Errors
    /// - [`CompassError::Permission`] if the current role can't see the member
    /// - [`CompassError::Validation`] if strict validation is on and a contact
    ///   field is malformed
    pub fn personal_tab(&self, membership_num: i64) -> Result<MemberDetails> {
        let document = self.profile_document(membership_num, ProfileTab::Personal)?;
        ensure_access(&document, ACCESS_DENIED_MEMBER, membership_num)?;

        // Title reads "Scout - <membership number> <names...>"
        let title = document
            .select(&selector("title"))
            .next()
            .map(text_content)
            .unwrap_or_default();
        let names: Vec<&str> = title.trim().split(' ').skip(3).collect();

        let root = document.root_element();
        let profile = document.select(&selector("#divProfile0")).next();
        let in_profile = |label: &str| profile.and_then(|p| labelled_cell(p, label, 1));
        let positional = |row: usize| profile.map(|p| positional_label(p, row)).unwrap_or_default();

        let join_date = positional(3);
        let address = labelled_cell(root, "Address", 2).unwrap_or_default();

        let details = MemberDetails {
            membership_number: membership_num,
            forenames: names.first().and_then(|n| non_empty(n)),
            surname: non_empty(&names.iter().skip(1).copied().collect::<Vec<_>>().join(" ")),
            name: non_empty(&positional(0)),
            known_as: non_empty(&positional(1)),
            join_date: if join_date.trim() == "Unknown" {
                None
            } else {
                parse_date(&join_date)?
            },
            sex: in_profile("Gender:").and_then(|s| non_empty(&s)),
            address: process_address(&address),
            main_phone: labelled_cell(root, "Phone", 2).and_then(|s| non_empty(&s)),
            main_email: labelled_cell(root, "Email", 2).and_then(|s| non_empty(&s)),
            birth_date: parse_date(&in_profile("Date of Birth:").unwrap_or_default())?,
            nationality: in_profile("Nationality:").and_then(|s| non_empty(&s)),
            ethnicity: in_profile("Ethnicity:").and_then(|s| non_empty(&normalize_space(&s))),
            religion: in_profile("Religion/Faith:")
                .and_then(|s| non_empty(&normalize_space(&s))),
            occupation: in_profile("Occupation:").and_then(|s| non_empty(&normalize_space(&s))),
            postcode: None,
        };

        let validated = validation_errors_logging(
            membership_num,
            "Membership Number",
            self.strict(),
            details.validated(),
        )?;
        Ok(validated.unwrap_or(details))
    }

    /// Roles tab.
    ///
    /// Occasional helper, council, staff and network roles are dropped unless
    /// `keep_non_volunteer_roles` is set. `statuses`, when given, keeps only
    /// roles in those statuses. Membership duration counts every volunteer
    /// role that wasn't cancelled, whatever the filters.
    pub fn roles_tab(
        &self,
        membership_num: i64,
        keep_non_volunteer_roles: bool,
        statuses: Option<&BTreeSet<RoleStatus>>,
    ) -> Result<MemberRolesCollection> {
        debug!("getting roles tab for member number: {}", membership_num);
        let document = self.profile_document(membership_num, ProfileTab::Roles)?;
        ensure_access(&document, ACCESS_DENIED_MEMBER, membership_num)?;

        let today = Local::now().date_naive();
        let mut roles_dates = Vec::new();
        let mut roles = BTreeMap::new();

        for row in document.select(&selector("tbody > tr[data-pk]")) {
            let all_cells = row_cells(row);
            let role_type = all_cells.first().and_then(|cell| {
                child_elements(*cell)
                    .into_iter()
                    .find_map(|el| el.value().attr("title").map(str::to_string))
            });

            // Editable role lists add a tick-box column; rows without a
            // tick-box get an empty cell instead
            let mut cells = all_cells;
            if let Some(first) = cells.first() {
                let children = child_elements(*first);
                if children.is_empty() || children.iter().any(|el| el.value().name() == "input") {
                    cells.remove(0);
                }
            }
            if cells.len() < 7 {
                return Err(CompassError::Parse(format!(
                    "Unexpected roles table layout for member {}",
                    membership_num
                )));
            }

            let role_number = row
                .value()
                .attr("data-pk")
                .and_then(maybe_int)
                .ok_or_else(|| CompassError::Parse("Role row without a role number".into()))?;
            let (raw_status, review_date) =
                extract_review_date(text_content(cells[5]).trim())?;
            let Some(role_status) = validation_errors_logging(
                membership_num,
                "Membership Number",
                self.strict(),
                raw_status.parse::<RoleStatus>(),
            )?
            else {
                continue;
            };

            let role = MemberRoleCore {
                role_number,
                membership_number: membership_num,
                role_title: text_content(cells[0]).trim().to_string(),
                role_class: text_content(cells[1]).trim().to_string(),
                role_type,
                location_id: child_elements(cells[2])
                    .first()
                    .and_then(|el| el.value().attr("data-ng_id"))
                    .and_then(maybe_int),
                location_name: text_content(cells[2]).trim().to_string(),
                role_start: parse_date(&text_content(cells[3]))?,
                role_end: parse_date(&text_content(cells[4]))?,
                role_status,
                review_date,
                can_view_details: child_elements(cells[6]).iter().any(|el| {
                    el.value()
                        .attr("class")
                        .is_some_and(|class| class.contains("VIEWROLE"))
                }),
            };

            if is_non_volunteer(&role) {
                if !keep_non_volunteer_roles {
                    continue;
                }
            } else if role.role_status != RoleStatus::Cancelled {
                if let Some(start) = role.role_start {
                    roles_dates.push((start, role.role_end.unwrap_or(today)));
                }
            }

            if statuses.is_some_and(|wanted| !wanted.contains(&role.role_status)) {
                continue;
            }
            roles.insert(role.role_number, role);
        }

        Ok(MemberRolesCollection {
            roles,
            membership_duration: membership_duration(&roles_dates),
        })
    }

    /// Permits tab. Revoked permits have no expiry date.
    pub fn permits_tab(&self, membership_num: i64) -> Result<Vec<MemberPermit>> {
        let document = self.profile_document(membership_num, ProfileTab::Permits)?;

        let mut permits = Vec::new();
        for row in document.select(&selector("table#tbl_p4_permits tr.msTR.msTRPERM")) {
            let cells = child_elements(row);
            if cells.len() < 6 {
                return Err(CompassError::Parse(format!(
                    "Unexpected permits table layout for member {}",
                    membership_num
                )));
            }
            let expires = text_content(cells[5]);
            permits.push(MemberPermit {
                membership_number: membership_num,
                permit_type: text_content(cells[1]),
                category: text_content(cells[2]),
                kind: text_content(cells[3]),
                restrictions: text_content(cells[4]),
                expires: if expires.trim() == "Revoked" {
                    None
                } else {
                    parse_date(&expires)?
                },
                status: cells[5].value().attr("class").unwrap_or_default().to_string(),
            });
        }
        Ok(permits)
    }

    /// Training tab: role training status, learning plans and mandatory learning.
    pub fn training_tab(&self, membership_num: i64) -> Result<MemberTrainingTab> {
        self.training(membership_num, false)
    }

    /// Mandatory ongoing learning only (safety, safeguarding, first aid, GDPR).
    pub fn mandatory_training(&self, membership_num: i64) -> Result<MemberMandatoryTraining> {
        Ok(self.training(membership_num, true)?.mandatory)
    }

    fn training(&self, membership_num: i64, ongoing_only: bool) -> Result<MemberTrainingTab> {
        debug!("getting training tab for member number: {}", membership_num);
        let document = self.profile_document(membership_num, ProfileTab::Training)?;

        let mut plps = BTreeMap::new();
        let mut roles = BTreeMap::new();
        if let Some(table) = document.select(&selector("table#tbl_p5_TrainModules")).next() {
            for row in table_rows(table) {
                if has_class(row, "trPLP") {
                    let (plp_number, modules) = process_learning_plan(row, ongoing_only)?;
                    plps.insert(plp_number, modules);
                }
                if has_class(row, "msTR") {
                    let role = process_training_role(row)?;
                    roles.insert(role.role_number, role);
                }
            }
        }

        let mandatory = compile_ongoing_learning(&plps, &document)?;
        if ongoing_only {
            return Ok(MemberTrainingTab {
                mandatory,
                ..MemberTrainingTab::default()
            });
        }
        Ok(MemberTrainingTab {
            roles,
            plps,
            mandatory,
        })
    }

    /// Awards tab.
    pub fn awards_tab(&self, membership_num: i64) -> Result<Vec<MemberAward>> {
        let document = self.profile_document(membership_num, ProfileTab::Awards)?;
        ensure_access(&document, ACCESS_DENIED_MEMBER, membership_num)?;

        let mut awards = Vec::new();
        for table in document.select(&selector("table.msAward")) {
            for row in table_rows(table) {
                // Award properties sit in a sub-table in the second cell
                let Some(props_table) = child_elements(row)
                    .get(1)
                    .and_then(|cell| child_elements(*cell).into_iter().next())
                else {
                    continue;
                };
                let values: Vec<String> = table_rows(props_table)
                    .into_iter()
                    .map(|prop| {
                        child_elements(prop)
                            .get(1)
                            .map(|cell| text_content(*cell))
                            .unwrap_or_default()
                    })
                    .collect();
                let value = |i: usize| values.get(i).cloned().unwrap_or_default();
                awards.push(MemberAward {
                    membership_number: membership_num,
                    kind: value(0),
                    location: non_empty(&value(1)),
                    date: parse_date(&value(2))?,
                });
            }
        }
        Ok(awards)
    }

    /// Disclosures tab.
    ///
    /// Withdrawn applications can lack a country, number, issuer and dates.
    pub fn disclosures_tab(&self, membership_num: i64) -> Result<Vec<MemberDisclosure>> {
        let document = self.profile_document(membership_num, ProfileTab::Disclosures)?;
        ensure_access(&document, ACCESS_DENIED_MEMBER, membership_num)?;

        let mut disclosures = Vec::new();
        for row in document.select(&selector("tbody > tr")) {
            let cells = row_cells(row);
            if cells.len() < 8 {
                continue;
            }
            let text = |i: usize| text_content(cells[i]);
            disclosures.push(MemberDisclosure {
                membership_number: membership_num,
                country: non_empty(&text(0)),
                provider: text(1),
                kind: text(2),
                number: non_empty(&text(3)),
                issuer: non_empty(&text(4)),
                issue_date: parse_date(&text(5))?,
                status: text(6),
                expiry_date: parse_date(&text(7))?,
            });
        }
        Ok(disclosures)
    }

    /// Detailed data for one role, from the role popup.
    ///
    /// `response` may hold an already downloaded popup page, in which case
    /// no request is made.
    pub fn role_detail(&self, role_number: i64, response: Option<&[u8]>) -> Result<MemberRolePopup> {
        let start = Instant::now();
        let body = match response {
            Some(body) => body.to_vec(),
            None => {
                let url = self.client.settings().url(&format!(
                    "Popups/Profile/AssignNewRole.aspx?VIEW={}",
                    role_number
                ));
                let body = self.client.get(&url)?.error_for_server_status()?.body;
                debug!(
                    "Getting details for role number: {}. Request in {:.2}s",
                    role_number,
                    start.elapsed().as_secs_f64()
                );
                body
            }
        };
        let processing = Instant::now();

        let document = Html::parse_document(&String::from_utf8_lossy(&body));
        let form = Form::first(&document)?;
        if form.action == ACCESS_DENIED_ROLE {
            return Err(CompassError::Permission(format!(
                "You do not have permission to the details of role {}",
                role_number
            )));
        }

        let field = |name: &str| form.field(name).map(str::to_string);
        let membership_number = field("ctl00$workarea$txt_p1_memberno")
            .as_deref()
            .and_then(maybe_int)
            .ok_or_else(|| {
                CompassError::Parse(format!("No membership number for role {}", role_number))
            })?;

        let birth_date = if self.client.settings().debug {
            match form
                .control("ctl00$workarea$txt_p1_membername")
                .and_then(|c| c.attr("data-dob"))
            {
                Some(dob) => parse_date(dob)?,
                None => None,
            }
        } else {
            None
        };

        let line_manager = form
            .control("ctl00$workarea$cbo_p2_linemaneger")
            .and_then(|c| c.options.iter().find(|o| o.selected))
            .filter(|o| !UNSET_VALUES.contains(&o.text.as_str()));

        let ce_check = field("ctl00$workarea$txt_p2_cecheck").unwrap_or_default();
        let (disclosure_check, disclosure_date) =
            extract_disclosure_date(&field("ctl00$workarea$txt_p2_disclosure").unwrap_or_default())?;
        let references = field("ctl00$workarea$cbo_p2_referee_status").map(|code| {
            REFERENCE_CODES
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, description)| description.to_string())
                .unwrap_or(code)
        });

        let approvals = approval_values(&document);
        let approval = |code: &str| approvals.get(code).cloned();

        let details = MemberRoleDetail {
            role_number,
            organisation_level: field("ctl00$workarea$cbo_p1_level"),
            birth_date,
            membership_number,
            name: field("ctl00$workarea$txt_p1_membername")
                .and_then(|s| s.split_once(' ').map(|(_, name)| name.to_string())),
            role_title: field("ctl00$workarea$txt_p1_alt_title"),
            role_start: parse_date(&field("ctl00$workarea$txt_p1_startdate").unwrap_or_default())?,
            role_status: field("ctl00$workarea$txt_p2_status"),
            line_manager_number: line_manager.and_then(|o| maybe_int(&o.value)),
            line_manager: line_manager.map(|o| o.text.clone()),
            review_date: parse_date(&field("ctl00$workarea$txt_p2_review").unwrap_or_default())?,
            ce_check: if ce_check.trim() == "Pending" {
                None
            } else {
                parse_date(&ce_check)?
            },
            disclosure_check,
            disclosure_date,
            references,
            appointment_panel_approval: approval("ROLPRP|AACA"),
            commissioner_approval: approval("ROLPRP|CAPR"),
            committee_approval: approval("ROLPRP|CCA"),
        };

        let popup = MemberRolePopup {
            hierarchy: RoleHierarchy::from_levels(&role_locations(&form)),
            details,
            getting_started: getting_started_modules(&document)?,
        };

        debug!(
            "Processed details for role number: {}. Compass: {:.3}s; Processing: {:.4}s",
            role_number,
            (processing - start).as_secs_f64(),
            processing.elapsed().as_secs_f64()
        );

        let validated =
            validation_errors_logging(role_number, "Role Number", self.strict(), popup.validated())?;
        Ok(validated.unwrap_or(popup))
    }
}

fn ensure_access(document: &Html, denied_action: &str, membership_num: i64) -> Result<()> {
    let form = Form::first(document)?;
    if form.action == denied_action {
        return Err(CompassError::Permission(format!(
            "You do not have permission to the details of {}",
            membership_num
        )));
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Label text in the second cell of the `row`-th row of the profile block.
fn positional_label(profile: ElementRef<'_>, row: usize) -> String {
    profile
        .select(&selector("tr"))
        .nth(row)
        .and_then(|tr| row_cells(tr).get(1).copied())
        .and_then(|cell| cell.select(&selector("label")).next())
        .map(text_content)
        .unwrap_or_default()
}

fn is_non_volunteer(role: &MemberRoleCore) -> bool {
    role.role_class.to_lowercase().contains("helper")
        || NON_VOLUNTEER_TITLES.contains(&role.role_title.to_lowercase().as_str())
}

/// Splits `street, town[, county]. POSTCODE COUNTRY`.
///
/// Addresses that don't follow the pattern are kept only as unparsed text.
pub fn process_address(address: &str) -> AddressData {
    let address = address.trim();
    if address.is_empty() {
        return AddressData::default();
    }
    let unparsed = AddressData {
        unparsed_address: Some(address.to_string()),
        ..AddressData::default()
    };

    let Some((main, code)) = address.rsplit_once(". ") else {
        return unparsed;
    };
    let Some((postcode, country)) = code.rsplit_once(' ') else {
        return unparsed;
    };
    let parts: Vec<&str> = main.rsplitn(3, ", ").collect();
    let (street, town, county) = match parts.as_slice() {
        [county, town, street] => (*street, *town, Some(*county)),
        [town, street] => (*street, *town, None),
        _ => return unparsed,
    };

    AddressData {
        unparsed_address: Some(address.to_string()),
        country: Some(country.to_string()),
        postcode: Some(postcode.to_string()),
        county: county.map(str::to_string),
        town: Some(town.to_string()),
        street: Some(street.to_string()),
    }
}

/// Splits `Full Review Due <date>` and `Full Ending <date>` into a status and date.
pub fn extract_review_date(review_status: &str) -> Result<(String, Option<NaiveDate>)> {
    for prefix in ["Full Review Due ", "Full Ending "] {
        if let Some(date) = review_status.strip_prefix(prefix) {
            return Ok(("Full".to_string(), parse_date(date)?));
        }
    }
    Ok((review_status.to_string(), None))
}

/// Splits `Disclosure Issued : <date>` into a check status and date.
pub fn extract_disclosure_date(status: &str) -> Result<(Option<String>, Option<NaiveDate>)> {
    if let Some(date) = status.strip_prefix("Disclosure Issued : ") {
        return Ok((Some("Disclosure Issued".to_string()), parse_date(date)?));
    }
    Ok((non_empty(status), None))
}

/// Merges inclusive date ranges that overlap or touch.
pub fn merge_date_ranges(ranges: &[(NaiveDate, NaiveDate)]) -> Vec<(NaiveDate, NaiveDate)> {
    let mut sorted = ranges.to_vec();
    sorted.sort();

    let mut merged: Vec<(NaiveDate, NaiveDate)> = Vec::new();
    for (start, end) in sorted {
        match merged.last_mut() {
            Some((_, last_end)) if (start - *last_end).num_days() <= 1 => {
                *last_end = (*last_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Days of membership (inclusive) across all ranges, in years.
pub fn membership_duration(ranges: &[(NaiveDate, NaiveDate)]) -> f64 {
    let days: i64 = merge_date_ranges(ranges)
        .iter()
        .map(|(start, end)| (*end - *start).num_days() + 1)
        .sum();
    // Leap year except thrice per 400 years
    days as f64 / 365.2425
}

fn process_learning_plan(row: ElementRef<'_>, ongoing_only: bool) -> Result<(i64, Vec<TrainingModule>)> {
    let plp_table = child_elements(row)
        .into_iter()
        .next()
        .and_then(|cell| child_elements(cell).into_iter().next())
        .ok_or_else(|| CompassError::Parse("Learning plan row without a table".into()))?;
    let plp_number = plp_table
        .value()
        .attr("data-pk")
        .and_then(maybe_int)
        .ok_or_else(|| CompassError::Parse("Learning plan without a number".into()))?;

    let mut modules = Vec::new();
    for module_row in table_rows(plp_table) {
        if !(has_class(module_row, "msTR") && has_class(module_row, "trMTMN")) {
            continue;
        }
        let cells = child_elements(module_row);
        if cells.len() < 6 {
            return Err(CompassError::Parse(format!(
                "Unexpected learning plan layout in plan {}",
                plp_number
            )));
        }

        let title = text_content(cells[0]);
        let (code, name) = match MODULE_CODE_RE.captures(title.trim()) {
            Some(caps) => (Some(caps[1].to_string()), Some(caps[2].to_string())),
            None => (None, None),
        };
        // Only GDPR counts towards ongoing learning
        if ongoing_only && !code.as_deref().is_some_and(|c| c.to_lowercase().contains("gdpr")) {
            continue;
        }

        let learning_required = text_content(cells[1]).to_lowercase();
        let validated_by = text_content(cells[4]);
        let (validated_membership_number, validated_name) = match validated_by.trim() {
            "" => (None, None),
            text => {
                let (number, name) = text.split_once(' ').unwrap_or((text, ""));
                (maybe_int(number), Some(name.to_string()))
            }
        };

        modules.push(TrainingModule {
            pk: module_row
                .value()
                .attr("data-pk")
                .and_then(maybe_int)
                .unwrap_or_default(),
            module_id: cells[0]
                .value()
                .attr("id")
                .and_then(|id| id.get(4..))
                .and_then(maybe_int)
                .unwrap_or_default(),
            code,
            name,
            learning_required: if learning_required.trim().is_empty() {
                None
            } else {
                Some(learning_required.contains("yes"))
            },
            learning_method: non_empty(&text_content(cells[2])),
            learning_completed: parse_date(&text_content(cells[3]))?,
            learning_date: parse_date(&text_content(cells[3]))?,
            validated_membership_number,
            validated_name,
            validated_date: parse_date(&text_content(cells[5]))?,
        });
    }
    Ok((plp_number, modules))
}

fn process_training_role(row: ElementRef<'_>) -> Result<TrainingRole> {
    let cells = child_elements(row);
    let role_number = row
        .value()
        .attr("data-ng_mrn")
        .and_then(maybe_int)
        .ok_or_else(|| CompassError::Parse("Training role row without a role number".into()))?;
    if cells.len() < 6 {
        return Err(CompassError::Parse(format!(
            "Unexpected training layout for role {}",
            role_number
        )));
    }

    let status_with_review = text_content(cells[2]);
    let (role_status, review_date) = match ["Full (Review Due: ", "Full (Ending: "]
        .iter()
        .find_map(|prefix| status_with_review.strip_prefix(prefix))
    {
        Some(date) => ("Full".to_string(), parse_date(date.trim_end_matches(')'))?),
        None => (status_with_review.clone(), None),
    };

    let mut role = TrainingRole {
        role_number,
        role_title: text_content(cells[0]),
        role_start: parse_date(&text_content(cells[1]))?,
        role_status,
        review_date,
        location: text_content(cells[3]),
        wood_badge_number: cells[5]
            .value()
            .attr("id")
            .map(|id| id.trim_start_matches("WB_"))
            .and_then(non_empty),
        ..TrainingRole::default()
    };

    let advisor = text_content(cells[4]);
    if !advisor.trim().is_empty() {
        let (number, name) = advisor.split_once(' ').unwrap_or((advisor.as_str(), ""));
        role.ta_number = maybe_int(number);
        role.ta_name = Some(name.to_string());
        role.ta_data = Some(advisor.clone());
    }

    let completion = text_content(cells[5]);
    if !completion.trim().is_empty() {
        let (kind, date) = completion.split_once(':').unwrap_or((completion.as_str(), ""));
        role.completion_type = Some(kind.trim().to_string());
        role.completion_date = parse_date(date.trim())?;
        role.completion = Some(completion.clone());
    }
    Ok(role)
}

fn compile_ongoing_learning(
    plps: &BTreeMap<i64, Vec<TrainingModule>>,
    document: &Html,
) -> Result<MemberMandatoryTraining> {
    let mut mandatory = MemberMandatoryTraining {
        gdpr: OngoingLearning {
            completed_date: plps
                .values()
                .flatten()
                .filter(|module| module.code.as_deref() == Some("GDPR"))
                .filter_map(|module| module.validated_date)
                .max(),
            renewal_date: None,
        },
        ..MemberMandatoryTraining::default()
    };

    for row in document.select(&selector("tr[data-ng_code]")) {
        let cells: BTreeMap<String, String> = child_elements(row)
            .into_iter()
            .map(|cell| {
                let id = cell.value().attr("id").unwrap_or("<None>");
                let key = id.split('_').next().unwrap_or_default().to_string();
                (key, text_content(cell))
            })
            .collect();
        let learning = OngoingLearning {
            completed_date: parse_date(cells.get("tdLastComplete").map_or("", String::as_str))?,
            renewal_date: parse_date(cells.get("tdRenewal").map_or("", String::as_str))?,
        };
        match row.value().attr("data-ng_code") {
            Some("SA") => mandatory.safety = learning,
            Some("SG") => mandatory.safeguarding = learning,
            Some("FA") => mandatory.first_aid = learning,
            other => debug!("Ignoring unknown ongoing learning code {:?}", other),
        }
    }
    Ok(mandatory)
}

/// Approval code → current value, from the role popup's property rows.
fn approval_values(document: &Html) -> BTreeMap<String, String> {
    let mut approvals = BTreeMap::new();
    for row in document.select(&selector("tr.trProp")) {
        let Some(select) = child_elements(row)
            .get(1)
            .and_then(|cell| child_elements(*cell).into_iter().next())
        else {
            continue;
        };
        // The title attribute only shows who first added the role, so it's ignored
        if let (Some(code), Some(value)) = (
            select.value().attr("data-app_code"),
            select.value().attr("data-db"),
        ) {
            approvals.insert(code.to_string(), value.to_string());
        }
    }
    approvals
}

fn getting_started_modules(document: &Html) -> Result<BTreeMap<String, GettingStartedModule>> {
    let mut modules = BTreeMap::new();
    for row in document.select(&selector("tr.trTrain.trTrainData")) {
        let cells = child_elements(row);
        if cells.len() < 3 {
            continue;
        }
        let name = child_elements(cells[0])
            .first()
            .map(|el| text_content(*el).trim().to_string())
            .unwrap_or_default();
        if !MODULE_NAMES.iter().any(|(module, _)| *module == name) {
            continue;
        }

        let Some(date_input) = child_elements(cells[2]).into_iter().next() else {
            continue;
        };
        let code = date_input.value().attr("data-ng_value").unwrap_or_default();
        let key = RENAMED_MODULES
            .iter()
            .find(|(c, _)| *c == code)
            .map_or(code, |(_, renamed)| *renamed);
        let validated_by = child_elements(cells[1])
            .get(1)
            .and_then(|el| el.value().attr("value"))
            .and_then(non_empty);

        modules.insert(
            key.to_string(),
            GettingStartedModule {
                validated: parse_date(date_input.value().attr("value").unwrap_or_default())?,
                validated_by,
            },
        );
    }
    Ok(modules)
}

/// Organisation levels the role sits in, keyed by lower-cased level name.
fn role_locations(form: &Form) -> BTreeMap<String, String> {
    let mut controls: Vec<_> = form
        .controls
        .iter()
        .filter(|c| c.name.contains("ctl00$workarea$cbo_p1_location"))
        .collect();
    controls.sort_by(|a, b| a.name.cmp(&b.name));

    controls
        .into_iter()
        .filter_map(|control| {
            let level = control.attr("title")?;
            let value = control.options.first()?.text.clone();
            if UNSET_VALUES.contains(&value.as_str()) {
                return None;
            }
            let level = RENAMED_LEVELS
                .iter()
                .find(|(long, _)| *long == level)
                .map_or(level, |(_, short)| *short);
            Some((level.to_lowercase(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn role(title: &str, class: &str) -> MemberRoleCore {
        MemberRoleCore {
            role_number: 1,
            membership_number: 1,
            role_title: title.to_string(),
            role_class: class.to_string(),
            role_type: None,
            location_id: None,
            location_name: String::new(),
            role_start: None,
            role_end: None,
            role_status: RoleStatus::Full,
            review_date: None,
            can_view_details: false,
        }
    }

    #[test]
    fn network_and_helper_roles_are_not_volunteer_roles() {
        assert!(is_non_volunteer(&role("County Scout Network Member", "Member")));
        assert!(is_non_volunteer(&role("District Scout Network Member", "Member")));
        assert!(is_non_volunteer(&role("Section Assistant", "Occasional Helper")));
        assert!(!is_non_volunteer(&role("County Commissioner", "Commissioner")));
    }

    #[test]
    fn address_with_county() {
        let address = process_address("1 High Street, Guildford, Surrey. GU1 1AA UK");
        assert_eq!(address.street.as_deref(), Some("1 High Street"));
        assert_eq!(address.town.as_deref(), Some("Guildford"));
        assert_eq!(address.county.as_deref(), Some("Surrey"));
        assert_eq!(address.postcode.as_deref(), Some("GU1 1AA"));
        assert_eq!(address.country.as_deref(), Some("UK"));
    }

    #[test]
    fn address_without_county() {
        let address = process_address("1 High Street, Guildford. GU1 1AA UK");
        assert_eq!(address.town.as_deref(), Some("Guildford"));
        assert_eq!(address.county, None);
    }

    #[test]
    fn odd_addresses_stay_unparsed() {
        assert_eq!(process_address(""), AddressData::default());
        let address = process_address("Somewhere without structure");
        assert_eq!(
            address.unparsed_address.as_deref(),
            Some("Somewhere without structure")
        );
        assert_eq!(address.postcode, None);
    }

    #[test]
    fn review_dates_split_from_status() {
        assert_eq!(
            extract_review_date("Full Review Due 01 Jan 2025").unwrap(),
            ("Full".to_string(), Some(date(2025, 1, 1)))
        );
        assert_eq!(
            extract_review_date("Full Ending 02 February 2024").unwrap(),
            ("Full".to_string(), Some(date(2024, 2, 2)))
        );
        assert_eq!(
            extract_review_date("Provisional").unwrap(),
            ("Provisional".to_string(), None)
        );
    }

    #[test]
    fn disclosure_dates_split_from_status() {
        assert_eq!(
            extract_disclosure_date("Disclosure Issued : 05 Mar 2021").unwrap(),
            (Some("Disclosure Issued".to_string()), Some(date(2021, 3, 5)))
        );
        assert_eq!(extract_disclosure_date("").unwrap(), (None, None));
        assert_eq!(
            extract_disclosure_date("Application Withdrawn").unwrap(),
            (Some("Application Withdrawn".to_string()), None)
        );
    }

    #[test]
    fn overlapping_and_adjacent_ranges_merge() {
        let ranges = [
            (date(2010, 1, 1), date(2012, 1, 1)),
            (date(2011, 6, 1), date(2013, 1, 1)),
            (date(2013, 1, 2), date(2014, 1, 1)),
            (date(2020, 1, 1), date(2020, 12, 31)),
            (date(2010, 2, 1), date(2010, 3, 1)),
        ];
        assert_eq!(
            merge_date_ranges(&ranges),
            vec![
                (date(2010, 1, 1), date(2014, 1, 1)),
                (date(2020, 1, 1), date(2020, 12, 31)),
            ]
        );
    }

    #[test]
    fn duration_counts_inclusive_days() {
        let one_day = [(date(2020, 1, 1), date(2020, 1, 1))];
        assert!((membership_duration(&one_day) - 1.0 / 365.2425).abs() < 1e-12);
        assert_eq!(membership_duration(&[]), 0.0);

        let leap_year = [(date(2020, 1, 1), date(2020, 12, 31))];
        assert!((membership_duration(&leap_year) - 366.0 / 365.2425).abs() < 1e-12);
    }

    #[test]
    fn profile_tabs_parse_case_insensitively() {
        assert_eq!("roles".parse::<ProfileTab>().unwrap(), ProfileTab::Roles);
        let err = "Children".parse::<ProfileTab>().unwrap_err();
        assert!(err.to_string().contains("Allowed values are"));
    }
}
