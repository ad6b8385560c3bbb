//! Member records scraped from the MemberProfile tabs and role popups.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::validation::{
    Validate, ValidationError, normalise_phone, validate_email, validate_membership_number,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddressData {
    pub unparsed_address: Option<String>,
    pub country: Option<String>,
    pub postcode: Option<String>,
    pub county: Option<String>,
    pub town: Option<String>,
    pub street: Option<String>,
}

/// Personal Details tab.
///
/// Which fields are filled in depends on what the current role may see.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemberDetails {
    pub membership_number: i64,
    pub name: Option<String>,
    pub known_as: Option<String>,
    pub forenames: Option<String>,
    pub surname: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<String>,
    pub nationality: Option<String>,
    pub ethnicity: Option<String>,
    pub religion: Option<String>,
    pub occupation: Option<String>,
    pub join_date: Option<NaiveDate>,
    pub postcode: Option<String>,
    pub main_phone: Option<String>,
    pub main_email: Option<String>,
    pub address: AddressData,
}

impl Validate for MemberDetails {
    fn validated(&self) -> Result<Self, ValidationError> {
        let mut details = self.clone();
        validate_membership_number("membership_number", details.membership_number)?;
        if let Some(email) = &self.main_email {
            details.main_email = Some(validate_email("main_email", email)?);
        }
        if let Some(phone) = &self.main_phone {
            details.main_phone = Some(normalise_phone("main_phone", phone)?);
        }
        if details.postcode.is_none() {
            details.postcode = details.address.postcode.clone();
        }
        Ok(details)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RoleStatus {
    Cancelled,
    Closed,
    Full,
    #[serde(rename = "Pre provisional")]
    PreProvisional,
    Provisional,
}

impl RoleStatus {
    pub const ALL: [RoleStatus; 5] = [
        RoleStatus::Cancelled,
        RoleStatus::Closed,
        RoleStatus::Full,
        RoleStatus::PreProvisional,
        RoleStatus::Provisional,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RoleStatus::Cancelled => "Cancelled",
            RoleStatus::Closed => "Closed",
            RoleStatus::Full => "Full",
            RoleStatus::PreProvisional => "Pre provisional",
            RoleStatus::Provisional => "Provisional",
        }
    }
}

impl fmt::Display for RoleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', " ").as_str() {
            "cancelled" => Ok(RoleStatus::Cancelled),
            "closed" => Ok(RoleStatus::Closed),
            "full" => Ok(RoleStatus::Full),
            "pre provisional" => Ok(RoleStatus::PreProvisional),
            "provisional" => Ok(RoleStatus::Provisional),
            _ => {
                let allowed: Vec<&str> = RoleStatus::ALL.iter().map(|s| s.as_str()).collect();
                Err(ValidationError::new(
                    "role_status",
                    format!(
                        "unexpected value '{}'; permitted: {}",
                        s,
                        allowed.join(", ")
                    ),
                ))
            }
        }
    }
}

/// One row of the Roles tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberRoleCore {
    pub role_number: i64,
    pub membership_number: i64,
    pub role_title: String,
    pub role_class: String,
    /// Only visible to roles with access to the System Admin tab
    pub role_type: Option<String>,
    /// Only present while the role's location still exists in the hierarchy
    pub location_id: Option<i64>,
    pub location_name: String,
    pub role_start: Option<NaiveDate>,
    pub role_end: Option<NaiveDate>,
    pub role_status: RoleStatus,
    pub review_date: Option<NaiveDate>,
    pub can_view_details: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemberRolesCollection {
    pub roles: BTreeMap<i64, MemberRoleCore>,
    /// Years of (merged) full volunteer role time
    pub membership_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberPermit {
    pub membership_number: i64,
    pub permit_type: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub restrictions: String,
    /// `None` when the permit has been revoked
    pub expires: Option<NaiveDate>,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingRole {
    pub role_number: i64,
    pub role_title: String,
    pub role_start: Option<NaiveDate>,
    pub role_status: String,
    pub review_date: Option<NaiveDate>,
    pub location: String,
    pub ta_data: Option<String>,
    pub ta_number: Option<i64>,
    pub ta_name: Option<String>,
    pub completion: Option<String>,
    pub completion_type: Option<String>,
    pub completion_date: Option<NaiveDate>,
    pub wood_badge_number: Option<String>,
}

/// A Personal Learning Plan module row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingModule {
    pub pk: i64,
    pub module_id: i64,
    pub code: Option<String>,
    pub name: Option<String>,
    pub learning_required: Option<bool>,
    pub learning_method: Option<String>,
    pub learning_completed: Option<NaiveDate>,
    pub learning_date: Option<NaiveDate>,
    pub validated_membership_number: Option<i64>,
    pub validated_name: Option<String>,
    pub validated_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OngoingLearning {
    pub completed_date: Option<NaiveDate>,
    pub renewal_date: Option<NaiveDate>,
}

/// Mandatory ongoing learning. Every type is present, empty if never done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemberMandatoryTraining {
    pub safety: OngoingLearning,
    pub safeguarding: OngoingLearning,
    pub first_aid: OngoingLearning,
    pub gdpr: OngoingLearning,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemberTrainingTab {
    pub roles: BTreeMap<i64, TrainingRole>,
    pub plps: BTreeMap<i64, Vec<TrainingModule>>,
    pub mandatory: MemberMandatoryTraining,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberAward {
    pub membership_number: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberDisclosure {
    pub membership_number: i64,
    /// Missing when the application was withdrawn
    pub country: Option<String>,
    pub provider: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub number: Option<String>,
    pub issuer: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub status: String,
    pub expiry_date: Option<NaiveDate>,
}

/// Where a role sits in the organisation, from the role popup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleHierarchy {
    pub organisation: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub county: Option<String>,
    pub district: Option<String>,
    pub group: Option<String>,
    pub section: Option<String>,
}

impl RoleHierarchy {
    /// Builds the hierarchy from lower-cased level names. Unknown levels are ignored.
    pub fn from_levels(levels: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| levels.get(key).cloned();
        RoleHierarchy {
            organisation: get("organisation"),
            country: get("country"),
            region: get("region"),
            county: get("county"),
            district: get("district"),
            group: get("group"),
            section: get("section"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemberRoleDetail {
    pub role_number: i64,
    pub organisation_level: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub membership_number: i64,
    pub name: Option<String>,
    pub role_title: Option<String>,
    pub role_start: Option<NaiveDate>,
    pub role_status: Option<String>,
    pub line_manager_number: Option<i64>,
    pub line_manager: Option<String>,
    pub review_date: Option<NaiveDate>,
    /// Confidential enquiry check
    pub ce_check: Option<NaiveDate>,
    pub disclosure_check: Option<String>,
    pub disclosure_date: Option<NaiveDate>,
    pub references: Option<String>,
    pub appointment_panel_approval: Option<String>,
    pub commissioner_approval: Option<String>,
    pub committee_approval: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GettingStartedModule {
    pub validated: Option<NaiveDate>,
    pub validated_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemberRolePopup {
    pub hierarchy: RoleHierarchy,
    pub details: MemberRoleDetail,
    pub getting_started: BTreeMap<String, GettingStartedModule>,
}

impl Validate for MemberRolePopup {
    fn validated(&self) -> Result<Self, ValidationError> {
        validate_membership_number("details.membership_number", self.details.membership_number)?;
        validate_membership_number("details.role_number", self.details.role_number)?;
        if let Some(status) = &self.details.role_status {
            status.parse::<RoleStatus>()?;
        }
        Ok(self.clone())
    }
}
