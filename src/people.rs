//! Member data for the logged-in role.

use std::collections::BTreeSet;

use log::debug;

use crate::error::Result;
use crate::logon::Logon;
use crate::models::member::{
    MemberAward, MemberDetails, MemberDisclosure, MemberMandatoryTraining, MemberPermit,
    MemberRolePopup, MemberRolesCollection, MemberTrainingTab, RoleStatus,
};
use crate::scrapers::member::PeopleScraper;

#[derive(Debug, Clone)]
pub struct People {
    scraper: PeopleScraper,
}

impl People {
    pub fn new(logon: &Logon) -> Self {
        People {
            scraper: PeopleScraper::new(logon.client().clone()),
        }
    }

    pub fn personal(&self, membership_num: i64) -> Result<MemberDetails> {
        self.scraper.personal_tab(membership_num)
    }

    /// Roles held by a member.
    ///
    /// # Arguments
    /// * `keep_non_volunteer_roles` - include occasional helper, network,
    ///   staff and council roles
    /// * `statuses` - only keep roles in these statuses
    pub fn roles(
        &self,
        membership_num: i64,
        keep_non_volunteer_roles: bool,
        statuses: Option<&BTreeSet<RoleStatus>>,
    ) -> Result<MemberRolesCollection> {
        self.scraper
            .roles_tab(membership_num, keep_non_volunteer_roles, statuses)
    }

    /// Roles plus the popup details of every role the current role may view.
    pub fn roles_with_details(
        &self,
        membership_num: i64,
        keep_non_volunteer_roles: bool,
    ) -> Result<(MemberRolesCollection, Vec<MemberRolePopup>)> {
        let roles = self.roles(membership_num, keep_non_volunteer_roles, None)?;
        let mut details = Vec::new();
        for role in roles.roles.values().filter(|r| r.can_view_details) {
            debug!("Fetching details for role {}", role.role_number);
            details.push(self.scraper.role_detail(role.role_number, None)?);
        }
        Ok((roles, details))
    }

    pub fn permits(&self, membership_num: i64) -> Result<Vec<MemberPermit>> {
        self.scraper.permits_tab(membership_num)
    }

    pub fn training(&self, membership_num: i64) -> Result<MemberTrainingTab> {
        self.scraper.training_tab(membership_num)
    }

    pub fn mandatory_training(&self, membership_num: i64) -> Result<MemberMandatoryTraining> {
        self.scraper.mandatory_training(membership_num)
    }

    pub fn awards(&self, membership_num: i64) -> Result<Vec<MemberAward>> {
        self.scraper.awards_tab(membership_num)
    }

    pub fn disclosures(&self, membership_num: i64) -> Result<Vec<MemberDisclosure>> {
        self.scraper.disclosures_tab(membership_num)
    }

    /// Most recently issued disclosure, if any has an issue date.
    pub fn latest_disclosure(&self, membership_num: i64) -> Result<Option<MemberDisclosure>> {
        Ok(self
            .disclosures(membership_num)?
            .into_iter()
            .filter(|d| d.issue_date.is_some())
            .max_by_key(|d| d.issue_date))
    }

    pub fn role_detail(&self, role_number: i64) -> Result<MemberRolePopup> {
        self.scraper.role_detail(role_number, None)
    }
}
