//! Organisation hierarchy and member search scraping.
//!
//! The hierarchy API returns JSON lists of units below a parent unit. With
//! `LiveData=Y` each unit additionally carries a JSON-encoded `Tag` holding
//! its status, address, member count and (for sections) the section type.

use chrono::{Local, Timelike};
use log::debug;
use scraper::Html;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::client::Client;
use crate::error::{CompassError, Result};
use crate::models::hierarchy::{HierarchyEndpoint, HierarchyMember, HierarchyUnit, HierarchyUnitRecord};
use crate::parser::Form;
use crate::utility::compass_restify;

const DENIED_MESSAGE: &str = "Authorization has been denied for this request.";
const SEARCH_ERROR_ACTION: &str = "./ScoutsPortal.aspx?Invalid=SearchError";
const SEARCH_DATA_FIELD: &str = "ctl00$plInnerPanel_head$txt_h_Data";

/// Search result columns that carry nothing useful: visibility is always
/// "Y" for results we can see, addresses lack reliable postcodes and the
/// role is only the primary role.
const DROPPED_MEMBER_KEYS: [&str; 3] = ["visibility_status", "address", "role"];

#[derive(Debug, Clone)]
pub struct HierarchyScraper {
    client: Arc<Client>,
}

impl HierarchyScraper {
    pub fn new(client: Arc<Client>) -> Self {
        HierarchyScraper { client }
    }

    /// Units (or sections) directly below `parent_unit`.
    ///
    /// # Errors
    /// - [`CompassError::Permission`] if the current role can't see the unit
    /// - [`CompassError::Network`] on transport failures or HTTP 5xx
    pub fn units_from_hierarchy(
        &self,
        parent_unit: i64,
        endpoint: HierarchyEndpoint,
    ) -> Result<Vec<HierarchyUnit>> {
        let url = self
            .client
            .settings()
            .url(&format!("hierarchy{}", endpoint.path()));
        debug!("Getting {} for unit {}", endpoint.name(), parent_unit);
        let reply = self
            .client
            .post_json(&url, &json!({"LiveData": "Y", "ParentID": parent_unit.to_string()}))?
            .error_for_server_status()?;

        let value: Value = reply.json()?;
        if value.get("Message").and_then(Value::as_str) == Some(DENIED_MESSAGE) {
            return Err(CompassError::Permission(format!(
                "You do not have permission to see {} of unit {}",
                endpoint.name(),
                parent_unit
            )));
        }

        let records: Vec<HierarchyUnitRecord> = serde_json::from_value(value)?;
        Ok(records.into_iter().map(HierarchyUnit::from).collect())
    }

    /// Members holding roles in a unit, via the hierarchy member search.
    pub fn members_with_roles_in_unit(&self, unit_number: i64) -> Result<Vec<HierarchyMember>> {
        let now = Local::now();
        let time_uid = format!(
            "{}{}{}",
            now.hour(),
            now.minute(),
            now.timestamp_subsec_millis()
        );
        let data = compass_restify([
            ("SearchType", "HIERARCHY".to_string()),
            ("OrganisationNumber", unit_number.to_string()),
            ("UI", time_uid),
        ]);

        let settings = self.client.settings();
        self.client
            .post_json(&settings.url("Search/Members"), &data)?
            .error_for_server_status()?;
        let results = self
            .client
            .get(&settings.url("SearchResults.aspx"))?
            .error_for_server_status()?;

        let document = Html::parse_document(&results.text());
        let form = Form::first(&document)?;
        if form.action == SEARCH_ERROR_ACTION {
            return Err(CompassError::Compass("Invalid Search".to_string()));
        }

        parse_search_results(form.field(SEARCH_DATA_FIELD).unwrap_or_default())
    }
}

/// Decodes the member search JSON, dropping the uninformative columns.
pub fn parse_search_results(raw: &str) -> Result<Vec<HierarchyMember>> {
    let raw = if raw.trim().is_empty() { "[]" } else { raw };
    let rows: Vec<Map<String, Value>> = serde_json::from_str(raw)?;
    rows.into_iter()
        .map(|mut row| -> Result<HierarchyMember> {
            for key in DROPPED_MEMBER_KEYS {
                row.remove(key);
            }
            Ok(serde_json::from_value(Value::Object(row))?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_results_drop_noise_columns() {
        let members = parse_search_results(
            r#"[{"contact_number":"123","name":"A Person","visibility_status":"Y","address":"x","role":"Leader","email":"a@example.com"}]"#,
        )
        .unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].contact_number, 123);
        assert_eq!(members[0].name, "A Person");
        assert!(members[0].extra.contains_key("email"));
        assert!(!members[0].extra.contains_key("role"));
        assert!(!members[0].extra.contains_key("address"));
    }

    #[test]
    fn empty_search_field_means_no_members() {
        assert!(parse_search_results("").unwrap().is_empty());
        assert!(parse_search_results("[]").unwrap().is_empty());
    }
}
