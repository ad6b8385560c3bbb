//! Session properties Compass embeds in every portal page.
//!
//! The portal form carries a hidden `ctl00$_POST_CTRL` field holding
//! `Key.Path#value~Key.Path#value~...`. Keys are dotted paths such as
//! `Master.User.CN`; they are folded into nested, lower-cased JSON objects and
//! deserialized into [`CompassProps`].

use chrono::NaiveTime;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::serde_helpers::{optional_flag, optional_int, optional_string, optional_time};
use crate::error::{CompassError, Result};
use crate::utility::cast;

/// Role number → (role title, role location)
pub type Roles = BTreeMap<i64, (String, String)>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassPropsNav {
    #[serde(deserialize_with = "optional_string")]
    pub action: Option<String>,
    #[serde(rename = "startno", deserialize_with = "optional_int")]
    pub start_no: Option<i64>,
    #[serde(rename = "startpage", deserialize_with = "optional_int")]
    pub start_page: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassPropsPage {
    #[serde(rename = "usecn", deserialize_with = "optional_int")]
    pub use_cn: Option<i64>,
    #[serde(rename = "hidebadges", deserialize_with = "optional_flag")]
    pub hide_badges: Option<bool>,
    #[serde(deserialize_with = "optional_string")]
    pub croc: Option<String>,
    #[serde(rename = "hidenominations", deserialize_with = "optional_flag")]
    pub hide_nominations: Option<bool>,
    #[serde(rename = "candeleteoglhrs", deserialize_with = "optional_flag")]
    pub can_delete_ogl_hrs: Option<bool>,
    #[serde(rename = "foldname", deserialize_with = "optional_string")]
    pub fold_name: Option<String>,
}

/// Create/read/update/delete permission letters per data area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassPropsCrud {
    #[serde(deserialize_with = "optional_string")]
    pub mdis: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub roles: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub pemd: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub mmmd: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub mvid: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub perm: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub trn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassPropsUser {
    #[serde(rename = "isme", deserialize_with = "optional_flag")]
    pub is_me: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassPropsMasterSso {
    #[serde(deserialize_with = "optional_int")]
    pub on: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassPropsMasterUser {
    /// Contact (membership) number
    #[serde(deserialize_with = "optional_int")]
    pub cn: Option<i64>,
    /// Member role number
    #[serde(deserialize_with = "optional_int")]
    pub mrn: Option<i64>,
    /// Organisation number
    #[serde(deserialize_with = "optional_int")]
    pub on: Option<i64>,
    #[serde(deserialize_with = "optional_string")]
    pub lvl: Option<String>,
    /// Session key mixed into authenticated request hashes
    #[serde(deserialize_with = "optional_string")]
    pub jk: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassPropsMasterConst {
    #[serde(deserialize_with = "optional_int")]
    pub wales: Option<i64>,
    #[serde(deserialize_with = "optional_int")]
    pub scotland: Option<i64>,
    #[serde(rename = "overseas", deserialize_with = "optional_int")]
    pub over_seas: Option<i64>,
    #[serde(deserialize_with = "optional_int")]
    pub hq: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassPropsMasterSys {
    #[serde(rename = "sessionid", deserialize_with = "optional_string")]
    pub session_id: Option<String>,
    #[serde(rename = "safejson", deserialize_with = "optional_flag")]
    pub safe_json: Option<bool>,
    #[serde(rename = "webpath", deserialize_with = "optional_string")]
    pub web_path: Option<String>,
    #[serde(deserialize_with = "optional_flag")]
    pub beta: Option<bool>,
    #[serde(rename = "textsize", deserialize_with = "optional_int")]
    pub text_size: Option<i64>,
    /// Compass spells this key without the second 'e'
    #[serde(rename = "timout", deserialize_with = "optional_int")]
    pub timeout: Option<i64>,
    #[serde(deserialize_with = "optional_flag")]
    pub rest: Option<bool>,
    #[serde(rename = "hardtime", deserialize_with = "optional_time")]
    pub hard_time: Option<NaiveTime>,
    #[serde(rename = "hardexpiry", deserialize_with = "optional_string")]
    pub hard_expiry: Option<String>,
    #[serde(rename = "timeoutextension", deserialize_with = "optional_int")]
    pub timeout_extension: Option<i64>,
    #[serde(deserialize_with = "optional_int")]
    pub ping: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassPropsMaster {
    pub sso: CompassPropsMasterSso,
    pub user: CompassPropsMasterUser,
    #[serde(rename = "const")]
    pub constants: CompassPropsMasterConst,
    pub sys: CompassPropsMasterSys,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassPropsConstSys {
    #[serde(deserialize_with = "optional_int")]
    pub sto: Option<i64>,
    #[serde(rename = "sto_ask", deserialize_with = "optional_int")]
    pub sto_ask: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassPropsConst {
    pub sys: CompassPropsConstSys,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassProps {
    pub nav: CompassPropsNav,
    pub page: CompassPropsPage,
    pub crud: CompassPropsCrud,
    pub user: CompassPropsUser,
    pub master: CompassPropsMaster,
    #[serde(rename = "const")]
    pub constants: CompassPropsConst,
}

impl CompassProps {
    /// Parses the raw `ctl00$_POST_CTRL` value.
    ///
    /// # Errors
    /// Returns [`CompassError::Parse`] if a known key holds a value of the
    /// wrong type.
    pub fn from_post_ctrl(raw: &str) -> Result<Self> {
        let tree = props_tree(raw);
        serde_json::from_value(tree)
            .map_err(|e| CompassError::Parse(format!("Invalid Compass properties: {}", e)))
    }
}

/// Folds `A.B.C#value` pairs into nested lower-cased JSON objects.
fn props_tree(raw: &str) -> Value {
    let mut root = Map::new();
    for pair in raw.split('~') {
        let mut parts = pair.split('#');
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let segments: Vec<String> = key
            .split('.')
            .map(|s| s.trim().to_ascii_lowercase())
            .collect();
        if segments.iter().any(String::is_empty) {
            continue;
        }
        // Hash keys and session ids must survive untouched, leading zeros included
        let value = match segments.last().map(String::as_str) {
            Some("jk" | "sessionid") => Value::String(value.to_string()),
            _ => cast(value),
        };
        if !insert_path(&mut root, &segments, value) {
            debug!("Skipping conflicting Compass property '{}'", key);
        }
    }
    Value::Object(root)
}

fn insert_path(map: &mut Map<String, Value>, segments: &[String], value: Value) -> bool {
    match segments {
        [] => false,
        [last] => {
            map.insert(last.clone(), value);
            true
        }
        [head, rest @ ..] => {
            let entry = map
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(child) => insert_path(child, rest, value),
                _ => false,
            }
        }
    }
}

/// Splits a role selector label into (title, location).
///
/// Labels read `Title - Location`, where the title may itself contain
/// ` - `, so the split is on the last separator.
pub fn split_role_label(label: &str) -> (String, String) {
    let normalised = label.replace('\u{a0}', " ");
    let normalised = normalised.trim();
    match normalised.rsplit_once(" - ") {
        Some((title, location)) => (title.trim().to_string(), location.trim().to_string()),
        None => (normalised.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_keys_become_nested_props() {
        let props = CompassProps::from_post_ctrl(
            "Master.User.CN#10000000~Master.User.MRN#9000000~Master.User.JK#abc123~Master.Sys.SessionID#d6c7~Nav.StartNo#-1",
        )
        .unwrap();
        assert_eq!(props.master.user.cn, Some(10000000));
        assert_eq!(props.master.user.mrn, Some(9000000));
        assert_eq!(props.master.user.jk.as_deref(), Some("abc123"));
        assert_eq!(props.master.sys.session_id.as_deref(), Some("d6c7"));
        assert_eq!(props.nav.start_no, Some(-1));
    }

    #[test]
    fn numeric_jk_stays_a_string() {
        let props = CompassProps::from_post_ctrl("Master.User.JK#0012345").unwrap();
        assert_eq!(props.master.user.jk.as_deref(), Some("0012345"));
    }

    #[test]
    fn pairs_without_values_are_ignored() {
        let props = CompassProps::from_post_ctrl("garbage~~Page.CROC#OK#extra").unwrap();
        assert_eq!(props.page.croc.as_deref(), Some("OK"));
    }

    #[test]
    fn role_labels_split_on_last_separator() {
        assert_eq!(
            split_role_label("TSA Council Member - Nominated Member (18-24)\u{a0}-\u{a0}The Scout Association"),
            (
                "TSA Council Member - Nominated Member (18-24)".to_string(),
                "The Scout Association".to_string()
            )
        );
        assert_eq!(
            split_role_label("Member"),
            ("Member".to_string(), String::new())
        );
    }
}
