//! Custom serde deserializers for Compass's loosely typed payloads.
//!
//! Compass is inconsistent about types: numbers arrive as strings or as
//! numbers, booleans as `Y`/`N` flags or real booleans, and some JSON fields
//! hold further JSON encoded as a string. These helpers accept every shape
//! seen in the wild and produce one clean Rust type.

use chrono::NaiveTime;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

/// Deserializes an integer that may be sent as a number or a numeric string.
///
/// # Examples
/// ```text
/// Input:  "10000001"  or  10000001
/// Output: 10000001
/// ```
pub fn int_from_any<'a, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'a>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_int(&value)
        .ok_or_else(|| de::Error::custom(format!("expected an integer, got {}", describe(&value))))
}

/// Like [`int_from_any`], but `null` and the empty string become `None`.
pub fn optional_int<'a, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'a>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        _ => value_to_int(&value).map(Some).ok_or_else(|| {
            de::Error::custom(format!("expected an integer, got {}", describe(&value)))
        }),
    }
}

fn value_to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Deserializes any scalar into its string form.
///
/// Values that look numeric are coerced to numbers upstream, so keys such as
/// the JK hash need turning back into strings.
pub fn optional_string<'a, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'a>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(if b { "True" } else { "False" }.to_string())),
        other => Err(de::Error::custom(format!(
            "expected a string, got {}",
            describe(&other)
        ))),
    }
}

/// Deserializes Compass flags (`Y`/`N`, `True`/`False`, `1`/`0`, real booleans).
pub fn optional_flag<'a, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'a>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(de::Error::custom(format!("expected a flag, got {}", n))),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "y" | "yes" | "true" => Ok(Some(true)),
            "n" | "no" | "false" => Ok(Some(false)),
            _ => Err(de::Error::custom(format!("expected a flag, got '{}'", s))),
        },
        other => Err(de::Error::custom(format!(
            "expected a flag, got {}",
            describe(other)
        ))),
    }
}

/// Deserializes a `HH:MM:SS` time of day.
pub fn optional_time<'a, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'a>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S")
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid time '{}': {}", s, e))),
    }
}

/// Deserializes a string holding a JSON list, keeping its first element.
///
/// The hierarchy API packs per-unit extras into `"Tag": "[{...}]"`. Empty
/// strings and `null` mean there is no extra data.
///
/// # Examples
/// ```text
/// Input:  "[{\"org_status\":\"Active\",\"Members\":12}]"
/// Output: Some(UnitTag { status: "Active", member_count: 12, .. })
/// ```
pub fn json_encoded_first<'a, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'a>,
    T: DeserializeOwned,
{
    let raw = match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(None),
    };
    let mut items: Vec<T> = serde_json::from_str(&raw)
        .map_err(|e| de::Error::custom(format!("invalid encoded JSON '{}': {}", raw, e)))?;
    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(items.swap_remove(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "int_from_any")]
        id: i64,
        #[serde(default, deserialize_with = "optional_int")]
        parent: Option<i64>,
        #[serde(default, deserialize_with = "optional_flag")]
        flag: Option<bool>,
        #[serde(default, deserialize_with = "optional_string")]
        key: Option<String>,
        #[serde(default, deserialize_with = "optional_time")]
        at: Option<NaiveTime>,
    }

    #[test]
    fn accepts_strings_and_numbers() {
        let sample: Sample = serde_json::from_value(serde_json::json!({
            "id": "42",
            "parent": 7,
            "flag": "Y",
            "key": 1234,
            "at": "20:18:28",
        }))
        .unwrap();

        assert_eq!(sample.id, 42);
        assert_eq!(sample.parent, Some(7));
        assert_eq!(sample.flag, Some(true));
        assert_eq!(sample.key.as_deref(), Some("1234"));
        assert_eq!(sample.at, NaiveTime::from_hms_opt(20, 18, 28));
    }

    #[test]
    fn missing_and_empty_values_are_none() {
        let sample: Sample =
            serde_json::from_value(serde_json::json!({"id": 1, "parent": ""})).unwrap();
        assert_eq!(sample.parent, None);
        assert_eq!(sample.flag, None);
        assert_eq!(sample.at, None);
    }

    #[test]
    fn rejects_non_numeric_ids() {
        let result: Result<Sample, _> = serde_json::from_value(serde_json::json!({"id": "abc"}));
        assert!(result.is_err());
    }
}
