//! Small helpers shared by the scrapers.
//!
//! Compass is an ASP.NET application from another era: it wants JSON bodies
//! in a key/value list format, hashes keys the way Java does, and renders
//! dates in a handful of human formats. The functions here smooth that over.

use chrono::NaiveDate;
use log::error;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;

use crate::error::{CompassError, Result};
use crate::models::validation::ValidationError;

const DATE_FORMATS: [&str; 4] = ["%d %b %Y", "%d %B %Y", "%Y-%m-%d", "%d/%m/%Y"];

/// Java's `String.hashCode`, computed over code points with 32-bit wrapping.
///
/// # Examples
/// ```
/// use compass_interface_core::utility::hash_code;
///
/// assert_eq!(hash_code("testing"), -1422446064);
/// ```
pub fn hash_code(text: &str) -> i32 {
    text.chars()
        .fold(0i32, |code, c| code.wrapping_mul(31).wrapping_add(c as i32))
}

/// One entry of the key/value list format Compass expects for JSON bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestPair {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// Converts `(key, value)` pairs into `[{"Key": key, "Value": value}, ...]`.
///
/// Both sides are stringified and the input order is kept.
///
/// # Examples
/// ```text
/// Input:  [("a", 1), ("b", 2)]
/// Output: [{"Key": "a", "Value": "1"}, {"Key": "b", "Value": "2"}]
/// ```
pub fn compass_restify<K, V, I>(data: I) -> Vec<RestPair>
where
    I: IntoIterator<Item = (K, V)>,
    K: Display,
    V: Display,
{
    data.into_iter()
        .map(|(k, v)| RestPair {
            key: k.to_string(),
            value: v.to_string(),
        })
        .collect()
}

/// Coerces a raw Compass value into the closest JSON type.
///
/// Integers win first, then Python-style literals (`True`, `False`, `None`,
/// floats and quoted strings). Anything else, including the empty string, is
/// returned unchanged as a string.
pub fn cast(value: &str) -> Value {
    let trimmed = value.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if trimmed.is_empty() {
        return Value::String(value.to_string());
    }
    match trimmed {
        "True" => return Value::Bool(true),
        "False" => return Value::Bool(false),
        "None" => return Value::Null,
        _ => {}
    }
    if let Some(number) = trimmed
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        return Value::Number(number);
    }
    for quote in ['\'', '"'] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return Value::String(trimmed[1..trimmed.len() - 1].to_string());
        }
    }
    Value::String(value.to_string())
}

pub fn maybe_int(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

/// Parses a Compass date string. Empty strings mean "no date".
///
/// # Errors
/// Returns [`CompassError::Parse`] if the string is not empty and matches none
/// of the known date formats.
pub fn parse_date(value: &str) -> Result<Option<NaiveDate>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .map(Some)
        .ok_or_else(|| {
            CompassError::Parse(format!("Parsing string `{}` into a date failed!", value))
        })
}

/// Logs a validation failure against the record it came from.
///
/// In strict mode the failure is returned as [`CompassError::Validation`];
/// otherwise it is swallowed and `Ok(None)` tells the caller to drop the
/// record.
pub fn validation_errors_logging<T>(
    id: i64,
    name: &str,
    strict: bool,
    result: std::result::Result<T, ValidationError>,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(source) => {
            error!("Parsing Error! {}: {}", name, id);
            error!("{}", source);
            if strict {
                Err(CompassError::Validation {
                    name: name.to_string(),
                    id,
                    source,
                })
            } else {
                Ok(None)
            }
        }
    }
}
