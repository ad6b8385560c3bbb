//! Runtime settings.
//!
//! Settings are read from an optional TOML file and then overridden from
//! `COMPASS_*` environment variables. Every field has a default, so an empty
//! file (or none at all) gives a working configuration for the live portal.

use std::{env, fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::error::{CompassError, Result};

const DEFAULT_BASE_URL: &str = "https://compass.scouts.org.uk";
const DEFAULT_ORG_NUMBER: i64 = 10000001;
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the Compass portal, without a trailing slash
    pub base_url: String,
    /// Organisation number sent with the login form
    pub org_number: i64,
    /// Raise on validation failures instead of logging and dropping the record
    pub validation_errors: bool,
    /// Extra (sensitive) fields are only scraped in debug mode
    pub debug: bool,
    pub timeout_secs: u64,
    /// Compass soft-times out report exports after ten minutes
    pub report_timeout_secs: u64,
    /// Compass sniffs user agents while exporting reports
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: DEFAULT_BASE_URL.to_string(),
            org_number: DEFAULT_ORG_NUMBER,
            validation_errors: true,
            debug: false,
            timeout_secs: 30,
            report_timeout_secs: 600,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    /// Settings pointing at a different portal root, e.g. a local test server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Settings {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Settings::default()
        }
    }

    /// Loads settings from `path` (if given) and applies environment overrides.
    ///
    /// # Errors
    /// Returns [`CompassError::Config`] if the file can't be read or parsed, or
    /// if an environment override holds a value of the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Settings::default(),
        };
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CompassError::Config(format!("Can't read '{}': {}", path.display(), e))
        })?;
        let mut settings: Settings = toml::from_str(&content).map_err(|e| {
            CompassError::Config(format!("Can't parse '{}': {}", path.display(), e))
        })?;
        settings.base_url = settings.base_url.trim_end_matches('/').to_string();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = env::var("COMPASS_BASE_URL") {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(number) = env::var("COMPASS_ORG_NUMBER") {
            self.org_number = number.trim().parse().map_err(|_| {
                CompassError::Config(format!("COMPASS_ORG_NUMBER is not a number: '{}'", number))
            })?;
        }
        if let Ok(flag) = env::var("COMPASS_VALIDATION_ERRORS") {
            self.validation_errors = parse_flag("COMPASS_VALIDATION_ERRORS", &flag)?;
        }
        if let Ok(flag) = env::var("COMPASS_DEBUG") {
            self.debug = parse_flag("COMPASS_DEBUG", &flag)?;
        }
        Ok(())
    }

    /// JSON web service root used for report tokens.
    pub fn web_service_path(&self) -> String {
        format!("{}/JSon.svc", self.base_url)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.report_timeout_secs)
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        _ => Err(CompassError::Config(format!(
            "{} must be a boolean, got '{}'",
            name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_live_portal() {
        let settings = Settings::default();
        assert_eq!(settings.base_url, "https://compass.scouts.org.uk");
        assert_eq!(settings.org_number, 10000001);
        assert!(settings.validation_errors);
        assert_eq!(
            settings.web_service_path(),
            "https://compass.scouts.org.uk/JSon.svc"
        );
    }

    #[test]
    fn url_joins_without_double_slash() {
        let settings = Settings::with_base_url("http://127.0.0.1:4200/");
        assert_eq!(
            settings.url("/ScoutsPortal.aspx"),
            "http://127.0.0.1:4200/ScoutsPortal.aspx"
        );
        assert_eq!(settings.url("Login.ashx"), "http://127.0.0.1:4200/Login.ashx");
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("X", "Yes").unwrap());
        assert!(!parse_flag("X", "0").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }
}
