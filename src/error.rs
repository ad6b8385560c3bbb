//! Error types for Compass operations.

use thiserror::Error;

use crate::models::validation::ValidationError;

/// Result type for Compass operations
pub type Result<T> = std::result::Result<T, CompassError>;

/// Errors that can occur while talking to Compass
#[derive(Error, Debug)]
pub enum CompassError {
    /// Transport failure, or Compass answered with a server error
    #[error("Network Error! {0}")]
    Network(String),

    /// Login or role change could not be confirmed
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The current role may not see the requested data
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Report export failed
    #[error("Report error: {0}")]
    Report(String),

    /// The current role may not run the requested report
    #[error("Report permission denied: {0}")]
    ReportPermission(String),

    /// Scraped data did not pass validation
    #[error("Parsing Error! {name}: {id} ({source})")]
    Validation {
        name: String,
        id: i64,
        #[source]
        source: ValidationError,
    },

    /// Page or value had an unexpected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Compass reported an error state
    #[error("{0}")]
    Compass(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ureq::Error> for CompassError {
    fn from(err: ureq::Error) -> Self {
        CompassError::Network(err.to_string())
    }
}
