//! Field validation for scraped records.

use email_address::EmailAddress;
use phonenumber::{Mode, country};
use std::str::FromStr;

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Records that can check and normalise their own fields.
pub trait Validate: Sized {
    /// Returns a normalised copy, or the first field that failed.
    fn validated(&self) -> Result<Self, ValidationError>;
}

pub fn validate_membership_number(field: &str, value: i64) -> Result<i64, ValidationError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ValidationError::new(
            field,
            format!("ensure this value is greater than 0 (got {})", value),
        ))
    }
}

/// Checks address syntax and lower-cases the domain part.
pub fn validate_email(field: &str, value: &str) -> Result<String, ValidationError> {
    let address = EmailAddress::from_str(value.trim()).map_err(|e| {
        ValidationError::new(
            field,
            format!("value is not a valid email address: '{}' ({})", value, e),
        )
    })?;
    Ok(format!(
        "{}@{}",
        address.local_part(),
        address.domain().to_ascii_lowercase()
    ))
}

/// Normalises a phone number to E.164, assuming UK numbers when no country
/// code is given.
///
/// # Examples
/// ```text
/// Input:  "0121 234 5678"
/// Output: "+441212345678"
///
/// Input:  "+1 201-555-0123"
/// Output: "+12015550123"
/// ```
pub fn normalise_phone(field: &str, value: &str) -> Result<String, ValidationError> {
    let invalid = || {
        ValidationError::new(
            field,
            format!("value is not a valid phone number: '{}'", value),
        )
    };
    let number = phonenumber::parse(Some(country::Id::GB), value.trim()).map_err(|_| invalid())?;
    if !phonenumber::is_valid(&number) {
        return Err(invalid());
    }
    Ok(number.format().mode(Mode::E164).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_domain_is_lowercased() {
        assert_eq!(
            validate_email("main_email", " Jane.Doe@Example.ORG ").unwrap(),
            "Jane.Doe@example.org"
        );
        assert!(validate_email("main_email", "not-an-email").is_err());
        assert!(validate_email("main_email", "@example.org").is_err());
        assert!(validate_email("main_email", "jane@").is_err());
    }

    #[test]
    fn phone_numbers_normalise_to_e164() {
        assert_eq!(
            normalise_phone("main_phone", "0121 234 5678").unwrap(),
            "+441212345678"
        );
        assert_eq!(
            normalise_phone("main_phone", "07400-123456").unwrap(),
            "+447400123456"
        );
        assert_eq!(
            normalise_phone("main_phone", "+1 201-555-0123").unwrap(),
            "+12015550123"
        );
        assert_eq!(
            normalise_phone("main_phone", "+44 7400 123456").unwrap(),
            "+447400123456"
        );
    }

    #[test]
    fn junk_phone_numbers_are_rejected() {
        assert!(normalise_phone("main_phone", "call me").is_err());
        assert!(normalise_phone("main_phone", "12345").is_err());
        assert!(normalise_phone("main_phone", "0123").is_err());
        assert!(normalise_phone("main_phone", "0(((1234567").is_err());
        assert!(normalise_phone("main_phone", "07400 12345678901").is_err());
    }

    #[test]
    fn validation_errors_name_the_field() {
        let err = normalise_phone("main_phone", "12345").unwrap_err();
        assert_eq!(
            err.to_string(),
            "main_phone: value is not a valid phone number: '12345'"
        );
    }

    #[test]
    fn membership_numbers_are_positive() {
        assert!(validate_membership_number("membership_number", 0).is_err());
        assert_eq!(
            validate_membership_number("membership_number", 12345).unwrap(),
            12345
        );
    }
}
