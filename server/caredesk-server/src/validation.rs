//! Request validation utilities for consistent validation across handlers
//!
//! This module provides a `RequestValidation` trait, helper macros for
//! single checks and a `FieldErrors` collector for records that report
//! several invalid fields at once.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::error::ApiError;

lazy_static! {
    static ref PHONE_REGEX: Regex = Regex::new(r"^[0-9]{10,11}$").expect("phone pattern");
    static ref IDENTITY_CARD_REGEX: Regex = Regex::new(r"^[0-9]{9,12}$").expect("identity pattern");
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern");
    static ref DATE_REGEX: Regex = Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("date pattern");
    static ref TIME_REGEX: Regex = Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").expect("time pattern");
}

/// Trait for validating request payloads
///
/// Implemented by every record type; the CRUD pipeline calls it after the
/// payload has been deserialized and before derived fields are computed.
pub trait RequestValidation {
    /// Validates the request and returns an error if validation fails
    fn validate(&self) -> Result<(), ApiError>;
}

/// Macro for validating fields with custom predicates
///
/// # Usage
///
/// ```rust,ignore
/// validate_field!(self.quantity, self.quantity > 0.0, "quantity must be positive");
/// ```
#[macro_export]
macro_rules! validate_field {
    ($field:expr, $predicate:expr, $message:expr) => {
        if !$predicate {
            return Err($crate::error::ApiError::validation($message));
        }
    };
}

/// Macro for validating required fields (non-empty strings)
#[macro_export]
macro_rules! validate_required {
    ($field:expr, $message:expr) => {
        $crate::validate_field!($field, !$field.trim().is_empty(), $message);
    };
}

/// Macro for validating numeric ranges
#[macro_export]
macro_rules! validate_range {
    ($field:expr, $min:expr, $max:expr, $message:expr) => {
        $crate::validate_field!($field, $field >= $min && $field <= $max, $message);
    };
}

pub fn is_valid_phone(value: &str) -> bool {
    PHONE_REGEX.is_match(value)
}

pub fn is_valid_identity_card(value: &str) -> bool {
    IDENTITY_CARD_REGEX.is_match(value)
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

/// `YYYY-MM-DD` naming a real calendar day.
pub fn is_valid_date(value: &str) -> bool {
    DATE_REGEX.is_match(value) && chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// 24-hour `HH:MM`.
pub fn is_valid_time(value: &str) -> bool {
    TIME_REGEX.is_match(value)
}

pub fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

pub fn is_percentage(value: f64) -> bool {
    value.is_finite() && (0.0..=100.0).contains(&value)
}

/// Collects per-field messages and turns them into one validation error.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: HashMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.entry(field.to_string()).or_default().push(message.into());
    }

    /// Record `message` for `field` unless `valid` holds.
    pub fn check(&mut self, field: &str, valid: bool, message: &str) {
        if !valid {
            self.add(field, message);
        }
    }

    pub fn required(&mut self, field: &str, value: &str) {
        self.check(field, !value.trim().is_empty(), &format!("{field} is required"));
    }

    /// Check an optional value only when it is present and non-empty.
    pub fn check_optional<F>(&mut self, field: &str, value: Option<&str>, is_valid: F, message: &str)
    where
        F: Fn(&str) -> bool,
    {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.check(field, is_valid(value), message);
        }
    }

    pub fn non_negative(&mut self, field: &str, value: f64) {
        self.check(field, is_non_negative(value), &format!("{field} must not be negative"));
    }

    pub fn percentage(&mut self, field: &str, value: Option<f64>) {
        if let Some(value) = value {
            self.check(field, is_percentage(value), &format!("{field} must lie between 0 and 100"));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let mut fields: Vec<&String> = self.errors.keys().collect();
        fields.sort();
        let first = fields
            .first()
            .and_then(|field| self.errors.get(*field))
            .and_then(|messages| messages.first())
            .cloned()
            .unwrap_or_default();
        let message = if fields.len() == 1 {
            first
        } else {
            format!("{first} (and {} more invalid fields)", fields.len() - 1)
        };
        Err(ApiError::validation_with_fields(message, self.errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestRequest {
        name: String,
        quantity: f64,
    }

    impl RequestValidation for TestRequest {
        fn validate(&self) -> Result<(), ApiError> {
            validate_required!(self.name, "name is required");
            validate_range!(self.quantity, 0.0, 1000.0, "quantity must lie between 0 and 1000");
            Ok(())
        }
    }

    #[test]
    fn test_macros() {
        let ok = TestRequest {
            name: "Paracetamol".to_string(),
            quantity: 10.0,
        };
        assert!(ok.validate().is_ok());

        let blank = TestRequest {
            name: "  ".to_string(),
            quantity: 10.0,
        };
        assert!(blank.validate().is_err());

        let too_many = TestRequest {
            name: "Paracetamol".to_string(),
            quantity: 5000.0,
        };
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn test_phone_and_identity_patterns() {
        assert!(is_valid_phone("0901234567"));
        assert!(is_valid_phone("09012345678"));
        assert!(!is_valid_phone("090123456"));
        assert!(!is_valid_phone("090-123-4567"));

        assert!(is_valid_identity_card("123456789"));
        assert!(is_valid_identity_card("025123456789"));
        assert!(!is_valid_identity_card("12345678"));
        assert!(!is_valid_identity_card("0251234567890"));
    }

    #[test]
    fn test_email_date_time_patterns() {
        assert!(is_valid_email("lan.nguyen@benhvien.vn"));
        assert!(!is_valid_email("lan.nguyen@"));
        assert!(is_valid_date("1990-01-01"));
        assert!(!is_valid_date("1990-02-30"));
        assert!(!is_valid_date("01/01/1990"));
        assert!(is_valid_time("08:30"));
        assert!(!is_valid_time("24:00"));
    }

    #[test]
    fn test_field_errors_collects_all() {
        let mut errors = FieldErrors::new();
        errors.required("fullName", "");
        errors.check_optional("phone", Some("123"), is_valid_phone, "phone must contain 10-11 digits");
        errors.check_optional("email", None, is_valid_email, "invalid email");
        errors.percentage("discountPercent", Some(150.0));

        match errors.into_result() {
            Err(ApiError::Validation { field_errors: Some(fields), .. }) => {
                assert_eq!(fields.len(), 3);
                assert!(fields.contains_key("phone"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
