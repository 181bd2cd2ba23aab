use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email pattern");
    // Domestic numbers start with 0 (10-11 digits); international with +84.
    static ref PHONE_REGEX: Regex =
        Regex::new(r"(?:\+84\d{9,10}\b|\b0\d{9,10}\b)").expect("phone pattern");
    // CMND (9 digits) and CCCD (12 digits) identity numbers.
    static ref IDENTITY_REGEX: Regex = Regex::new(r"\b\d{9,12}\b").expect("identity pattern");
}

/// PII redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_identity_numbers: bool,
    /// Replace values with a short stable hash so log lines about the same
    /// person can still be correlated.
    pub hash_for_correlation: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_identity_numbers: true,
            hash_for_correlation: true,
        }
    }
}

/// PII redactor for log messages
#[derive(Debug, Clone, Default)]
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        if self.config.redact_emails {
            result = self.replace(&EMAIL_REGEX, &result, "EMAIL", |email| {
                let (local, domain) = email.split_once('@').unwrap_or((email, ""));
                format!(
                    "{}***@{}***",
                    local.chars().next().unwrap_or('*'),
                    domain.chars().next().unwrap_or('*')
                )
            });
        }

        // Phones before identity numbers: both are digit runs and the phone
        // pattern is the narrower one.
        if self.config.redact_phones {
            result = self.replace(&PHONE_REGEX, &result, "PHONE", |phone| {
                let tail = phone.get(phone.len().saturating_sub(3)..).unwrap_or_default();
                format!("*******{tail}")
            });
        }

        if self.config.redact_identity_numbers {
            result = self.replace(&IDENTITY_REGEX, &result, "ID", |id| "*".repeat(id.len()));
        }

        result
    }

    fn replace<F>(&self, pattern: &Regex, text: &str, label: &str, mask: F) -> String
    where
        F: Fn(&str) -> String,
    {
        pattern
            .replace_all(text, |caps: &Captures| {
                let value = &caps[0];
                if self.config.hash_for_correlation {
                    format!("{label}[{}]", hash_value(value))
                } else {
                    mask(value)
                }
            })
            .into_owned()
    }
}

fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    // First 6 bytes keep the token short and free of padding.
    general_purpose::URL_SAFE_NO_PAD.encode(&digest[..6])
}
