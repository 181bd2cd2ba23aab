// Logger configuration
use serde::{Deserialize, Serialize};

use crate::redactor::RedactionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub redaction_enabled: bool,
    pub hash_for_correlation: bool,
    pub log_level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            redaction_enabled: true,
            hash_for_correlation: true,
            log_level: "info".to_string(),
        }
    }
}

impl LoggerConfig {
    pub fn redaction(&self) -> RedactionConfig {
        RedactionConfig {
            redact_emails: self.redaction_enabled,
            redact_phones: self.redaction_enabled,
            redact_identity_numbers: self.redaction_enabled,
            hash_for_correlation: self.hash_for_correlation,
        }
    }
}
