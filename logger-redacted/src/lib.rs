//! PII redaction for log output.
//!
//! Patient and staff records carry phone numbers, national identity numbers
//! and email addresses. Anything that may end up in a log line (request URIs,
//! error messages) goes through [`redact`] first.
//!
//! # Detected Data Types
//!
//! - **Email Addresses**: `lan@benhvien.vn` → `l***@b***`
//! - **Phone Numbers**: `0912345678` → `*******678`
//! - **Identity Numbers** (CMND/CCCD): `079123456789` → `************`
//!
//! With `hash_for_correlation` (the default) each value becomes a short
//! stable hash such as `PHONE[q1Xw3T0b]` instead.
//!
//! # Example
//!
//! ```rust
//! use logger_redacted::{PiiRedactor, RedactionConfig};
//!
//! let redactor = PiiRedactor::new(RedactionConfig {
//!     hash_for_correlation: false,
//!     ..Default::default()
//! });
//! assert_eq!(redactor.redact("phone=0912345678"), "phone=*******678");
//! ```

use std::sync::OnceLock;

pub mod config;
pub mod macros;
pub mod redactor;

pub use config::*;
pub use redactor::*;

#[doc(hidden)]
pub use tracing as __tracing;

static GLOBAL_REDACTOR: OnceLock<PiiRedactor> = OnceLock::new();

/// Install the process-wide redactor. Returns `false` if one was already
/// installed; the first installation wins.
pub fn init(config: RedactionConfig) -> bool {
    GLOBAL_REDACTOR.set(PiiRedactor::new(config)).is_ok()
}

/// Redact `text` with the process-wide redactor, or the default one when
/// [`init`] was never called.
pub fn redact(text: &str) -> String {
    GLOBAL_REDACTOR.get_or_init(PiiRedactor::default).redact(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_redact_hides_phone() {
        let redacted = redact("patient phone 0912345678");
        assert!(!redacted.contains("0912345678"));
    }

    #[test]
    fn test_logger_config_disables_redaction() {
        let config = LoggerConfig {
            redaction_enabled: false,
            ..Default::default()
        };
        let redactor = PiiRedactor::new(config.redaction());
        assert_eq!(redactor.redact("0912345678"), "0912345678");
    }

    #[test]
    fn test_macros_expand() {
        redacted_info!("patient {} updated", "0912345678");
        redacted_warn!("lookup failed for {}", "a@b.vn");
        redacted_error!("plain message");
    }
}
