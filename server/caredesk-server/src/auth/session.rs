//! Revoked-token registry backing logout.

use dashmap::DashMap;

/// Token ids revoked before their natural expiry, with that expiry.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    revoked: DashMap<String, i64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke `jti` until `expires_at` (seconds since epoch).
    pub fn revoke(&self, jti: &str, expires_at: i64) {
        self.purge_expired(chrono::Utc::now().timestamp());
        self.revoked.insert(jti.to_string(), expires_at);
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.contains_key(jti)
    }

    /// Drop entries whose token would be rejected as expired anyway.
    pub fn purge_expired(&self, now: i64) {
        self.revoked.retain(|_, expires_at| *expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}
