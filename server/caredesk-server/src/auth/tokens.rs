/// JWT access tokens
///
/// HS256-signed tokens carrying the staff user's id, username and role. Each
/// token has a unique `jti` so logout can revoke it before expiry.
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::roles::Role;
use crate::error::{ApiError, ApiResult};

/// JWT token claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// JWT ID (unique token identifier)
    pub jti: String,
    pub username: String,
    pub role: Role,
    /// Issued at timestamp (seconds since epoch)
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl TokenClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: TokenClaims,
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    issuer: String,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl_seconds: i64, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::seconds(ttl_seconds),
            issuer: issuer.to_string(),
        }
    }

    /// Issue an access token for a staff user.
    pub fn issue(&self, user_id: &str, username: &str, role: Role) -> ApiResult<IssuedToken> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            username: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::internal(format!("Failed to sign token: {e}")))?;

        Ok(IssuedToken { token, claims })
    }

    /// Check signature, issuer and expiry and return the claims.
    pub fn verify(&self, token: &str) -> ApiResult<TokenClaims> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::authentication("Token has expired")
                }
                _ => ApiError::authentication("Invalid token"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(b"unit-test-secret", 3600, "caredesk")
    }

    #[test]
    fn test_issue_and_verify() {
        let service = service();
        let issued = service.issue("u1", "lan", Role::Nurse).unwrap();
        let claims = service.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, Role::Nurse);
        assert_eq!(claims.jti, issued.claims.jti);
    }

    #[test]
    fn test_tokens_are_unique() {
        let service = service();
        let a = service.issue("u1", "lan", Role::Nurse).unwrap();
        let b = service.issue("u1", "lan", Role::Nurse).unwrap();
        assert_ne!(a.claims.jti, b.claims.jti);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issued = service().issue("u1", "lan", Role::Admin).unwrap();
        let other = TokenService::new(b"another-secret", 3600, "caredesk");
        assert!(other.verify(&issued.token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = TokenService::new(b"unit-test-secret", -3600, "caredesk");
        let issued = service.issue("u1", "lan", Role::Admin).unwrap();
        let err = service.verify(&issued.token).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }
}
