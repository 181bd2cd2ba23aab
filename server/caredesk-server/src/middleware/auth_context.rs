//! Authentication context extraction
//!
//! Handlers that need the caller take an [`AuthContext`] argument. When a
//! page guard already authenticated the request the context is reused from
//! the request extensions; otherwise the bearer token is verified here.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::auth::{Role, TokenClaims};
use crate::error::{ApiError, ApiResult};
use crate::server::CareDeskServer;

/// Authenticated caller, taken from a verified access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    /// Token id, used to revoke the token on logout
    pub token_id: String,
    /// Token expiry (unix seconds)
    pub expires_at: i64,
}

impl From<TokenClaims> for AuthContext {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
            token_id: claims.jti,
            expires_at: claims.exp,
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
fn bearer_token(headers: &HeaderMap) -> ApiResult<&str> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::authentication("Missing Authorization header"))?
        .to_str()
        .map_err(|_| ApiError::authentication("Invalid Authorization header"))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::authentication("Invalid Authorization header format. Expected: Bearer <token>"))
}

/// Verify the bearer token of a request.
pub fn authenticate(headers: &HeaderMap, server: &CareDeskServer) -> ApiResult<AuthContext> {
    let claims = server.tokens.verify(bearer_token(headers)?)?;
    if server.sessions.is_revoked(&claims.jti) {
        return Err(ApiError::authentication("Token has been revoked"));
    }
    Ok(claims.into())
}

#[async_trait]
impl FromRequestParts<CareDeskServer> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, server: &CareDeskServer) -> Result<Self, Self::Rejection> {
        if let Some(context) = parts.extensions.get::<AuthContext>() {
            return Ok(context.clone());
        }
        authenticate(&parts.headers, server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).expect("token"), "abc.def.ghi");
    }
}
