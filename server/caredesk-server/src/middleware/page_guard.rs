//! Role checks for resource routes
//!
//! Every resource router is wrapped in a guard naming the navigation pages
//! it belongs to. A caller passes when their role may open at least one of
//! them.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::auth_context::authenticate;
use crate::auth::Page;
use crate::error::ApiError;
use crate::server::CareDeskServer;

#[derive(Clone)]
pub struct PageGuard {
    server: CareDeskServer,
    pages: &'static [Page],
}

impl PageGuard {
    pub fn new(server: CareDeskServer, pages: &'static [Page]) -> Self {
        Self { server, pages }
    }
}

/// Reject callers whose role may not open any of the guarded pages.
///
/// Skipped entirely when `auth.enforce` is off. The verified context is
/// stored in the request and response extensions for handlers and the
/// audit log.
pub async fn enforce_page_access(
    State(guard): State<PageGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !guard.server.config.auth.enforce {
        return Ok(next.run(request).await);
    }

    let context = authenticate(request.headers(), &guard.server)?;
    if !context.role.can_access_any(guard.pages) {
        tracing::warn!(
            username = %context.username,
            role = %context.role,
            uri = %request.uri().path(),
            "Access denied"
        );
        return Err(ApiError::authorization(format!(
            "Role '{}' is not allowed to access this resource",
            context.role
        )));
    }

    request.extensions_mut().insert(context.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(context);
    Ok(response)
}
