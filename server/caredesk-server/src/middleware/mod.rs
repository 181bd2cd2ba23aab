//! Request middleware: authentication context, page guards, timing and audit
//! logging, CORS

pub mod auth_context;
pub mod page_guard;

pub use auth_context::{authenticate, AuthContext};
pub use page_guard::{enforce_page_access, PageGuard};

use axum::extract::Request;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::config::CorsSettings;

/// Request timing middleware
pub async fn request_timing_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = logger_redacted::redact(&request.uri().to_string());

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        duration_ms = start.elapsed().as_millis(),
        status = response.status().as_u16(),
        "Request processed"
    );

    response
}

/// Audit logging middleware
///
/// Records who touched what. The caller is taken from the context set by the
/// page guard; unguarded and unauthenticated requests log as `anonymous`.
pub async fn audit_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = logger_redacted::redact(&request.uri().to_string());

    let response = next.run(request).await;

    let caller = response
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| format!("{}:{}", ctx.username, ctx.role))
        .unwrap_or_else(|| "anonymous".to_string());
    if method != Method::GET {
        tracing::info!(
            method = %method,
            uri = %uri,
            caller = %caller,
            status = response.status().as_u16(),
            "Audit log: write request"
        );
    } else {
        tracing::debug!(
            method = %method,
            uri = %uri,
            caller = %caller,
            status = response.status().as_u16(),
            "Audit log: read request"
        );
    }

    response
}

/// Create CORS layer from the configured origins
///
/// Unparseable origins are skipped with a warning.
pub fn create_cors_layer(settings: &CorsSettings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}
