use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::server::CareDeskServer;

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,
    pub timestamp: String,
    pub version: String,
    /// Seconds since startup
    pub uptime: u64,
    pub checks: BTreeMap<String, String>,
}

/// Health check handler
///
/// Answers 503 when the document store does not respond.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "Store unreachable", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(server): State<CareDeskServer>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = BTreeMap::new();
    let store = server.store.backend();
    let healthy = match server.store.ping().await {
        Ok(()) => {
            checks.insert(format!("store:{store}"), "healthy".to_string());
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Store health check failed");
            checks.insert(format!("store:{store}"), "unreachable".to_string());
            false
        }
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: server.uptime_seconds(),
        checks,
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
