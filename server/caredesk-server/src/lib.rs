//! CareDesk server - hospital administration REST API
//!
//! Patients, appointments, medical records, billing, pharmacy and laboratory
//! collections behind one generic CRUD pipeline, with role-gated navigation
//! pages, JWT sessions and dashboard reports.

#[macro_use]
pub mod validation;

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::*;
pub use server::CareDeskServer;

use axum::{middleware::from_fn, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Create the main application router with all routes and middleware
pub fn create_app(server: CareDeskServer) -> Router {
    let cors = middleware::create_cors_layer(&server.config.cors);
    routes::create_routes(&server)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(from_fn(middleware::request_timing_middleware))
                .layer(from_fn(middleware::audit_logging_middleware)),
        )
        .with_state(server)
}
