use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

use crate::auth::Page;
use crate::handlers::common::{crud_routes, Resource};
use crate::handlers::{
    auth, billing, health, healthcare, laboratory, patients, pharmacy, reports, users,
};
use crate::middleware::{enforce_page_access, PageGuard};
use crate::openapi;
use crate::server::CareDeskServer;

/// Create health check routes
pub fn health_routes() -> Router<CareDeskServer> {
    Router::new().route("/health", get(health::health_check))
}

/// Create authentication routes
///
/// Login is public. The other routes authenticate through the `AuthContext`
/// extractor and are open to every role.
pub fn auth_routes() -> Router<CareDeskServer> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/navigation", get(auth::navigation))
}

/// Wrap a router in a guard for the given navigation pages
fn guarded(
    server: &CareDeskServer,
    pages: &'static [Page],
    router: Router<CareDeskServer>,
) -> Router<CareDeskServer> {
    router.route_layer(from_fn_with_state(
        PageGuard::new(server.clone(), pages),
        enforce_page_access,
    ))
}

/// Standard CRUD routes for `R` plus any extra routes, nested at
/// `/<collection>` behind the resource's page guard.
fn resource<R: Resource>(
    server: &CareDeskServer,
    extra: Router<CareDeskServer>,
) -> Router<CareDeskServer> {
    let routes = crud_routes::<R>().merge(extra);
    Router::new().nest(
        &format!("/{}", R::COLLECTION),
        guarded(server, R::PAGES, routes),
    )
}

/// Create resource routes for every collection
pub fn resource_routes(server: &CareDeskServer) -> Router<CareDeskServer> {
    Router::new()
        // Patients and clinical records
        .merge(resource::<patients::Patients>(server, Router::new()))
        .merge(resource::<healthcare::Appointments>(server, Router::new()))
        .merge(resource::<healthcare::MedicalRecords>(
            server,
            Router::new().route(
                "/appointment/:appointment_id",
                get(healthcare::get_medical_record_by_appointment),
            ),
        ))
        // Billing
        .merge(resource::<billing::Invoices>(
            server,
            Router::new().route("/:id/payments", post(billing::record_invoice_payment)),
        ))
        .merge(resource::<billing::InvoiceItems>(server, Router::new()))
        .merge(resource::<billing::PaymentTransactions>(server, Router::new()))
        .merge(resource::<billing::ServicePrices>(server, Router::new()))
        .merge(resource::<billing::InsuranceProviders>(server, Router::new()))
        // Pharmacy
        .merge(resource::<pharmacy::Medicines>(server, Router::new()))
        .merge(resource::<pharmacy::Suppliers>(server, Router::new()))
        .merge(resource::<pharmacy::StockTransactions>(server, Router::new()))
        .merge(resource::<pharmacy::StockAlerts>(server, Router::new()))
        .merge(resource::<pharmacy::Prescriptions>(server, Router::new()))
        // Laboratory
        .merge(resource::<laboratory::LabTests>(server, Router::new()))
        .merge(resource::<laboratory::LabResults>(server, Router::new()))
        .merge(resource::<laboratory::LabParameters>(server, Router::new()))
        .merge(resource::<laboratory::LabNormalRanges>(server, Router::new()))
        .merge(resource::<laboratory::LabTestTemplates>(server, Router::new()))
        .merge(resource::<laboratory::LabWorkflows>(server, Router::new()))
        .merge(resource::<laboratory::LabEquipmentRegistry>(server, Router::new()))
        .merge(resource::<laboratory::LabQualityControls>(server, Router::new()))
        // Administration
        .merge(resource::<users::Users>(server, Router::new()))
}

/// Create report routes
pub fn report_routes(server: &CareDeskServer) -> Router<CareDeskServer> {
    guarded(
        server,
        reports::REPORT_PAGES,
        Router::new().route("/summary", get(reports::report_summary)),
    )
}

/// Create all application routes
pub fn create_routes(server: &CareDeskServer) -> Router<CareDeskServer> {
    Router::new()
        .merge(health_routes())
        .nest("/auth", auth_routes())
        .nest("/reports", report_routes(server))
        .merge(resource_routes(server))
        .merge(openapi::create_docs_routes())
}
