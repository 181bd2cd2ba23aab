//! Billing rules for hospital invoices.
//!
//! Provides the arithmetic behind invoices and their payments:
//! - Line item totals with per-line discount
//! - Invoice totals with percent or absolute discount and tax
//! - Payment application and status derivation
//! - Revenue summaries for dashboards and reports
//!
//! Amounts cross the crate boundary as `f64` (that is how they are stored in
//! documents) and are computed internally with `rust_decimal`, rounded to two
//! decimal places.

pub mod error;
pub mod models;
pub mod payment;
pub mod reporting;
pub mod service;

pub use error::*;
pub use models::*;
pub use payment::*;
pub use reporting::*;
pub use service::*;
