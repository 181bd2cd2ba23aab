pub mod auth;
pub mod billing;
pub mod common;
pub mod health;
pub mod healthcare;
pub mod laboratory;
pub mod patients;
pub mod pharmacy;
pub mod reports;
pub mod users;
