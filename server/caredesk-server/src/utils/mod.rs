//! Utility modules

pub mod query_builder;
pub mod timestamps;

pub use query_builder::*;
pub use timestamps::*;
