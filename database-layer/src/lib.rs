//! Document storage for the CareDesk hospital information system.
//!
//! Every resource lives in its own collection of JSON documents addressed by
//! a string `id`. Writes are grouped into [`UnitOfWork`]s that commit
//! all-or-nothing, which is what keeps cascading creates free of orphans and
//! invoice payment application free of lost updates.
//!
//! Two backends implement [`DocumentStore`]:
//!
//! - [`MemoryStore`]: process-local, used for development and tests
//! - [`PgDocumentStore`]: one JSONB table in PostgreSQL via `sqlx`
//!
//! ```rust,no_run
//! use database_layer::{connect, DocumentQuery, SortKey, UnitOfWork};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), database_layer::DatabaseError> {
//! let store = connect("memory://").await?;
//! let doc = database_layer::into_document(json!({"id": "p1", "fullName": "An"}))?;
//! store.commit(UnitOfWork::new().insert("patients", doc)).await?;
//!
//! let query = DocumentQuery::new().search("an", ["fullName"]).order_by(SortKey::asc("fullName"));
//! let page = store.find("patients", &query).await?;
//! assert_eq!(page.total, 1);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;
pub mod transaction;

pub use connection::*;
pub use document::*;
pub use error::*;
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use query::*;
pub use store::DocumentStore;
pub use transaction::*;
