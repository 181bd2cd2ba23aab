//! Store selection from a connection string.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{DatabaseError, DatabaseResult};
use crate::memory::MemoryStore;
use crate::postgres::PgDocumentStore;
use crate::store::DocumentStore;

/// Connection string selecting the process-local store.
pub const MEMORY_URL: &str = "memory://";

/// Open the store named by `url`.
///
/// `postgres://` and `postgresql://` URLs open the JSONB store; `memory://`
/// (or an empty string) opens a fresh in-memory store.
pub async fn connect(url: &str) -> DatabaseResult<Arc<dyn DocumentStore>> {
    let url = url.trim();
    if url.is_empty() || url.starts_with(MEMORY_URL) {
        warn!("Using the in-memory document store; data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let store = PgDocumentStore::connect(url).await?;
        info!(backend = "postgres", "Document store connected");
        return Ok(Arc::new(store));
    }
    Err(DatabaseError::ConfigurationError(format!(
        "unsupported database URL scheme: {}",
        url.split("://").next().unwrap_or(url)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_urls() {
        assert_eq!(connect("").await.unwrap().backend(), "memory");
        assert_eq!(connect("memory://").await.unwrap().backend(), "memory");
    }

    #[tokio::test]
    async fn test_unknown_scheme() {
        let err = connect("mongodb://localhost/hims").await.err().unwrap();
        assert!(matches!(err, DatabaseError::ConfigurationError(_)));
    }
}
