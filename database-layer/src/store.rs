use async_trait::async_trait;

use crate::document::Document;
use crate::error::DatabaseResult;
use crate::query::{DocumentQuery, QueryPage};
use crate::transaction::UnitOfWork;

/// Collection-oriented document storage.
///
/// Reads see committed state only. Every write goes through [`commit`], which
/// applies a [`UnitOfWork`] atomically: if any operation fails (missing
/// target, duplicate unique value, rejected mutation) nothing is written.
///
/// [`commit`]: DocumentStore::commit
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for health reports and logs.
    fn backend(&self) -> &'static str;

    async fn get(&self, collection: &str, id: &str) -> DatabaseResult<Option<Document>>;

    /// Fetch several documents by id. Missing ids are skipped; the result
    /// keeps the order of `ids`.
    async fn get_many(&self, collection: &str, ids: &[String]) -> DatabaseResult<Vec<Document>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.get(collection, id).await? {
                found.push(doc);
            }
        }
        Ok(found)
    }

    async fn find(&self, collection: &str, query: &DocumentQuery) -> DatabaseResult<QueryPage>;

    async fn commit(&self, work: UnitOfWork) -> DatabaseResult<Vec<Document>>;

    async fn ping(&self) -> DatabaseResult<()>;
}
