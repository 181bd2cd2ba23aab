//! The `Resource` trait: everything the generic CRUD pipeline needs to know
//! about one record type.

use async_trait::async_trait;
use database_layer::{Document, SequenceCode, SortKey, UnitOfWork, CREATED_AT_FIELD, UPDATED_AT_FIELD};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Page;
use crate::error::ApiResult;
use crate::server::CareDeskServer;
use crate::validation::RequestValidation;

/// Width of the numeric part of generated codes (`PT000001`).
pub const CODE_WIDTH: usize = 6;

/// Server-assigned fields shared by every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
}

/// Human-readable code allocated from a store counter on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSpec {
    pub field: &'static str,
    pub prefix: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// A record type served by the generic handlers in [`super::crud`].
///
/// Implementors are zero-sized markers; the record itself is `Self::Record`.
/// Query keys accepted by `list` are exactly the names in `FILTERS` plus the
/// reserved `search`, `sort`, `page` and `page_size`.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    type Record: Serialize + DeserializeOwned + RequestValidation + Send + Sync;

    /// Collection name, also the route segment.
    const COLLECTION: &'static str;
    /// Singular label used in messages ("Patient not found").
    const LABEL: &'static str;
    /// Navigation pages whose roles may use this resource.
    const PAGES: &'static [Page];
    const FILTERS: &'static [&'static str];
    const SEARCH: &'static [&'static str];
    const DEFAULT_SORT: (&'static str, SortOrder);
    /// Extra sortable fields beyond filters, search fields and timestamps.
    const SORTABLE: &'static [&'static str] = &[];
    const UNIQUE: &'static [&'static str] = &[];
    const CODE: Option<CodeSpec> = None;
    /// Computed fields an update recomputes unless its payload sets them.
    const DERIVED: &'static [&'static str] = &[];

    fn sequence() -> Option<SequenceCode> {
        Self::CODE.map(|code| SequenceCode::new(code.field, Self::COLLECTION, code.prefix, CODE_WIDTH))
    }

    fn default_sort() -> SortKey {
        match Self::DEFAULT_SORT {
            (field, SortOrder::Asc) => SortKey::asc(field),
            (field, SortOrder::Desc) => SortKey::desc(field),
        }
    }

    fn is_sortable(field: &str) -> bool {
        field == Self::DEFAULT_SORT.0
            || field == CREATED_AT_FIELD
            || field == UPDATED_AT_FIELD
            || Self::FILTERS.contains(&field)
            || Self::SEARCH.contains(&field)
            || Self::SORTABLE.contains(&field)
    }

    /// Fields a payload may never set.
    fn protected_fields() -> Vec<&'static str> {
        let mut fields = vec!["id", CREATED_AT_FIELD, UPDATED_AT_FIELD];
        if let Some(code) = Self::CODE {
            fields.push(code.field);
        }
        fields
    }

    /// Rewrite nested relations in a payload before it is typed, returning
    /// the writes that create any nested records. `id` is the id of the
    /// record being written.
    async fn expand(
        _server: &CareDeskServer,
        _id: &str,
        _payload: &mut Document,
        _mode: WriteMode,
    ) -> ApiResult<UnitOfWork> {
        Ok(UnitOfWork::new())
    }

    /// Compute derived fields after validation.
    ///
    /// Runs inside the store write on updates, against the current version
    /// of the record, so it must not touch the store.
    fn derive(_record: &mut Self::Record) -> ApiResult<()> {
        Ok(())
    }

    /// Fill values that need other records, such as display names.
    async fn enrich(_server: &CareDeskServer, _record: &mut Self::Record) -> ApiResult<()> {
        Ok(())
    }

    /// Drop stored derived values that `changes` does not set, so the
    /// merged record derives them afresh.
    fn reset_derived(stored: &mut Document, changes: &Document) {
        for field in Self::DERIVED {
            if !changes.contains_key(*field) {
                stored.remove(*field);
            }
        }
    }

    /// Replace stored references with the documents they name.
    async fn resolve(_server: &CareDeskServer, document: Document) -> ApiResult<Document> {
        Ok(document)
    }

    /// Shape a stored document for the response.
    fn present(document: Document) -> Document {
        document
    }
}
