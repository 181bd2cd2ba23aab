//! Building blocks shared by the resource handlers

pub mod crud;
pub mod enums;
pub mod resource;

pub use crud::crud_routes;
pub use enums::*;
pub use resource::{CodeSpec, RecordMeta, Resource, SortOrder, WriteMode};

use database_layer::Document;
use serde_json::Value;

use crate::error::ApiResult;
use crate::server::CareDeskServer;

/// Read one string field of a related record, `None` if either is missing.
pub async fn related_text(
    server: &CareDeskServer,
    collection: &str,
    id: &str,
    field: &str,
) -> ApiResult<Option<String>> {
    let related = server.store.get(collection, id).await?;
    Ok(related.and_then(|doc| text_field(&doc, field)))
}

/// Copy a display value from a related record when the caller left it blank.
pub async fn fill_display_name(
    server: &CareDeskServer,
    target: &mut Option<String>,
    collection: &str,
    id: Option<&str>,
    field: &str,
) -> ApiResult<()> {
    let blank = target.as_deref().map_or(true, |v| v.trim().is_empty());
    if let (true, Some(id)) = (blank, id.filter(|id| !id.is_empty())) {
        if let Some(value) = related_text(server, collection, id, field).await? {
            *target = Some(value);
        }
    }
    Ok(())
}

pub fn text_field(document: &Document, field: &str) -> Option<String> {
    document.get(field).and_then(Value::as_str).map(str::to_string)
}

pub fn number_field(document: &Document, field: &str) -> Option<f64> {
    document.get(field).and_then(Value::as_f64)
}
