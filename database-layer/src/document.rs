//! Document representation shared by every store backend.

use serde_json::{Map, Value};

use crate::error::{DatabaseError, DatabaseResult};

/// A stored record: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Field holding the external identifier of every document.
pub const ID_FIELD: &str = "id";
/// Creation instant (RFC 3339), stamped by the server.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Last update instant (RFC 3339), stamped by the server.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Read the `id` of a document.
pub fn document_id(doc: &Document) -> DatabaseResult<&str> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DatabaseError::InvalidDocument("document has no string id".to_string()))
}

/// Convert an arbitrary JSON value into a document.
pub fn into_document(value: Value) -> DatabaseResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DatabaseError::InvalidDocument(format!(
            "expected a JSON object, found {}",
            type_name(&other)
        ))),
    }
}

/// Text rendering of a scalar used for equality filters.
///
/// Strings compare by content, numbers and booleans by their JSON text, so a
/// query-string value like `"true"` or `"3"` matches the stored scalar.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id() {
        let doc = into_document(json!({"id": "abc", "name": "x"})).unwrap();
        assert_eq!(document_id(&doc).unwrap(), "abc");

        let doc = into_document(json!({"id": ""})).unwrap();
        assert!(document_id(&doc).is_err());
    }

    #[test]
    fn test_into_document_rejects_non_objects() {
        assert!(into_document(json!([1, 2])).is_err());
        assert!(into_document(json!("text")).is_err());
    }

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text(&json!("a")), Some("a".to_string()));
        assert_eq!(scalar_text(&json!(3)), Some("3".to_string()));
        assert_eq!(scalar_text(&json!(true)), Some("true".to_string()));
        assert_eq!(scalar_text(&json!(null)), None);
    }
}
