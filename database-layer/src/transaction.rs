//! Units of work: ordered write operations committed all-or-nothing.

use std::fmt;

use crate::document::Document;
use crate::error::DatabaseResult;

/// Read-modify-write step applied to the current version of a document while
/// the unit of work holds it exclusively.
pub type Mutation = Box<dyn FnOnce(Document) -> DatabaseResult<Document> + Send>;

/// Human-readable sequential code allocated inside the unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCode {
    /// Document field receiving the code.
    pub field: String,
    /// Counter name; counters are independent of collections.
    pub counter: String,
    pub prefix: String,
    /// Zero-padded width of the numeric part.
    pub width: usize,
}

impl SequenceCode {
    pub fn new(field: &str, counter: &str, prefix: &str, width: usize) -> Self {
        Self {
            field: field.to_string(),
            counter: counter.to_string(),
            prefix: prefix.to_string(),
            width,
        }
    }

    pub fn format(&self, value: u64) -> String {
        format!("{}{:0width$}", self.prefix, value, width = self.width)
    }
}

pub enum WriteOp {
    Insert {
        collection: String,
        document: Document,
        sequence: Option<SequenceCode>,
        unique: Vec<String>,
    },
    Replace {
        collection: String,
        document: Document,
        unique: Vec<String>,
    },
    Modify {
        collection: String,
        id: String,
        mutation: Mutation,
        /// Checked against the mutated document.
        unique: Vec<String>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Insert { collection, .. }
            | WriteOp::Replace { collection, .. }
            | WriteOp::Modify { collection, .. }
            | WriteOp::Delete { collection, .. } => collection,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            WriteOp::Insert { .. } => "insert",
            WriteOp::Replace { .. } => "replace",
            WriteOp::Modify { .. } => "modify",
            WriteOp::Delete { .. } => "delete",
        }
    }
}

impl fmt::Debug for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteOp")
            .field("kind", &self.kind())
            .field("collection", &self.collection())
            .finish()
    }
}

/// Ordered batch of writes. Either every operation is applied or none is.
///
/// `commit` returns one document per operation, in order: the stored
/// document for inserts, replaces and modifies, and the removed document for
/// deletes.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    ops: Vec<WriteOp>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, collection: &str, document: Document) -> Self {
        self.ops.push(WriteOp::Insert {
            collection: collection.to_string(),
            document,
            sequence: None,
            unique: Vec::new(),
        });
        self
    }

    pub fn insert_with(
        mut self,
        collection: &str,
        document: Document,
        sequence: Option<SequenceCode>,
        unique: &[&str],
    ) -> Self {
        self.ops.push(WriteOp::Insert {
            collection: collection.to_string(),
            document,
            sequence,
            unique: unique.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn replace(mut self, collection: &str, document: Document, unique: &[&str]) -> Self {
        self.ops.push(WriteOp::Replace {
            collection: collection.to_string(),
            document,
            unique: unique.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn modify<F>(self, collection: &str, id: &str, mutation: F) -> Self
    where
        F: FnOnce(Document) -> DatabaseResult<Document> + Send + 'static,
    {
        self.modify_with(collection, id, &[], mutation)
    }

    /// `modify` that also enforces uniqueness of `unique` on the result.
    pub fn modify_with<F>(mut self, collection: &str, id: &str, unique: &[&str], mutation: F) -> Self
    where
        F: FnOnce(Document) -> DatabaseResult<Document> + Send + 'static,
    {
        self.ops.push(WriteOp::Modify {
            collection: collection.to_string(),
            id: id.to_string(),
            mutation: Box::new(mutation),
            unique: unique.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn delete(mut self, collection: &str, id: &str) -> Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self
    }

    /// Append every operation of another unit of work.
    pub fn extend(mut self, other: UnitOfWork) -> Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_code_format() {
        let code = SequenceCode::new("invoiceNumber", "invoices", "INV", 6);
        assert_eq!(code.format(42), "INV000042");
        assert_eq!(code.format(1_234_567), "INV1234567");
    }

    #[test]
    fn test_unit_of_work_keeps_order() {
        let uow = UnitOfWork::new()
            .insert("a", Document::new())
            .delete("b", "1")
            .extend(UnitOfWork::new().modify("c", "2", Ok));
        let kinds: Vec<&str> = uow.into_ops().iter().map(|op| op.kind()).collect();
        assert_eq!(kinds, vec!["insert", "delete", "modify"]);
    }
}
