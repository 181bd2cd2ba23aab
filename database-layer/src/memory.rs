//! Process-local document store.
//!
//! Used for development, demos and the test suites. A unit of work is staged
//! in an overlay while the write lock is held and merged only when every
//! operation succeeded, which gives the same all-or-nothing contract as the
//! Postgres backend.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::document::{document_id, scalar_text, Document, ID_FIELD};
use crate::error::{DatabaseError, DatabaseResult};
use crate::query::{DocumentQuery, QueryPage};
use crate::store::DocumentStore;
use crate::transaction::{SequenceCode, UnitOfWork, WriteOp};

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, BTreeMap<String, Document>>,
    sequences: HashMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.state
            .read()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

type Key = (String, String);

/// Pending changes of one unit of work layered over committed state.
struct Staging<'a> {
    base: &'a State,
    docs: HashMap<Key, Option<Document>>,
    sequences: HashMap<String, u64>,
}

impl<'a> Staging<'a> {
    fn new(base: &'a State) -> Self {
        Self {
            base,
            docs: HashMap::new(),
            sequences: HashMap::new(),
        }
    }

    fn lookup(&self, collection: &str, id: &str) -> Option<&Document> {
        match self.docs.get(&(collection.to_string(), id.to_string())) {
            Some(staged) => staged.as_ref(),
            None => self.base.collections.get(collection).and_then(|c| c.get(id)),
        }
    }

    fn effective(&self, collection: &str) -> Vec<&Document> {
        let mut docs: Vec<&Document> = self
            .base
            .collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(id, _)| !self.docs.contains_key(&(collection.to_string(), (*id).clone())))
                    .map(|(_, doc)| doc)
                    .collect()
            })
            .unwrap_or_default();
        docs.extend(
            self.docs
                .iter()
                .filter(|((c, _), _)| c == collection)
                .filter_map(|(_, doc)| doc.as_ref()),
        );
        docs
    }

    fn next_sequence(&mut self, counter: &str) -> u64 {
        let current = self
            .sequences
            .get(counter)
            .or_else(|| self.base.sequences.get(counter))
            .copied()
            .unwrap_or(0);
        let next = current + 1;
        self.sequences.insert(counter.to_string(), next);
        next
    }

    fn check_unique(&self, collection: &str, doc: &Document, fields: &[String]) -> DatabaseResult<()> {
        let id = document_id(doc)?;
        for field in fields {
            let Some(value) = doc.get(field).and_then(scalar_text) else {
                continue;
            };
            let clash = self.effective(collection).into_iter().any(|other| {
                other.get(ID_FIELD).and_then(|v| v.as_str()) != Some(id)
                    && other.get(field).and_then(scalar_text).as_deref() == Some(value.as_str())
            });
            if clash {
                return Err(DatabaseError::Duplicate {
                    collection: collection.to_string(),
                    field: field.clone(),
                    value,
                });
            }
        }
        Ok(())
    }

    fn stage(&mut self, collection: &str, id: &str, doc: Option<Document>) {
        self.docs.insert((collection.to_string(), id.to_string()), doc);
    }

    fn apply(&mut self, op: WriteOp) -> DatabaseResult<Document> {
        match op {
            WriteOp::Insert {
                collection,
                mut document,
                sequence,
                unique,
            } => {
                let id = document_id(&document)?.to_string();
                if self.lookup(&collection, &id).is_some() {
                    return Err(DatabaseError::AlreadyExists { collection, id });
                }
                allocate_code(self, &mut document, sequence.as_ref());
                self.check_unique(&collection, &document, &unique)?;
                self.stage(&collection, &id, Some(document.clone()));
                Ok(document)
            }
            WriteOp::Replace {
                collection,
                document,
                unique,
            } => {
                let id = document_id(&document)?.to_string();
                if self.lookup(&collection, &id).is_none() {
                    return Err(DatabaseError::not_found(&collection, &id));
                }
                self.check_unique(&collection, &document, &unique)?;
                self.stage(&collection, &id, Some(document.clone()));
                Ok(document)
            }
            WriteOp::Modify {
                collection,
                id,
                mutation,
                unique,
            } => {
                let current = self
                    .lookup(&collection, &id)
                    .cloned()
                    .ok_or_else(|| DatabaseError::not_found(&collection, &id))?;
                let mut updated = mutation(current)?;
                updated.insert(ID_FIELD.to_string(), id.clone().into());
                self.check_unique(&collection, &updated, &unique)?;
                self.stage(&collection, &id, Some(updated.clone()));
                Ok(updated)
            }
            WriteOp::Delete { collection, id } => {
                let removed = self
                    .lookup(&collection, &id)
                    .cloned()
                    .ok_or_else(|| DatabaseError::not_found(&collection, &id))?;
                self.stage(&collection, &id, None);
                Ok(removed)
            }
        }
    }
}

fn allocate_code(staging: &mut Staging<'_>, document: &mut Document, sequence: Option<&SequenceCode>) {
    if let Some(sequence) = sequence {
        let value = staging.next_sequence(&sequence.counter);
        document.insert(sequence.field.clone(), sequence.format(value).into());
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, collection: &str, id: &str) -> DatabaseResult<Option<Document>> {
        Ok(self
            .state
            .read()
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn find(&self, collection: &str, query: &DocumentQuery) -> DatabaseResult<QueryPage> {
        let state = self.state.read();
        Ok(match state.collections.get(collection) {
            Some(docs) => query.apply(docs.values()),
            None => QueryPage::default(),
        })
    }

    async fn commit(&self, work: UnitOfWork) -> DatabaseResult<Vec<Document>> {
        let mut state = self.state.write();
        let ops = work.into_ops();
        let op_count = ops.len();

        let (results, docs, sequences) = {
            let mut staging = Staging::new(&state);
            let mut results = Vec::with_capacity(op_count);
            for op in ops {
                results.push(staging.apply(op)?);
            }
            (results, staging.docs, staging.sequences)
        };

        for ((collection, id), doc) in docs {
            let entries = state.collections.entry(collection).or_default();
            match doc {
                Some(doc) => {
                    entries.insert(id, doc);
                }
                None => {
                    entries.remove(&id);
                }
            }
        }
        state.sequences.extend(sequences);

        debug!(operations = op_count, "Committed unit of work");
        Ok(results)
    }

    async fn ping(&self) -> DatabaseResult<()> {
        Ok(())
    }
}
