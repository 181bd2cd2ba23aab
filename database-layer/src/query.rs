//! Backend-neutral query model for document collections.
//!
//! A `DocumentQuery` carries equality filters, an optional case-insensitive
//! substring search, sort keys and an optional window. The in-memory store
//! evaluates it directly through [`DocumentQuery::matches`] and
//! [`DocumentQuery::compare`]; the Postgres store translates it to SQL.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{scalar_text, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Equality filter on one top-level field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

/// Case-insensitive substring search, OR-combined across `fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSearch {
    pub term: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentQuery {
    pub filters: Vec<FieldFilter>,
    pub search: Option<TextSearch>,
    pub sort: Vec<SortKey>,
    pub limit: Option<u64>,
    pub offset: u64,
}

/// One page of query results plus the unwindowed match count.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub documents: Vec<Document>,
    pub total: u64,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// The term is matched as given; only an empty term is ignored.
    pub fn search<I, S>(mut self, term: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let term = term.into();
        if !term.is_empty() {
            self.search = Some(TextSearch {
                term,
                fields: fields.into_iter().map(Into::into).collect(),
            });
        }
        self
    }

    pub fn order_by(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn window(mut self, limit: Option<u64>, offset: u64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Whether a document satisfies every filter and the search, if any.
    pub fn matches(&self, doc: &Document) -> bool {
        let filters_pass = self.filters.iter().all(|filter| {
            match doc.get(&filter.field) {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(scalar_text)
                    .any(|text| text == filter.value),
                Some(value) => scalar_text(value).is_some_and(|text| text == filter.value),
                None => false,
            }
        });
        if !filters_pass {
            return false;
        }

        match &self.search {
            None => true,
            Some(search) => {
                let needle = search.term.to_lowercase();
                search.fields.iter().any(|field| {
                    doc.get(field)
                        .and_then(scalar_text)
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
                })
            }
        }
    }

    /// Ordering of two documents under the query's sort keys.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.sort {
            let ordering = compare_values(a.get(&key.field), b.get(&key.field), key.direction);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Filter, sort and window an iterator of documents.
    pub fn apply<'a, I>(&self, docs: I) -> QueryPage
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut matched: Vec<&Document> = docs.into_iter().filter(|doc| self.matches(doc)).collect();
        matched.sort_by(|a, b| self.compare(a, b));

        let total = matched.len() as u64;
        let skip = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let take = self
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        QueryPage {
            documents: matched.into_iter().skip(skip).take(take).cloned().collect(),
            total,
        }
    }
}

/// Missing and null values sort after everything else in either direction.
fn compare_values(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = compare_present(a, b);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
    }
}

fn compare_present(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
