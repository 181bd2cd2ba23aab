//! PostgreSQL backend storing every collection in one JSONB table.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use tracing::{debug, info, warn};

use crate::document::{document_id, into_document, scalar_text, Document, ID_FIELD};
use crate::error::{DatabaseError, DatabaseResult};
use crate::query::{DocumentQuery, QueryPage, SortDirection};
use crate::store::DocumentStore;
use crate::transaction::{SequenceCode, UnitOfWork, WriteOp};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        body JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (collection, id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS documents_body_gin ON documents USING GIN (body)",
    r#"
    CREATE TABLE IF NOT EXISTS sequences (
        name TEXT PRIMARY KEY,
        value BIGINT NOT NULL
    )
    "#,
];

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Connect and make sure the document tables exist.
    pub async fn connect(connection_string: &str) -> DatabaseResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(connection_string)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        info!("Postgres document store ready");
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> DatabaseResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Append the WHERE clause of a query. Field names are bound as parameters,
/// never spliced into the SQL text.
fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, collection: &str, query: &DocumentQuery) {
    builder.push(" WHERE collection = ");
    builder.push_bind(collection.to_string());

    for filter in &query.filters {
        builder.push(" AND (body ->> ");
        builder.push_bind(filter.field.clone());
        builder.push(" = ");
        builder.push_bind(filter.value.clone());
        builder.push(" OR (jsonb_typeof(body -> ");
        builder.push_bind(filter.field.clone());
        builder.push(") = 'array' AND body -> ");
        builder.push_bind(filter.field.clone());
        builder.push(" ? ");
        builder.push_bind(filter.value.clone());
        builder.push("))");
    }

    if let Some(search) = &query.search {
        if !search.fields.is_empty() {
            let pattern = escape_like(&search.term);
            builder.push(" AND (");
            for (i, field) in search.fields.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder.push("body ->> ");
                builder.push_bind(field.clone());
                builder.push(" ILIKE ");
                builder.push_bind(pattern.clone());
            }
            builder.push(")");
        }
    }
}

fn row_document(row: &PgRow) -> DatabaseResult<Document> {
    let body: Value = row.try_get("body")?;
    into_document(body)
}

async fn lock_collection(tx: &mut Transaction<'_, Postgres>, collection: &str) -> DatabaseResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(collection)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn next_sequence(tx: &mut Transaction<'_, Postgres>, sequence: &SequenceCode) -> DatabaseResult<String> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sequences (name, value) VALUES ($1, 1)
        ON CONFLICT (name) DO UPDATE SET value = sequences.value + 1
        RETURNING value
        "#,
    )
    .bind(&sequence.counter)
    .fetch_one(&mut **tx)
    .await?;
    Ok(sequence.format(u64::try_from(value).unwrap_or_default()))
}

async fn check_unique(
    tx: &mut Transaction<'_, Postgres>,
    collection: &str,
    doc: &Document,
    fields: &[String],
) -> DatabaseResult<()> {
    if fields.is_empty() {
        return Ok(());
    }
    lock_collection(tx, collection).await?;
    let id = document_id(doc)?;

    for field in fields {
        let Some(value) = doc.get(field).and_then(scalar_text) else {
            continue;
        };
        let clash: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM documents
                WHERE collection = $1 AND id <> $2 AND body ->> $3 = $4
            )
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(field)
        .bind(&value)
        .fetch_one(&mut **tx)
        .await?;

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

async fn apply_op(tx: &mut Transaction<'_, Postgres>, op: WriteOp) -> DatabaseResult<Document> {
    match op {
        WriteOp::Insert {
            collection,
            mut document,
            sequence,
            unique,
        } => {
            if let Some(sequence) = &sequence {
                let code = next_sequence(tx, sequence).await?;
                document.insert(sequence.field.clone(), code.into());
            }
            check_unique(tx, &collection, &document, &unique).await?;
            let id = document_id(&document)?.to_string();

            let inserted = sqlx::query(
                r#"
                INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)
                ON CONFLICT (collection, id) DO NOTHING
                "#,
            )
            .bind(&collection)
            .bind(&id)
            .bind(Value::Object(document.clone()))
            .execute(&mut **tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                return Err(DatabaseError::AlreadyExists { collection, id });
            }
            Ok(document)
        }
        WriteOp::Replace {
            collection,
            document,
            unique,
        } => {
            check_unique(tx, &collection, &document, &unique).await?;
            let id = document_id(&document)?.to_string();
            let updated = sqlx::query("UPDATE documents SET body = $3 WHERE collection = $1 AND id = $2")
                .bind(&collection)
                .bind(&id)
                .bind(Value::Object(document.clone()))
                .execute(&mut **tx)
                .await?
                .rows_affected();

            if updated == 0 {
                return Err(DatabaseError::not_found(&collection, &id));
            }
            Ok(document)
        }
        WriteOp::Modify {
            collection,
            id,
            mutation,
            unique,
        } => {
            let row = sqlx::query("SELECT body FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE")
                .bind(&collection)
                .bind(&id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| DatabaseError::not_found(&collection, &id))?;

            let mut updated = mutation(row_document(&row)?)?;
            updated.insert(ID_FIELD.to_string(), id.clone().into());
            check_unique(tx, &collection, &updated, &unique).await?;

            sqlx::query("UPDATE documents SET body = $3 WHERE collection = $1 AND id = $2")
                .bind(&collection)
                .bind(&id)
                .bind(Value::Object(updated.clone()))
                .execute(&mut **tx)
                .await?;
            Ok(updated)
        }
        WriteOp::Delete { collection, id } => {
            let row = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2 RETURNING body")
                .bind(&collection)
                .bind(&id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| DatabaseError::not_found(&collection, &id))?;
            row_document(&row)
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, collection: &str, id: &str) -> DatabaseResult<Option<Document>> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_document).transpose()
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> DatabaseResult<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT d.body FROM documents d
            JOIN UNNEST($2::text[]) WITH ORDINALITY AS wanted(id, position) ON wanted.id = d.id
            WHERE d.collection = $1
            ORDER BY wanted.position
            "#,
        )
        .bind(collection)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_document).collect()
    }

    async fn find(&self, collection: &str, query: &DocumentQuery) -> DatabaseResult<QueryPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents");
        push_conditions(&mut count, collection, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT body FROM documents");
        push_conditions(&mut select, collection, query);

        if query.sort.is_empty() {
            select.push(" ORDER BY created_at DESC");
        } else {
            select.push(" ORDER BY ");
            for (i, key) in query.sort.iter().enumerate() {
                if i > 0 {
                    select.push(", ");
                }
                select.push("body -> ");
                select.push_bind(key.field.clone());
                select.push(match key.direction {
                    SortDirection::Asc => " ASC NULLS LAST",
                    SortDirection::Desc => " DESC NULLS LAST",
                });
            }
        }
        if let Some(limit) = query.limit {
            select.push(" LIMIT ");
            select.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if query.offset > 0 {
            select.push(" OFFSET ");
            select.push_bind(i64::try_from(query.offset).unwrap_or(i64::MAX));
        }

        debug!(collection, sql = select.sql(), "Executing document query");
        let rows = select.build().fetch_all(&self.pool).await?;
        let documents = rows.iter().map(row_document).collect::<DatabaseResult<Vec<_>>>()?;

        Ok(QueryPage {
            documents,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn commit(&self, work: UnitOfWork) -> DatabaseResult<Vec<Document>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Failed to begin transaction: {}", e)))?;

        let ops = work.into_ops();
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            match apply_op(&mut tx, op).await {
                Ok(doc) => results.push(doc),
                Err(e) => {
                    warn!(error = %e, "Rolling back unit of work");
                    tx.rollback().await?;
                    return Err(e);
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::QueryFailed(format!("Failed to commit transaction: {}", e)))?;
        Ok(results)
    }

    async fn ping(&self) -> DatabaseResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
