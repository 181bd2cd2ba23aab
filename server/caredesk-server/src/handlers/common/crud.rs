//! Generic CRUD handlers
//!
//! One pipeline serves every resource. Writes go through [`stage_new`] or the
//! update path below, which strip server-assigned fields, expand nested
//! relations, type and validate the record, compute derived fields and build
//! a single [`UnitOfWork`]. Updates merge inside a `Modify` step. Reads resolve references and shape the response
//! through the resource's `resolve` and `present` hooks.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use database_layer::{
    document_id, into_document, DatabaseError, DatabaseResult, Document, UnitOfWork, CREATED_AT_FIELD,
    ID_FIELD, UPDATED_AT_FIELD,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::resource::{Resource, WriteMode};
use crate::error::{api_success, api_success_with_meta, ApiError, ApiResponse, ApiResult, ResponseMetadata};
use crate::server::CareDeskServer;
use crate::types::ApiJson;
use crate::utils::{build_list_query, now_rfc3339};
use crate::validation::RequestValidation;

/// Confirmation returned by `DELETE /<collection>/:id`
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteConfirmation {
    pub message: String,
    pub id: String,
}

/// Routes for the five standard operations, to be nested at `/<collection>`.
pub fn crud_routes<R: Resource>() -> Router<CareDeskServer> {
    Router::new()
        .route("/", get(list::<R>).post(create::<R>))
        .route("/:id", get(get_by_id::<R>).put(update::<R>).delete(delete::<R>))
}

pub async fn create<R: Resource>(
    State(server): State<CareDeskServer>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Document>>)> {
    let (_, work) = stage_new::<R>(&server, payload).await?;
    let stored = commit_last::<R>(&server, work).await?;
    tracing::info!(collection = R::COLLECTION, id = %document_id(&stored)?, "Record created");

    let body = respond::<R>(&server, stored).await?;
    Ok((StatusCode::CREATED, Json(api_success(body))))
}

pub async fn list<R: Resource>(
    State(server): State<CareDeskServer>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<ApiResponse<Vec<Document>>>> {
    let request = build_list_query::<R>(&params)?;
    let page = server.store.find(R::COLLECTION, &request.query).await?;

    let mut documents = Vec::with_capacity(page.documents.len());
    for document in page.documents {
        documents.push(respond::<R>(&server, document).await?);
    }

    let metadata = match &request.pagination {
        Some(pagination) => pagination.to_metadata(page.total),
        None => ResponseMetadata {
            pagination: None,
            total_count: Some(page.total),
        },
    };
    Ok(Json(api_success_with_meta(documents, metadata)))
}

pub async fn get_by_id<R: Resource>(
    State(server): State<CareDeskServer>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Document>>> {
    let stored = load::<R>(&server, &id).await?;
    Ok(Json(api_success(respond::<R>(&server, stored).await?)))
}

/// Overlay the supplied top-level fields on the stored record.
///
/// Fields absent from the payload keep their stored values; the merged
/// record is validated and re-derived as a whole. The merge itself runs as a
/// `Modify` over the version current at commit time, so writes that land
/// between the read below and the commit are kept.
pub async fn update<R: Resource>(
    State(server): State<CareDeskServer>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Json<ApiResponse<Document>>> {
    let stored = load::<R>(&server, &id).await?;
    let mut changes = payload_document(payload)?;
    strip_protected::<R>(&mut changes);

    let nested = R::expand(&server, &id, &mut changes, WriteMode::Update).await?;
    changes.insert(UPDATED_AT_FIELD.to_string(), now_rfc3339().into());

    // Validate and enrich against the version just read; lookups cannot run
    // inside the store write, so their results travel with the changes.
    let mut record = checked::<R>(overlay::<R>(stored, &changes))?;
    let derived = stored_form(&record)?;
    R::enrich(&server, &mut record).await?;
    absorb_enrichment(&mut changes, &derived, &stored_form(&record)?);

    let work = nested.modify_with(R::COLLECTION, &id, R::UNIQUE, move |current| {
        rebase::<R>(current, &changes)
    });
    let stored = commit_last::<R>(&server, work).await?;
    tracing::info!(collection = R::COLLECTION, id = %id, "Record updated");

    Ok(Json(api_success(respond::<R>(&server, stored).await?)))
}

pub async fn delete<R: Resource>(
    State(server): State<CareDeskServer>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<DeleteConfirmation>>> {
    server
        .store
        .commit(UnitOfWork::new().delete(R::COLLECTION, &id))
        .await
        .map_err(missing_as::<R>)?;
    tracing::info!(collection = R::COLLECTION, id = %id, "Record deleted");

    Ok(Json(api_success(DeleteConfirmation {
        message: format!("{} deleted successfully", R::LABEL),
        id,
    })))
}

/// Prepare the insert of a new record built from `payload`.
///
/// Returns the typed, derived document (without its sequence code, which is
/// allocated at commit) and the unit of work that creates it together with
/// any nested records. The record's own insert is the last operation.
pub async fn stage_new<R: Resource>(
    server: &CareDeskServer,
    payload: Value,
) -> ApiResult<(Document, UnitOfWork)> {
    let mut document = payload_document(payload)?;
    strip_protected::<R>(&mut document);

    let id = Uuid::new_v4().to_string();
    let nested = R::expand(server, &id, &mut document, WriteMode::Create).await?;

    let now = now_rfc3339();
    document.insert(ID_FIELD.to_string(), id.into());
    document.insert(CREATED_AT_FIELD.to_string(), now.clone().into());
    document.insert(UPDATED_AT_FIELD.to_string(), now.into());

    let record = finalize::<R>(server, document).await?;
    let work = nested.insert_with(R::COLLECTION, record.clone(), R::sequence(), R::UNIQUE);
    Ok((record, work))
}

/// Fetch a stored record or fail with the resource's 404.
pub async fn load<R: Resource>(server: &CareDeskServer, id: &str) -> ApiResult<Document> {
    server
        .store
        .get(R::COLLECTION, id)
        .await?
        .ok_or_else(|| ApiError::not_found(R::LABEL))
}

/// Resolve references and shape a stored record for a response.
pub async fn respond<R: Resource>(server: &CareDeskServer, stored: Document) -> ApiResult<Document> {
    let resolved = R::resolve(server, stored).await?;
    Ok(R::present(resolved))
}

/// Map a store-level "not found" onto this resource's label.
pub fn missing_as<R: Resource>(error: DatabaseError) -> ApiError {
    match error {
        DatabaseError::NotFound { .. } => ApiError::not_found(R::LABEL),
        other => other.into(),
    }
}

pub(crate) fn payload_document(payload: Value) -> ApiResult<Document> {
    into_document(payload).map_err(|_| ApiError::bad_request("Request body must be a JSON object"))
}

fn strip_protected<R: Resource>(document: &mut Document) {
    for field in R::protected_fields() {
        document.remove(field);
    }
}

/// Type, validate, derive and enrich a new record, returning the stored form.
async fn finalize<R: Resource>(server: &CareDeskServer, document: Document) -> ApiResult<Document> {
    let mut record = checked::<R>(document)?;
    R::enrich(server, &mut record).await?;
    Ok(stored_form(&record)?)
}

/// Type, validate and derive a candidate document.
fn checked<R: Resource>(document: Document) -> ApiResult<R::Record> {
    let mut record: R::Record = serde_json::from_value(Value::Object(document))
        .map_err(|e| ApiError::validation(format!("Invalid {}: {}", R::LABEL.to_lowercase(), e)))?;
    record.validate()?;
    R::derive(&mut record)?;
    Ok(record)
}

fn stored_form<T: Serialize>(record: &T) -> DatabaseResult<Document> {
    let mut stored = into_document(serde_json::to_value(record)?)?;
    stored.retain(|_, value| !value.is_null());
    Ok(stored)
}

/// `stored` with `changes` on top, derived values reset.
fn overlay<R: Resource>(mut stored: Document, changes: &Document) -> Document {
    R::reset_derived(&mut stored, changes);
    stored.extend(changes.iter().map(|(key, value)| (key.clone(), value.clone())));
    stored
}

/// Fold the fields `enrich` set or removed into the change set.
fn absorb_enrichment(changes: &mut Document, derived: &Document, enriched: &Document) {
    for key in derived.keys().filter(|key| !enriched.contains_key(*key)) {
        changes.remove(key);
    }
    for (key, value) in enriched {
        if derived.get(key) != Some(value) {
            changes.insert(key.clone(), value.clone());
        }
    }
}

/// Apply an update to the current version of a record inside the store write.
fn rebase<R: Resource>(current: Document, changes: &Document) -> DatabaseResult<Document> {
    let record = checked::<R>(overlay::<R>(current, changes))
        .map_err(|e| DatabaseError::rejected(e.public_message()))?;
    stored_form(&record)
}

/// Commit and return the document written by the last operation.
async fn commit_last<R: Resource>(server: &CareDeskServer, work: UnitOfWork) -> ApiResult<Document> {
    let mut written = server.store.commit(work).await.map_err(missing_as::<R>)?;
    written
        .pop()
        .ok_or_else(|| ApiError::internal(format!("Write to {} returned no document", R::COLLECTION)))
}
