//! Batch job handlers
//!
//! A batch is validated as a whole before anything runs; the response only
//! carries the job id, results are fetched from the matching `check`
//! endpoint.

use super::{parse_args, relocation_mode, require_read, require_write};
use crate::error::ErrorContext;
use crate::state::UserSession;
use crate::{ApiError, AppState};
use axum::{
    extract::{Extension, State},
    Json,
};
use boxgate_core::{JobStatus, Operation};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Most entries a single batch request may carry
pub const MAX_BATCH_ENTRIES: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct DeleteBatchArg {
    pub entries: Vec<super::PathArg>,
}

#[derive(Debug, Deserialize)]
pub struct RelocationBatchArg {
    pub entries: Vec<RelocationPath>,
    #[serde(default)]
    pub autorename: bool,
}

#[derive(Debug, Deserialize)]
pub struct RelocationPath {
    pub from_path: String,
    pub to_path: String,
}

#[derive(Debug, Deserialize)]
pub struct JobIdArg {
    pub async_job_id: String,
}

/// How the entries of a finished job are labelled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResultShape {
    /// `{".tag": "success", "metadata": ...}`
    Delete,
    /// `{".tag": "success", "success": ...}`
    Relocation,
}

/// Render a job status as a Dropbox batch job result
fn job_status_json(status: JobStatus, shape: ResultShape) -> Value {
    match status {
        JobStatus::InProgress => json!({ ".tag": "in_progress" }),
        JobStatus::Complete { entries } => {
            let key = match shape {
                ResultShape::Delete => "metadata",
                ResultShape::Relocation => "success",
            };
            let entries: Vec<Value> = entries
                .into_iter()
                .map(|entry| json!({ ".tag": "success", key: entry }))
                .collect();
            json!({ ".tag": "complete", "entries": entries })
        }
        JobStatus::Failed { summary, kind } => json!({
            ".tag": "failed",
            "failed": { ".tag": kind.as_str() },
            "error_summary": summary,
        }),
    }
}

fn check_entry_count(endpoint: &str, count: usize) -> Result<(), ApiError> {
    if count > MAX_BATCH_ENTRIES {
        return Err(ApiError::bad_input(
            endpoint,
            format!("at most {MAX_BATCH_ENTRIES} entries per batch, got {count}"),
        ));
    }
    Ok(())
}

fn job_launched(job_id: String) -> Json<Value> {
    Json(json!({ ".tag": "async_job_id", "async_job_id": job_id }))
}

/// POST /2/files/delete_batch
pub async fn delete_batch(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    require_write(&session)?;
    let arg: DeleteBatchArg = parse_args("files/delete_batch", &body)?;
    check_entry_count("files/delete_batch", arg.entries.len())?;

    let operations = arg
        .entries
        .into_iter()
        .map(|entry| Operation::Delete { path: entry.path })
        .collect();
    let space = state.open_space(&session).await?;
    let job_id = space
        .launch_batch(operations)
        .await
        .map_err(ApiError::within(ErrorContext::PATH_LOOKUP))?;
    Ok(job_launched(job_id))
}

/// POST /2/files/move_batch_v2
pub async fn move_batch(
    state: State<Arc<AppState>>,
    session: Extension<UserSession>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    relocation_batch("files/move_batch_v2", state, session, body, |from, to, mode| {
        Operation::Move { from, to, mode }
    })
    .await
}

/// POST /2/files/copy_batch_v2
pub async fn copy_batch(
    state: State<Arc<AppState>>,
    session: Extension<UserSession>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    relocation_batch("files/copy_batch_v2", state, session, body, |from, to, mode| {
        Operation::Copy { from, to, mode }
    })
    .await
}

async fn relocation_batch(
    endpoint: &str,
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
    operation: impl Fn(String, String, boxgate_core::WriteMode) -> Operation,
) -> Result<Json<Value>, ApiError> {
    require_write(&session)?;
    let arg: RelocationBatchArg = parse_args(endpoint, &body)?;
    check_entry_count(endpoint, arg.entries.len())?;

    let mode = relocation_mode(arg.autorename);
    let operations = arg
        .entries
        .into_iter()
        .map(|entry| operation(entry.from_path, entry.to_path, mode))
        .collect();
    let space = state.open_space(&session).await?;
    let job_id = space
        .launch_batch(operations)
        .await
        .map_err(ApiError::within(ErrorContext::RELOCATION))?;
    Ok(job_launched(job_id))
}

/// POST /2/files/delete_batch/check
pub async fn delete_batch_check(
    state: State<Arc<AppState>>,
    session: Extension<UserSession>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    check_job("files/delete_batch/check", state, session, body, ResultShape::Delete).await
}

/// POST /2/files/move_batch/check_v2
pub async fn move_batch_check(
    state: State<Arc<AppState>>,
    session: Extension<UserSession>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    check_job("files/move_batch/check_v2", state, session, body, ResultShape::Relocation).await
}

/// POST /2/files/copy_batch/check_v2
pub async fn copy_batch_check(
    state: State<Arc<AppState>>,
    session: Extension<UserSession>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    check_job("files/copy_batch/check_v2", state, session, body, ResultShape::Relocation).await
}

async fn check_job(
    endpoint: &str,
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
    shape: ResultShape,
) -> Result<Json<Value>, ApiError> {
    require_read(&session)?;
    let arg: JobIdArg = parse_args(endpoint, &body)?;

    let space = state.open_space(&session).await?;
    let status = space.check_job(&arg.async_job_id)?;
    Ok(Json(job_status_json(status, shape)))
}
