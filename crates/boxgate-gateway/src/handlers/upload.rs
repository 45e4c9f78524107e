//! Content endpoints: upload, upload sessions and download

use super::{
    body_stream, header_args, header_json, is_empty_body, require_read, require_write, write_mode,
    ModeArg, PathArg, API_RESULT_HEADER,
};
use crate::state::UserSession;
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use boxgate_driver::Entry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct CommitInfo {
    pub path: String,
    #[serde(default)]
    pub mode: ModeArg,
    #[serde(default)]
    pub autorename: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionStartArg {
    #[serde(default)]
    pub close: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionCursor {
    pub session_id: String,
    pub offset: u64,
}

#[derive(Debug, Deserialize)]
pub struct SessionAppendArg {
    pub cursor: SessionCursor,
    #[serde(default)]
    pub close: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionFinishArg {
    pub cursor: SessionCursor,
    pub commit: CommitInfo,
}

#[derive(Debug, Serialize)]
pub struct SessionStartResult {
    pub session_id: String,
}

/// POST /2/files/upload
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<Entry>, ApiError> {
    require_write(&session)?;
    let arg: CommitInfo = header_args("files/upload", &headers)?;

    let space = state.open_space(&session).await?;
    let entry = space
        .upload(&arg.path, write_mode(arg.mode, arg.autorename), body_stream(body))
        .await?;
    Ok(Json(entry))
}

/// POST /2/files/download
pub async fn download(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_read(&session)?;
    let arg: PathArg = header_args("files/download", &headers)?;

    let space = state.open_space(&session).await?;
    let (entry, content) = space.download(&arg.path).await?;
    let result = header_json(&entry)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (HeaderName::from_static(API_RESULT_HEADER), result),
        ],
        Body::from_stream(content),
    )
        .into_response())
}

/// POST /2/files/upload_session/start
pub async fn upload_session_start(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<SessionStartResult>, ApiError> {
    require_write(&session)?;
    let arg: SessionStartArg = if headers.contains_key(super::API_ARG_HEADER) {
        header_args("files/upload_session/start", &headers)?
    } else {
        SessionStartArg::default()
    };

    let first_chunk = (!is_empty_body(&headers)).then(|| body_stream(body));
    let space = state.open_space(&session).await?;
    let session_id = space.upload_session_start(first_chunk).await?;
    debug!(%session_id, close = arg.close, "Upload session started");
    Ok(Json(SessionStartResult { session_id }))
}

/// POST /2/files/upload_session/append_v2
pub async fn upload_session_append(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<Value>, ApiError> {
    require_write(&session)?;
    let arg: SessionAppendArg = header_args("files/upload_session/append_v2", &headers)?;

    let space = state.open_space(&session).await?;
    space
        .upload_session_append(&arg.cursor.session_id, arg.cursor.offset, body_stream(body))
        .await?;
    debug!(session_id = %arg.cursor.session_id, close = arg.close, "Upload session appended");
    Ok(Json(Value::Null))
}

/// POST /2/files/upload_session/finish
pub async fn upload_session_finish(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<Entry>, ApiError> {
    require_write(&session)?;
    let arg: SessionFinishArg = header_args("files/upload_session/finish", &headers)?;

    let last_chunk = (!is_empty_body(&headers)).then(|| body_stream(body));
    let space = state.open_space(&session).await?;
    let entry = space
        .upload_session_finish(
            &arg.cursor.session_id,
            arg.cursor.offset,
            last_chunk,
            &arg.commit.path,
            write_mode(arg.commit.mode, arg.commit.autorename),
        )
        .await?;
    Ok(Json(entry))
}
