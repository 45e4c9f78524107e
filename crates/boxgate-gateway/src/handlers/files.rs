//! Metadata, listing and single-entry handlers

use super::{parse_args, relocation_mode, require_read, require_write};
use crate::error::ErrorContext;
use crate::state::UserSession;
use crate::{ApiError, AppState};
use axum::{
    extract::{Extension, State},
    Json,
};
use boxgate_core::{ListFolderResult, LongPollResult, DEFAULT_LIST_LIMIT};
use boxgate_driver::Entry;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Long-poll timeout bounds, in seconds
pub const LONGPOLL_MIN_TIMEOUT: u64 = 30;
pub const LONGPOLL_MAX_TIMEOUT: u64 = 480;

#[derive(Debug, Deserialize)]
pub struct PathArg {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ListFolderArg {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CursorArg {
    pub cursor: String,
}

#[derive(Debug, Deserialize)]
pub struct LongPollArg {
    pub cursor: String,
    pub timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderArg {
    pub path: String,
    #[serde(default)]
    pub autorename: bool,
}

#[derive(Debug, Deserialize)]
pub struct RelocationArg {
    pub from_path: String,
    pub to_path: String,
    #[serde(default)]
    pub autorename: bool,
}

/// `{"metadata": ...}` wrapper of the `_v2` endpoints
#[derive(Debug, Serialize)]
pub struct MetadataResult {
    pub metadata: Entry,
}

#[derive(Debug, Serialize)]
pub struct CursorResult {
    pub cursor: String,
}

fn list_limit(endpoint: &str, limit: Option<u32>) -> Result<Option<usize>, ApiError> {
    match limit {
        None => Ok(None),
        Some(n) if n >= 1 && n as usize <= DEFAULT_LIST_LIMIT => Ok(Some(n as usize)),
        Some(n) => Err(ApiError::bad_input(
            endpoint,
            format!("limit must be between 1 and {DEFAULT_LIST_LIMIT}, got {n}"),
        )),
    }
}

/// Clamp a requested long-poll timeout into the accepted range
pub fn longpoll_timeout(requested: Option<u64>) -> Duration {
    let secs = requested
        .unwrap_or(LONGPOLL_MIN_TIMEOUT)
        .clamp(LONGPOLL_MIN_TIMEOUT, LONGPOLL_MAX_TIMEOUT);
    Duration::from_secs(secs)
}

/// POST /2/files/list_folder
pub async fn list_folder(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
) -> Result<Json<ListFolderResult>, ApiError> {
    require_read(&session)?;
    let arg: ListFolderArg = parse_args("files/list_folder", &body)?;
    let limit = list_limit("files/list_folder", arg.limit)?;

    let space = state.open_space(&session).await?;
    Ok(Json(space.list_folder(&arg.path, arg.recursive, limit).await?))
}

/// POST /2/files/list_folder/continue
pub async fn list_folder_continue(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
) -> Result<Json<ListFolderResult>, ApiError> {
    require_read(&session)?;
    let arg: CursorArg = parse_args("files/list_folder/continue", &body)?;

    let space = state.open_space(&session).await?;
    Ok(Json(space.list_folder_continue(&arg.cursor).await?))
}

/// POST /2/files/list_folder/get_latest_cursor
pub async fn get_latest_cursor(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
) -> Result<Json<CursorResult>, ApiError> {
    require_read(&session)?;
    let arg: ListFolderArg = parse_args("files/list_folder/get_latest_cursor", &body)?;
    let limit = list_limit("files/list_folder/get_latest_cursor", arg.limit)?;

    let space = state.open_space(&session).await?;
    let cursor = space.get_latest_cursor(&arg.path, arg.recursive, limit).await?;
    Ok(Json(CursorResult { cursor }))
}

/// POST /2/files/list_folder/longpoll
pub async fn list_folder_longpoll(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
) -> Result<Json<LongPollResult>, ApiError> {
    require_read(&session)?;
    let arg: LongPollArg = parse_args("files/list_folder/longpoll", &body)?;

    let space = state.open_space(&session).await?;
    let result = space
        .list_folder_longpoll(&arg.cursor, Some(longpoll_timeout(arg.timeout)))
        .await?;
    Ok(Json(result))
}

/// POST /2/files/get_metadata
pub async fn get_metadata(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
) -> Result<Json<Entry>, ApiError> {
    require_read(&session)?;
    let arg: PathArg = parse_args("files/get_metadata", &body)?;

    let space = state.open_space(&session).await?;
    Ok(Json(space.get_metadata(&arg.path).await?))
}

/// POST /2/files/create_folder_v2
pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
) -> Result<Json<MetadataResult>, ApiError> {
    require_write(&session)?;
    let arg: CreateFolderArg = parse_args("files/create_folder_v2", &body)?;

    let space = state.open_space(&session).await?;
    let metadata = space.create_folder(&arg.path, arg.autorename).await?;
    Ok(Json(MetadataResult { metadata }))
}

/// POST /2/files/delete_v2
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
) -> Result<Json<MetadataResult>, ApiError> {
    require_write(&session)?;
    let arg: PathArg = parse_args("files/delete_v2", &body)?;

    let space = state.open_space(&session).await?;
    let metadata = space
        .delete(&arg.path)
        .await
        .map_err(ApiError::within(ErrorContext::PATH_LOOKUP))?;
    Ok(Json(MetadataResult { metadata }))
}

/// POST /2/files/move_v2
pub async fn move_entry(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
) -> Result<Json<MetadataResult>, ApiError> {
    require_write(&session)?;
    let arg: RelocationArg = parse_args("files/move_v2", &body)?;

    let space = state.open_space(&session).await?;
    let metadata = space
        .move_entry(&arg.from_path, &arg.to_path, relocation_mode(arg.autorename))
        .await
        .map_err(ApiError::within(ErrorContext::RELOCATION))?;
    Ok(Json(MetadataResult { metadata }))
}

/// POST /2/files/copy_v2
pub async fn copy_entry(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<UserSession>,
    body: Bytes,
) -> Result<Json<MetadataResult>, ApiError> {
    require_write(&session)?;
    let arg: RelocationArg = parse_args("files/copy_v2", &body)?;

    let space = state.open_space(&session).await?;
    let metadata = space
        .copy_entry(&arg.from_path, &arg.to_path, relocation_mode(arg.autorename))
        .await
        .map_err(ApiError::within(ErrorContext::RELOCATION))?;
    Ok(Json(MetadataResult { metadata }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, 30)]
    #[case(Some(5), 30)]
    #[case(Some(90), 90)]
    #[case(Some(10_000), 480)]
    fn test_longpoll_timeout_is_clamped(#[case] requested: Option<u64>, #[case] secs: u64) {
        assert_eq!(longpoll_timeout(requested), Duration::from_secs(secs));
    }

    #[test]
    fn test_list_limit_bounds() {
        assert_eq!(list_limit("x", None).unwrap(), None);
        assert_eq!(list_limit("x", Some(1)).unwrap(), Some(1));
        assert!(list_limit("x", Some(0)).is_err());
        assert!(list_limit("x", Some(2001)).is_err());
    }
}
