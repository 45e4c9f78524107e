//! Dropbox API request handlers

pub mod batch;
pub mod files;
pub mod service;
pub mod upload;

pub use batch::*;
pub use files::*;
pub use service::*;
pub use upload::*;

use crate::state::UserSession;
use crate::ApiError;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue};
use boxgate_core::WriteMode;
use boxgate_driver::{ByteStream, DriverError};
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Request header carrying the arguments of content endpoints
pub const API_ARG_HEADER: &str = "dropbox-api-arg";
/// Response header carrying the result of download endpoints
pub const API_RESULT_HEADER: &str = "dropbox-api-result";

/// Decode the JSON body of an RPC endpoint
pub fn parse_args<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_input(endpoint, e.to_string()))
}

/// Decode the `Dropbox-API-Arg` header of a content endpoint
pub fn header_args<T: DeserializeOwned>(endpoint: &str, headers: &HeaderMap) -> Result<T, ApiError> {
    let raw = headers
        .get(API_ARG_HEADER)
        .ok_or_else(|| ApiError::bad_input(endpoint, format!("missing {API_ARG_HEADER} header")))?;
    parse_args(endpoint, raw.as_bytes())
}

/// JSON for a response header. Header values must be ASCII, so everything
/// else is written as `\uXXXX` escapes.
pub fn header_json<T: Serialize>(value: &T) -> Result<HeaderValue, ApiError> {
    let json = serde_json::to_string(value).map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            escaped.push(c);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units) {
            let _ = write!(escaped, "\\u{unit:04x}");
        }
    }
    HeaderValue::from_str(&escaped).map_err(|e| ApiError::Internal(e.to_string()))
}

/// Request body as a driver content stream
pub fn body_stream(body: Body) -> ByteStream {
    body.into_data_stream()
        .map_err(|e| DriverError::Backend(format!("request body: {e}")))
        .boxed()
}

/// Whether the request announces an empty body
pub fn is_empty_body(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0")
}

pub fn require_read(session: &UserSession) -> Result<(), ApiError> {
    if !session.can_read() {
        return Err(ApiError::unauthorized("missing_scope", "Read access required"));
    }
    Ok(())
}

pub fn require_write(session: &UserSession) -> Result<(), ApiError> {
    if !session.can_write() {
        return Err(ApiError::unauthorized("missing_scope", "Write access required"));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeTag {
    #[default]
    Add,
    Overwrite,
}

/// Upload write mode; Dropbox accepts both `"add"` and `{".tag": "add"}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ModeArg {
    Plain(ModeTag),
    Tagged {
        #[serde(rename = ".tag")]
        tag: ModeTag,
    },
}

impl Default for ModeArg {
    fn default() -> Self {
        Self::Plain(ModeTag::Add)
    }
}

impl ModeArg {
    pub fn tag(&self) -> ModeTag {
        match *self {
            Self::Plain(tag) | Self::Tagged { tag } => tag,
        }
    }
}

/// Resolve a Dropbox `mode` + `autorename` pair
pub fn write_mode(mode: ModeArg, autorename: bool) -> WriteMode {
    match mode.tag() {
        ModeTag::Overwrite => WriteMode::Overwrite,
        ModeTag::Add if autorename => WriteMode::Rename,
        ModeTag::Add => WriteMode::Add,
    }
}

/// Move/copy write mode; these endpoints never overwrite
pub fn relocation_mode(autorename: bool) -> WriteMode {
    if autorename {
        WriteMode::Rename
    } else {
        WriteMode::Add
    }
}
