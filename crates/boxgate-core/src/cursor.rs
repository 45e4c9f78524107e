//! Listing cursors and the long-poll loop

use crate::{Bridge, CoreError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use boxgate_driver::CursorItem;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Continuation token of a folder listing.
///
/// Fields always serialize in declaration order, so equal cursors encode to
/// equal strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub path: String,
    pub recursive: bool,
    pub limit: usize,
    pub last_item: Option<CursorItem>,
}

impl Cursor {
    pub fn new(path: impl Into<String>, recursive: bool, limit: usize, last_item: Option<CursorItem>) -> Self {
        Self {
            path: path.into(),
            recursive,
            limit,
            last_item,
        }
    }

    /// Opaque string form
    pub fn encode(&self) -> String {
        // Serializing a struct of strings, bools and integers cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self> {
        let json = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| CoreError::MalformedCursor(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| CoreError::MalformedCursor(e.to_string()))
    }
}

pub fn encode_cursor(path: &str, recursive: bool, limit: usize, last_item: Option<CursorItem>) -> String {
    Cursor::new(path, recursive, limit, last_item).encode()
}

pub fn decode_cursor(token: &str) -> Result<Cursor> {
    Cursor::decode(token)
}

/// Long-poll timing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LongPollConfig {
    pub default_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Outcome of a long-poll
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongPollResult {
    pub changes: bool,
    /// Seconds the caller should wait before polling again
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<u64>,
}

/// Poll `path` until something newer than the cursor's watermark shows up
/// or `timeout` elapses
#[instrument(skip(bridge, cursor), fields(recursive = cursor.recursive))]
pub async fn long_poll(
    bridge: &Bridge,
    path: &str,
    cursor: &Cursor,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<LongPollResult> {
    let deadline = Instant::now() + timeout;
    loop {
        if bridge
            .is_any_cursor_item_newer(path, cursor.recursive, cursor.last_item.as_ref())
            .await?
        {
            return Ok(LongPollResult {
                changes: true,
                backoff: None,
            });
        }
        let now = Instant::now();
        if now >= deadline {
            debug!("Long-poll timed out without changes");
            return Ok(LongPollResult::default());
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}
