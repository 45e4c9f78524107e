//! # Boxgate Driver
//!
//! Storage driver contract for the boxgate gateway.
//!
//! This crate provides:
//! - **Driver trait**: the minimal operations every backend must implement,
//!   plus optional operations a backend may implement natively
//! - **Capabilities**: a static descriptor of which optional operations a
//!   driver overrides, read once when the bridge is built
//! - **Entries**: the backend-agnostic `Entry` / `CursorItem` data model
//! - **Reference drivers**: an in-memory driver and a local filesystem driver
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Capability Bridge (core)       │
//! ├─────────────────────────────────────────┤
//! │    Driver Trait  +  Capabilities        │
//! ├──────────────┬──────────────┬───────────┤
//! │ MemoryDriver │ LocalFsDriver│  S3 / ... │
//! └──────────────┴──────────────┴───────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use boxgate_driver::{Driver, MemoryDriver, bytes_stream};
//!
//! let driver = MemoryDriver::new();
//! driver.put_object("/notes/todo.txt", bytes_stream("milk".into())).await?;
//! let entry = driver.get_object_metadata("/notes/todo.txt").await?;
//! ```

pub mod entry;
pub mod error;
pub mod local;
pub mod memory;
pub mod path;

pub use entry::{content_hash, CursorItem, Entry, EntryTag, PLACEHOLDER_REV};
pub use error::{DriverError, Result};
pub use local::LocalFsDriver;
pub use memory::{JournalOp, MemoryDriver};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::ops::ControlFlow;

/// A stream of object content
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Callback invoked for every entry a traversal visits.
///
/// Returning `ControlFlow::Break(())` asks the driver to stop early.
pub type Visitor<'a> = dyn FnMut(Entry) -> ControlFlow<()> + Send + 'a;

/// Optional operations a driver implements natively.
///
/// Anything left `false` is supplied by the bridge's generic fallback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub delete_directory: bool,
    pub directory_metadata: bool,
    pub copy: bool,
    pub rename: bool,
    pub sort_key: bool,
    pub cursor_item: bool,
    pub list_with_cursor: bool,
    pub latest_cursor_item: bool,
    pub newer_check: bool,
    pub multipart: bool,
}

/// One page of a cursor-driven listing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Entries in ascending sort-key order
    pub entries: Vec<Entry>,
    /// More entries remain past this page
    pub has_more: bool,
    /// Watermark to continue from
    pub cursor_item: Option<CursorItem>,
}

/// Trait for storage backends
#[async_trait]
pub trait Driver: Send + Sync + std::fmt::Debug {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Which optional operations this driver overrides
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Metadata of the object at `path`
    async fn get_object_metadata(&self, path: &str) -> Result<Entry>;

    /// Read an object's content
    async fn get_object(&self, path: &str) -> Result<ByteStream>;

    /// Write an object, replacing any existing one; missing parents are created
    async fn put_object(&self, path: &str, body: ByteStream) -> Result<()>;

    /// Delete a single object
    async fn delete_object(&self, path: &str) -> Result<()>;

    /// Create a directory and any missing parents; existing directories are fine
    async fn create_directory(&self, path: &str) -> Result<()>;

    /// Visit the entries below `path`, one level or the whole subtree
    async fn traverse_directory(
        &self,
        path: &str,
        recursive: bool,
        visitor: &mut Visitor<'_>,
    ) -> Result<()>;

    async fn delete_directory(&self, _path: &str) -> Result<()> {
        Err(DriverError::NotSupported("delete_directory"))
    }

    async fn get_directory_metadata(&self, _path: &str) -> Result<Entry> {
        Err(DriverError::NotSupported("get_directory_metadata"))
    }

    async fn copy_object(&self, _from: &str, _to: &str) -> Result<()> {
        Err(DriverError::NotSupported("copy_object"))
    }

    async fn move_object(&self, _from: &str, _to: &str) -> Result<()> {
        Err(DriverError::NotSupported("move_object"))
    }

    /// Backend-native ordering token, e.g. a change sequence number
    fn entry_sort_key(&self, _entry: &Entry) -> Option<String> {
        None
    }

    fn cursor_item(&self, _entry: &Entry) -> Option<CursorItem> {
        None
    }

    async fn list_folder_using_cursor(
        &self,
        _path: &str,
        _recursive: bool,
        _limit: usize,
        _cursor: Option<&CursorItem>,
    ) -> Result<ListPage> {
        Err(DriverError::NotSupported("list_folder_using_cursor"))
    }

    async fn get_latest_cursor_item(
        &self,
        _path: &str,
        _recursive: bool,
    ) -> Result<Option<CursorItem>> {
        Err(DriverError::NotSupported("get_latest_cursor_item"))
    }

    async fn is_any_cursor_item_newer(
        &self,
        _path: &str,
        _recursive: bool,
        _watermark: Option<&CursorItem>,
    ) -> Result<bool> {
        Err(DriverError::NotSupported("is_any_cursor_item_newer"))
    }

    /// Returns a fresh upload id
    async fn start_multipart_upload(&self) -> Result<String> {
        Err(DriverError::NotSupported("start_multipart_upload"))
    }

    async fn multipart_upload(&self, _upload_id: &str, _offset: u64, _body: ByteStream) -> Result<()> {
        Err(DriverError::NotSupported("multipart_upload"))
    }

    async fn finish_multipart_upload(&self, _upload_id: &str, _destination: &str) -> Result<()> {
        Err(DriverError::NotSupported("finish_multipart_upload"))
    }
}

/// Wrap in-memory content as a single-chunk stream
pub fn bytes_stream(data: Bytes) -> ByteStream {
    stream::once(async move { Ok(data) }).boxed()
}

/// Drain a stream into one buffer
pub async fn collect_bytes(stream: ByteStream) -> Result<Bytes> {
    let buf = stream
        .try_fold(BytesMut::new(), |mut buf, chunk| async move {
            buf.extend_from_slice(&chunk);
            Ok(buf)
        })
        .await?;
    Ok(buf.freeze())
}
