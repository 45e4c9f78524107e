//! # Boxgate Core
//!
//! Storage engine behind the boxgate Dropbox-compatible gateway.
//!
//! This crate provides:
//! - **Capability Bridge**: a complete storage interface over any driver,
//!   with generic fallbacks for the optional operations it lacks
//! - **Cursor Protocol**: sort-key watermarks, opaque cursors, paginated
//!   listing and long-poll change detection
//! - **Bulk Operations**: validated move/copy/delete over whole folder trees
//!   with conflict resolution and post-order folder removal
//! - **User Paths**: per-account namespaces over one backend
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP API Layer             │
//! ├─────────────────────────────────────────┤
//! │   UserSpace (resolver, jobs, sessions)  │
//! ├─────────────────────────────────────────┤
//! │   Bulk Engine    │   Cursor / Long-poll │
//! ├─────────────────────────────────────────┤
//! │           Capability Bridge             │
//! ├─────────────────────────────────────────┤
//! │                Driver                   │
//! └─────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod conflict;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod multipart;
pub mod resolver;
pub mod retry;
pub mod space;

pub use bridge::{Bridge, BridgeConfig};
pub use cursor::{decode_cursor, encode_cursor, long_poll, Cursor, LongPollConfig, LongPollResult};
pub use engine::{Action, BulkEngine, EngineConfig, Operation, ValidatedOperation, WriteMode};
pub use error::{CoreError, ErrorKind, Result};
pub use jobs::{JobRegistry, JobStatus, UploadSessions};
pub use resolver::UserScope;
pub use retry::{retry_not_found, RetryConfig};
pub use space::{ListFolderResult, StorageConfig, StorageManager, UserSpace, DEFAULT_LIST_LIMIT};
