//! # Boxgate Gateway
//!
//! Dropbox-compatible HTTP gateway over pluggable storage backends.
//!
//! This crate provides:
//! - **Files API**: the `/2/files/*` listing, metadata, move/copy/delete,
//!   batch and upload endpoints
//! - **Authentication**: JWT bearer tokens mapped to per-user namespaces
//! - **Rate Limiting**: Per-user request throttling
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP Clients                      │
//! │        (Dropbox SDKs, rclone, curl, etc.)           │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                  Boxgate Gateway                    │
//! ├─────────────────────────────────────────────────────┤
//! │  Auth Middleware │ Rate Limiter │ Request Parser    │
//! ├─────────────────────────────────────────────────────┤
//! │               Files API Handlers                    │
//! │  (list_folder, upload, move_v2, delete_batch, ...)  │
//! ├─────────────────────────────────────────────────────┤
//! │                   boxgate-core                      │
//! │   (User paths, Bulk engine, Cursors, Jobs)          │
//! ├─────────────────────────────────────────────────────┤
//! │                  boxgate-driver                     │
//! │            (Memory, Local filesystem)               │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{BackendKind, GatewayConfig};
pub use error::{ApiError, ErrorContext};
pub use server::{run_server, run_server_with_shutdown};
pub use state::{AppState, UserSession};
