//! Application state

use crate::auth::{SCOPE_FILES_ALL, SCOPE_FILES_READ, SCOPE_FILES_WRITE};
use crate::config::{BackendKind, GatewayConfig};
use boxgate_core::{StorageManager, UserScope, UserSpace};
use boxgate_driver::{Driver, LocalFsDriver, MemoryDriver};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

/// Hash a user ID for privacy
///
/// The hash names the user's root folder, so raw user IDs (e.g. email
/// addresses) never show up in backend paths.
pub fn hash_user_id(user_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"boxgate:user_id:"); // Domain separation
    hasher.update(user_id.as_bytes());
    let hash = hasher.finalize();
    // First 16 bytes (128 bits) as hex
    hex::encode(&hash[..16])
}

/// Application state shared across handlers
pub struct AppState {
    /// Gateway configuration
    pub config: GatewayConfig,
    /// Storage layer over the configured backend
    pub storage: StorageManager,
}

impl AppState {
    /// Create a new application state
    pub async fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let driver: Arc<dyn Driver> = match config.backend {
            BackendKind::Memory => {
                warn!("⚠ Storage mode: In-memory (NOT persistent - for development only)");
                Arc::new(MemoryDriver::new())
            }
            BackendKind::Local => {
                let driver = LocalFsDriver::new(&config.data_dir).await?;
                info!("✓ Storage mode: local files in {}", config.data_dir.display());
                Arc::new(driver)
            }
        };
        Ok(Self::with_driver(config, driver))
    }

    /// Application state over an already constructed driver
    pub fn with_driver(config: GatewayConfig, driver: Arc<dyn Driver>) -> Self {
        let storage = StorageManager::new(driver, config.storage_config());
        Self { config, storage }
    }

    /// Open the namespace a session is confined to
    pub async fn open_space(&self, session: &UserSession) -> Result<UserSpace, boxgate_core::CoreError> {
        let scope = UserScope::new(session.hashed_user_id.clone(), session.app_id.clone())?;
        self.storage.open(scope).await
    }
}

/// User session information
#[derive(Clone, Debug)]
pub struct UserSession {
    /// User ID (from JWT sub claim)
    pub user_id: String,
    /// Hashed user ID, names the user's root folder
    pub hashed_user_id: String,
    /// App folder the session is confined to
    pub app_id: Option<String>,
    /// Display name
    pub display_name: Option<String>,
    /// Scopes
    pub scopes: Vec<String>,
    /// Expiration time
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl UserSession {
    /// Create a new user session with automatic ID hashing
    pub fn new(
        user_id: String,
        app_id: Option<String>,
        display_name: Option<String>,
        scopes: Vec<String>,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let hashed_user_id = hash_user_id(&user_id);
        Self {
            user_id,
            hashed_user_id,
            app_id,
            display_name,
            scopes,
            expires_at,
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now() > self.expires_at
    }

    /// Check if user has a scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope || s == "*")
    }

    /// Check if user can read
    pub fn can_read(&self) -> bool {
        self.has_scope(SCOPE_FILES_READ) || self.has_scope(SCOPE_FILES_ALL)
    }

    /// Check if user can write
    pub fn can_write(&self) -> bool {
        self.has_scope(SCOPE_FILES_WRITE) || self.has_scope(SCOPE_FILES_ALL)
    }
}
