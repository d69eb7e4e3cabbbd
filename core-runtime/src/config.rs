//! # Core Configuration Module
//!
//! Configuration for the collection sync core.
//!
//! ## Overview
//!
//! A builder constructs [`CoreConfig`], which carries the storage settings
//! used by the service root and the [`SyncSettings`] handed to the
//! reconciliation engine. `build()` validates fail-fast and reports
//! actionable errors.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::{CoreConfig, SyncSettings};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/collection.db")
//!     .sync(SyncSettings {
//!         request_timeout: Duration::from_secs(30),
//!         ..SyncSettings::default()
//!     })
//!     .build()
//!     .expect("valid config");
//!
//! assert!(config.database_path.is_some());
//! ```
//!
//! Leaving `database_path` unset selects an in-memory database, which is what
//! tests use.

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for pooled SQLite connections.
pub const MAX_DB_CONNECTIONS: u32 = 64;

/// Default time after which an outstanding remote request stops blocking a
/// new request of the same class.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_LOCAL_COLLECTION_ID: &str = "local";
pub const DEFAULT_LOCAL_COLLECTION_NAME: &str = "My Collection";
pub const DEFAULT_REMOTE_COLLECTION_ID: &str = "remote";
pub const DEFAULT_REMOTE_COLLECTION_NAME: &str = "Hatchet";

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Path to the SQLite database file; `None` selects an in-memory database
    pub database_path: Option<PathBuf>,

    /// Maximum number of pooled database connections
    pub max_db_connections: u32,

    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,

    /// Settings consumed by the reconciliation engine
    pub sync: SyncSettings,
}

/// Settings for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Age after which an outstanding request no longer blocks its class
    pub request_timeout: Duration,

    /// Run the initial fetch burst from `initialize()`
    pub fetch_on_initialize: bool,

    /// Id of the always-present local library collection
    pub local_collection_id: String,

    /// Display name of the local library collection
    pub local_collection_name: String,

    /// Id of the remote service collection
    pub remote_collection_id: String,

    /// Display name of the remote service collection
    pub remote_collection_name: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            fetch_on_initialize: true,
            local_collection_id: DEFAULT_LOCAL_COLLECTION_ID.to_string(),
            local_collection_name: DEFAULT_LOCAL_COLLECTION_NAME.to_string(),
            remote_collection_id: DEFAULT_REMOTE_COLLECTION_ID.to_string(),
            remote_collection_name: DEFAULT_REMOTE_COLLECTION_NAME.to_string(),
        }
    }
}

impl SyncSettings {
    /// Validates the engine settings.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.local_collection_id.trim().is_empty() || self.remote_collection_id.trim().is_empty()
        {
            return Err(Error::Config(
                "Collection ids cannot be empty. Set local_collection_id and remote_collection_id."
                    .to_string(),
            ));
        }

        if self.local_collection_id == self.remote_collection_id {
            return Err(Error::Config(format!(
                "Local and remote collections share the id '{}'. Give them distinct ids.",
                self.local_collection_id
            )));
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config(
                    "Database path cannot be empty. Omit it to use an in-memory database."
                        .to_string(),
                ));
            }
        }

        if self.max_db_connections == 0 {
            return Err(Error::Config(
                "max_db_connections must be at least 1".to_string(),
            ));
        }

        if self.max_db_connections > MAX_DB_CONNECTIONS {
            return Err(Error::Config(format!(
                "max_db_connections cannot exceed {}",
                MAX_DB_CONNECTIONS
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        self.sync.validate()
    }

    /// Whether the database lives in memory only.
    pub fn is_in_memory(&self) -> bool {
        self.database_path.is_none()
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    max_db_connections: Option<u32>,
    event_buffer_size: Option<usize>,
    sync: Option<SyncSettings>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/collection.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the pool size. Default: 5, forced to 1 for in-memory databases
    /// by the pool factory.
    pub fn max_db_connections(mut self, connections: u32) -> Self {
        self.max_db_connections = Some(connections);
        self
    }

    /// Sets the event bus buffer. Default: [`DEFAULT_EVENT_BUFFER_SIZE`].
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn sync(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    /// Shortcut for overriding only the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        let mut settings = self.sync.take().unwrap_or_default();
        settings.request_timeout = timeout;
        self.sync = Some(settings);
        self
    }

    /// Shortcut for toggling the initial fetch burst.
    pub fn fetch_on_initialize(mut self, enabled: bool) -> Self {
        let mut settings = self.sync.take().unwrap_or_default();
        settings.fetch_on_initialize = enabled;
        self.sync = Some(settings);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn build(self) -> Result<CoreConfig> {
        let config = CoreConfig {
            database_path: self.database_path,
            max_db_connections: self.max_db_connections.unwrap_or(5),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            sync: self.sync.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
