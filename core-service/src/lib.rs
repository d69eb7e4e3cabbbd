//! Core service façade and bootstrap helpers.
//!
//! This crate is the composition root: it turns a [`CoreConfig`] and a
//! host-provided [`RemoteSync`] implementation into a running
//! [`ReconciliationEngine`] backed by SQLite. Hosts create exactly one
//! [`CoreService`] per signed-in user and share it by cloning.
//!
//! ```no_run
//! # async fn example(remote: std::sync::Arc<dyn core_service::RemoteSync>) -> core_service::Result<()> {
//! use core_service::{CoreConfig, CoreService};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/collection.db")
//!     .build()?;
//! let core = CoreService::bootstrap(config, move |_bus| remote).await?;
//! core.start().await?;
//!
//! let playlists = core.engine().playlists().await;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use bridge_traits::error::BridgeError;
pub use core_runtime::config::{CoreConfig, SyncSettings};
pub use core_runtime::events::{CollectionEvent, CoreEvent, EventBus, RemoteEvent, UpdateCause};
pub use core_sync::{FetchOutcome, ReconciliationEngine, RemoteSync};

use std::sync::Arc;

use core_library::db::{create_pool, DatabaseConfig};
use core_library::{LocalStore, SqliteLocalStore};
use core_runtime::events::Receiver;
use tracing::info;

struct ServiceInner {
    config: CoreConfig,
    event_bus: EventBus,
    store: Arc<SqliteLocalStore>,
    engine: ReconciliationEngine,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Build the pool, event bus, store and engine from `config`.
    ///
    /// `remote` receives the service's event bus, on which it must publish
    /// `RemoteEvent::ResultsReported` once a requested result is ready.
    /// The engine is not started; call [`start`](Self::start).
    pub async fn bootstrap<F>(config: CoreConfig, remote: F) -> Result<Self>
    where
        F: FnOnce(EventBus) -> Arc<dyn RemoteSync>,
    {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::from_core_config(&config)).await?;
        let event_bus = EventBus::new(config.event_buffer_size);
        let store = Arc::new(SqliteLocalStore::new(pool).with_event_bus(event_bus.clone()));
        let remote = remote(event_bus.clone());

        let engine = ReconciliationEngine::new(
            config.sync.clone(),
            store.clone(),
            remote,
            event_bus.clone(),
        );

        info!(
            in_memory = config.is_in_memory(),
            max_db_connections = config.max_db_connections,
            "Core service bootstrapped"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                event_bus,
                store,
                engine,
            }),
        })
    }

    /// Initialize the engine. Returns `false` if it was already running.
    pub async fn start(&self) -> Result<bool> {
        Ok(self.inner.engine.initialize().await?)
    }

    /// Stop reacting to bus events.
    pub fn shutdown(&self) {
        self.inner.engine.shutdown();
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.inner.engine
    }

    pub fn store(&self) -> Arc<dyn LocalStore> {
        self.inner.store.clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    /// Subscribe to all core events, including `CollectionEvent::Updated`.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.inner.config)
            .field("engine", &self.inner.engine)
            .finish_non_exhaustive()
    }
}
