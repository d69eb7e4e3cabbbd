//! Collection registry
//!
//! Keyed set of known collections (the local library, the remote service).
//! Inserting an id that already exists replaces the earlier entry. Listing
//! is sorted on read, case-insensitively by display name with the id as tie
//! breaker.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionKind {
    LocalLibrary,
    Remote,
}

/// A source of tracks and playlists shown to the user
pub trait Collection: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn kind(&self) -> CollectionKind;

    fn is_local(&self) -> bool {
        self.kind() == CollectionKind::LocalLibrary
    }
}

/// The always-present local collection
#[derive(Debug, Clone)]
pub struct LocalLibraryCollection {
    id: String,
    name: String,
}

impl LocalLibraryCollection {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl Collection for LocalLibraryCollection {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CollectionKind {
        CollectionKind::LocalLibrary
    }
}

/// Collection mirrored from the remote service
#[derive(Debug, Clone)]
pub struct RemoteCollection {
    id: String,
    name: String,
}

impl RemoteCollection {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl Collection for RemoteCollection {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CollectionKind {
        CollectionKind::Remote
    }
}

/// Thread-safe collection registry
#[derive(Default)]
pub struct CollectionRegistry {
    collections: RwLock<HashMap<String, Arc<dyn Collection>>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `collection`, replacing any entry with the same id.
    pub async fn add(&self, collection: Arc<dyn Collection>) {
        let id = collection.id().to_string();
        self.collections.write().await.insert(id, collection);
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn Collection>> {
        self.collections.read().await.get(id).cloned()
    }

    /// Snapshot sorted by lower-cased name, then id.
    pub async fn list(&self) -> Vec<Arc<dyn Collection>> {
        let mut collections: Vec<_> = self.collections.read().await.values().cloned().collect();
        collections.sort_by(|a, b| {
            a.name()
                .to_lowercase()
                .cmp(&b.name().to_lowercase())
                .then_with(|| a.id().cmp(b.id()))
        });
        collections
    }

    pub async fn len(&self) -> usize {
        self.collections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.collections.read().await.is_empty()
    }
}

impl std::fmt::Debug for CollectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionRegistry").finish_non_exhaustive()
    }
}
