//! # Request Tracker
//!
//! Correlates asynchronous remote results with the requests the engine
//! issued. A result is applied only if its id is consumed here, and every id
//! can be consumed exactly once, so duplicate or stale deliveries become
//! no-ops.
//!
//! The tracker also gates fetches by request class: while a request of a
//! given [`RequestKind`] is outstanding, `issue_unique` refuses to hand out a
//! second one. Outstanding requests older than the configured timeout stop
//! gating their class so a lost result notification cannot wedge it forever.

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Correlation id for one remote request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a request id from its string form
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRequestId`] if the string is not a UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidRequestId(format!("{}: {}", s, e)))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Class of remote request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    /// Listing of all remote playlists, without entries
    Playlists,
    /// Entries of one playlist
    PlaylistEntries { playlist_id: String },
    LovedItems,
    StarredArtists,
    StarredAlbums,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Playlists => write!(f, "playlists"),
            RequestKind::PlaylistEntries { playlist_id } => {
                write!(f, "playlist_entries({})", playlist_id)
            }
            RequestKind::LovedItems => write!(f, "loved_items"),
            RequestKind::StarredArtists => write!(f, "starred_artists"),
            RequestKind::StarredAlbums => write!(f, "starred_albums"),
        }
    }
}

#[derive(Debug, Clone)]
struct Outstanding {
    kind: RequestKind,
    issued_at: Instant,
}

/// Thread-safe set of outstanding request ids.
///
/// A single mutex guards the map; no operation awaits while holding it.
#[derive(Debug)]
pub struct RequestTracker {
    timeout: Duration,
    outstanding: Mutex<HashMap<RequestId, Outstanding>>,
}

impl RequestTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            outstanding: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, Outstanding>> {
        self.outstanding
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_live(&self, entry: &Outstanding, now: Instant) -> bool {
        now.duration_since(entry.issued_at) < self.timeout
    }

    /// Record a fresh id for `kind`.
    pub fn issue(&self, kind: RequestKind) -> RequestId {
        let id = RequestId::new();
        self.lock().insert(
            id,
            Outstanding {
                kind,
                issued_at: Instant::now(),
            },
        );
        id
    }

    /// Record a fresh id unless a live request of the same class exists.
    pub fn issue_unique(&self, kind: RequestKind) -> Option<RequestId> {
        let now = Instant::now();
        let mut outstanding = self.lock();

        if outstanding
            .values()
            .any(|entry| entry.kind == kind && self.is_live(entry, now))
        {
            return None;
        }

        let id = RequestId::new();
        outstanding.insert(
            id,
            Outstanding {
                kind,
                issued_at: now,
            },
        );
        Some(id)
    }

    /// Atomically test for and remove `id`.
    ///
    /// Returns `false` for ids never issued or already consumed.
    pub fn consume(&self, id: &RequestId) -> bool {
        self.take(id).is_some()
    }

    /// Same as [`consume`](Self::consume), returning the request class.
    pub fn take(&self, id: &RequestId) -> Option<RequestKind> {
        self.lock().remove(id).map(|entry| entry.kind)
    }

    /// Whether a live request of `kind` is outstanding.
    pub fn is_outstanding(&self, kind: &RequestKind) -> bool {
        let now = Instant::now();
        self.lock()
            .values()
            .any(|entry| &entry.kind == kind && self.is_live(entry, now))
    }

    /// Classes of all outstanding requests, expired ones included.
    pub fn outstanding_kinds(&self) -> Vec<RequestKind> {
        self.lock().values().map(|entry| entry.kind.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget expired requests. Their results will be ignored from now on.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut outstanding = self.lock();
        let before = outstanding.len();
        outstanding.retain(|_, entry| self.is_live(entry, now));
        before - outstanding.len()
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new(core_runtime::config::DEFAULT_REQUEST_TIMEOUT)
    }
}
