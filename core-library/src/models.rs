//! Domain models for the locally cached collection
//!
//! Tracks, artists and albums are referenced by name, the way the remote
//! service addresses them. Identity comparisons go through the normalized
//! `key()` of each reference.

use chrono::Utc;
use core_runtime::events::SyncScope;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved id of the playlist holding loved tracks.
pub const LOVED_ITEMS_PLAYLIST_ID: &str = "_loved_items_";

/// Display name of the loved-tracks playlist.
pub const LOVED_ITEMS_PLAYLIST_NAME: &str = "Loved Tracks";

/// Reserved id of the player's last queue snapshot.
pub const CACHED_PLAYLIST_ID: &str = "_cached_playlist_";

/// Separator between normalized key components.
const KEY_SEPARATOR: char = '\u{1f}';

/// Normalize a name for identity comparison.
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Whether `id` names a playlist owned by the core rather than the user.
pub fn is_reserved_playlist_id(id: &str) -> bool {
    id == LOVED_ITEMS_PLAYLIST_ID || id == CACHED_PLAYLIST_ID
}

fn join_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| normalize(part))
        .collect::<Vec<_>>()
        .join(&KEY_SEPARATOR.to_string())
}

// =============================================================================
// Entity References
// =============================================================================

/// Track reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    pub name: String,
    pub artist: String,
    pub album: Option<String>,
}

impl TrackRef {
    pub fn new(name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artist: artist.into(),
            album: None,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Identity key. The album is descriptive only.
    pub fn key(&self) -> String {
        join_key(&[&self.artist, &self.name])
    }
}

/// Artist reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

impl ArtistRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn key(&self) -> String {
        normalize(&self.name)
    }
}

/// Album reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlbumRef {
    pub name: String,
    pub artist: String,
}

impl AlbumRef {
    pub fn new(name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artist: artist.into(),
        }
    }

    pub fn key(&self) -> String {
        join_key(&[&self.artist, &self.name])
    }
}

// =============================================================================
// Playlists
// =============================================================================

/// Playlist with its ordered entries.
///
/// Two playlists with the same `id` and `current_revision` are content-equal.
/// Listing results from the remote carry empty `entries`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    /// Opaque revision token assigned by the remote
    pub current_revision: String,
    pub entries: Vec<TrackRef>,
}

impl Playlist {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        current_revision: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            current_revision: current_revision.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entries(mut self, entries: Vec<TrackRef>) -> Self {
        self.entries = entries;
        self
    }

    /// Empty loved-tracks playlist.
    pub fn loved_items() -> Self {
        Self::new(LOVED_ITEMS_PLAYLIST_ID, LOVED_ITEMS_PLAYLIST_NAME, "")
    }

    pub fn track_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_reserved(&self) -> bool {
        is_reserved_playlist_id(&self.id)
    }

    pub fn contains(&self, track: &TrackRef) -> bool {
        let key = track.key();
        self.entries.iter().any(|entry| entry.key() == key)
    }

    /// Validate playlist data
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Playlist id cannot be empty".to_string());
        }
        if self.name.trim().is_empty() && !self.is_reserved() {
            return Err("Playlist name cannot be empty".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Loved State
// =============================================================================

/// Something the user can love: a track, an artist or an album.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LovedEntity {
    Track(TrackRef),
    Artist(ArtistRef),
    Album(AlbumRef),
}

impl LovedEntity {
    pub fn kind(&self) -> &'static str {
        match self {
            LovedEntity::Track(_) => "track",
            LovedEntity::Artist(_) => "artist",
            LovedEntity::Album(_) => "album",
        }
    }

    pub fn key(&self) -> String {
        match self {
            LovedEntity::Track(track) => track.key(),
            LovedEntity::Artist(artist) => artist.key(),
            LovedEntity::Album(album) => album.key(),
        }
    }

    /// Which remote state class holds this entity's loved flag.
    pub fn scope(&self) -> SyncScope {
        match self {
            LovedEntity::Track(_) => SyncScope::LovedItems,
            LovedEntity::Artist(_) => SyncScope::StarredArtists,
            LovedEntity::Album(_) => SyncScope::StarredAlbums,
        }
    }
}

impl fmt::Display for LovedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LovedEntity::Track(t) => write!(f, "track '{}' by '{}'", t.name, t.artist),
            LovedEntity::Artist(a) => write!(f, "artist '{}'", a.name),
            LovedEntity::Album(a) => write!(f, "album '{}' by '{}'", a.name, a.artist),
        }
    }
}

/// Loved flag of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LovedItem {
    pub entity: LovedEntity,
    pub loved: bool,
}

// =============================================================================
// Pending Operation Log
// =============================================================================

/// A local mutation not yet acknowledged by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PendingAction {
    SetLoved { entity: LovedEntity, loved: bool },
    DeletePlaylist { playlist_id: String },
}

impl PendingAction {
    pub fn scope(&self) -> SyncScope {
        match self {
            PendingAction::SetLoved { entity, .. } => entity.scope(),
            PendingAction::DeletePlaylist { .. } => SyncScope::Playlists,
        }
    }
}

/// Durable pending-log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Row id assigned by the store, used for acknowledgement
    pub id: i64,
    pub action: PendingAction,
    /// Unix seconds
    pub created_at: i64,
}

impl PendingOperation {
    pub fn new(id: i64, action: PendingAction) -> Self {
        Self {
            id,
            action,
            created_at: Utc::now().timestamp(),
        }
    }

    pub fn scope(&self) -> SyncScope {
        self.action.scope()
    }
}
