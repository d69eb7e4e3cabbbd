//! Remote sync contract
//!
//! The remote service is a black box. Requests are fire-and-forget: the
//! implementation publishes `RemoteEvent::ResultsReported { request_id }` on
//! the event bus once a result can be fetched with
//! [`RemoteSync::result_by_id`].

use crate::request_tracker::{RequestId, RequestKind};
use async_trait::async_trait;
use bridge_traits::error::Result;
use core_library::models::{AlbumRef, ArtistRef, LovedEntity, PendingOperation, Playlist};
use serde::{Deserialize, Serialize};

/// A request handed to the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub id: RequestId,
    pub kind: RequestKind,
}

/// Result of a resolved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RemotePayload {
    /// Complete listing of remote playlists, entries empty
    Playlists(Vec<Playlist>),
    /// One playlist with its entries
    PlaylistEntries(Playlist),
    /// The loved-tracks playlist
    LovedItems(Playlist),
    StarredArtists(Vec<ArtistRef>),
    StarredAlbums(Vec<AlbumRef>),
}

impl RemotePayload {
    pub fn label(&self) -> &'static str {
        match self {
            RemotePayload::Playlists(_) => "playlists",
            RemotePayload::PlaylistEntries(_) => "playlist_entries",
            RemotePayload::LovedItems(_) => "loved_items",
            RemotePayload::StarredArtists(_) => "starred_artists",
            RemotePayload::StarredAlbums(_) => "starred_albums",
        }
    }
}

/// Social action kinds understood by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocialActionType {
    Love,
}

/// Remote collection service
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Start resolving `request`. The result is announced on the bus.
    async fn resolve(&self, request: RemoteRequest) -> Result<()>;

    /// Fetch the result of a reported request. `None` if the remote has
    /// nothing (anymore) for this id.
    async fn result_by_id(&self, id: &RequestId) -> Result<Option<RemotePayload>>;

    /// Deliver pending operations. Returns the ids the remote acknowledged.
    async fn send_logged_ops(&self, ops: Vec<PendingOperation>) -> Result<Vec<i64>>;

    async fn send_social_action(
        &self,
        entity: &LovedEntity,
        action: SocialActionType,
        value: bool,
    ) -> Result<()>;

    async fn delete_playlist(&self, playlist_id: &str) -> Result<()>;
}
