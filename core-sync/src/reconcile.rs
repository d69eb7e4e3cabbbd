//! Playlist merge planning
//!
//! Computes what has to happen locally so the cached playlists match a
//! complete remote listing. Planning is pure; the engine applies the plan.
//!
//! Rules, per remote playlist `R`:
//! 1. absent locally: create it, then fetch its entries
//! 2. revision differs, or the local copy has no entries: refetch entries
//! 3. only the name differs: rename
//! 4. otherwise: unchanged
//!
//! Local playlists that the listing does not mention are deleted. A revision
//! mismatch never causes a delete, and reserved playlists are never touched.

use core_library::models::{is_reserved_playlist_id, Playlist};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// One step of a playlist merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistAction {
    /// Store the listed playlist (without entries) and fetch its entries
    Create(Playlist),
    /// Fetch entries again; the local copy is stale or empty
    Refetch { playlist_id: String },
    Rename { playlist_id: String, name: String },
    Unchanged { playlist_id: String },
    /// Gone from the remote
    Delete { playlist_id: String },
}

impl PlaylistAction {
    pub fn playlist_id(&self) -> &str {
        match self {
            PlaylistAction::Create(playlist) => &playlist.id,
            PlaylistAction::Refetch { playlist_id }
            | PlaylistAction::Rename { playlist_id, .. }
            | PlaylistAction::Unchanged { playlist_id }
            | PlaylistAction::Delete { playlist_id } => playlist_id,
        }
    }
}

/// Counts of applied merge steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub created: usize,
    pub refetched: usize,
    pub renamed: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl ReconcileSummary {
    pub fn from_actions(actions: &[PlaylistAction]) -> Self {
        actions
            .iter()
            .fold(Self::default(), |mut summary, action| {
                match action {
                    PlaylistAction::Create(_) => summary.created += 1,
                    PlaylistAction::Refetch { .. } => summary.refetched += 1,
                    PlaylistAction::Rename { .. } => summary.renamed += 1,
                    PlaylistAction::Unchanged { .. } => summary.unchanged += 1,
                    PlaylistAction::Delete { .. } => summary.deleted += 1,
                }
                summary
            })
    }

    /// Whether applying the plan changes anything locally.
    pub fn has_changes(&self) -> bool {
        self.created + self.renamed + self.deleted > 0
    }
}

/// Plan the merge of `remote` (a complete listing) into `local`.
///
/// `track_counts` maps local playlist ids to their stored entry counts;
/// missing ids count as empty.
pub fn plan_playlist_sync(
    local: &[Playlist],
    track_counts: &HashMap<String, usize>,
    remote: &[Playlist],
) -> Vec<PlaylistAction> {
    let mut unmatched: HashMap<&str, &Playlist> = local
        .iter()
        .filter(|playlist| !playlist.is_reserved())
        .map(|playlist| (playlist.id.as_str(), playlist))
        .collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut actions = Vec::with_capacity(remote.len() + unmatched.len());

    for remote_playlist in remote {
        let id = remote_playlist.id.as_str();
        if is_reserved_playlist_id(id) || !seen.insert(id) {
            continue;
        }

        let action = match unmatched.remove(id) {
            None => PlaylistAction::Create(Playlist::new(
                id,
                remote_playlist.name.clone(),
                remote_playlist.current_revision.clone(),
            )),
            Some(local_playlist) => {
                let count = track_counts.get(id).copied().unwrap_or(0);
                if local_playlist.current_revision != remote_playlist.current_revision
                    || count == 0
                {
                    PlaylistAction::Refetch {
                        playlist_id: id.to_string(),
                    }
                } else if local_playlist.name != remote_playlist.name {
                    PlaylistAction::Rename {
                        playlist_id: id.to_string(),
                        name: remote_playlist.name.clone(),
                    }
                } else {
                    PlaylistAction::Unchanged {
                        playlist_id: id.to_string(),
                    }
                }
            }
        };
        actions.push(action);
    }

    actions.extend(
        local
            .iter()
            .filter(|playlist| unmatched.contains_key(playlist.id.as_str()))
            .map(|playlist| PlaylistAction::Delete {
                playlist_id: playlist.id.clone(),
            }),
    );

    actions
}
