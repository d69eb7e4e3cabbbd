//! Integration tests for the reconciliation engine
//!
//! These run the engine against a real in-memory SQLite store and a fake
//! remote that answers every request asynchronously over the event bus:
//! - Playlist merge (create, refetch, rename, delete)
//! - Concurrent initialization
//! - Deferred fetches while operations are pending
//! - Concurrent toggles and request expiry
//! - Reserved playlists surviving remote listings

use bridge_traits::error::{BridgeError, Result as BridgeResult};
use core_library::db::create_test_pool;
use core_library::models::{
    AlbumRef, ArtistRef, LovedEntity, PendingOperation, Playlist, TrackRef, CACHED_PLAYLIST_ID,
    LOVED_ITEMS_PLAYLIST_ID,
};
use core_library::{LocalStore, SqliteLocalStore};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, RemoteEvent};
use core_sync::{
    FetchOutcome, ReconciliationEngine, RemotePayload, RemoteRequest, RemoteSync, RequestId,
    RequestKind, SocialActionType,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fake Remote
// ============================================================================

#[derive(Default)]
struct RemoteState {
    playlists: Vec<Playlist>,
    entries: HashMap<String, Playlist>,
    loved: Option<Playlist>,
    artists: Vec<ArtistRef>,
    albums: Vec<AlbumRef>,

    fail_social_actions: bool,
    report_results: bool,

    pending_results: HashMap<RequestId, RemotePayload>,
    resolved: Vec<RequestKind>,
    sent_ops: Vec<PendingOperation>,
    social_actions: Vec<(LovedEntity, bool)>,
    deleted_playlists: Vec<String>,
}

/// Remote that answers from canned state and reports on the bus
struct FakeRemote {
    event_bus: EventBus,
    state: Mutex<RemoteState>,
}

impl FakeRemote {
    fn new(event_bus: EventBus) -> Self {
        Self {
            event_bus,
            state: Mutex::new(RemoteState {
                report_results: true,
                ..RemoteState::default()
            }),
        }
    }

    fn with_state(&self, update: impl FnOnce(&mut RemoteState)) {
        update(&mut self.state.lock().unwrap());
    }

    fn resolved(&self) -> Vec<RequestKind> {
        self.state.lock().unwrap().resolved.clone()
    }

    fn resolved_count(&self, kind: &RequestKind) -> usize {
        self.resolved().iter().filter(|k| *k == kind).count()
    }
}

#[async_trait::async_trait]
impl RemoteSync for FakeRemote {
    async fn resolve(&self, request: RemoteRequest) -> BridgeResult<()> {
        let report = {
            let mut state = self.state.lock().unwrap();
            state.resolved.push(request.kind.clone());

            let payload = match &request.kind {
                RequestKind::Playlists => Some(RemotePayload::Playlists(state.playlists.clone())),
                RequestKind::PlaylistEntries { playlist_id } => state
                    .entries
                    .get(playlist_id)
                    .cloned()
                    .map(RemotePayload::PlaylistEntries),
                RequestKind::LovedItems => state.loved.clone().map(RemotePayload::LovedItems),
                RequestKind::StarredArtists => {
                    Some(RemotePayload::StarredArtists(state.artists.clone()))
                }
                RequestKind::StarredAlbums => {
                    Some(RemotePayload::StarredAlbums(state.albums.clone()))
                }
            };
            if let Some(payload) = payload {
                state.pending_results.insert(request.id, payload);
            }
            state.report_results
        };

        if report {
            let bus = self.event_bus.clone();
            let request_id = request.id.to_string();
            tokio::spawn(async move {
                bus.emit(CoreEvent::Remote(RemoteEvent::ResultsReported { request_id }))
                    .ok();
            });
        }
        Ok(())
    }

    async fn result_by_id(&self, id: &RequestId) -> BridgeResult<Option<RemotePayload>> {
        Ok(self.state.lock().unwrap().pending_results.remove(id))
    }

    async fn send_logged_ops(&self, ops: Vec<PendingOperation>) -> BridgeResult<Vec<i64>> {
        let ids = ops.iter().map(|op| op.id).collect();
        self.state.lock().unwrap().sent_ops.extend(ops);
        Ok(ids)
    }

    async fn send_social_action(
        &self,
        entity: &LovedEntity,
        _action: SocialActionType,
        value: bool,
    ) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.social_actions.push((entity.clone(), value));
        if state.fail_social_actions {
            return Err(BridgeError::OperationFailed("offline".to_string()));
        }
        Ok(())
    }

    async fn delete_playlist(&self, playlist_id: &str) -> BridgeResult<()> {
        self.state
            .lock()
            .unwrap()
            .deleted_playlists
            .push(playlist_id.to_string());
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    engine: ReconciliationEngine,
    store: Arc<SqliteLocalStore>,
    remote: Arc<FakeRemote>,
}

async fn setup(fetch_on_initialize: bool) -> Harness {
    setup_with(SyncSettings {
        fetch_on_initialize,
        ..SyncSettings::default()
    })
    .await
}

async fn setup_with(settings: SyncSettings) -> Harness {
    let pool = create_test_pool().await.unwrap();
    let bus = EventBus::new(256);
    let store = Arc::new(SqliteLocalStore::new(pool).with_event_bus(bus.clone()));
    let remote = Arc::new(FakeRemote::new(bus.clone()));

    let engine = ReconciliationEngine::new(settings, store.clone(), remote.clone(), bus);

    Harness {
        engine,
        store,
        remote,
    }
}

fn tracks(n: usize) -> Vec<TrackRef> {
    (0..n)
        .map(|i| TrackRef::new(format!("Track {}", i), "Artist"))
        .collect()
}

async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn wait_for_playlist(
    store: &SqliteLocalStore,
    id: &str,
    check: impl Fn(Option<&Playlist>) -> bool,
) -> Option<Playlist> {
    for _ in 0..300 {
        let playlist = store.get_playlist(id).await.unwrap();
        if check(playlist.as_ref()) {
            return playlist;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("playlist {} never reached the expected state", id);
}

// ============================================================================
// Playlist merge
// ============================================================================

#[tokio::test]
async fn test_merge_creates_refetches_and_deletes() {
    let h = setup(false).await;

    h.store
        .store_playlist(&Playlist::new("A", "Alpha", "1").with_entries(tracks(3)))
        .await
        .unwrap();
    h.store
        .store_playlist(&Playlist::new("B", "Beta", "2"))
        .await
        .unwrap();

    h.remote.with_state(|state| {
        state.playlists = vec![
            Playlist::new("A", "Alpha", "1"),
            Playlist::new("C", "Gamma", "1"),
        ];
        state.entries.insert(
            "C".to_string(),
            Playlist::new("C", "Gamma", "1").with_entries(tracks(2)),
        );
    });

    assert!(h.engine.initialize().await.unwrap());
    assert!(matches!(
        h.engine.fetch_playlists().await.unwrap(),
        FetchOutcome::Issued(_)
    ));

    let gamma = wait_for_playlist(&h.store, "C", |p| p.map_or(false, |p| p.entries.len() == 2))
        .await
        .unwrap();
    assert_eq!(gamma.name, "Gamma");

    wait_for_playlist(&h.store, "B", |p| p.is_none()).await;
    let alpha = h.store.get_playlist("A").await.unwrap().unwrap();
    assert_eq!(alpha.entries.len(), 3);

    let entry_fetches: Vec<RequestKind> = h
        .remote
        .resolved()
        .into_iter()
        .filter(|kind| matches!(kind, RequestKind::PlaylistEntries { .. }))
        .collect();
    assert_eq!(
        entry_fetches,
        vec![RequestKind::PlaylistEntries {
            playlist_id: "C".to_string()
        }]
    );

    let names = {
        let mut names = Vec::new();
        for _ in 0..300 {
            names = h
                .engine
                .playlists()
                .await
                .into_iter()
                .map(|p| p.name)
                .collect::<Vec<_>>();
            if names == ["Alpha", "Gamma"] {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        names
    };
    assert_eq!(names, vec!["Alpha", "Gamma"]);

    h.engine.shutdown();
}

#[tokio::test]
async fn test_revision_mismatch_replaces_entries() {
    let h = setup(false).await;

    h.store
        .store_playlist(&Playlist::new("A", "Alpha", "1").with_entries(tracks(2)))
        .await
        .unwrap();
    h.remote.with_state(|state| {
        state.playlists = vec![Playlist::new("A", "Alpha II", "2")];
        state.entries.insert(
            "A".to_string(),
            Playlist::new("A", "Alpha II", "2").with_entries(tracks(4)),
        );
    });

    h.engine.initialize().await.unwrap();
    h.engine.fetch_playlists().await.unwrap();

    let alpha = wait_for_playlist(&h.store, "A", |p| {
        p.map_or(false, |p| p.current_revision == "2")
    })
    .await
    .unwrap();
    assert_eq!(alpha.name, "Alpha II");
    assert_eq!(alpha.entries.len(), 4);

    h.engine.shutdown();
}

#[tokio::test]
async fn test_rename_keeps_entries_and_skips_fetch() {
    let h = setup(false).await;

    h.store
        .store_playlist(&Playlist::new("A", "Old", "1").with_entries(tracks(3)))
        .await
        .unwrap();
    h.remote
        .with_state(|state| state.playlists = vec![Playlist::new("A", "New", "1")]);

    h.engine.initialize().await.unwrap();
    h.engine.fetch_playlists().await.unwrap();

    let renamed = wait_for_playlist(&h.store, "A", |p| p.map_or(false, |p| p.name == "New"))
        .await
        .unwrap();
    assert_eq!(renamed.entries.len(), 3);
    assert_eq!(renamed.current_revision, "1");
    assert_eq!(
        h.remote.resolved_count(&RequestKind::PlaylistEntries {
            playlist_id: "A".to_string()
        }),
        0
    );

    h.engine.shutdown();
}

#[tokio::test]
async fn test_reserved_playlists_survive_empty_listing() {
    let h = setup(false).await;

    h.store
        .store_playlist(&Playlist::new("A", "Alpha", "1").with_entries(tracks(1)))
        .await
        .unwrap();
    let op = h
        .store
        .set_loved_item(&LovedEntity::Track(TrackRef::new("Loved", "Artist")), true)
        .await
        .unwrap();
    h.store.remove_logged_ops(&[op.id]).await.unwrap();
    h.engine.set_cached_playlist(tracks(2)).await.unwrap();

    h.engine.initialize().await.unwrap();
    h.engine.fetch_playlists().await.unwrap();

    wait_for_playlist(&h.store, "A", |p| p.is_none()).await;

    let loved = h
        .store
        .get_playlist(LOVED_ITEMS_PLAYLIST_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loved.entries.len(), 1);
    let cached = h.engine.cached_playlist().await.unwrap().unwrap();
    assert_eq!(cached.id, CACHED_PLAYLIST_ID);
    assert_eq!(cached.entries.len(), 2);

    h.engine.shutdown();
}

// ============================================================================
// Initialization
// ============================================================================

#[tokio::test]
async fn test_concurrent_initialize_runs_once() {
    let h = setup(true).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.initialize().await.unwrap() })
        })
        .collect();

    let mut performed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            performed += 1;
        }
    }
    assert_eq!(performed, 1);
    assert!(h.engine.is_initialized());
    assert!(!h.engine.initialize().await.unwrap());

    wait_until(|| h.remote.resolved().len() >= 4).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for kind in [
        RequestKind::Playlists,
        RequestKind::LovedItems,
        RequestKind::StarredArtists,
        RequestKind::StarredAlbums,
    ] {
        assert_eq!(h.remote.resolved_count(&kind), 1, "{}", kind);
    }
    assert_eq!(h.remote.resolved().len(), 4);

    let registry = h.engine.registry();
    assert_eq!(registry.len().await, 2);
    assert!(h.store.get_loved_items_playlist().await.unwrap().is_some());

    h.engine.shutdown();
}

// ============================================================================
// Pending operations
// ============================================================================

#[tokio::test]
async fn test_drained_log_triggers_deferred_fetch() {
    let h = setup(false).await;
    let track = LovedEntity::Track(TrackRef::new("Teardrop", "Massive Attack"));

    h.remote.with_state(|state| {
        state.fail_social_actions = true;
        state.loved = Some(
            Playlist::new("remote-loved", "Loved", "7")
                .with_entries(vec![TrackRef::new("Teardrop", "Massive Attack")]),
        );
    });

    h.engine.initialize().await.unwrap();
    assert!(h.engine.toggle_loved(track.clone()).await.unwrap());
    wait_until(|| h.remote.state.lock().unwrap().social_actions.len() == 1).await;
    assert_eq!(h.store.get_logged_ops_count().await.unwrap(), 1);

    assert_eq!(
        h.engine.fetch_loved_items().await.unwrap(),
        FetchOutcome::Deferred
    );

    wait_until(|| h.remote.resolved_count(&RequestKind::LovedItems) == 1).await;
    assert_eq!(h.remote.state.lock().unwrap().sent_ops.len(), 1);
    assert_eq!(h.store.get_logged_ops_count().await.unwrap(), 0);

    let loved = wait_for_playlist(&h.store, LOVED_ITEMS_PLAYLIST_ID, |p| {
        p.map_or(false, |p| p.current_revision == "7")
    })
    .await
    .unwrap();
    assert_eq!(loved.entries.len(), 1);
    assert!(h.engine.is_loved(&track).await.unwrap());

    h.engine.shutdown();
}

#[tokio::test]
async fn test_initial_fetches_run_after_pending_log_drains() {
    let h = setup(true).await;
    let track = LovedEntity::Track(TrackRef::new("Unfinished", "Artist"));

    h.remote.with_state(|state| {
        state.playlists = vec![Playlist::new("R", "Road Trip", "1")];
        state.entries.insert(
            "R".to_string(),
            Playlist::new("R", "Road Trip", "1").with_entries(tracks(2)),
        );
    });

    // Left over from an earlier session: logged but never delivered.
    h.store.set_loved_item(&track, true).await.unwrap();
    assert_eq!(h.store.get_logged_ops_count().await.unwrap(), 1);

    assert!(h.engine.initialize().await.unwrap());

    let road_trip = wait_for_playlist(&h.store, "R", |p| p.map_or(false, |p| p.entries.len() == 2))
        .await
        .unwrap();
    assert_eq!(road_trip.name, "Road Trip");

    for kind in [
        RequestKind::Playlists,
        RequestKind::LovedItems,
        RequestKind::StarredArtists,
        RequestKind::StarredAlbums,
    ] {
        wait_until(|| h.remote.resolved_count(&kind) >= 1).await;
    }
    assert_eq!(h.remote.state.lock().unwrap().sent_ops.len(), 1);
    assert_eq!(h.store.get_logged_ops_count().await.unwrap(), 0);

    h.engine.shutdown();
}

#[tokio::test]
async fn test_loved_result_dropped_while_ops_pending() {
    let h = setup(false).await;
    let local = LovedEntity::Track(TrackRef::new("Local", "Artist"));

    h.remote.with_state(|state| {
        state.report_results = false;
        state.fail_social_actions = true;
        state.loved = Some(
            Playlist::new("remote-loved", "Loved", "3")
                .with_entries(vec![TrackRef::new("Remote", "Artist")]),
        );
    });

    let FetchOutcome::Issued(id) = h.engine.fetch_loved_items().await.unwrap() else {
        panic!("expected a request to be issued");
    };

    h.engine.toggle_loved(local.clone()).await.unwrap();
    wait_until(|| h.remote.state.lock().unwrap().social_actions.len() == 1).await;

    h.engine.on_remote_result(&id).await.unwrap();

    let loved = h.engine.loved_items_playlist().await.unwrap();
    assert_eq!(loved.entries, vec![TrackRef::new("Local", "Artist")]);
    assert!(h.engine.is_loved(&local).await.unwrap());
}

#[tokio::test]
async fn test_delete_playlist_reaches_remote_and_clears_log() {
    let h = setup(false).await;

    h.store
        .store_playlist(&Playlist::new("A", "Alpha", "1").with_entries(tracks(1)))
        .await
        .unwrap();

    assert!(h.engine.delete_playlist("A").await.unwrap());
    assert!(!h.engine.delete_playlist("A").await.unwrap());
    assert!(h.store.get_playlist("A").await.unwrap().is_none());

    wait_until(|| h.remote.state.lock().unwrap().deleted_playlists == ["A"]).await;
    for _ in 0..300 {
        if h.store.get_logged_ops_count().await.unwrap() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.store.get_logged_ops_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_starred_results_replace_local_sets() {
    let h = setup(false).await;

    h.store
        .store_starred_artists(&[ArtistRef::new("Stale")])
        .await
        .unwrap();
    h.remote.with_state(|state| {
        state.artists = vec![ArtistRef::new("Low"), ArtistRef::new("Slowdive")];
        state.albums = vec![AlbumRef::new("Souvlaki", "Slowdive")];
    });

    h.engine.initialize().await.unwrap();
    h.engine.fetch_starred_artists().await.unwrap();
    h.engine.fetch_starred_albums().await.unwrap();

    for _ in 0..300 {
        let artists = h.engine.starred_artists().await.unwrap();
        let albums = h.engine.starred_albums().await.unwrap();
        if artists.len() == 2 && albums.len() == 1 {
            assert!(artists.iter().all(|a| a.name != "Stale"));
            h.engine.shutdown();
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("starred sets were never replaced");
}

// ============================================================================
// Concurrency & expiry
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_alternate() {
    let h = setup(false).await;
    let track = LovedEntity::Track(TrackRef::new("Roygbiv", "Boards of Canada"));

    for _ in 0..20 {
        let first = {
            let engine = h.engine.clone();
            let track = track.clone();
            tokio::spawn(async move { engine.toggle_loved(track).await })
        };
        let second = {
            let engine = h.engine.clone();
            let track = track.clone();
            tokio::spawn(async move { engine.toggle_loved(track).await })
        };

        let (first, second) = tokio::join!(first, second);
        let (first, second) = (first.unwrap().unwrap(), second.unwrap().unwrap());
        assert_ne!(first, second);
        assert!(!h.engine.is_loved(&track).await.unwrap());
    }

    wait_until(|| h.remote.state.lock().unwrap().social_actions.len() == 40).await;
    let loved_count = h
        .remote
        .state
        .lock()
        .unwrap()
        .social_actions
        .iter()
        .filter(|(_, loved)| *loved)
        .count();
    assert_eq!(loved_count, 20);
}

#[tokio::test]
async fn test_unanswered_requests_expire_while_running() {
    let h = setup_with(SyncSettings {
        fetch_on_initialize: false,
        request_timeout: Duration::from_millis(30),
        ..SyncSettings::default()
    })
    .await;
    h.remote.with_state(|state| state.report_results = false);

    h.engine.initialize().await.unwrap();
    assert!(matches!(
        h.engine.fetch_playlists().await.unwrap(),
        FetchOutcome::Issued(_)
    ));
    assert_eq!(h.engine.outstanding_requests(), vec![RequestKind::Playlists]);

    wait_until(|| h.engine.outstanding_requests().is_empty()).await;
    assert!(matches!(
        h.engine.fetch_playlists().await.unwrap(),
        FetchOutcome::Issued(_)
    ));

    h.engine.shutdown();
}
