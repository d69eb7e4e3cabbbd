//! # Reconciliation Engine
//!
//! Keeps the local collection cache consistent with the remote service.
//!
//! ## Overview
//!
//! The engine reacts to three notification sources on the [`EventBus`]:
//!
//! - `RemoteEvent::ResultsReported`: a requested result is ready. The id is
//!   consumed from the [`RequestTracker`]; unknown or already consumed ids
//!   are ignored, otherwise the payload is pulled and applied.
//! - `RemoteEvent::OpLogEmptied`: every pending operation of a scope was
//!   delivered, so the deferred fetch for that scope runs now.
//! - `StoreEvent::PlaylistsChanged`: the in-memory playlist cache is rebuilt.
//!
//! Every successful local mutation publishes
//! `CollectionEvent::Updated { cause }`.
//!
//! ## Pending operations
//!
//! Local mutations (loving an item, deleting a playlist) are written to the
//! store together with a pending-log record. While the log is non-empty
//! gated fetches are deferred and a flush of the log is started instead, and
//! loved/starred results are not applied. This keeps remote snapshots taken
//! before a local change from overwriting it. Deferred scopes are remembered
//! and announced with `OpLogEmptied` once the log drains, whichever path
//! drained it.
//!
//! Local mutations and the check-then-write of incoming results run under one
//! mutation lock, so a result can never land between a pending-log check and
//! the overwrite it guards.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::ReconciliationEngine;
//!
//! let engine = ReconciliationEngine::new(settings, store, remote, event_bus);
//! engine.initialize().await?;
//!
//! let loved = engine.toggle_loved(entity).await?;
//! let playlists = engine.playlists().await;
//! ```
//!
//! The bus listener holds a clone of the engine. Call
//! [`shutdown`](ReconciliationEngine::shutdown) to stop it.

use crate::reconcile::{plan_playlist_sync, PlaylistAction, ReconcileSummary};
use crate::registry::{CollectionRegistry, LocalLibraryCollection, RemoteCollection};
use crate::remote::{RemotePayload, RemoteRequest, RemoteSync, SocialActionType};
use crate::request_tracker::{RequestId, RequestKind, RequestTracker};
use crate::Result;
use bridge_traits::error::BridgeError;
use core_library::models::{
    is_reserved_playlist_id, AlbumRef, ArtistRef, LovedEntity, PendingAction, Playlist, TrackRef,
    CACHED_PLAYLIST_ID, LOVED_ITEMS_PLAYLIST_ID, LOVED_ITEMS_PLAYLIST_NAME,
};
use core_library::LocalStore;
use core_runtime::config::SyncSettings;
use core_runtime::events::{
    CollectionEvent, CoreEvent, EventBus, EventSeverity, RecvError, RemoteEvent, StoreEvent,
    SyncScope, UpdateCause,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

const CACHED_PLAYLIST_NAME: &str = "Cached Playlist";

/// Result of a fetch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A remote request was issued under this id
    Issued(RequestId),
    /// A request of the same class is still outstanding
    AlreadyOutstanding,
    /// Pending operations exist; a flush was started instead
    Deferred,
}

/// Reconciliation engine
///
/// Cheap to clone; all state is shared behind `Arc`s so background tasks
/// hold their own handle.
#[derive(Clone)]
pub struct ReconciliationEngine {
    settings: Arc<SyncSettings>,
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteSync>,
    event_bus: EventBus,
    registry: Arc<CollectionRegistry>,
    tracker: Arc<RequestTracker>,

    /// User playlists by id, rebuilt wholesale by `refresh_playlist_cache`
    playlist_cache: Arc<RwLock<HashMap<String, Playlist>>>,
    cache_refresh: Arc<Mutex<()>>,
    flush_lock: Arc<Mutex<()>>,

    /// Held across every check-then-write against loved, starred and
    /// playlist state, and while the pending log is read for a flush
    mutation_lock: Arc<Mutex<()>>,
    /// Scopes whose fetch was deferred and is still owed
    deferred: Arc<std::sync::Mutex<Vec<SyncScope>>>,
    /// Pending op ids whose direct remote call has not returned
    in_flight: Arc<std::sync::Mutex<HashSet<i64>>>,

    initialized: Arc<AtomicBool>,
    init_lock: Arc<Mutex<()>>,
    listener: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl ReconciliationEngine {
    pub fn new(
        settings: SyncSettings,
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteSync>,
        event_bus: EventBus,
    ) -> Self {
        let tracker = RequestTracker::new(settings.request_timeout);

        Self {
            settings: Arc::new(settings),
            store,
            remote,
            event_bus,
            registry: Arc::new(CollectionRegistry::new()),
            tracker: Arc::new(tracker),
            playlist_cache: Arc::new(RwLock::new(HashMap::new())),
            cache_refresh: Arc::new(Mutex::new(())),
            flush_lock: Arc::new(Mutex::new(())),
            mutation_lock: Arc::new(Mutex::new(())),
            deferred: Arc::new(std::sync::Mutex::new(Vec::new())),
            in_flight: Arc::new(std::sync::Mutex::new(HashSet::new())),
            initialized: Arc::new(AtomicBool::new(false)),
            init_lock: Arc::new(Mutex::new(())),
            listener: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initialize the engine once.
    ///
    /// Returns `true` only for the call that performed initialization.
    /// Errors before the bus listener starts leave the engine uninitialized
    /// so a later call retries. Failures of the initial fetch burst are
    /// logged and do not fail initialization.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<bool> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(false);
        }

        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            return Ok(false);
        }

        self.register_default_collections().await;
        self.ensure_loved_items_playlist().await?;
        self.refresh_playlist_cache().await?;

        self.start_listener();
        self.initialized.store(true, Ordering::Release);
        info!("Reconciliation engine initialized");

        if self.settings.fetch_on_initialize {
            for scope in SyncScope::ALL {
                match self.fetch_scope(scope).await {
                    Ok(outcome) => debug!(%scope, ?outcome, "Initial fetch"),
                    Err(e) => warn!(%scope, error = %e, "Initial fetch failed"),
                }
            }
        }

        Ok(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Stop the bus listener. In-flight background tasks run to completion.
    pub fn shutdown(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handle) = handle {
            handle.abort();
            info!("Reconciliation engine listener stopped");
        }
    }

    async fn register_default_collections(&self) {
        self.registry
            .add(Arc::new(LocalLibraryCollection::new(
                self.settings.local_collection_id.clone(),
                self.settings.local_collection_name.clone(),
            )))
            .await;
        self.registry
            .add(Arc::new(RemoteCollection::new(
                self.settings.remote_collection_id.clone(),
                self.settings.remote_collection_name.clone(),
            )))
            .await;
    }

    async fn ensure_loved_items_playlist(&self) -> Result<()> {
        if self.store.get_loved_items_playlist().await?.is_none() {
            debug!("Creating empty loved items playlist");
            self.store.store_playlist(&Playlist::loved_items()).await?;
        }
        Ok(())
    }

    fn start_listener(&self) {
        let mut receiver = self.event_bus.subscribe();
        let engine = self.clone();
        let purge_period = self.settings.request_timeout.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut purge = tokio::time::interval(purge_period);
            purge.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            purge.tick().await;

            loop {
                tokio::select! {
                    received = receiver.recv() => match received {
                        Ok(event) => engine.handle_event(event),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Engine listener lagged behind the event bus");
                            engine.spawn_cache_refresh();
                        }
                        Err(RecvError::Closed) => {
                            debug!("Event bus closed, engine listener exiting");
                            break;
                        }
                    },
                    _ = purge.tick() => {
                        engine.purge_expired_requests();
                    }
                }
            }
        });

        let previous = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn handle_event(&self, event: CoreEvent) {
        match event.severity() {
            EventSeverity::Info => info!(event = event.description(), "Bus event received"),
            EventSeverity::Debug => debug!(event = event.description(), "Bus event received"),
        }

        match event {
            CoreEvent::Remote(RemoteEvent::ResultsReported { request_id }) => {
                let id = match RequestId::from_string(&request_id) {
                    Ok(id) => id,
                    Err(e) => {
                        debug!(error = %e, "Ignoring result with malformed id");
                        return;
                    }
                };
                let engine = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = engine.on_remote_result(&id).await {
                        warn!(request_id = %id, error = %e, "Failed to apply remote result");
                    }
                });
            }
            CoreEvent::Remote(RemoteEvent::OpLogEmptied { scope }) => {
                let engine = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = engine.fetch_scope(scope).await {
                        warn!(%scope, error = %e, "Fetch after pending log drained failed");
                    }
                });
            }
            CoreEvent::Store(StoreEvent::PlaylistsChanged { .. }) => self.spawn_cache_refresh(),
            CoreEvent::Collection(_) => {}
        }
    }

    fn notify(&self, cause: UpdateCause) {
        self.event_bus
            .emit(CoreEvent::Collection(CollectionEvent::Updated { cause }))
            .ok();
    }

    // ========================================================================
    // Fetching
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn fetch_playlists(&self) -> Result<FetchOutcome> {
        self.request(RequestKind::Playlists, Some(SyncScope::Playlists)).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_loved_items(&self) -> Result<FetchOutcome> {
        self.request(RequestKind::LovedItems, Some(SyncScope::LovedItems)).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_starred_artists(&self) -> Result<FetchOutcome> {
        self.request(RequestKind::StarredArtists, Some(SyncScope::StarredArtists)).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_starred_albums(&self) -> Result<FetchOutcome> {
        self.request(RequestKind::StarredAlbums, Some(SyncScope::StarredAlbums)).await
    }

    /// Fetch the entries of one playlist. Not gated by the pending log.
    #[instrument(skip(self))]
    pub async fn fetch_playlist_entries(&self, playlist_id: &str) -> Result<FetchOutcome> {
        self.request(
            RequestKind::PlaylistEntries {
                playlist_id: playlist_id.to_string(),
            },
            None,
        )
        .await
    }

    pub async fn fetch_scope(&self, scope: SyncScope) -> Result<FetchOutcome> {
        match scope {
            SyncScope::Playlists => self.fetch_playlists().await,
            SyncScope::LovedItems => self.fetch_loved_items().await,
            SyncScope::StarredArtists => self.fetch_starred_artists().await,
            SyncScope::StarredAlbums => self.fetch_starred_albums().await,
        }
    }

    /// Issue a remote request. With a `gate` scope the request is deferred
    /// while the pending log is non-empty and owed once the log drains.
    async fn request(&self, kind: RequestKind, gate: Option<SyncScope>) -> Result<FetchOutcome> {
        if let Some(scope) = gate {
            let pending = self.store.get_logged_ops_count().await?;
            if pending > 0 {
                debug!(%kind, pending, "Pending operations logged, deferring fetch");
                self.defer(scope);
                self.spawn_flush();
                return Ok(FetchOutcome::Deferred);
            }
        }

        let Some(id) = self.tracker.issue_unique(kind.clone()) else {
            debug!(%kind, "Request of this class already outstanding");
            return Ok(FetchOutcome::AlreadyOutstanding);
        };

        let request = RemoteRequest {
            id,
            kind: kind.clone(),
        };
        if let Err(e) = self.remote.resolve(request).await {
            self.tracker.consume(&id);
            warn!(%kind, error = %e, "Failed to issue remote request");
            return Err(e.into());
        }

        debug!(%kind, request_id = %id, "Remote request issued");
        Ok(FetchOutcome::Issued(id))
    }

    /// Classes of requests issued and not yet answered.
    pub fn outstanding_requests(&self) -> Vec<RequestKind> {
        self.tracker.outstanding_kinds()
    }

    /// Forget requests whose results never arrived.
    pub fn purge_expired_requests(&self) -> usize {
        let purged = self.tracker.purge_expired();
        if purged > 0 {
            debug!(purged, "Purged expired remote requests");
        }
        purged
    }

    // ========================================================================
    // Applying results
    // ========================================================================

    /// Apply the result reported for `request_id`.
    ///
    /// Unknown or already consumed ids return `Ok(())` without touching the
    /// remote or the store.
    #[instrument(skip(self, request_id), fields(request_id = %request_id))]
    pub async fn on_remote_result(&self, request_id: &RequestId) -> Result<()> {
        let Some(kind) = self.tracker.take(request_id) else {
            debug!("Ignoring result for unknown or consumed request");
            return Ok(());
        };

        let Some(payload) = self.remote.result_by_id(request_id).await? else {
            warn!(%kind, "Remote reported a result but returned none");
            return Ok(());
        };

        if !payload_matches(&kind, &payload) {
            warn!(%kind, payload = payload.label(), "Dropping result of unexpected type");
            return Ok(());
        }

        match payload {
            RemotePayload::Playlists(remote) => {
                self.reconcile_playlists(remote).await?;
            }
            RemotePayload::PlaylistEntries(playlist) => self.apply_playlist_entries(playlist).await?,
            RemotePayload::LovedItems(playlist) => self.apply_loved_items(playlist).await?,
            RemotePayload::StarredArtists(artists) => self.apply_starred_artists(artists).await?,
            RemotePayload::StarredAlbums(albums) => self.apply_starred_albums(albums).await?,
        }

        Ok(())
    }

    /// Merge a complete remote playlist listing into the local store.
    #[instrument(skip(self, remote), fields(remote_count = remote.len()))]
    pub async fn reconcile_playlists(&self, remote: Vec<Playlist>) -> Result<ReconcileSummary> {
        let _mutation = self.mutation_lock.lock().await;

        let pending_deletes = self.pending_playlist_deletes().await?;
        let remote: Vec<Playlist> = remote
            .into_iter()
            .filter(|playlist| !pending_deletes.contains(&playlist.id))
            .collect();

        let local = self.store.get_playlists().await?;
        let mut track_counts = HashMap::with_capacity(local.len());
        for playlist in &local {
            let count = self.store.get_playlist_track_count(&playlist.id).await?;
            track_counts.insert(playlist.id.clone(), count);
        }

        let actions = plan_playlist_sync(&local, &track_counts, &remote);
        for action in &actions {
            self.apply_playlist_action(action).await?;
        }

        let summary = ReconcileSummary::from_actions(&actions);
        info!(
            created = summary.created,
            refetched = summary.refetched,
            renamed = summary.renamed,
            deleted = summary.deleted,
            "Playlists reconciled"
        );
        Ok(summary)
    }

    async fn apply_playlist_action(&self, action: &PlaylistAction) -> Result<()> {
        match action {
            PlaylistAction::Create(playlist) => {
                self.store.store_playlist(playlist).await?;
                self.notify(UpdateCause::PlaylistCreated);
                self.refetch_entries(&playlist.id).await;
            }
            PlaylistAction::Refetch { playlist_id } => self.refetch_entries(playlist_id).await,
            PlaylistAction::Rename { playlist_id, name } => {
                if self.store.rename_playlist(playlist_id, name).await? {
                    self.notify(UpdateCause::PlaylistRenamed);
                }
            }
            PlaylistAction::Unchanged { .. } => {}
            PlaylistAction::Delete { playlist_id } => {
                if self.store.delete_playlist(playlist_id).await? {
                    self.notify(UpdateCause::PlaylistDeleted);
                }
            }
        }
        Ok(())
    }

    async fn refetch_entries(&self, playlist_id: &str) {
        if let Err(e) = self.fetch_playlist_entries(playlist_id).await {
            warn!(playlist_id, error = %e, "Failed to request playlist entries");
        }
    }

    async fn apply_playlist_entries(&self, playlist: Playlist) -> Result<()> {
        if playlist.is_reserved() {
            debug!(playlist_id = %playlist.id, "Ignoring entries for reserved playlist");
            return Ok(());
        }

        let _mutation = self.mutation_lock.lock().await;
        if self.pending_playlist_deletes().await?.contains(&playlist.id) {
            debug!(playlist_id = %playlist.id, "Playlist deleted locally, dropping entries");
            return Ok(());
        }

        self.store.store_playlist(&playlist).await?;
        debug!(
            playlist_id = %playlist.id,
            entries = playlist.entries.len(),
            "Playlist entries stored"
        );
        self.notify(UpdateCause::PlaylistRefreshed);
        Ok(())
    }

    async fn apply_loved_items(&self, playlist: Playlist) -> Result<()> {
        let _mutation = self.mutation_lock.lock().await;
        if self.has_pending_ops().await? {
            debug!("Pending operations logged, dropping loved items result");
            return Ok(());
        }

        let loved = Playlist::new(
            LOVED_ITEMS_PLAYLIST_ID,
            LOVED_ITEMS_PLAYLIST_NAME,
            playlist.current_revision,
        )
        .with_entries(dedupe_by_key(playlist.entries, TrackRef::key));

        self.store.store_playlist(&loved).await?;
        debug!(count = loved.entries.len(), "Loved items replaced");
        self.notify(UpdateCause::LovedItemsReplaced);
        Ok(())
    }

    async fn apply_starred_artists(&self, artists: Vec<ArtistRef>) -> Result<()> {
        let _mutation = self.mutation_lock.lock().await;
        if self.has_pending_ops().await? {
            debug!("Pending operations logged, dropping starred artists result");
            return Ok(());
        }

        self.store
            .store_starred_artists(&dedupe_by_key(artists, ArtistRef::key))
            .await?;
        self.notify(UpdateCause::StarredReplaced);
        Ok(())
    }

    async fn apply_starred_albums(&self, albums: Vec<AlbumRef>) -> Result<()> {
        let _mutation = self.mutation_lock.lock().await;
        if self.has_pending_ops().await? {
            debug!("Pending operations logged, dropping starred albums result");
            return Ok(());
        }

        self.store
            .store_starred_albums(&dedupe_by_key(albums, AlbumRef::key))
            .await?;
        self.notify(UpdateCause::StarredReplaced);
        Ok(())
    }

    async fn has_pending_ops(&self) -> Result<bool> {
        Ok(self.store.get_logged_ops_count().await? > 0)
    }

    async fn pending_playlist_deletes(&self) -> Result<HashSet<String>> {
        if !self.has_pending_ops().await? {
            return Ok(HashSet::new());
        }

        Ok(self
            .store
            .logged_ops()
            .await?
            .into_iter()
            .filter_map(|op| match op.action {
                PendingAction::DeletePlaylist { playlist_id } => Some(playlist_id),
                PendingAction::SetLoved { .. } => None,
            })
            .collect())
    }

    // ========================================================================
    // Local mutations
    // ========================================================================

    /// Flip the loved state of `entity` and return the new value.
    ///
    /// The flip and its pending operation are stored atomically; the remote
    /// is told in the background and the operation is removed once it
    /// acknowledges.
    #[instrument(skip(self, entity), fields(entity = %entity))]
    pub async fn toggle_loved(&self, entity: LovedEntity) -> Result<bool> {
        let (loved, op) = {
            let _mutation = self.mutation_lock.lock().await;
            let loved = !self.store.is_item_loved(&entity).await?;
            let op = self.store.set_loved_item(&entity, loved).await?;
            self.mark_in_flight(op.id);
            (loved, op)
        };
        self.notify(UpdateCause::LovedToggled);

        let engine = self.clone();
        tokio::spawn(async move {
            let result = engine
                .remote
                .send_social_action(&entity, SocialActionType::Love, loved)
                .await;
            engine
                .acknowledge(op.id, result, "send_social_action")
                .await;
        });

        Ok(loved)
    }

    /// Delete a user playlist locally and on the remote.
    ///
    /// Returns `false` if the playlist does not exist. Reserved playlists
    /// cannot be deleted.
    #[instrument(skip(self))]
    pub async fn delete_playlist(&self, playlist_id: &str) -> Result<bool> {
        if is_reserved_playlist_id(playlist_id) {
            warn!("Refusing to delete reserved playlist");
            return Ok(false);
        }

        let op = {
            let _mutation = self.mutation_lock.lock().await;
            if !self.store.delete_playlist(playlist_id).await? {
                return Ok(false);
            }

            let op = self
                .store
                .log_op(&PendingAction::DeletePlaylist {
                    playlist_id: playlist_id.to_string(),
                })
                .await?;
            self.mark_in_flight(op.id);
            op
        };
        self.notify(UpdateCause::PlaylistDeleted);

        let engine = self.clone();
        let playlist_id = playlist_id.to_string();
        tokio::spawn(async move {
            let result = engine.remote.delete_playlist(&playlist_id).await;
            engine.acknowledge(op.id, result, "delete_playlist").await;
        });

        Ok(true)
    }

    /// Remove a pending operation once the remote accepted or rejected it.
    /// Transient failures keep it for the next flush.
    async fn acknowledge(
        &self,
        op_id: i64,
        result: std::result::Result<(), BridgeError>,
        operation: &'static str,
    ) {
        match result {
            Ok(()) => {}
            Err(e) if e.is_retryable() => {
                warn!(op_id, operation, error = %e, "Remote call failed, operation kept in log");
                self.release_in_flight(op_id);
                if self.has_deferred() {
                    self.spawn_flush();
                }
                return;
            }
            Err(e) => {
                warn!(op_id, operation, error = %e, "Remote rejected operation, dropping it");
            }
        }

        let removed = self.store.remove_logged_ops(&[op_id]).await;
        self.release_in_flight(op_id);
        if let Err(e) = removed {
            warn!(op_id, error = %e, "Failed to remove acknowledged operation");
            return;
        }

        if let Err(e) = self.announce_if_drained(Vec::new()).await {
            warn!(error = %e, "Failed to check pending log after acknowledgement");
        }
    }

    /// Send the pending log and drop what the remote acknowledged.
    ///
    /// Operations whose own remote call is still running are left out.
    /// When the log ends up empty, `RemoteEvent::OpLogEmptied` is published
    /// once per flushed or deferred scope. Returns the number of removed
    /// operations.
    #[instrument(skip(self))]
    pub async fn flush_pending_ops(&self) -> Result<usize> {
        let _guard = self.flush_lock.lock().await;

        let ops: Vec<_> = {
            let _mutation = self.mutation_lock.lock().await;
            let in_flight = self.in_flight_ids();
            self.store
                .logged_ops()
                .await?
                .into_iter()
                .filter(|op| !in_flight.contains(&op.id))
                .collect()
        };
        if ops.is_empty() {
            self.announce_if_drained(Vec::new()).await?;
            return Ok(0);
        }

        let mut scopes: Vec<SyncScope> = Vec::new();
        for op in &ops {
            let scope = op.scope();
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }

        let sent = ops.len();
        let acknowledged = self.remote.send_logged_ops(ops).await?;
        let removed = self.store.remove_logged_ops(&acknowledged).await?;
        debug!(sent, removed, "Pending operations flushed");

        self.announce_if_drained(scopes).await?;
        Ok(removed as usize)
    }

    /// Publish `OpLogEmptied` for `flushed` plus every deferred scope once
    /// the pending log is empty. Deferred scopes are kept otherwise.
    async fn announce_if_drained(&self, mut scopes: Vec<SyncScope>) -> Result<()> {
        if scopes.is_empty() && !self.has_deferred() {
            return Ok(());
        }
        if self.store.get_logged_ops_count().await? > 0 {
            return Ok(());
        }

        let deferred = std::mem::take(
            &mut *self
                .deferred
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for scope in deferred {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }

        for scope in scopes {
            debug!(%scope, "Pending log drained");
            self.event_bus
                .emit(CoreEvent::Remote(RemoteEvent::OpLogEmptied { scope }))
                .ok();
        }
        Ok(())
    }

    fn defer(&self, scope: SyncScope) {
        let mut deferred = self
            .deferred
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !deferred.contains(&scope) {
            deferred.push(scope);
        }
    }

    fn has_deferred(&self) -> bool {
        !self
            .deferred
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }

    fn mark_in_flight(&self, op_id: i64) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(op_id);
    }

    fn release_in_flight(&self, op_id: i64) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&op_id);
    }

    fn in_flight_ids(&self) -> HashSet<i64> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn spawn_flush(&self) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.flush_pending_ops().await {
                warn!(error = %e, "Flushing pending operations failed");
            }
        });
    }

    // ========================================================================
    // Playlist cache & accessors
    // ========================================================================

    /// Rebuild the in-memory playlist cache from the store.
    ///
    /// The new map is built off to the side and swapped in, so readers see
    /// either the old or the new snapshot.
    pub async fn refresh_playlist_cache(&self) -> Result<()> {
        let _guard = self.cache_refresh.lock().await;

        let fresh: HashMap<String, Playlist> = self
            .store
            .get_playlists()
            .await?
            .into_iter()
            .map(|playlist| (playlist.id.clone(), playlist))
            .collect();

        let count = fresh.len();
        *self.playlist_cache.write().await = fresh;
        debug!(count, "Playlist cache refreshed");

        self.notify(UpdateCause::CacheRefreshed);
        Ok(())
    }

    fn spawn_cache_refresh(&self) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.refresh_playlist_cache().await {
                warn!(error = %e, "Playlist cache refresh failed");
            }
        });
    }

    /// Cached user playlists sorted case-insensitively by name.
    pub async fn playlists(&self) -> Vec<Playlist> {
        let mut playlists: Vec<Playlist> = self.playlist_cache.read().await.values().cloned().collect();
        playlists.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        playlists
    }

    pub async fn playlist(&self, playlist_id: &str) -> Option<Playlist> {
        self.playlist_cache.read().await.get(playlist_id).cloned()
    }

    pub async fn is_loved(&self, entity: &LovedEntity) -> Result<bool> {
        Ok(self.store.is_item_loved(entity).await?)
    }

    pub async fn loved_items_playlist(&self) -> Result<Playlist> {
        Ok(self
            .store
            .get_loved_items_playlist()
            .await?
            .unwrap_or_else(Playlist::loved_items))
    }

    pub async fn starred_artists(&self) -> Result<Vec<ArtistRef>> {
        Ok(self.store.starred_artists().await?)
    }

    pub async fn starred_albums(&self) -> Result<Vec<AlbumRef>> {
        Ok(self.store.starred_albums().await?)
    }

    /// Persist the player's queue so it survives restarts.
    pub async fn set_cached_playlist(&self, entries: Vec<TrackRef>) -> Result<()> {
        let playlist =
            Playlist::new(CACHED_PLAYLIST_ID, CACHED_PLAYLIST_NAME, "").with_entries(entries);
        self.store.store_playlist(&playlist).await?;
        Ok(())
    }

    pub async fn cached_playlist(&self) -> Result<Option<Playlist>> {
        Ok(self.store.get_playlist(CACHED_PLAYLIST_ID).await?)
    }

    pub fn registry(&self) -> Arc<CollectionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("initialized", &self.is_initialized())
            .field("outstanding_requests", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

fn payload_matches(kind: &RequestKind, payload: &RemotePayload) -> bool {
    match (kind, payload) {
        (RequestKind::Playlists, RemotePayload::Playlists(_)) => true,
        (RequestKind::PlaylistEntries { playlist_id }, RemotePayload::PlaylistEntries(p)) => {
            &p.id == playlist_id
        }
        (RequestKind::LovedItems, RemotePayload::LovedItems(_)) => true,
        (RequestKind::StarredArtists, RemotePayload::StarredArtists(_)) => true,
        (RequestKind::StarredAlbums, RemotePayload::StarredAlbums(_)) => true,
        _ => false,
    }
}

/// Keep the first item of every key, preserving order.
fn dedupe_by_key<T>(items: Vec<T>, key: impl Fn(&T) -> String) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

impl From<SyncScope> for RequestKind {
    fn from(scope: SyncScope) -> Self {
        match scope {
            SyncScope::Playlists => RequestKind::Playlists,
            SyncScope::LovedItems => RequestKind::LovedItems,
            SyncScope::StarredArtists => RequestKind::StarredArtists,
            SyncScope::StarredAlbums => RequestKind::StarredAlbums,
        }
    }
}
