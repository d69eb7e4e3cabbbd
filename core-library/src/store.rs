//! Local collection store
//!
//! Durable cache of playlists, loved tracks, starred artists and albums,
//! plus the pending operation log (outbox) of local mutations that the
//! remote has not acknowledged yet.

use crate::error::{LibraryError, Result};
use crate::models::{
    normalize, AlbumRef, ArtistRef, LovedEntity, PendingAction, PendingOperation, Playlist,
    TrackRef, CACHED_PLAYLIST_ID, LOVED_ITEMS_PLAYLIST_ID, LOVED_ITEMS_PLAYLIST_NAME,
};
use async_trait::async_trait;
use chrono::Utc;
use core_runtime::events::{CoreEvent, EventBus, StoreEvent};
use sqlx::{query, query_as, FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

/// Store interface for the reconciliation engine.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// User playlists with their entries, ordered by normalized name.
    ///
    /// Reserved playlists (loved items, cached queue) are never listed.
    async fn get_playlists(&self) -> Result<Vec<Playlist>>;

    /// Any playlist by id, reserved ones included.
    async fn get_playlist(&self, id: &str) -> Result<Option<Playlist>>;

    /// Insert or replace a playlist and all of its entries.
    async fn store_playlist(&self, playlist: &Playlist) -> Result<()>;

    /// Returns `false` when the playlist did not exist.
    async fn delete_playlist(&self, id: &str) -> Result<bool>;

    /// Returns `false` when the playlist did not exist.
    async fn rename_playlist(&self, id: &str, name: &str) -> Result<bool>;

    /// Number of stored entries; zero for unknown playlists.
    async fn get_playlist_track_count(&self, id: &str) -> Result<usize>;

    async fn get_loved_items_playlist(&self) -> Result<Option<Playlist>>;

    async fn is_item_loved(&self, entity: &LovedEntity) -> Result<bool>;

    /// Set the loved flag and record the matching pending operation in one
    /// transaction.
    async fn set_loved_item(&self, entity: &LovedEntity, loved: bool) -> Result<PendingOperation>;

    async fn starred_artists(&self) -> Result<Vec<ArtistRef>>;

    async fn starred_albums(&self) -> Result<Vec<AlbumRef>>;

    /// Replace the starred artist set wholesale.
    async fn store_starred_artists(&self, artists: &[ArtistRef]) -> Result<()>;

    /// Replace the starred album set wholesale.
    async fn store_starred_albums(&self, albums: &[AlbumRef]) -> Result<()>;

    /// Append an operation to the pending log.
    async fn log_op(&self, action: &PendingAction) -> Result<PendingOperation>;

    /// Pending log in insertion order.
    async fn logged_ops(&self) -> Result<Vec<PendingOperation>>;

    /// Remove acknowledged operations, returning how many rows went away.
    async fn remove_logged_ops(&self, ids: &[i64]) -> Result<u64>;

    async fn get_logged_ops_count(&self) -> Result<u64>;
}

#[derive(FromRow)]
struct PlaylistRow {
    id: String,
    name: String,
    current_revision: String,
}

#[derive(FromRow)]
struct EntryRow {
    playlist_id: String,
    track_name: String,
    artist_name: String,
    album_name: Option<String>,
}

impl From<EntryRow> for TrackRef {
    fn from(row: EntryRow) -> Self {
        TrackRef {
            name: row.track_name,
            artist: row.artist_name,
            album: row.album_name,
        }
    }
}

#[derive(FromRow)]
struct OpRow {
    id: i64,
    payload: String,
    created_at: i64,
}

impl TryFrom<OpRow> for PendingOperation {
    type Error = LibraryError;

    fn try_from(row: OpRow) -> Result<Self> {
        Ok(PendingOperation {
            id: row.id,
            action: serde_json::from_str(&row.payload)?,
            created_at: row.created_at,
        })
    }
}

/// SQLite implementation of [`LocalStore`]
pub struct SqliteLocalStore {
    pool: SqlitePool,
    event_bus: Option<EventBus>,
}

impl SqliteLocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            event_bus: None,
        }
    }

    /// Publish `StoreEvent::PlaylistsChanged` after playlist writes.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn notify_playlist_changed(&self, playlist_id: &str) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Store(StoreEvent::PlaylistsChanged {
                playlist_id: playlist_id.to_string(),
            }))
            .ok();
        }
    }

    async fn load_entries(&self, playlist_id: &str) -> Result<Vec<TrackRef>> {
        let rows = query_as::<_, EntryRow>(
            r#"
            SELECT playlist_id, track_name, artist_name, album_name
            FROM playlist_entries
            WHERE playlist_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TrackRef::from).collect())
    }

    async fn ensure_loved_playlist_row(conn: &mut SqliteConnection) -> Result<()> {
        let now = Utc::now().timestamp();
        query(
            r#"
            INSERT OR IGNORE INTO playlists (id, name, normalized_name, current_revision, created_at, updated_at)
            VALUES (?, ?, ?, '', ?, ?)
            "#,
        )
        .bind(LOVED_ITEMS_PLAYLIST_ID)
        .bind(LOVED_ITEMS_PLAYLIST_NAME)
        .bind(normalize(LOVED_ITEMS_PLAYLIST_NAME))
        .bind(now)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn insert_op(conn: &mut SqliteConnection, action: &PendingAction) -> Result<PendingOperation> {
        let payload = serde_json::to_string(action)?;
        let created_at = Utc::now().timestamp();

        let result = query("INSERT INTO op_log (scope, payload, created_at) VALUES (?, ?, ?)")
            .bind(action.scope().as_str())
            .bind(payload)
            .bind(created_at)
            .execute(conn)
            .await?;

        Ok(PendingOperation {
            id: result.last_insert_rowid(),
            action: action.clone(),
            created_at,
        })
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get_playlists(&self) -> Result<Vec<Playlist>> {
        let rows = query_as::<_, PlaylistRow>(
            r#"
            SELECT id, name, current_revision FROM playlists
            WHERE id NOT IN (?, ?)
            ORDER BY normalized_name ASC, id ASC
            "#,
        )
        .bind(LOVED_ITEMS_PLAYLIST_ID)
        .bind(CACHED_PLAYLIST_ID)
        .fetch_all(&self.pool)
        .await?;

        let entry_rows = query_as::<_, EntryRow>(
            r#"
            SELECT playlist_id, track_name, artist_name, album_name
            FROM playlist_entries
            WHERE playlist_id NOT IN (?, ?)
            ORDER BY playlist_id ASC, position ASC
            "#,
        )
        .bind(LOVED_ITEMS_PLAYLIST_ID)
        .bind(CACHED_PLAYLIST_ID)
        .fetch_all(&self.pool)
        .await?;

        let mut entries: HashMap<String, Vec<TrackRef>> = HashMap::new();
        for row in entry_rows {
            entries
                .entry(row.playlist_id.clone())
                .or_default()
                .push(row.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let tracks = entries.remove(&row.id).unwrap_or_default();
                Playlist::new(row.id, row.name, row.current_revision).with_entries(tracks)
            })
            .collect())
    }

    async fn get_playlist(&self, id: &str) -> Result<Option<Playlist>> {
        let row = query_as::<_, PlaylistRow>(
            "SELECT id, name, current_revision FROM playlists WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let entries = self.load_entries(&row.id).await?;
                Ok(Some(
                    Playlist::new(row.id, row.name, row.current_revision).with_entries(entries),
                ))
            }
            None => Ok(None),
        }
    }

    async fn store_playlist(&self, playlist: &Playlist) -> Result<()> {
        playlist
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "Playlist".to_string(),
                message,
            })?;

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        query(
            r#"
            INSERT INTO playlists (id, name, normalized_name, current_revision, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                normalized_name = excluded.normalized_name,
                current_revision = excluded.current_revision,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&playlist.id)
        .bind(&playlist.name)
        .bind(normalize(&playlist.name))
        .bind(&playlist.current_revision)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        query("DELETE FROM playlist_entries WHERE playlist_id = ?")
            .bind(&playlist.id)
            .execute(&mut *tx)
            .await?;

        for (position, entry) in playlist.entries.iter().enumerate() {
            query(
                r#"
                INSERT INTO playlist_entries (playlist_id, position, entity_key, track_name, artist_name, album_name)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&playlist.id)
            .bind(position as i64)
            .bind(entry.key())
            .bind(&entry.name)
            .bind(&entry.artist)
            .bind(&entry.album)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            playlist_id = %playlist.id,
            entries = playlist.entries.len(),
            "Stored playlist"
        );
        self.notify_playlist_changed(&playlist.id);
        Ok(())
    }

    async fn delete_playlist(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.notify_playlist_changed(id);
        }
        Ok(deleted)
    }

    async fn rename_playlist(&self, id: &str, name: &str) -> Result<bool> {
        if name.trim().is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "name".to_string(),
                message: "Playlist name cannot be empty".to_string(),
            });
        }

        let result =
            query("UPDATE playlists SET name = ?, normalized_name = ?, updated_at = ? WHERE id = ?")
                .bind(name)
                .bind(normalize(name))
                .bind(Utc::now().timestamp())
                .bind(id)
                .execute(&self.pool)
                .await?;

        let renamed = result.rows_affected() > 0;
        if renamed {
            self.notify_playlist_changed(id);
        }
        Ok(renamed)
    }

    async fn get_playlist_track_count(&self, id: &str) -> Result<usize> {
        let (count,): (i64,) =
            query_as("SELECT COUNT(*) FROM playlist_entries WHERE playlist_id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count as usize)
    }

    async fn get_loved_items_playlist(&self) -> Result<Option<Playlist>> {
        self.get_playlist(LOVED_ITEMS_PLAYLIST_ID).await
    }

    async fn is_item_loved(&self, entity: &LovedEntity) -> Result<bool> {
        let key = entity.key();
        let (count,): (i64,) = match entity {
            LovedEntity::Track(_) => {
                query_as(
                    "SELECT COUNT(*) FROM playlist_entries WHERE playlist_id = ? AND entity_key = ?",
                )
                .bind(LOVED_ITEMS_PLAYLIST_ID)
                .bind(&key)
                .fetch_one(&self.pool)
                .await?
            }
            LovedEntity::Artist(_) => {
                query_as("SELECT COUNT(*) FROM starred_artists WHERE entity_key = ?")
                    .bind(&key)
                    .fetch_one(&self.pool)
                    .await?
            }
            LovedEntity::Album(_) => {
                query_as("SELECT COUNT(*) FROM starred_albums WHERE entity_key = ?")
                    .bind(&key)
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(count > 0)
    }

    async fn set_loved_item(&self, entity: &LovedEntity, loved: bool) -> Result<PendingOperation> {
        let key = entity.key();
        let mut tx = self.pool.begin().await?;

        match (entity, loved) {
            (LovedEntity::Track(track), true) => {
                Self::ensure_loved_playlist_row(&mut tx).await?;

                let (existing,): (i64,) = query_as(
                    "SELECT COUNT(*) FROM playlist_entries WHERE playlist_id = ? AND entity_key = ?",
                )
                .bind(LOVED_ITEMS_PLAYLIST_ID)
                .bind(&key)
                .fetch_one(&mut *tx)
                .await?;

                if existing == 0 {
                    query(
                        r#"
                        INSERT INTO playlist_entries (playlist_id, position, entity_key, track_name, artist_name, album_name)
                        SELECT ?, COALESCE(MAX(position) + 1, 0), ?, ?, ?, ?
                        FROM playlist_entries WHERE playlist_id = ?
                        "#,
                    )
                    .bind(LOVED_ITEMS_PLAYLIST_ID)
                    .bind(&key)
                    .bind(&track.name)
                    .bind(&track.artist)
                    .bind(&track.album)
                    .bind(LOVED_ITEMS_PLAYLIST_ID)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            (LovedEntity::Track(_), false) => {
                query("DELETE FROM playlist_entries WHERE playlist_id = ? AND entity_key = ?")
                    .bind(LOVED_ITEMS_PLAYLIST_ID)
                    .bind(&key)
                    .execute(&mut *tx)
                    .await?;
            }
            (LovedEntity::Artist(artist), true) => {
                query(
                    r#"
                    INSERT OR IGNORE INTO starred_artists (entity_key, name, position)
                    SELECT ?, ?, COALESCE(MAX(position) + 1, 0) FROM starred_artists
                    "#,
                )
                .bind(&key)
                .bind(&artist.name)
                .execute(&mut *tx)
                .await?;
            }
            (LovedEntity::Artist(_), false) => {
                query("DELETE FROM starred_artists WHERE entity_key = ?")
                    .bind(&key)
                    .execute(&mut *tx)
                    .await?;
            }
            (LovedEntity::Album(album), true) => {
                query(
                    r#"
                    INSERT OR IGNORE INTO starred_albums (entity_key, name, artist_name, position)
                    SELECT ?, ?, ?, COALESCE(MAX(position) + 1, 0) FROM starred_albums
                    "#,
                )
                .bind(&key)
                .bind(&album.name)
                .bind(&album.artist)
                .execute(&mut *tx)
                .await?;
            }
            (LovedEntity::Album(_), false) => {
                query("DELETE FROM starred_albums WHERE entity_key = ?")
                    .bind(&key)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let op = Self::insert_op(
            &mut tx,
            &PendingAction::SetLoved {
                entity: entity.clone(),
                loved,
            },
        )
        .await?;

        tx.commit().await?;

        debug!(entity = %entity, loved, op_id = op.id, "Loved state recorded");
        Ok(op)
    }

    async fn starred_artists(&self) -> Result<Vec<ArtistRef>> {
        let rows: Vec<(String,)> =
            query_as("SELECT name FROM starred_artists ORDER BY position ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(name,)| ArtistRef { name }).collect())
    }

    async fn starred_albums(&self) -> Result<Vec<AlbumRef>> {
        let rows: Vec<(String, String)> =
            query_as("SELECT name, artist_name FROM starred_albums ORDER BY position ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(name, artist)| AlbumRef { name, artist })
            .collect())
    }

    async fn store_starred_artists(&self, artists: &[ArtistRef]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        query("DELETE FROM starred_artists").execute(&mut *tx).await?;
        for (position, artist) in artists.iter().enumerate() {
            query("INSERT OR IGNORE INTO starred_artists (entity_key, name, position) VALUES (?, ?, ?)")
                .bind(artist.key())
                .bind(&artist.name)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn store_starred_albums(&self, albums: &[AlbumRef]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        query("DELETE FROM starred_albums").execute(&mut *tx).await?;
        for (position, album) in albums.iter().enumerate() {
            query(
                "INSERT OR IGNORE INTO starred_albums (entity_key, name, artist_name, position) VALUES (?, ?, ?, ?)",
            )
            .bind(album.key())
            .bind(&album.name)
            .bind(&album.artist)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn log_op(&self, action: &PendingAction) -> Result<PendingOperation> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_op(&mut conn, action).await
    }

    async fn logged_ops(&self) -> Result<Vec<PendingOperation>> {
        let rows = query_as::<_, OpRow>("SELECT id, payload, created_at FROM op_log ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PendingOperation::try_from).collect()
    }

    async fn remove_logged_ops(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM op_log WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn get_logged_ops_count(&self) -> Result<u64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM op_log")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use core_runtime::events::SyncScope;

    async fn setup_store() -> SqliteLocalStore {
        SqliteLocalStore::new(create_test_pool().await.unwrap())
    }

    fn track(name: &str, artist: &str) -> TrackRef {
        TrackRef::new(name, artist)
    }

    #[tokio::test]
    async fn test_store_and_get_playlist() {
        let store = setup_store().await;
        let playlist = Playlist::new("p1", "Road Trip", "r1").with_entries(vec![
            track("Song A", "Artist").with_album("Album"),
            track("Song B", "Artist"),
        ]);

        store.store_playlist(&playlist).await.unwrap();

        let found = store.get_playlist("p1").await.unwrap().unwrap();
        assert_eq!(found, playlist);
        assert_eq!(store.get_playlist_track_count("p1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_store_playlist_replaces_entries_and_revision() {
        let store = setup_store().await;
        store
            .store_playlist(
                &Playlist::new("p1", "Mix", "r1").with_entries(vec![track("Old", "Artist")]),
            )
            .await
            .unwrap();

        store
            .store_playlist(
                &Playlist::new("p1", "Mix", "r2")
                    .with_entries(vec![track("New 1", "Artist"), track("New 2", "Artist")]),
            )
            .await
            .unwrap();

        let found = store.get_playlist("p1").await.unwrap().unwrap();
        assert_eq!(found.current_revision, "r2");
        assert_eq!(found.entries.len(), 2);
        assert_eq!(found.entries[0].name, "New 1");
    }

    #[tokio::test]
    async fn test_get_playlists_sorted_and_excludes_reserved() {
        let store = setup_store().await;
        store.store_playlist(&Playlist::new("p2", "beta", "r")).await.unwrap();
        store.store_playlist(&Playlist::new("p1", "Alpha", "r")).await.unwrap();
        store.store_playlist(&Playlist::loved_items()).await.unwrap();
        store
            .store_playlist(&Playlist::new(CACHED_PLAYLIST_ID, "Queue", ""))
            .await
            .unwrap();

        let playlists = store.get_playlists().await.unwrap();
        let ids: Vec<_> = playlists.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_delete_and_rename_report_existence() {
        let store = setup_store().await;
        store
            .store_playlist(&Playlist::new("p1", "Mix", "r1").with_entries(vec![track("A", "B")]))
            .await
            .unwrap();

        assert!(store.rename_playlist("p1", "Better Mix").await.unwrap());
        assert!(!store.rename_playlist("missing", "X").await.unwrap());
        assert_eq!(store.get_playlist("p1").await.unwrap().unwrap().name, "Better Mix");

        assert!(store.delete_playlist("p1").await.unwrap());
        assert!(!store.delete_playlist("p1").await.unwrap());
        assert_eq!(store.get_playlist_track_count("p1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rename_rejects_empty_name() {
        let store = setup_store().await;
        store.store_playlist(&Playlist::new("p1", "Mix", "r1")).await.unwrap();
        assert!(store.rename_playlist("p1", "  ").await.is_err());
    }

    #[tokio::test]
    async fn test_set_loved_track_is_deduplicated_and_logged() {
        let store = setup_store().await;
        let entity = LovedEntity::Track(track("Song", "Artist"));

        let first = store.set_loved_item(&entity, true).await.unwrap();
        let second = store
            .set_loved_item(&LovedEntity::Track(track("SONG ", "artist")), true)
            .await
            .unwrap();
        assert!(second.id > first.id);

        assert!(store.is_item_loved(&entity).await.unwrap());
        let loved = store.get_loved_items_playlist().await.unwrap().unwrap();
        assert_eq!(loved.entries.len(), 1);
        assert_eq!(store.get_logged_ops_count().await.unwrap(), 2);

        store.set_loved_item(&entity, false).await.unwrap();
        assert!(!store.is_item_loved(&entity).await.unwrap());
        assert_eq!(store.get_logged_ops_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_set_loved_artist_and_album() {
        let store = setup_store().await;
        let artist = LovedEntity::Artist(ArtistRef::new("Portishead"));
        let album = LovedEntity::Album(AlbumRef::new("Dummy", "Portishead"));

        store.set_loved_item(&artist, true).await.unwrap();
        store.set_loved_item(&album, true).await.unwrap();

        assert_eq!(store.starred_artists().await.unwrap(), vec![ArtistRef::new("Portishead")]);
        assert_eq!(
            store.starred_albums().await.unwrap(),
            vec![AlbumRef::new("Dummy", "Portishead")]
        );

        let ops = store.logged_ops().await.unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].scope(), SyncScope::StarredArtists);
        assert_eq!(ops[1].scope(), SyncScope::StarredAlbums);
    }

    #[tokio::test]
    async fn test_store_starred_replaces_wholesale() {
        let store = setup_store().await;
        store
            .store_starred_artists(&[ArtistRef::new("A"), ArtistRef::new("B"), ArtistRef::new("a")])
            .await
            .unwrap();
        assert_eq!(store.starred_artists().await.unwrap().len(), 2);

        store.store_starred_artists(&[ArtistRef::new("C")]).await.unwrap();
        assert_eq!(store.starred_artists().await.unwrap(), vec![ArtistRef::new("C")]);

        store.store_starred_albums(&[]).await.unwrap();
        assert!(store.starred_albums().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_op_log_round_trip_and_removal() {
        let store = setup_store().await;
        let delete = store
            .log_op(&PendingAction::DeletePlaylist {
                playlist_id: "p1".to_string(),
            })
            .await
            .unwrap();
        let love = store
            .set_loved_item(&LovedEntity::Artist(ArtistRef::new("X")), true)
            .await
            .unwrap();

        let ops = store.logged_ops().await.unwrap();
        assert_eq!(ops, vec![delete.clone(), love.clone()]);

        assert_eq!(store.remove_logged_ops(&[delete.id, 999]).await.unwrap(), 1);
        assert_eq!(store.remove_logged_ops(&[]).await.unwrap(), 0);
        assert_eq!(store.logged_ops().await.unwrap(), vec![love]);
    }

    #[tokio::test]
    async fn test_playlist_writes_publish_store_events() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let store = SqliteLocalStore::new(create_test_pool().await.unwrap()).with_event_bus(bus);

        store.store_playlist(&Playlist::new("p1", "Mix", "r1")).await.unwrap();
        store.rename_playlist("p1", "Mix 2").await.unwrap();
        store.delete_playlist("p1").await.unwrap();
        store.delete_playlist("p1").await.unwrap();

        for _ in 0..3 {
            let event = events.recv().await.unwrap();
            assert_eq!(
                event,
                CoreEvent::Store(StoreEvent::PlaylistsChanged {
                    playlist_id: "p1".to_string()
                })
            );
        }
        assert!(events.try_recv().is_err());
    }
}
