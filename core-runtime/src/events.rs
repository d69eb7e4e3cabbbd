//! # Event Bus System
//!
//! Typed publish/subscribe channel built on `tokio::sync::broadcast`. It
//! connects the three upstream notification sources (remote result delivery,
//! pending-log drained, local store changes) with the reconciliation engine,
//! and carries the engine's "collection updated" signal out to the UI layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  ResultsReported /  ┌───────────┐
//! │ RemoteSync  ├────OpLogEmptied────>│           │     subscribe    ┌────────────┐
//! └─────────────┘                     │ EventBus  ├─────────────────>│   Engine   │
//! ┌─────────────┐  PlaylistsChanged   │ (broadcast│                  └─────┬──────┘
//! │ LocalStore  ├────────────────────>│  channel) │<───── Updated ─────────┘
//! └─────────────┘                     │           ├─────────────────>  UI / host
//!                                     └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CollectionEvent, CoreEvent, EventBus, UpdateCause};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Collection(CollectionEvent::Updated {
//!         cause: UpdateCause::PlaylistCreated,
//!     }))
//!     .ok();
//!
//! let received = stream.recv().await.unwrap();
//! assert!(matches!(received, CoreEvent::Collection(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal;
//!   consumers that depend on every event must resynchronise from the store.
//! - **`RecvError::Closed`**: all senders dropped; treat as shutdown.
//!
//! `emit` fails when nobody is subscribed. Publishers in this workspace
//! ignore that error with `.ok()`: notifications are advisory and consumers
//! re-query state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Notifications raised by the remote sync bridge
    Remote(RemoteEvent),
    /// Notifications raised by the local store
    Store(StoreEvent),
    /// Collection changes published for consumers (UI)
    Collection(CollectionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Remote(e) => e.description(),
            CoreEvent::Store(e) => e.description(),
            CoreEvent::Collection(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Remote(RemoteEvent::OpLogEmptied { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Level at which a consumer logs an event it received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
}

/// Class of remotely synchronised state.
///
/// Used to route "pending log drained" notifications back to the fetch that
/// was deferred, and to tag pending operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncScope {
    Playlists,
    LovedItems,
    StarredArtists,
    StarredAlbums,
}

impl SyncScope {
    pub const ALL: [SyncScope; 4] = [
        SyncScope::Playlists,
        SyncScope::LovedItems,
        SyncScope::StarredArtists,
        SyncScope::StarredAlbums,
    ];

    /// String representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncScope::Playlists => "playlists",
            SyncScope::LovedItems => "loved_items",
            SyncScope::StarredArtists => "starred_artists",
            SyncScope::StarredAlbums => "starred_albums",
        }
    }

    /// Parse the database representation
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scope| scope.as_str() == s)
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Remote Events
// ============================================================================

/// Events published by the remote sync bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RemoteEvent {
    /// The result for an issued request is ready to be fetched.
    ResultsReported {
        /// Correlation id handed out when the request was issued.
        request_id: String,
    },
    /// Every logged operation of a scope has been delivered.
    OpLogEmptied {
        /// Which state class may now be fetched again.
        scope: SyncScope,
    },
}

impl RemoteEvent {
    fn description(&self) -> &str {
        match self {
            RemoteEvent::ResultsReported { .. } => "Remote results reported",
            RemoteEvent::OpLogEmptied { .. } => "Pending operation log emptied",
        }
    }
}

// ============================================================================
// Store Events
// ============================================================================

/// Events published by the local store after durable writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum StoreEvent {
    /// A playlist row or its entries were written or removed.
    PlaylistsChanged {
        /// The playlist that changed.
        playlist_id: String,
    },
}

impl StoreEvent {
    fn description(&self) -> &str {
        match self {
            StoreEvent::PlaylistsChanged { .. } => "Stored playlists changed",
        }
    }
}

// ============================================================================
// Collection Events
// ============================================================================

/// What kind of local mutation produced a collection update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateCause {
    PlaylistCreated,
    PlaylistDeleted,
    PlaylistRenamed,
    PlaylistRefreshed,
    LovedItemsReplaced,
    LovedToggled,
    StarredReplaced,
    CacheRefreshed,
}

/// The single "collection changed" signal.
///
/// Consumers re-query state instead of applying a diff; `cause` is
/// informational.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CollectionEvent {
    Updated { cause: UpdateCause },
}

impl CollectionEvent {
    fn description(&self) -> &str {
        match self {
            CollectionEvent::Updated { .. } => "Collection updated",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when nobody is subscribed.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn updated(cause: UpdateCause) -> CoreEvent {
        CoreEvent::Collection(CollectionEvent::Updated { cause })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(updated(UpdateCause::LovedToggled)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Remote(RemoteEvent::ResultsReported {
            request_id: "req-1".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for _ in 0..5 {
            bus.emit(updated(UpdateCause::CacheRefreshed)).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity_and_description() {
        let drained = CoreEvent::Remote(RemoteEvent::OpLogEmptied {
            scope: SyncScope::LovedItems,
        });
        assert_eq!(drained.severity(), EventSeverity::Info);
        assert_eq!(drained.description(), "Pending operation log emptied");

        let store = CoreEvent::Store(StoreEvent::PlaylistsChanged {
            playlist_id: "p1".to_string(),
        });
        assert_eq!(store.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_sync_scope_round_trips_through_db_string() {
        for scope in SyncScope::ALL {
            assert_eq!(SyncScope::parse(scope.as_str()), Some(scope));
        }
        assert_eq!(SyncScope::parse("tracks"), None);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = CoreEvent::Remote(RemoteEvent::OpLogEmptied {
            scope: SyncScope::StarredAlbums,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Remote\""));
        assert!(json.contains("starred_albums"));

        let decoded: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }
}
