//! # Collection Sync Module
//!
//! Reconciles the local collection cache with a remote music service.
//!
//! ## Overview
//!
//! The remote answers requests asynchronously: the engine hands it a
//! request id, and the remote later announces on the event bus that the
//! result for that id is ready. This module manages:
//! - Correlating results with issued requests, each applied at most once
//! - Merging remote playlist listings into the local store
//! - Replacing loved items and starred artists/albums from remote snapshots
//! - Deferring fetches while locally logged operations are undelivered
//! - The registry of known collections
//!
//! ## Components
//!
//! - **Request Tracker** (`request_tracker`): Outstanding request ids, gated by request class
//! - **Remote Contract** (`remote`): `RemoteSync` trait and result payloads
//! - **Merge Planner** (`reconcile`): Pure playlist merge planning
//! - **Collection Registry** (`registry`): Known collections, sorted by name
//! - **Reconciliation Engine** (`engine`): Event-driven orchestration of all of the above

pub mod engine;
pub mod error;
pub mod reconcile;
pub mod registry;
pub mod remote;
pub mod request_tracker;

pub use engine::{FetchOutcome, ReconciliationEngine};
pub use error::{Result, SyncError};
pub use reconcile::{plan_playlist_sync, PlaylistAction, ReconcileSummary};
pub use registry::{
    Collection, CollectionKind, CollectionRegistry, LocalLibraryCollection, RemoteCollection,
};
pub use remote::{RemotePayload, RemoteRequest, RemoteSync, SocialActionType};
pub use request_tracker::{RequestId, RequestKind, RequestTracker};
