//! # Collection Library Module
//!
//! Owns the local collection cache and the pending operation log.
//!
//! ## Overview
//!
//! This crate manages:
//! - SQLite schema, migrations and connection pooling (`db`)
//! - Domain models for playlists, loved items and pending operations (`models`)
//! - The [`LocalStore`](store::LocalStore) contract and its SQLite
//!   implementation (`store`)

pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use error::{LibraryError, Result};
pub use store::{LocalStore, SqliteLocalStore};
