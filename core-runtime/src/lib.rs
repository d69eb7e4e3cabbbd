//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the collection sync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the library, sync and
//! service crates depend on. It establishes the logging conventions, the
//! configuration contract, and the typed publish/subscribe channel that
//! replaces platform broadcasts between the remote service, the local store
//! and the reconciliation engine.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
