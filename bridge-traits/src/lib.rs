//! # Host Bridge Traits
//!
//! Contracts between the collection sync core and the host application.
//!
//! ## Overview
//!
//! The core never talks to the remote music service or to the platform logger
//! directly. Hosts hand in implementations of the traits defined here (and of
//! `core_sync::remote::RemoteSync`, which needs the library models), and every
//! failure that crosses that boundary is reported as a [`BridgeError`].
//!
//! ## Traits
//!
//! - [`LoggerSink`](logger::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Host implementations should:
//!
//! - Convert transport and platform errors to `BridgeError`
//! - Use [`BridgeError::Rejected`] when the remote service answered but refused
//!   the operation, so callers can tell it apart from connectivity problems
//! - Keep messages actionable (include the operation or resource involved)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across tokio
//! tasks behind an `Arc`.

pub mod error;
pub mod logger;

pub use error::BridgeError;
pub use logger::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
