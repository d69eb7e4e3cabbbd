//! Workspace placeholder crate.
//!
//! Exposes the collection sync service behind the default `service` feature so
//! host applications can depend on a single crate instead of wiring
//! `core-service`, `core-sync` and `core-library` individually.

#[cfg(feature = "service")]
pub use core_service::*;
