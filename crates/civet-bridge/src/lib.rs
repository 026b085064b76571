//! # Civet bridge
//!
//! The ABI surface that translation shims program against: the
//! [`RuntimeApi`] slow-path trait (the opaque call into the host runtime),
//! the [`BridgeContext`] that fronts it with inline fast paths and close
//! buffering, and the [`HandleTracker`] that bulk-closes handles on every
//! exit path of a shim function.
//!
//! Handles stay opaque [`RawHandle`] words throughout; only the
//! `civet-handle` codec interprets their bits.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod api;
pub mod context;
pub mod error;
pub mod tracker;

pub use api::{ABI_VERSION, RuntimeApi};
pub use context::BridgeContext;
pub use error::{BridgeError, BridgeResult};
pub use tracker::HandleTracker;

pub use civet_handle::{CompareOp, RawHandle};
