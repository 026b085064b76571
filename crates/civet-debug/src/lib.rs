//! # Civet debug mode
//!
//! Lifecycle instrumentation for handles crossing the extension ABI.
//! Extension bugs this layer exists to catch:
//!
//! - **use-after-close**: every boxed handle handed to an extension is
//!   wrapped in a [`state::DebugState`] arena slot; closed wrappers sit in
//!   a bounded FIFO quarantine so a stale word is recognized instead of
//!   aliasing a live object;
//! - **reads through stale raw pointers**: data handed out by accessor
//!   shims is copied into [`protect::ProtectedRegion`]s whose read access
//!   is revoked (or poisoned) the moment the owning handle closes;
//! - **retained execution contexts**: every call into extension code goes
//!   through a [`ContextPool`] entry; an extension that stashes the context
//!   pointer across a call boundary finds it marked invalid.
//!
//! The debug layer is a strict wrapper: inline-encoded primitives and
//! immortal singletons flow through untouched, and everything it forwards
//! reaches the same [`civet_bridge::BridgeContext`] fast/slow paths a
//! release build would use.
//!
//! None of these types are `Send` or `Sync`: a `DebugState` and the
//! contexts sharing it belong to exactly one thread, matching the
//! single-owner model of the rest of the bridge.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod context;
pub mod ctx_pool;
pub mod protect;
pub mod state;

mod handle;
mod queue;
#[cfg(test)]
mod testutil;
mod trace;

pub use context::DebugContext;
pub use ctx_pool::ContextPool;
pub use state::{
    BuilderId, BuilderKind, DebugConfig, Violation, ViolationKind, ViolationPolicy,
};
