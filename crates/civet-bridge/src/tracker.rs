//! Bulk handle tracking.
//!
//! A shim function with many early-return error paths cannot be trusted to
//! close every handle it produced on every path. The tracker makes that
//! structural: every mid-function handle is `add`ed the moment it exists,
//! and one `close` on the way out (any way out) releases the whole set in
//! insertion order.

use civet_handle::RawHandle;

use crate::context::BridgeContext;
use crate::error::{BridgeError, BridgeResult};

/// A growable collection of handles closed in bulk on any exit path.
///
/// Owns its array, not the referenced objects. `add` grows the storage
/// geometrically; the starting capacity is a hint, not a cap, and the only
/// way `add` fails is genuine allocation failure — it never drops a handle
/// silently.
pub struct HandleTracker {
    handles: Vec<RawHandle>,
}

impl HandleTracker {
    /// Create a tracker with room for `capacity` handles before the first
    /// regrowth.
    pub fn new(capacity: usize) -> BridgeResult<Self> {
        let mut handles = Vec::new();
        handles
            .try_reserve(capacity)
            .map_err(|_| BridgeError::NoMemory)?;
        Ok(Self { handles })
    }

    /// Track one handle.
    pub fn add(&mut self, handle: RawHandle) -> BridgeResult<()> {
        self.handles
            .try_reserve(1)
            .map_err(|_| BridgeError::NoMemory)?;
        self.handles.push(handle);
        Ok(())
    }

    /// Number of tracked handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Is the tracker empty?
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Forget every tracked handle without closing it.
    ///
    /// Used when ownership of the handles has been transferred elsewhere
    /// (e.g. into a freshly built collection) and closing them here would
    /// double-release.
    pub fn forget_all(&mut self) {
        self.handles.clear();
    }

    /// Close every tracked handle in insertion order and release the
    /// tracker's storage.
    pub fn close(self, ctx: &mut BridgeContext) {
        self.close_with(|handle| ctx.close(handle));
    }

    /// Close every tracked handle in insertion order through an arbitrary
    /// closer (the debug layer routes this through its own close).
    pub fn close_with(mut self, mut close: impl FnMut(RawHandle)) {
        for handle in self.handles.drain(..) {
            close(handle);
        }
    }
}
