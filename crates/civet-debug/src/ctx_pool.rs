//! The context pool: stale-context detection for extension calls.
//!
//! The slow path may reenter extension code at any time, and extensions
//! are only allowed to use the context they were *given* for the duration
//! of that one call. To make retention detectable, every call into
//! extension code goes through a pooled duplicate context: the caller's
//! context is marked invalid for the duration, the callee gets the next
//! pooled entry (marked valid), and on return the marks are swapped back.
//! An extension that stashed a context pointer finds it invalid on its
//! next use — a fatal protocol violation, caught before any queue
//! mutation.

use std::cell::Cell;
use std::rc::Rc;

use crate::context::DebugContext;

/// A fixed ring of duplicate contexts sharing one debug state.
pub struct ContextPool {
    entries: Vec<Rc<DebugContext>>,
    cursor: Cell<usize>,
}

impl ContextPool {
    /// Pre-duplicate `pool_size` copies of `base`. All entries share the
    /// base context's debug state and runtime; all start invalid.
    pub fn new(base: &DebugContext, pool_size: usize) -> Self {
        assert!(pool_size > 0, "context pool needs at least one entry");
        Self {
            entries: (0..pool_size).map(|_| Rc::new(base.duplicate())).collect(),
            cursor: Cell::new(0),
        }
    }

    /// Number of pooled entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the pool empty? (Never true; kept for API symmetry.)
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advance to the next pooled entry: the caller's context becomes
    /// invalid, the returned entry becomes valid.
    ///
    /// Most callers want [`ContextPool::call_extension`], which also
    /// restores validity on return.
    pub fn next(&self, caller: &DebugContext) -> Rc<DebugContext> {
        let index = (self.cursor.get() + 1) % self.entries.len();
        self.cursor.set(index);
        caller.set_valid(false);
        let callee = Rc::clone(&self.entries[index]);
        callee.set_valid(true);
        callee
    }

    /// Run a call into extension-supplied code under the full protocol:
    /// invalidate the caller, hand the callee the next pooled entry, and
    /// on return (normal or unwinding) restore the caller's validity and
    /// invalidate the callee's.
    pub fn call_extension<R>(&self, caller: &DebugContext, f: impl FnOnce(&DebugContext) -> R) -> R {
        let callee = self.next(caller);
        let _guard = ValidityGuard {
            caller,
            callee: Rc::clone(&callee),
        };
        f(&callee)
    }
}

/// Restores the caller/callee validity marks when a call returns, whether
/// normally or by unwinding.
struct ValidityGuard<'a> {
    caller: &'a DebugContext,
    callee: Rc<DebugContext>,
}

impl Drop for ValidityGuard<'_> {
    fn drop(&mut self) {
        self.callee.set_valid(false);
        self.caller.set_valid(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DebugConfig, ViolationPolicy};
    use crate::testutil::{MockRuntime, mock_bridge};
    use civet_bridge::RawHandle;
    use civet_handle::codec::box_index;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn base_ctx() -> DebugContext {
        let (bridge, _) = mock_bridge();
        let config = DebugConfig {
            // Keep violation reporting non-aborting; context staleness is
            // always fatal regardless.
            on_invalid_handle: ViolationPolicy::Callback(Box::new(|_| {})),
            ..DebugConfig::default()
        };
        DebugContext::new(bridge, config)
    }

    fn underlying(i: u32) -> RawHandle {
        box_index(MockRuntime::FIRST_INDEX + i)
    }

    #[test]
    fn test_call_protocol_swaps_validity() {
        let base = base_ctx();
        let pool = ContextPool::new(&base, 4);
        assert!(base.is_valid());

        pool.call_extension(&base, |callee| {
            assert!(callee.is_valid());
            assert!(!base.is_valid());
            // The callee context works normally during the call.
            let dh = callee.open(underlying(0));
            callee.close(dh);
        });

        assert!(base.is_valid());
    }

    #[test]
    fn test_nested_calls_round_robin() {
        let base = base_ctx();
        let pool = ContextPool::new(&base, 2);
        pool.call_extension(&base, |outer| {
            pool.call_extension(outer, |inner| {
                assert!(inner.is_valid());
                assert!(!outer.is_valid());
                assert!(!base.is_valid());
            });
            assert!(outer.is_valid());
            assert!(!base.is_valid());
        });
        assert!(base.is_valid());
    }

    #[test]
    fn test_stale_caller_detected_before_queue_mutation() {
        let base = base_ctx();
        let pool = ContextPool::new(&base, 4);
        let dh = base.open(underlying(0));
        let open_before = base.open_handles();
        let quarantined_before = base.quarantined_handles();

        pool.call_extension(&base, |_callee| {
            // Misbehaving extension: uses the caller's (invalid) context.
            let outcome = catch_unwind(AssertUnwindSafe(|| base.close(dh)));
            assert!(outcome.is_err(), "stale context use must be fatal");
        });

        // Detection happened before any queue was touched.
        assert_eq!(base.open_handles(), open_before);
        assert_eq!(base.quarantined_handles(), quarantined_before);
        // And the handle is still usable from a valid context.
        assert_eq!(base.unwrap(dh), underlying(0));
    }

    #[test]
    fn test_retained_context_is_detected_later() {
        let base = base_ctx();
        let pool = ContextPool::new(&base, 2);

        // Extension receives a pooled context and stashes it.
        let stashed = pool.next(&base);
        // Call protocol ends: callee invalidated, caller restored.
        stashed.set_valid(false);
        base.set_valid(true);

        let outcome = catch_unwind(AssertUnwindSafe(|| stashed.open(underlying(1))));
        assert!(outcome.is_err(), "retained context use must be fatal");
    }

    #[test]
    fn test_guard_restores_on_unwind() {
        let base = base_ctx();
        let pool = ContextPool::new(&base, 2);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            pool.call_extension(&base, |_callee| panic!("extension crashed"));
        }));
        assert!(outcome.is_err());
        // The guard still restored the caller's validity.
        assert!(base.is_valid());
    }
}
