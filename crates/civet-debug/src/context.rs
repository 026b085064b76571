//! The debug execution context.
//!
//! A `DebugContext` is what translation shims hold in debug builds. It
//! fronts the shared [`DebugState`] and the family's
//! [`BridgeContext`]: handles going out to the extension are wrapped,
//! handles coming back in are unwrapped (with use-after-close detection),
//! and everything else is forwarded to the bridge unchanged.
//!
//! Every operation checks the context's own validity flag first — before
//! touching any queue — so a context retained across a call boundary is a
//! detected, attributable failure rather than silent corruption (see
//! [`crate::ContextPool`]).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use civet_bridge::{BridgeContext, BridgeResult, CompareOp, HandleTracker, RawHandle};

use crate::state::{BuilderId, BuilderKind, DebugConfig, DebugState};

/// A debug-instrumented execution context.
///
/// Pooled duplicates (see [`crate::ContextPool`]) share one `DebugState`
/// and one `BridgeContext` via `Rc`; the validity flag is per-duplicate.
/// Not `Send`/`Sync`: one context family belongs to one thread.
pub struct DebugContext {
    state: Rc<RefCell<DebugState>>,
    runtime: Rc<RefCell<BridgeContext>>,
    valid: Cell<bool>,
}

impl DebugContext {
    /// Wrap a bridge context with fresh debug state.
    pub fn new(runtime: BridgeContext, config: DebugConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(DebugState::new(config))),
            runtime: Rc::new(RefCell::new(runtime)),
            valid: Cell::new(true),
        }
    }

    /// A duplicate sharing this context's state and runtime, initially
    /// invalid. Only the pool hands out valid duplicates.
    pub(crate) fn duplicate(&self) -> DebugContext {
        DebugContext {
            state: Rc::clone(&self.state),
            runtime: Rc::clone(&self.runtime),
            valid: Cell::new(false),
        }
    }

    /// May this context be used right now?
    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    pub(crate) fn set_valid(&self, valid: bool) {
        self.valid.set(valid);
    }

    /// Adjust the debug configuration; takes effect for subsequently
    /// created handles.
    pub fn configure(&self, f: impl FnOnce(&mut DebugConfig)) {
        f(self.state.borrow_mut().config_mut());
    }

    fn ensure_valid(&self) {
        if !self.valid.get() {
            tracing::error!(
                "stale execution context used: the extension retained a context pointer \
                 across a call boundary"
            );
            panic!("stale execution context used across a call boundary");
        }
    }

    /// Wrap a handle arriving from the host runtime.
    pub fn open(&self, underlying: RawHandle) -> RawHandle {
        self.ensure_valid();
        let mut runtime = self.runtime.borrow_mut();
        self.state.borrow_mut().open(&mut runtime, underlying)
    }

    /// Close a handle (idempotent).
    pub fn close(&self, handle: RawHandle) {
        self.ensure_valid();
        let mut runtime = self.runtime.borrow_mut();
        self.state.borrow_mut().close(&mut runtime, handle);
    }

    /// Close a handle, reporting an invalid-use event if it was already
    /// closed.
    pub fn close_and_validate(&self, handle: RawHandle) {
        self.ensure_valid();
        let mut runtime = self.runtime.borrow_mut();
        self.state.borrow_mut().close_and_validate(&mut runtime, handle);
    }

    /// Resolve a debug word to the underlying handle.
    pub fn unwrap(&self, handle: RawHandle) -> RawHandle {
        self.ensure_valid();
        self.state.borrow_mut().unwrap_for_use(handle)
    }

    /// Is this the null handle?
    pub fn is_null(&self, handle: RawHandle) -> bool {
        self.ensure_valid();
        handle.is_null()
    }

    /// Duplicate a handle; the duplicate gets its own wrapper.
    pub fn dup(&self, handle: RawHandle) -> BridgeResult<RawHandle> {
        self.ensure_valid();
        let underlying = self.state.borrow_mut().unwrap_for_use(handle);
        let duplicated = self.runtime.borrow_mut().dup(underlying)?;
        let mut runtime = self.runtime.borrow_mut();
        Ok(self.state.borrow_mut().open(&mut runtime, duplicated))
    }

    /// Copy raw data for `handle` into a protected region and return the
    /// pointer to hand to the extension.
    pub fn attach_data(
        &self,
        handle: RawHandle,
        data: &[u8],
        make_readonly: bool,
    ) -> BridgeResult<*const u8> {
        self.ensure_valid();
        self.state
            .borrow_mut()
            .attach_data(handle, data, make_readonly)
    }

    /// Addition; operands are unwrapped, the result is wrapped.
    pub fn add(&self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle> {
        self.binary_op(lhs, rhs, BridgeContext::add)
    }

    /// Subtraction; operands are unwrapped, the result is wrapped.
    pub fn sub(&self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle> {
        self.binary_op(lhs, rhs, BridgeContext::sub)
    }

    /// Multiplication; operands are unwrapped, the result is wrapped.
    pub fn mul(&self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle> {
        self.binary_op(lhs, rhs, BridgeContext::mul)
    }

    /// True division; operands are unwrapped, the result is wrapped.
    pub fn div(&self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle> {
        self.binary_op(lhs, rhs, BridgeContext::div)
    }

    /// Rich comparison.
    pub fn compare(&self, op: CompareOp, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<bool> {
        self.ensure_valid();
        let (lhs, rhs) = {
            let mut state = self.state.borrow_mut();
            (state.unwrap_for_use(lhs), state.unwrap_for_use(rhs))
        };
        self.runtime.borrow_mut().compare(op, lhs, rhs)
    }

    /// Track a new collection builder.
    pub fn builder_open(&self, kind: BuilderKind) -> BuilderId {
        self.ensure_valid();
        self.state.borrow_mut().builder_open(kind)
    }

    /// Consume a builder on successful build. Returns whether the
    /// lifecycle was valid.
    pub fn builder_build(&self, id: BuilderId, kind: BuilderKind) -> bool {
        self.ensure_valid();
        self.state.borrow_mut().builder_build(id, kind)
    }

    /// Cancel a builder. Returns whether the lifecycle was valid.
    pub fn builder_cancel(&self, id: BuilderId, kind: BuilderKind) -> bool {
        self.ensure_valid();
        self.state.borrow_mut().builder_cancel(id, kind)
    }

    /// Flush buffered slow-path closes to the host. Useful at teardown
    /// and in tests that observe host-side liveness.
    pub fn flush_closes(&self) {
        self.ensure_valid();
        self.runtime.borrow_mut().flush_closes();
    }

    /// Close every handle a tracker collected, in insertion order.
    pub fn close_tracker(&self, tracker: HandleTracker) {
        self.ensure_valid();
        tracker.close_with(|handle| {
            let mut runtime = self.runtime.borrow_mut();
            self.state.borrow_mut().close(&mut runtime, handle);
        });
    }

    /// Number of wrappers the extension may still use.
    pub fn open_handles(&self) -> usize {
        self.state.borrow().open_count()
    }

    /// Number of wrappers in the quarantine.
    pub fn quarantined_handles(&self) -> usize {
        self.state.borrow().quarantine_count()
    }

    /// Bytes currently held in protected regions.
    pub fn protected_bytes(&self) -> usize {
        self.state.borrow().protected_bytes_in_use()
    }

    fn binary_op(
        &self,
        lhs: RawHandle,
        rhs: RawHandle,
        op: impl FnOnce(&mut BridgeContext, RawHandle, RawHandle) -> BridgeResult<RawHandle>,
    ) -> BridgeResult<RawHandle> {
        self.ensure_valid();
        let (lhs, rhs) = {
            let mut state = self.state.borrow_mut();
            (state.unwrap_for_use(lhs), state.unwrap_for_use(rhs))
        };
        let result = op(&mut *self.runtime.borrow_mut(), lhs, rhs)?;
        let mut runtime = self.runtime.borrow_mut();
        Ok(self.state.borrow_mut().open(&mut runtime, result))
    }
}
