//! Debug-mode bookkeeping: configuration, queues, budgets, and the
//! open/close/free state machine for wrapped handles.
//!
//! A wrapper lives in exactly one of two intrusive queues. `open` holds
//! every handle the extension may still use; `closed` is the bounded FIFO
//! quarantine of handles the extension has given up. Quarantined wrappers
//! keep their slot (and their underlying reference) alive so a stale word
//! is *recognized* — only capacity pressure finally frees them.

use civet_bridge::{BridgeContext, BridgeError, BridgeResult, RawHandle};

use crate::handle::{HandleArena, slot_to_word, word_to_slot};
use crate::protect::ProtectedRegion;
use crate::queue::HandleQueue;
use crate::trace::AllocationTrace;

/// What a protocol violation was.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    /// An operation dereferenced a handle that was already closed.
    ClosedHandleUse,
    /// An operation named a word that denotes no live or quarantined
    /// wrapper (freed long ago, or corrupted).
    UnknownHandle,
    /// A builder handle was reused after build/cancel, or used with the
    /// wrong kind.
    BuilderMisuse,
}

/// A detected protocol violation, handed to callback policies.
#[derive(Debug)]
pub struct Violation {
    /// Violation category.
    pub kind: ViolationKind,
    /// The offending handle word (null for builder violations).
    pub handle: RawHandle,
    /// Generation of the wrapper, when one exists.
    pub generation: Option<u64>,
    /// Human-readable diagnostic.
    pub message: String,
    /// Rendered allocation trace of the wrapper, when captured.
    pub allocation_trace: Option<String>,
}

/// What to do when extension code violates the handle protocol.
///
/// The default aborts: a violation means the extension has already broken
/// the boundary's safety guarantees. The callback variant is an escape
/// hatch for migrating extensions — it suppresses the abort and lets
/// execution continue with the underlying reference still treated as
/// valid, which does *not* restore correctness.
pub enum ViolationPolicy {
    /// Log a diagnostic (with allocation trace, if captured) and abort
    /// the process.
    Abort,
    /// Invoke the callback and continue.
    Callback(Box<dyn FnMut(&Violation)>),
}

impl std::fmt::Debug for ViolationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationPolicy::Abort => f.write_str("Abort"),
            ViolationPolicy::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Debug-mode configuration.
///
/// Runtime-settable through [`crate::DebugContext::configure`]; limits
/// take effect for subsequently created handles (and at the next close,
/// for the quarantine bound).
#[derive(Debug)]
pub struct DebugConfig {
    /// Closed wrappers retained before the oldest is freed.
    pub max_quarantine_size: usize,
    /// Byte budget for protected raw-data copies; a close that would
    /// exceed it releases the data immediately instead of protecting it.
    pub max_protected_bytes: usize,
    /// Frames to capture at handle open; `0` disables capture.
    pub stacktrace_depth_limit: usize,
    /// Policy for invalid handle use.
    pub on_invalid_handle: ViolationPolicy,
    /// Policy for invalid builder-handle use.
    pub on_invalid_builder_handle: ViolationPolicy,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            max_quarantine_size: 1024,
            max_protected_bytes: 10 * 1024 * 1024,
            stacktrace_depth_limit: 0,
            on_invalid_handle: ViolationPolicy::Abort,
            on_invalid_builder_handle: ViolationPolicy::Abort,
        }
    }
}

/// The kind of an incremental collection builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderKind {
    /// Mutable-sequence builder.
    List,
    /// Immutable-sequence builder.
    Tuple,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuilderStatus {
    Open,
    Consumed,
    Cancelled,
}

struct BuilderSlot {
    kind: BuilderKind,
    status: BuilderStatus,
    allocation_trace: Option<AllocationTrace>,
}

/// Opaque identifier of a tracked builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuilderId(u32);

/// Family-scoped debug bookkeeping, shared by all pooled contexts.
pub struct DebugState {
    arena: HandleArena,
    open: HandleQueue,
    closed: HandleQueue,
    config: DebugConfig,
    current_generation: u64,
    protected_bytes_in_use: usize,
    builders: Vec<BuilderSlot>,
}

impl DebugState {
    /// Fresh state with the given configuration.
    pub fn new(config: DebugConfig) -> Self {
        Self {
            arena: HandleArena::new(),
            open: HandleQueue::new(),
            closed: HandleQueue::new(),
            config,
            current_generation: 0,
            protected_bytes_in_use: 0,
            builders: Vec::new(),
        }
    }

    /// Mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut DebugConfig {
        &mut self.config
    }

    /// Number of wrappers the extension may still use.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Number of wrappers sitting in the quarantine.
    pub fn quarantine_count(&self) -> usize {
        self.closed.len()
    }

    /// Bytes currently held in protected regions.
    pub fn protected_bytes_in_use(&self) -> usize {
        self.protected_bytes_in_use
    }

    /// Closed flag of a wrapper word, or `None` if the word denotes no
    /// wrapper.
    pub fn is_wrapper_closed(&self, handle: RawHandle) -> Option<bool> {
        let index = word_to_slot(handle)?;
        self.arena.lookup(index).map(|slot| slot.is_closed)
    }

    /// Generation of a wrapper word, or `None` if the word denotes no
    /// wrapper.
    pub fn generation_of(&self, handle: RawHandle) -> Option<u64> {
        let index = word_to_slot(handle)?;
        self.arena.lookup(index).map(|slot| slot.generation)
    }

    /// Wrap a handle arriving from the host runtime.
    ///
    /// Null, inline primitives, and immortal singletons pass through
    /// unwrapped. If the quarantine is at capacity, the oldest closed
    /// wrapper's storage is recycled for the new one (fully freeing its
    /// previous occupant); otherwise a slot is claimed from the arena.
    pub(crate) fn open(&mut self, runtime: &mut BridgeContext, underlying: RawHandle) -> RawHandle {
        if underlying.is_null() || !underlying.is_boxed() || underlying.is_singleton() {
            return underlying;
        }
        let recycled = if self.closed.len() >= self.config.max_quarantine_size {
            self.closed.pop_front(&mut self.arena)
        } else {
            None
        };
        let index = match recycled {
            Some(index) => {
                tracing::trace!(slot = index, "recycling quarantined wrapper for open");
                self.release_slot_contents(runtime, index);
                index
            }
            None => self.arena.allocate(),
        };

        self.current_generation += 1;
        let generation = self.current_generation;
        let trace = AllocationTrace::capture(self.config.stacktrace_depth_limit);
        let slot = self.arena.slot_mut(index);
        slot.referenced = underlying;
        slot.generation = generation;
        slot.is_closed = false;
        slot.allocation_trace = trace;
        self.open.append(&mut self.arena, index);

        tracing::trace!(slot = index, generation, "opened debug handle");
        slot_to_word(index)
    }

    /// Close a wrapper: move it to the quarantine and protect (or
    /// force-release) its associated data.
    ///
    /// Idempotent on already-closed wrappers — the deliberate counterpart
    /// of the non-fatal recovery path, where a callback policy lets
    /// execution continue after a double close was reported.
    pub(crate) fn close(&mut self, runtime: &mut BridgeContext, handle: RawHandle) {
        let Some(index) = word_to_slot(handle) else {
            return; // null, inline, singleton: nothing to release
        };
        let Some(slot) = self.arena.lookup(index) else {
            self.report_unknown(handle, "close of");
            return;
        };
        if slot.is_closed {
            return;
        }

        self.open.remove(&mut self.arena, index);
        self.arena.slot_mut(index).is_closed = true;
        self.closed.append(&mut self.arena, index);

        // Protect associated data, or release it on the spot when the
        // budget would overflow (accepted data loss, not a leak).
        let budget = self.config.max_protected_bytes;
        let in_use = self.protected_bytes_in_use;
        let slot = self.arena.slot_mut(index);
        let data_len = slot.associated_data.as_ref().map(|region| region.len());
        if let Some(len) = data_len {
            if in_use + len <= budget {
                if let Some(region) = slot.associated_data.as_mut() {
                    region.protect();
                }
                self.protected_bytes_in_use += len;
                tracing::trace!(slot = index, len, "protected raw data of closed handle");
            } else {
                slot.associated_data = None;
                tracing::debug!(
                    slot = index,
                    len,
                    in_use,
                    budget,
                    "protected-data budget exceeded; releasing immediately"
                );
            }
        }

        // Quarantine bound: evict and fully free the oldest entries
        // within this same call.
        while self.closed.len() > self.config.max_quarantine_size {
            if let Some(oldest) = self.closed.pop_front(&mut self.arena) {
                tracing::debug!(slot = oldest, "quarantine over capacity; freeing oldest");
                self.free_slot(runtime, oldest);
            }
        }
    }

    /// Close that treats "already closed" as an invalid-use event instead
    /// of a no-op. Entry points use this when the extension is supposed to
    /// own the handle it is closing.
    pub(crate) fn close_and_validate(&mut self, runtime: &mut BridgeContext, handle: RawHandle) {
        if let Some(index) = word_to_slot(handle)
            && let Some(slot) = self.arena.lookup(index)
            && slot.is_closed
        {
            self.report_closed(handle, index, "close of");
            return;
        }
        self.close(runtime, handle);
    }

    /// Resolve a wrapper word to its underlying handle for an operation.
    ///
    /// Dereferencing a closed wrapper is an invalid-use event; under a
    /// callback policy the underlying reference is still returned and
    /// treated as valid by callers (the documented compromise).
    pub(crate) fn unwrap_for_use(&mut self, handle: RawHandle) -> RawHandle {
        let Some(index) = word_to_slot(handle) else {
            return handle; // null and inline primitives are their own value
        };
        match self.arena.lookup(index) {
            None => {
                self.report_unknown(handle, "use of");
                RawHandle::NULL
            }
            Some(slot) => {
                let referenced = slot.referenced;
                if slot.is_closed {
                    self.report_closed(handle, index, "use of");
                }
                referenced
            }
        }
    }

    /// Copy accessor-returned raw data into a protected region owned by
    /// the wrapper, replacing any previous region, and hand back the
    /// pointer the shim gives to the extension.
    pub(crate) fn attach_data(
        &mut self,
        handle: RawHandle,
        data: &[u8],
        make_readonly: bool,
    ) -> BridgeResult<*const u8> {
        let Some(index) = word_to_slot(handle) else {
            return Err(BridgeError::type_error(
                "raw data can only be attached to boxed handles",
            ));
        };
        let Some(slot) = self.arena.lookup(index) else {
            self.report_unknown(handle, "raw-data attach to");
            return Err(BridgeError::system("raw-data attach to unknown handle"));
        };
        if slot.is_closed {
            self.report_closed(handle, index, "raw-data attach to");
        }
        let region = ProtectedRegion::copy(data, make_readonly)?;
        let ptr = region.as_ptr();
        let slot = self.arena.slot_mut(index);
        if let Some(old) = slot.associated_data.replace(region)
            && old.is_protected()
        {
            self.protected_bytes_in_use -= old.len();
        }
        Ok(ptr)
    }

    /// Track a new collection builder.
    pub(crate) fn builder_open(&mut self, kind: BuilderKind) -> BuilderId {
        let trace = AllocationTrace::capture(self.config.stacktrace_depth_limit);
        self.builders.push(BuilderSlot {
            kind,
            status: BuilderStatus::Open,
            allocation_trace: trace,
        });
        BuilderId((self.builders.len() - 1) as u32)
    }

    /// Mark a builder consumed by a successful build. Returns whether the
    /// lifecycle was valid.
    pub(crate) fn builder_build(&mut self, id: BuilderId, kind: BuilderKind) -> bool {
        self.builder_finish(id, kind, BuilderStatus::Consumed, "build")
    }

    /// Mark a builder explicitly cancelled. Returns whether the lifecycle
    /// was valid.
    pub(crate) fn builder_cancel(&mut self, id: BuilderId, kind: BuilderKind) -> bool {
        self.builder_finish(id, kind, BuilderStatus::Cancelled, "cancel")
    }

    fn builder_finish(
        &mut self,
        id: BuilderId,
        kind: BuilderKind,
        terminal: BuilderStatus,
        op: &str,
    ) -> bool {
        let recorded = self
            .builders
            .get(id.0 as usize)
            .map(|slot| (slot.kind, slot.status));
        match recorded {
            None => {
                self.report_builder(format!("{op} of unknown builder {:?}", id));
                false
            }
            Some((_, status)) if status != BuilderStatus::Open => {
                let how = if status == BuilderStatus::Consumed {
                    "consumed by build"
                } else {
                    "cancelled"
                };
                self.report_builder(format!("{op} of builder {id:?} which was already {how}"));
                false
            }
            Some((recorded_kind, _)) if recorded_kind != kind => {
                self.report_builder(format!(
                    "{op} of {kind:?} builder {:?} which was opened as {recorded_kind:?}",
                    id
                ));
                false
            }
            Some(_) => {
                // Both terminal transitions release the backing store the
                // same way.
                let slot = &mut self.builders[id.0 as usize];
                slot.status = terminal;
                slot.allocation_trace = None;
                true
            }
        }
    }

    /// Fully free a wrapper: release data and trace, close the underlying
    /// reference, and return the slot to the arena.
    fn free_slot(&mut self, runtime: &mut BridgeContext, index: u32) {
        self.release_slot_contents(runtime, index);
        self.arena.release(index);
    }

    /// Release a wrapper's contents without giving up the slot (shared by
    /// full free and storage recycling on open).
    fn release_slot_contents(&mut self, runtime: &mut BridgeContext, index: u32) {
        let slot = self.arena.slot_mut(index);
        if let Some(region) = slot.associated_data.take() {
            if region.is_protected() {
                self.protected_bytes_in_use -= region.len();
            }
            drop(region);
        }
        slot.allocation_trace = None;
        let underlying = slot.referenced;
        slot.referenced = RawHandle::NULL;
        slot.is_closed = false;
        runtime.close(underlying);
    }

    fn report_closed(&mut self, handle: RawHandle, index: u32, what: &str) {
        let slot = self.arena.slot(index);
        let violation = Violation {
            kind: ViolationKind::ClosedHandleUse,
            handle,
            generation: Some(slot.generation),
            message: format!(
                "{what} {handle:?} (generation {}): handle is already closed",
                slot.generation
            ),
            allocation_trace: slot.allocation_trace.as_ref().map(|t| t.as_str().to_owned()),
        };
        run_policy(&mut self.config.on_invalid_handle, &violation);
    }

    fn report_unknown(&mut self, handle: RawHandle, what: &str) {
        let violation = Violation {
            kind: ViolationKind::UnknownHandle,
            handle,
            generation: None,
            message: format!("{what} {handle:?}: no such debug handle"),
            allocation_trace: None,
        };
        run_policy(&mut self.config.on_invalid_handle, &violation);
    }

    fn report_builder(&mut self, message: String) {
        let violation = Violation {
            kind: ViolationKind::BuilderMisuse,
            handle: RawHandle::NULL,
            generation: None,
            message,
            allocation_trace: None,
        };
        run_policy(&mut self.config.on_invalid_builder_handle, &violation);
    }
}

/// Log a violation and dispatch the configured policy.
fn run_policy(policy: &mut ViolationPolicy, violation: &Violation) {
    tracing::error!(kind = ?violation.kind, message = %violation.message, "handle protocol violation");
    if let Some(trace) = &violation.allocation_trace {
        tracing::error!("offending handle was allocated at:\n{trace}");
    }
    match policy {
        ViolationPolicy::Abort => {
            eprintln!("civet-debug fatal: {}", violation.message);
            if let Some(trace) = &violation.allocation_trace {
                eprintln!("offending handle was allocated at:\n{trace}");
            }
            std::process::abort();
        }
        ViolationPolicy::Callback(callback) => callback(violation),
    }
}
