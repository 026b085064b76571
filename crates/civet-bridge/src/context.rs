//! The bridge context: fast paths in front of the slow path.
//!
//! A `BridgeContext` owns the [`RuntimeApi`] trait object and is what the
//! translation shims call. Numeric operations try the inline fast path
//! first and only cross the boundary when an operand is not
//! inline-decodable. Closes of boxed handles are buffered and flushed in
//! bulk to amortize crossings.

use civet_handle::{CompareOp, FastPath, RawHandle, arith};

use crate::api::{ABI_VERSION, RuntimeApi};
use crate::error::{BridgeError, BridgeResult};

/// Closed boxed handles are buffered up to this many before one bulk
/// crossing releases them all.
const CLOSE_BUFFER_CAPACITY: usize = 32;

/// The per-family execution context handed to translation shims.
pub struct BridgeContext {
    api: Box<dyn RuntimeApi>,
    /// Boxed handles closed by the extension but not yet released in the
    /// host. Flushed when full and on drop.
    pending_closes: Vec<RawHandle>,
}

impl BridgeContext {
    /// Wrap a host runtime implementation.
    ///
    /// The ABI revision is checked once here; a mismatch refuses the whole
    /// context rather than failing call-by-call later.
    pub fn new(api: Box<dyn RuntimeApi>) -> BridgeResult<Self> {
        let required = api.abi_version();
        if required != ABI_VERSION {
            return Err(BridgeError::AbiMismatch {
                required,
                provided: ABI_VERSION,
            });
        }
        Ok(Self {
            api,
            pending_closes: Vec::with_capacity(CLOSE_BUFFER_CAPACITY),
        })
    }

    /// Direct access to the slow path.
    pub fn api_mut(&mut self) -> &mut dyn RuntimeApi {
        self.api.as_mut()
    }

    /// Is this the null handle?
    #[inline]
    pub fn is_null(&self, handle: RawHandle) -> bool {
        handle.is_null()
    }

    /// Duplicate a handle.
    ///
    /// Inline primitives and immortal singletons are their own duplicates;
    /// only real boxed references cross the boundary.
    pub fn dup(&mut self, handle: RawHandle) -> BridgeResult<RawHandle> {
        if !handle.is_boxed() || handle.is_singleton() {
            return Ok(handle);
        }
        self.api.dup(handle)
    }

    /// Close a handle.
    ///
    /// Null, inline, and singleton handles have nothing to release. Boxed
    /// handles are buffered; the host sees them in one bulk crossing when
    /// the buffer fills or the context is flushed.
    pub fn close(&mut self, handle: RawHandle) {
        if handle.is_null() || !handle.is_boxed() || handle.is_singleton() {
            return;
        }
        self.pending_closes.push(handle);
        if self.pending_closes.len() >= CLOSE_BUFFER_CAPACITY {
            self.flush_closes();
        }
    }

    /// Release every buffered close now.
    pub fn flush_closes(&mut self) {
        if self.pending_closes.is_empty() {
            return;
        }
        tracing::trace!(count = self.pending_closes.len(), "bulk-closing handles");
        self.api.bulk_close(&self.pending_closes);
        self.pending_closes.clear();
    }

    /// Number of closes currently buffered. Exposed for tests and teardown
    /// diagnostics.
    pub fn pending_close_count(&self) -> usize {
        self.pending_closes.len()
    }

    /// Addition with the inline fast path.
    pub fn add(&mut self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle> {
        match arith::add(lhs, rhs) {
            FastPath::Computed(r) => Ok(r),
            FastPath::DivideByZero => Err(BridgeError::DivideByZero),
            FastPath::Fallback => self.api.add(lhs, rhs),
        }
    }

    /// Subtraction with the inline fast path.
    pub fn sub(&mut self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle> {
        match arith::sub(lhs, rhs) {
            FastPath::Computed(r) => Ok(r),
            FastPath::DivideByZero => Err(BridgeError::DivideByZero),
            FastPath::Fallback => self.api.sub(lhs, rhs),
        }
    }

    /// Multiplication with the inline fast path.
    pub fn mul(&mut self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle> {
        match arith::mul(lhs, rhs) {
            FastPath::Computed(r) => Ok(r),
            FastPath::DivideByZero => Err(BridgeError::DivideByZero),
            FastPath::Fallback => self.api.mul(lhs, rhs),
        }
    }

    /// True division with the inline fast path.
    ///
    /// A zero divisor is reported as [`BridgeError::DivideByZero`] without
    /// consulting the slow path — the same error the host would raise.
    pub fn div(&mut self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle> {
        match arith::div(lhs, rhs) {
            FastPath::Computed(r) => Ok(r),
            FastPath::DivideByZero => Err(BridgeError::DivideByZero),
            FastPath::Fallback => self.api.div(lhs, rhs),
        }
    }

    /// Rich comparison with the inline fast path.
    pub fn compare(&mut self, op: CompareOp, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<bool> {
        match arith::compare(op, lhs, rhs) {
            FastPath::Computed(r) => Ok(r),
            FastPath::DivideByZero => Err(BridgeError::DivideByZero),
            FastPath::Fallback => self.api.compare(op, lhs, rhs),
        }
    }
}

impl Drop for BridgeContext {
    fn drop(&mut self) {
        self.flush_closes();
    }
}
