//! The slow-path interface into the host runtime.
//!
//! Everything the bridge cannot resolve from inline handle bits crosses the
//! boundary through [`RuntimeApi`]. The trait is deliberately opaque: it
//! performs the real operation in the host runtime and returns a handle or
//! an error, and it may do arbitrary reentrant work while it is at it —
//! including calling back into extension code. The bridge never assumes
//! otherwise.

use civet_handle::{CompareOp, RawHandle};

use crate::error::BridgeResult;

/// ABI revision this bridge implements.
///
/// Checked once against [`RuntimeApi::abi_version`] when a
/// [`crate::BridgeContext`] is constructed; everything after that trusts the
/// trait object.
pub const ABI_VERSION: u32 = 1;

/// The opaque call into the host runtime.
///
/// Implementations must be correct for *all* handle words, including the
/// inline-encoded ones the fast paths also cover — the fast path is a pure
/// optimization and the bridge routes any operand pattern it declines here
/// unchanged.
pub trait RuntimeApi {
    /// The ABI revision the implementation was built against.
    fn abi_version(&self) -> u32;

    /// Duplicate a handle: returns a new handle denoting the same object.
    fn dup(&mut self, handle: RawHandle) -> BridgeResult<RawHandle>;

    /// Close a single handle, releasing the reference it holds.
    fn close(&mut self, handle: RawHandle);

    /// Close a batch of handles in one crossing.
    ///
    /// The default implementation closes them one at a time; hosts with a
    /// cheaper batched entry point should override it.
    fn bulk_close(&mut self, handles: &[RawHandle]) {
        for &handle in handles {
            self.close(handle);
        }
    }

    /// Addition in the host runtime's numeric domain.
    fn add(&mut self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle>;

    /// Subtraction in the host runtime's numeric domain.
    fn sub(&mut self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle>;

    /// Multiplication in the host runtime's numeric domain.
    fn mul(&mut self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle>;

    /// True division in the host runtime's numeric domain.
    fn div(&mut self, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<RawHandle>;

    /// Rich comparison in the host runtime.
    fn compare(&mut self, op: CompareOp, lhs: RawHandle, rhs: RawHandle) -> BridgeResult<bool>;
}
