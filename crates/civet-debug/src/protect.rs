//! Protected copies of raw data handed out to extensions.
//!
//! Accessor shims that return raw pointers into object storage copy the
//! bytes into a `ProtectedRegion` first. While the owning handle is open
//! the region is readable; when the handle closes the region is
//! *protected* — on unix the pages are remapped `PROT_NONE` so a stale
//! read faults immediately, elsewhere the bytes are overwritten with a
//! repeating poison pattern so a stale read returns garbage instead of the
//! old contents.
//!
//! The strategy is selected at build time; both provide the same contract:
//! `copy` → `as_ptr`/`len` → `protect` (best-effort revocation) → drop
//! (release). `protect` must be treated as best-effort: the poison
//! strategy does not revoke access, it only corrupts it.

use civet_bridge::{BridgeError, BridgeResult};

/// Pattern written over released-but-retained data by the poison strategy.
#[cfg(not(unix))]
const POISON_BYTE: u8 = 0x5A;

#[cfg(unix)]
mod imp {
    use super::*;

    /// An anonymous private mapping holding a copy of caller data.
    pub struct ProtectedRegion {
        ptr: *mut u8,
        len: usize,
        protected: bool,
    }

    impl ProtectedRegion {
        /// Copy `data` into a fresh anonymous mapping.
        ///
        /// With `make_readonly` the mapping is immediately downgraded to
        /// read-only, so even writes through the handed-out pointer fault.
        /// Mapping exhaustion surfaces as [`BridgeError::NoMemory`].
        pub fn copy(data: &[u8], make_readonly: bool) -> BridgeResult<Self> {
            let len = data.len();
            if len == 0 {
                return Ok(Self {
                    ptr: std::ptr::NonNull::<u8>::dangling().as_ptr(),
                    len: 0,
                    protected: false,
                });
            }
            // SAFETY: anonymous private mapping, no fd, offset 0.
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(BridgeError::NoMemory);
            }
            let ptr = ptr as *mut u8;
            // SAFETY: the mapping is at least `len` bytes and disjoint
            // from `data` (freshly mapped).
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, len);
            }
            if make_readonly {
                // SAFETY: ptr/len describe the mapping created above.
                let rc = unsafe { libc::mprotect(ptr as *mut libc::c_void, len, libc::PROT_READ) };
                if rc != 0 {
                    tracing::warn!(len, "mprotect(PROT_READ) failed; region stays writable");
                }
            }
            Ok(Self {
                ptr,
                len,
                protected: false,
            })
        }

        /// Revoke read access to the region.
        ///
        /// Best-effort: on mprotect failure the region stays readable and
        /// a warning is logged; the bookkeeping still treats it as
        /// protected so the budget accounting stays consistent.
        pub fn protect(&mut self) {
            if self.len > 0 {
                // SAFETY: ptr/len describe a live mapping owned by self.
                let rc = unsafe {
                    libc::mprotect(self.ptr as *mut libc::c_void, self.len, libc::PROT_NONE)
                };
                if rc != 0 {
                    tracing::warn!(len = self.len, "mprotect(PROT_NONE) failed");
                }
            }
            self.protected = true;
        }

        /// Pointer to the copied bytes.
        pub fn as_ptr(&self) -> *const u8 {
            self.ptr
        }

        /// Length of the copied bytes.
        pub fn len(&self) -> usize {
            self.len
        }

        /// Is the region empty?
        pub fn is_empty(&self) -> bool {
            self.len == 0
        }

        /// Has read access been revoked?
        pub fn is_protected(&self) -> bool {
            self.protected
        }
    }

    impl Drop for ProtectedRegion {
        fn drop(&mut self) {
            if self.len > 0 {
                // SAFETY: ptr/len describe the mapping created in `copy`;
                // munmap works regardless of current protection.
                unsafe {
                    libc::munmap(self.ptr as *mut libc::c_void, self.len);
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::*;

    /// A heap copy of caller data, poisoned instead of truly protected.
    pub struct ProtectedRegion {
        data: Box<[u8]>,
        protected: bool,
    }

    impl ProtectedRegion {
        /// Copy `data` onto the heap. `make_readonly` is accepted for
        /// contract parity but cannot be enforced by this strategy.
        pub fn copy(data: &[u8], make_readonly: bool) -> BridgeResult<Self> {
            let _ = make_readonly;
            let mut copy = Vec::new();
            copy.try_reserve_exact(data.len())
                .map_err(|_| BridgeError::NoMemory)?;
            copy.extend_from_slice(data);
            Ok(Self {
                data: copy.into_boxed_slice(),
                protected: false,
            })
        }

        /// Overwrite the bytes with the poison pattern. Does not revoke
        /// access; a stale read sees garbage, not a fault.
        pub fn protect(&mut self) {
            self.data.fill(POISON_BYTE);
            self.protected = true;
        }

        /// Pointer to the copied bytes.
        pub fn as_ptr(&self) -> *const u8 {
            self.data.as_ptr()
        }

        /// Length of the copied bytes.
        pub fn len(&self) -> usize {
            self.data.len()
        }

        /// Is the region empty?
        pub fn is_empty(&self) -> bool {
            self.data.is_empty()
        }

        /// Has the poison pattern been applied?
        pub fn is_protected(&self) -> bool {
            self.protected
        }
    }
}

pub use imp::ProtectedRegion;
