//! Debug handle slots and the arena that owns them.
//!
//! A debug-wrapped boxed handle is an index into [`HandleArena`]. The word
//! the extension holds encodes `SINGLETON_LIMIT + slot`, so wrapper indices
//! can never collide with the immortal singleton range, and the rest of
//! the workspace keeps treating debug handles as ordinary boxed words.
//!
//! Slots carry their own intrusive queue links (`prev`/`next` slot
//! indices), so moving a handle between the open and quarantine queues
//! never allocates.

use civet_bridge::RawHandle;
use civet_handle::SINGLETON_LIMIT;
use civet_handle::codec::{box_index, unbox_index};

use crate::protect::ProtectedRegion;
use crate::trace::AllocationTrace;

/// One wrapper for one boxed handle.
pub(crate) struct DebugHandle {
    /// The wrapped boxed handle. `NULL` while the slot is free.
    pub referenced: RawHandle,
    /// Generation counter snapshot at open.
    pub generation: u64,
    /// Matches quarantine membership at all times.
    pub is_closed: bool,
    /// Raw data handed out to the extension, owned until protected/freed.
    pub associated_data: Option<ProtectedRegion>,
    /// Allocation site, captured when tracing is enabled.
    pub allocation_trace: Option<AllocationTrace>,
    /// Intrusive queue link: previous slot.
    pub prev: Option<u32>,
    /// Intrusive queue link: next slot.
    pub next: Option<u32>,
    /// Slot occupancy; free slots sit on the arena free list.
    pub occupied: bool,
}

impl DebugHandle {
    fn vacant() -> Self {
        Self {
            referenced: RawHandle::NULL,
            generation: 0,
            is_closed: false,
            associated_data: None,
            allocation_trace: None,
            prev: None,
            next: None,
            occupied: false,
        }
    }
}

/// Slot storage for debug handles: a vector plus a free list.
///
/// Freed slots are recycled before the vector grows, which keeps wrapper
/// indices dense and bounds arena growth by the peak number of
/// simultaneously live-or-quarantined handles.
pub(crate) struct HandleArena {
    slots: Vec<DebugHandle>,
    free: Vec<u32>,
}

impl HandleArena {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Claim a slot (recycled or fresh). The slot comes back vacant but
    /// marked occupied; the caller initializes its fields.
    pub(crate) fn allocate(&mut self) -> u32 {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(DebugHandle::vacant());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        debug_assert!(!slot.occupied);
        slot.occupied = true;
        index
    }

    /// Return a slot to the free list. The caller must already have
    /// removed it from any queue and released its contents.
    pub(crate) fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.occupied);
        debug_assert!(slot.associated_data.is_none());
        *slot = DebugHandle::vacant();
        self.free.push(index);
    }

    pub(crate) fn slot(&self, index: u32) -> &DebugHandle {
        &self.slots[index as usize]
    }

    pub(crate) fn slot_mut(&mut self, index: u32) -> &mut DebugHandle {
        &mut self.slots[index as usize]
    }

    /// Look up an occupied slot, or `None` for out-of-range / vacant
    /// indices (a corrupted or long-freed debug word).
    pub(crate) fn lookup(&self, index: u32) -> Option<&DebugHandle> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.occupied)
    }

    /// Number of slots ever created (occupied + free).
    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// The ABI word for a wrapper slot.
pub(crate) fn slot_to_word(index: u32) -> RawHandle {
    box_index(SINGLETON_LIMIT + index)
}

/// The wrapper slot for an ABI word, if the word is in wrapper space.
pub(crate) fn word_to_slot(handle: RawHandle) -> Option<u32> {
    if handle.is_boxed() && !handle.is_singleton() {
        Some(unbox_index(handle) - SINGLETON_LIMIT)
    } else {
        None
    }
}
