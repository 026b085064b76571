//! Shared test double: a minimal host runtime with observable effects.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use civet_bridge::{ABI_VERSION, BridgeContext, BridgeResult, CompareOp, RawHandle, RuntimeApi};
use civet_handle::codec::box_index;

/// Observable side of [`MockRuntime`], shared with the test body.
#[derive(Default)]
pub(crate) struct MockLog {
    pub slow_calls: Cell<usize>,
    pub closed: RefCell<Vec<RawHandle>>,
}

pub(crate) struct MockRuntime {
    next_index: u32,
    log: Rc<MockLog>,
}

impl MockRuntime {
    /// First boxed index the mock hands out; far from singleton space.
    pub(crate) const FIRST_INDEX: u32 = 0x1000;

    pub(crate) fn new() -> (MockRuntime, Rc<MockLog>) {
        let log = Rc::new(MockLog::default());
        (
            MockRuntime {
                next_index: Self::FIRST_INDEX,
                log: Rc::clone(&log),
            },
            log,
        )
    }

    fn fresh(&mut self) -> RawHandle {
        let index = self.next_index;
        self.next_index += 1;
        box_index(index)
    }

    fn count(&self) {
        self.log.slow_calls.set(self.log.slow_calls.get() + 1);
    }
}

impl RuntimeApi for MockRuntime {
    fn abi_version(&self) -> u32 {
        ABI_VERSION
    }

    fn dup(&mut self, _handle: RawHandle) -> BridgeResult<RawHandle> {
        self.count();
        Ok(self.fresh())
    }

    fn close(&mut self, handle: RawHandle) {
        self.count();
        self.log.closed.borrow_mut().push(handle);
    }

    fn add(&mut self, _: RawHandle, _: RawHandle) -> BridgeResult<RawHandle> {
        self.count();
        Ok(self.fresh())
    }

    fn sub(&mut self, _: RawHandle, _: RawHandle) -> BridgeResult<RawHandle> {
        self.count();
        Ok(self.fresh())
    }

    fn mul(&mut self, _: RawHandle, _: RawHandle) -> BridgeResult<RawHandle> {
        self.count();
        Ok(self.fresh())
    }

    fn div(&mut self, _: RawHandle, _: RawHandle) -> BridgeResult<RawHandle> {
        self.count();
        Ok(self.fresh())
    }

    fn compare(&mut self, _: CompareOp, _: RawHandle, _: RawHandle) -> BridgeResult<bool> {
        self.count();
        Ok(false)
    }
}

/// A bridge context over a fresh mock, plus the mock's log.
pub(crate) fn mock_bridge() -> (BridgeContext, Rc<MockLog>) {
    let (mock, log) = MockRuntime::new();
    (BridgeContext::new(Box::new(mock)).unwrap(), log)
}
