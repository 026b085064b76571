//! End-to-end handle lifecycle tests
//!
//! These tests drive the debug layer the way a translation shim would:
//! through the public `DebugContext` surface, against a host runtime
//! double that records every boundary crossing.

use std::cell::RefCell;
use std::rc::Rc;

use civet_bridge::{
    ABI_VERSION, BridgeContext, BridgeResult, CompareOp, HandleTracker, RawHandle, RuntimeApi,
};
use civet_debug::{ContextPool, DebugConfig, DebugContext, ViolationPolicy};
use civet_handle::codec::{box_index, decode_int, encode_int};

/// Host runtime double: a reference table with live/dead flags.
#[derive(Default)]
struct HostState {
    /// live[i] is true while reference slot FIRST + i is open.
    live: Vec<bool>,
    boundary_crossings: usize,
}

const FIRST: u32 = 0x4000;

#[derive(Default)]
struct HostRuntime {
    state: Rc<RefCell<HostState>>,
}

impl HostRuntime {
    fn alloc(&mut self) -> RawHandle {
        let mut state = self.state.borrow_mut();
        state.live.push(true);
        box_index(FIRST + (state.live.len() - 1) as u32)
    }

    fn crossed(&self) {
        self.state.borrow_mut().boundary_crossings += 1;
    }
}

impl RuntimeApi for HostRuntime {
    fn abi_version(&self) -> u32 {
        ABI_VERSION
    }

    fn dup(&mut self, _handle: RawHandle) -> BridgeResult<RawHandle> {
        self.crossed();
        Ok(self.alloc())
    }

    fn close(&mut self, handle: RawHandle) {
        self.crossed();
        if handle.is_boxed() {
            let index = civet_handle::codec::unbox_index(handle);
            if index >= FIRST {
                self.state.borrow_mut().live[(index - FIRST) as usize] = false;
            }
        }
    }

    fn add(&mut self, _: RawHandle, _: RawHandle) -> BridgeResult<RawHandle> {
        self.crossed();
        Ok(self.alloc())
    }

    fn sub(&mut self, _: RawHandle, _: RawHandle) -> BridgeResult<RawHandle> {
        self.crossed();
        Ok(self.alloc())
    }

    fn mul(&mut self, _: RawHandle, _: RawHandle) -> BridgeResult<RawHandle> {
        self.crossed();
        Ok(self.alloc())
    }

    fn div(&mut self, _: RawHandle, _: RawHandle) -> BridgeResult<RawHandle> {
        self.crossed();
        Ok(self.alloc())
    }

    fn compare(&mut self, _: CompareOp, _: RawHandle, _: RawHandle) -> BridgeResult<bool> {
        self.crossed();
        Ok(false)
    }
}

fn debug_context_with(config: DebugConfig) -> (DebugContext, Rc<RefCell<HostState>>, HostAllocator) {
    let state = Rc::new(RefCell::new(HostState::default()));
    let host = HostRuntime {
        state: Rc::clone(&state),
    };
    let alloc = HostAllocator {
        state: Rc::clone(&state),
    };
    let bridge = BridgeContext::new(Box::new(host)).unwrap();
    (DebugContext::new(bridge, config), state, alloc)
}

/// Allocates new host references from the test body (standing in for the
/// host runtime handing fresh handles across the boundary).
struct HostAllocator {
    state: Rc<RefCell<HostState>>,
}

impl HostAllocator {
    fn fresh(&self) -> RawHandle {
        let mut state = self.state.borrow_mut();
        state.live.push(true);
        box_index(FIRST + (state.live.len() - 1) as u32)
    }
}

fn collecting_config(log: &Rc<RefCell<Vec<String>>>) -> DebugConfig {
    let sink = Rc::clone(log);
    DebugConfig {
        on_invalid_handle: ViolationPolicy::Callback(Box::new(move |violation| {
            sink.borrow_mut().push(violation.message.clone());
        })),
        ..DebugConfig::default()
    }
}

#[test]
fn test_shim_function_with_tracker_leaks_nothing() {
    let (ctx, host, alloc) = debug_context_with(DebugConfig::default());

    // A shim-shaped function: produces three handles, tracks each
    // immediately, fails halfway through, closes everything on exit.
    let shim = |ctx: &DebugContext| -> Result<RawHandle, &'static str> {
        let mut tracker = HandleTracker::new(0).map_err(|_| "no memory")?;
        for _ in 0..3 {
            let h = ctx.open(alloc.fresh());
            tracker.add(h).map_err(|_| "no memory")?;
        }
        // Early error path: everything tracked so far must be closed.
        ctx.close_tracker(tracker);
        Err("conversion failed")
    };

    assert!(shim(&ctx).is_err());
    assert_eq!(ctx.open_handles(), 0);
    assert_eq!(ctx.quarantined_handles(), 3);

    // Push the three wrappers out of a size-2 quarantine; the host must
    // see its references die.
    ctx.configure(|config| config.max_quarantine_size = 2);
    let extra = ctx.open(alloc.fresh());
    ctx.close(extra);
    assert_eq!(ctx.quarantined_handles(), 2);
    ctx.flush_closes();
    let live = host.borrow().live.iter().filter(|&&l| l).count();
    // 4 references existed; 2 are still quarantined (alive), 2 were freed.
    assert_eq!(live, 2);
}

#[test]
fn test_mixed_inline_and_boxed_arithmetic() {
    let (ctx, host, alloc) = debug_context_with(DebugConfig::default());

    // Pure inline work never crosses the boundary.
    let five = encode_int(5);
    let three = encode_int(3);
    let eight = ctx.add(five, three).unwrap();
    assert_eq!(decode_int(eight), 8);
    assert_eq!(host.borrow().boundary_crossings, 0);

    // A boxed operand forces the slow path, and the result comes back
    // wrapped.
    let boxed = ctx.open(alloc.fresh());
    let result = ctx.add(boxed, encode_int(1)).unwrap();
    assert_eq!(host.borrow().boundary_crossings, 1);
    assert!(!ctx.unwrap(result).is_null());
}

#[test]
fn test_use_after_close_names_the_handle() {
    let violations = Rc::new(RefCell::new(Vec::new()));
    let (ctx, _, alloc) = debug_context_with(collecting_config(&violations));
    ctx.configure(|config| config.stacktrace_depth_limit = 8);

    let h = ctx.open(alloc.fresh());
    ctx.close(h);
    let _ = ctx.unwrap(h);

    let log = violations.borrow();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("already closed"), "{}", log[0]);
}

#[test]
fn test_context_pool_protocol_end_to_end() {
    let (ctx, _, alloc) = debug_context_with(DebugConfig::default());
    let pool = ContextPool::new(&ctx, 4);

    let outer_handle = ctx.open(alloc.fresh());
    let result = pool.call_extension(&ctx, |extension_ctx| {
        // The extension works with its own context and hands a value back.
        let h = extension_ctx.open(alloc.fresh());
        extension_ctx.close(h);
        extension_ctx.unwrap(outer_handle)
    });
    assert!(!result.is_null());
    assert!(ctx.is_valid());
    assert_eq!(ctx.unwrap(outer_handle), result);
}

#[test]
fn test_protected_data_budget_end_to_end() {
    let (ctx, _, alloc) = debug_context_with(DebugConfig::default());
    ctx.configure(|config| config.max_protected_bytes = 64);

    let a = ctx.open(alloc.fresh());
    let ptr = ctx.attach_data(a, &[7u8; 48], true).unwrap();
    // SAFETY: handle is open; region is readable.
    assert_eq!(unsafe { *ptr }, 7);
    ctx.close(a);
    assert_eq!(ctx.protected_bytes(), 48);

    // The next close would exceed the budget: its data is released, not
    // protected.
    let b = ctx.open(alloc.fresh());
    ctx.attach_data(b, &[9u8; 48], true).unwrap();
    ctx.close(b);
    assert_eq!(ctx.protected_bytes(), 48);
}
