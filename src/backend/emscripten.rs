//! Emscripten backend over Asyncify fibers.
//!
//! WebAssembly gives no access to the native call stack, so suspension goes
//! through Asyncify: `emscripten_fiber_swap` unwinds the live wasm frames into a
//! side buffer and rewinds the target's. That makes transfers orders of magnitude
//! slower than the assembly backends, and the whole arrangement is as
//! experimental as the toolchain feature it rides on.
//!
//! Each fiber needs both a C stack and an Asyncify unwind buffer. The caller's
//! buffer is split in two for this, so the usable stack is smaller than nominal.
//! The main context only needs the Asyncify half, which lives in a thread local.

use std::cell::UnsafeCell;
use std::mem;
use std::ptr;

use libc::{c_int, c_void};

use crate::trace::trace;
use crate::Entry;

/// Smallest stack `initialize` accepts. Half of it goes to the Asyncify buffer.
pub const MIN_STACK_SIZE: usize = 1024;

pub const LIMITED_ADDRESS_SPACE: bool = true;

/// Largest slice of a context's buffer given to Asyncify.
const MAX_ASYNCIFY_STACK: usize = 1024 * 1024;

/// Asyncify buffer for the main context, one per thread.
const MAIN_ASYNCIFY_STACK: usize = 64 * 1024;

thread_local! {
    static MAIN_ASYNCIFY: UnsafeCell<[u8; MAIN_ASYNCIFY_STACK]> =
        UnsafeCell::new([0; MAIN_ASYNCIFY_STACK]);
}

#[repr(C)]
struct AsyncifyData {
    stack_ptr: *mut c_void,
    stack_limit: *mut c_void,
    rewind_id: c_int,
}

/// Mirror of `emscripten_fiber_t`. Only ever filled in by the emscripten calls.
#[repr(C)]
struct FiberState {
    stack_base: *mut c_void,
    stack_limit: *mut c_void,
    stack_ptr: *mut c_void,
    entry: Option<unsafe extern "C" fn(*mut c_void)>,
    user_data: *mut c_void,
    asyncify_data: AsyncifyData,
}

extern "C" {
    fn emscripten_fiber_init(
        fiber: *mut FiberState,
        entry: unsafe extern "C" fn(*mut c_void),
        user_data: *mut c_void,
        c_stack: *mut c_void,
        c_stack_size: usize,
        asyncify_stack: *mut c_void,
        asyncify_stack_size: usize,
    );
    fn emscripten_fiber_init_from_current_context(
        fiber: *mut FiberState,
        asyncify_stack: *mut c_void,
        asyncify_stack_size: usize,
    );
    fn emscripten_fiber_swap(old_fiber: *mut FiberState, new_fiber: *mut FiberState);
}

/// One execution context backed by an Asyncify fiber.
///
/// The record must stay at a fixed address between initialization and `destroy`:
/// the fiber state is registered with the runtime and suspended transfers hold
/// raw pointers to the record.
#[repr(C)]
pub struct Context {
    state: FiberState,
    from: *mut Context,
    entry: Option<Entry>,
    stack: *mut u8,
    stack_size: usize,
}

impl Context {
    /// Returns a blank record. It becomes usable after one of the initialize calls.
    pub fn empty() -> Context {
        Context {
            state: unsafe { mem::zeroed() },
            from: ptr::null_mut(),
            entry: None,
            stack: ptr::null_mut(),
            stack_size: 0,
        }
    }

    /// Marks this record as the context the caller is already running on, wiring
    /// the thread's Asyncify buffer into it.
    ///
    /// # Safety
    ///
    /// Must be called on a blank record, at most once per native thread, before
    /// any transfer happens on that thread. The record must not move afterwards.
    pub unsafe fn initialize_main(&mut self) {
        debug_assert!(self.stack.is_null() && self.entry.is_none());
        self.from = ptr::null_mut();
        MAIN_ASYNCIFY.with(|buffer| {
            emscripten_fiber_init_from_current_context(
                &mut self.state,
                buffer.get() as *mut c_void,
                MAIN_ASYNCIFY_STACK,
            );
        });
    }

    /// Prepares this record so the first transfer into it runs `entry(from, self)`.
    /// The buffer is split into an Asyncify half (capped at 1 MB) and a C stack
    /// half.
    ///
    /// # Safety
    ///
    /// `stack` must point to `size` writable bytes owned by the caller and kept
    /// alive until the context is destroyed, with `size` at least
    /// [MIN_STACK_SIZE](constant.MIN_STACK_SIZE.html). The record must not move
    /// afterwards.
    pub unsafe fn initialize(&mut self, entry: Entry, stack: *mut u8, size: usize) {
        debug_assert!(!stack.is_null());
        debug_assert!(size >= MIN_STACK_SIZE);

        self.entry = Some(entry);
        self.stack = stack;
        self.stack_size = size;
        self.from = ptr::null_mut();

        let asyncify_size = (size / 2).min(MAX_ASYNCIFY_STACK);
        trace!(
            "initialized {:p}: {} byte stack, {} byte asyncify buffer",
            self as *mut Context,
            size - asyncify_size,
            asyncify_size
        );
        emscripten_fiber_init(
            &mut self.state,
            trampoline,
            self as *mut Context as *mut c_void,
            stack.add(asyncify_size) as *mut c_void,
            size - asyncify_size,
            stack as *mut c_void,
            asyncify_size,
        );
    }

    /// Suspends `current` and resumes `target`, returning `target` once something
    /// transfers back into `current`. The resumed side can read who woke it
    /// through [from](#method.from).
    ///
    /// # Safety
    ///
    /// Both pointers must be valid initialized records belonging to the calling
    /// thread, and `target` must be suspended or never yet resumed.
    pub unsafe fn transfer(current: *mut Context, target: *mut Context) -> *mut Context {
        let previous = (*target).from;
        (*target).from = current;

        emscripten_fiber_swap(&mut (*current).state, &mut (*target).state);

        (*target).from = previous;
        target
    }

    /// Releases backend bookkeeping. The fiber state holds no OS handle, so this
    /// only clears the record for reuse. The caller still owns the stack memory.
    ///
    /// # Safety
    ///
    /// The context must not be running and must never be transferred into again.
    pub unsafe fn destroy(&mut self) {
        trace!("destroying {:p}", self as *mut Context);
        self.state = mem::zeroed();
        self.entry = None;
        self.stack = ptr::null_mut();
        self.stack_size = 0;
        self.from = ptr::null_mut();
    }

    /// The context that most recently transferred into this one. Meaningful until
    /// the transfer that set it returns on the other side.
    pub fn from(&self) -> *mut Context {
        self.from
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe { self.destroy() };
    }
}

// First code to run on a fresh fiber.
unsafe extern "C" fn trampoline(user_data: *mut c_void) {
    let context = user_data as *mut Context;
    trace!("context {:p} starting", context);
    match (*context).entry {
        Some(entry) => entry((*context).from, context),
        None => unreachable!("transfer into a context that was never initialized"),
    }
}
