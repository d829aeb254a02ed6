//! Portable POSIX backend built on the `ucontext` family.
//!
//! `swapcontext` moves more state than the assembly backends (including the signal
//! mask on some platforms), so this is the slowest native backend, but it runs
//! anywhere libc implements `makecontext`.
//!
//! POSIX only guarantees that `makecontext` forwards int-sized arguments, so the
//! record address crosses into the trampoline as two `c_uint` halves and is
//! reassembled there.

use std::mem;
use std::ptr;

use libc::{c_uint, getcontext, makecontext, swapcontext, ucontext_t};

use crate::trace::trace;
use crate::Entry;

/// Smallest stack `initialize` accepts.
pub const MIN_STACK_SIZE: usize = 1024;

/// Hint for stack providers to default to small reservations.
pub const LIMITED_ADDRESS_SPACE: bool = cfg!(target_pointer_width = "32");

/// One execution context backed by a `ucontext_t`.
///
/// The record must stay at a fixed address between initialization and `destroy`:
/// `ucontext_t` may point into itself on some libcs, and every suspended transfer
/// holds raw pointers to the record.
#[repr(C)]
pub struct Context {
    state: ucontext_t,
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

    /// Marks this record as the context of the stack the caller is already running on.
    ///
    /// # Safety
    ///
    /// Must be called on a blank record, at most once per native thread, before any
    /// transfer happens on that thread. The record must not move afterwards.
    pub unsafe fn initialize_main(&mut self) {
        debug_assert!(self.stack.is_null() && self.entry.is_none());
        self.from = ptr::null_mut();
        // The state is captured by the first swapcontext out of this context.
    }

    /// Prepares this record so the first transfer into it runs `entry(from, self)`
    /// on the given stack.
    ///
    /// # Safety
    ///
    /// `stack` must point to `size` writable bytes owned by the caller and kept
    /// alive until the context is destroyed, with `size` at least
    /// [MIN_STACK_SIZE](constant.MIN_STACK_SIZE.html). The record must not move
    /// afterwards: the trampoline is linked to this exact address.
    pub unsafe fn initialize(&mut self, entry: Entry, stack: *mut u8, size: usize) {
        debug_assert!(!stack.is_null());
        debug_assert!(size >= MIN_STACK_SIZE);

        self.entry = Some(entry);
        self.stack = stack;
        self.stack_size = size;
        self.from = ptr::null_mut();

        let rc = getcontext(&mut self.state);
        debug_assert_eq!(rc, 0);
        self.state.uc_stack.ss_sp = stack as *mut libc::c_void;
        self.state.uc_stack.ss_size = size;
        self.state.uc_stack.ss_flags = 0;
        self.state.uc_link = ptr::null_mut();

        let address = self as *mut Context as usize as u64;
        let hi = (address >> 32) as c_uint;
        let lo = (address & 0xFFFF_FFFF) as c_uint;
        let target =
            mem::transmute::<unsafe extern "C" fn(c_uint, c_uint), extern "C" fn()>(trampoline);
        makecontext(&mut self.state, target, 2, hi, lo);
        trace!("initialized {:p} with a {} byte stack", self as *mut Context, size);
    }

    /// Suspends `current` and resumes `target`, returning `target` once something
    /// transfers back into `current`.
    ///
    /// The resumed side can read who woke it through [from](#method.from) for the
    /// duration of its turn.
    ///
    /// # Safety
    ///
    /// Both pointers must be valid initialized records belonging to the calling
    /// thread, and `target` must be suspended or never yet resumed. Transfers are
    /// strictly sequential per thread; this is a cooperative switch, not a
    /// synchronization point.
    pub unsafe fn transfer(current: *mut Context, target: *mut Context) -> *mut Context {
        let previous = (*target).from;
        (*target).from = current;

        let rc = swapcontext(&mut (*current).state, &(*target).state);
        debug_assert_eq!(rc, 0);

        (*target).from = previous;
        target
    }

    /// Releases backend bookkeeping. The caller still owns and frees the stack.
    ///
    /// No OS handle sits behind a ucontext record, so this only clears the record
    /// for reuse.
    ///
    /// # Safety
    ///
    /// The context must not be running and must never be transferred into again.
    pub unsafe fn destroy(&mut self) {
        trace!("destroying {:p}", self as *mut Context);
        self.entry = None;
        self.stack = ptr::null_mut();
        self.stack_size = 0;
        self.from = ptr::null_mut();
    }

    /// The context that most recently transferred into this one.
    ///
    /// Meaningful from the moment something transfers in until that transfer call
    /// returns on the other side; outside that window the previous value has been
    /// restored.
    pub fn from(&self) -> *mut Context {
        self.from
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe { self.destroy() };
    }
}

// First code to run on a fresh context. Reassembles the record address from the
// two int-sized halves makecontext smuggled through.
unsafe extern "C" fn trampoline(hi: c_uint, lo: c_uint) {
    let address = ((hi as u64) << 32) | (lo as u64);
    let context = address as usize as *mut Context;
    trace!("context {:p} starting", context);
    match (*context).entry {
        Some(entry) => entry((*context).from, context),
        None => unreachable!("transfer into a context that was never initialized"),
    }
}
