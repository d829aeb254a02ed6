//! 32-bit ARM backend.
//!
//! The smallest switch in the crate: AAPCS leaves r0-r3 for arguments, so the
//! routine only moves r4-r11 and the link register by hand. A fresh context
//! needs no trampoline at all. Its program counter slot points straight at the
//! entry function, and the transfer arguments riding r0/r1 through the switch
//! are already the `(from, current)` pair the entry function expects.

use std::arch::naked_asm;
use std::ptr;

use crate::trace::trace;
use crate::Entry;

/// Smallest stack `initialize` accepts.
pub const MIN_STACK_SIZE: usize = 1024;

pub const LIMITED_ADDRESS_SPACE: bool = true;

/// One execution context. The saved stack pointer must stay at offset zero; the
/// switch routine addresses the record through it.
#[repr(C)]
pub struct Context {
    stack_pointer: *mut u8,
    from: *mut Context,
}

impl Context {
    /// Returns a blank record. It becomes usable after one of the initialize calls.
    pub fn empty() -> Context {
        Context {
            stack_pointer: ptr::null_mut(),
            from: ptr::null_mut(),
        }
    }

    /// Marks this record as the context of the stack the caller is already running
    /// on. Its stack pointer is captured by the first transfer out of it.
    ///
    /// # Safety
    ///
    /// Must be called on a blank record, at most once per native thread, before any
    /// transfer happens on that thread.
    pub unsafe fn initialize_main(&mut self) {
        debug_assert!(self.stack_pointer.is_null());
        self.from = ptr::null_mut();
    }

    /// Seeds the initial frame: eight zeroed words for r4-r11 and the entry
    /// function address in the slot the switch routine pops into pc.
    ///
    /// # Safety
    ///
    /// `stack` must point to `size` writable bytes owned by the caller and kept
    /// alive until the context is destroyed, with `size` at least
    /// [MIN_STACK_SIZE](constant.MIN_STACK_SIZE.html).
    pub unsafe fn initialize(&mut self, entry: Entry, stack: *mut u8, size: usize) {
        debug_assert!(!stack.is_null());
        debug_assert!(size >= MIN_STACK_SIZE);

        let top = ((stack as usize + size) & !0xF) as *mut usize;

        ptr::write_bytes(top.offset(-9), 0, 8);
        *top.offset(-1) = entry as usize;

        self.stack_pointer = top.offset(-9) as *mut u8;
        self.from = ptr::null_mut();
        trace!("initialized {:p} with a {} byte stack", self as *mut Context, size);
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

        switch_stacks(current, target);

        (*target).from = previous;
        target
    }

    /// Releases backend bookkeeping. A record on this backend holds no OS handle,
    /// so this only clears it for reuse. The caller still owns the stack memory.
    ///
    /// # Safety
    ///
    /// The context must not be running and must never be transferred into again.
    pub unsafe fn destroy(&mut self) {
        trace!("destroying {:p}", self as *mut Context);
        self.stack_pointer = ptr::null_mut();
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

// Nine words cross by hand: r4-r11 plus the return address, which comes back as
// a program counter load. Popping into pc honors interworking, so the entry
// function may be ARM or Thumb code.
#[unsafe(naked)]
unsafe extern "C" fn switch_stacks(_current: *mut Context, _target: *mut Context) {
    naked_asm!(
        "push {{r4-r11, lr}}",
        "str sp, [r0]",
        "ldr sp, [r1]",
        "pop {{r4-r11, pc}}",
    );
}
