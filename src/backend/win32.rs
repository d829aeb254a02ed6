//! Windows x86 backend.
//!
//! The switch routine uses the `fastcall` convention so both arguments arrive in
//! ecx/edx, survive the switch untouched, and double as the entry function's
//! arguments when a fresh context starts. Besides the four callee-saved general
//! purpose registers the routine swaps the first three words of the Thread
//! Information Block at fs: the structured exception handling chain at fs:[0],
//! the stack base at fs:[4] and the stack limit at fs:[8]. A fresh context gets
//! an exception chain of 0xFFFFFFFF, the end-of-chain sentinel.

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

    /// Seeds the initial frame: entry and trampoline addresses, the three TIB
    /// words and a zeroed area for ebp, ebx, edi and esi.
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

        ptr::write_bytes(top.offset(-9), 0, 9);
        *top.offset(-1) = entry as usize;
        *top.offset(-2) = trampoline as usize;
        *top.offset(-3) = 0xFFFF_FFFF; // end of the SEH chain
        *top.offset(-4) = top as usize; // TIB stack base
        *top.offset(-5) = stack as usize; // TIB stack limit

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

// Saves the SEH chain, the TIB stack bounds and the callee-saved registers on
// the current stack, parks the stack pointer in `current` (ecx) and adopts the
// one in `target` (edx).
#[unsafe(naked)]
unsafe extern "fastcall" fn switch_stacks(_current: *mut Context, _target: *mut Context) {
    naked_asm!(
        "push dword ptr fs:[0]",
        "push dword ptr fs:[4]",
        "push dword ptr fs:[8]",
        "push ebp",
        "push ebx",
        "push edi",
        "push esi",
        "mov [ecx], esp",
        "mov esp, [edx]",
        "pop esi",
        "pop edi",
        "pop ebx",
        "pop ebp",
        "pop dword ptr fs:[8]",
        "pop dword ptr fs:[4]",
        "pop dword ptr fs:[0]",
        "ret",
    );
}

// First code to run on a fresh context: forwards the register arguments onto the
// stack for the cdecl entry function, whose address was left on top of the
// stack. The entry function never returns.
#[unsafe(naked)]
unsafe extern "fastcall" fn trampoline() {
    naked_asm!("mov eax, [esp]", "push edx", "push ecx", "call eax", "ud2");
}
