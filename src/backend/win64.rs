//! Windows x86_64 backend.
//!
//! The switch routine is an ordinary `extern "C"` function as far as the compiler
//! is concerned, so everything the ABI calls volatile is already saved at the call
//! site and only the callee-saved set crosses by hand: rbp, rbx, rdi, rsi, r12-r15
//! and xmm6-xmm15, plus the three words of the Thread Information Block that
//! Windows keeps per stack (base, limit and deallocation stack). Swapping those
//! keeps guard page handling and stack walks working on the borrowed stack.
//!
//! Offsets follow the public TIB layout: the block's linear address sits at
//! gs:[0x30], stack base at 0x08, stack limit at 0x10 and the deallocation stack
//! at 0x1478.

use std::arch::naked_asm;
use std::ptr;

use crate::trace::trace;
use crate::Entry;

/// Smallest stack `initialize` accepts. The initial frame itself needs 312 bytes.
pub const MIN_STACK_SIZE: usize = 1024;

pub const LIMITED_ADDRESS_SPACE: bool = false;

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

    /// Seeds the initial frame. After this call the stack holds, from the aligned
    /// top downwards:
    /// * the entry function address, left for the trampoline to pick up,
    /// * the trampoline address, popped by the final `ret` of the switch routine,
    /// * stack base, stack limit and deallocation stack for the TIB,
    /// * a zeroed callee-saved register area (8 gp registers, 10 xmm registers and
    ///   one alignment word).
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

        ptr::write_bytes(top.offset(-39), 0, 39);
        *top.offset(-6) = entry as usize;
        *top.offset(-7) = trampoline as usize;
        *top.offset(-8) = top as usize; // TIB stack base
        *top.offset(-9) = stack as usize; // TIB stack limit
        *top.offset(-10) = stack as usize; // TIB deallocation stack

        self.stack_pointer = top.offset(-39) as *mut u8;
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

// Saves the callee-saved state and the TIB stack words on the current stack,
// parks the stack pointer in `current` and adopts the one in `target`. For a
// fresh context the final `ret` lands in `trampoline` with rcx/rdx untouched,
// so the transfer arguments double as the entry function's arguments.
#[unsafe(naked)]
unsafe extern "C" fn switch_stacks(_current: *mut Context, _target: *mut Context) {
    naked_asm!(
        "mov r10, gs:[0x30]",
        "mov rax, [r10 + 0x08]",
        "push rax",
        "mov rax, [r10 + 0x10]",
        "push rax",
        "mov rax, [r10 + 0x1478]",
        "push rax",
        "push rbp",
        "push rbx",
        "push rdi",
        "push rsi",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "sub rsp, 168",
        "movaps [rsp + 8], xmm6",
        "movaps [rsp + 24], xmm7",
        "movaps [rsp + 40], xmm8",
        "movaps [rsp + 56], xmm9",
        "movaps [rsp + 72], xmm10",
        "movaps [rsp + 88], xmm11",
        "movaps [rsp + 104], xmm12",
        "movaps [rsp + 120], xmm13",
        "movaps [rsp + 136], xmm14",
        "movaps [rsp + 152], xmm15",
        "mov [rcx], rsp",
        "mov rsp, [rdx]",
        "movaps xmm6, [rsp + 8]",
        "movaps xmm7, [rsp + 24]",
        "movaps xmm8, [rsp + 40]",
        "movaps xmm9, [rsp + 56]",
        "movaps xmm10, [rsp + 72]",
        "movaps xmm11, [rsp + 88]",
        "movaps xmm12, [rsp + 104]",
        "movaps xmm13, [rsp + 120]",
        "movaps xmm14, [rsp + 136]",
        "movaps xmm15, [rsp + 152]",
        "add rsp, 168",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rsi",
        "pop rdi",
        "pop rbx",
        "pop rbp",
        "pop rax",
        "mov [r10 + 0x1478], rax",
        "pop rax",
        "mov [r10 + 0x10], rax",
        "pop rax",
        "mov [r10 + 0x08], rax",
        "ret",
    );
}

// First code to run on a fresh context. The entry address sits on top of the
// stack; loading it without popping keeps rsp on call alignment and gives the
// callee its spill space. The entry function never returns.
#[unsafe(naked)]
unsafe extern "C" fn trampoline() {
    naked_asm!("mov rax, [rsp]", "call rax", "ud2");
}
