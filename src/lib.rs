//! Handoff provides stackful symmetric context transfer in Rust.
//!
//! A [Context](struct.Context.html) records one suspended execution context: a stack
//! pointer (or an opaque OS context, depending on the backend) plus a back-pointer to
//! whoever last transferred into it. Control moves between contexts only through
//! [Context::transfer](struct.Context.html#method.transfer), which suspends the caller
//! and resumes the target at its last suspension point, or at its entry function the
//! first time.
//!
//! The crate compiles exactly one backend per target: hand-written switch routines on
//! Windows x86/x86_64 and 32-bit ARM, `ucontext` on the remaining POSIX targets,
//! Asyncify fibers on Emscripten, and an optional portable backend that parks one OS
//! thread per context (feature `pthread`).
//!
//! Stack memory is caller-owned. The crate never allocates or frees it; it only writes
//! the initial frame into the buffer handed to `initialize`. The `stackbed` crate in
//! this workspace provides page-backed buffers with guard pages that satisfy every
//! backend's alignment rules.
//!
//! ## Example
//! ```
//! use handoff::Context;
//! use stackbed::{FixedStack, Stack};
//!
//! #[repr(C)]
//! struct Counter {
//!     context: Context,
//!     main: *mut Context,
//!     count: u32,
//! }
//!
//! unsafe extern "C-unwind" fn count_up(_from: *mut Context, current: *mut Context) -> ! {
//!     let counter = &mut *(current as *mut Counter);
//!     loop {
//!         counter.count += 1;
//!         Context::transfer(current, counter.main);
//!     }
//! }
//!
//! fn main() {
//!     let stack = FixedStack::new(64 * 1024).unwrap();
//!     let mut main = Context::empty();
//!     unsafe { main.initialize_main() };
//!
//!     let mut counter = Counter {
//!         context: Context::empty(),
//!         main: &mut main,
//!         count: 0,
//!     };
//!     unsafe { counter.context.initialize(count_up, stack.limit(), stack.len()) };
//!
//!     for _ in 0..3 {
//!         unsafe { Context::transfer(&mut main, &mut counter.context) };
//!     }
//!     assert_eq!(counter.count, 3);
//!
//!     unsafe { counter.context.destroy() };
//! }
//! ```

mod backend;
mod trace;

pub use backend::{Context, LIMITED_ADDRESS_SPACE, MIN_STACK_SIZE};

/// Entry point of a spawned context.
///
/// Called on the context's own stack the first time something transfers into it.
/// `from` is the context that performed that first transfer and `current` is the
/// context the function runs on. The function must never return; its only way to
/// stop running is to transfer away and never be resumed again.
///
/// The ABI is `C-unwind` so that retiring a suspended context on the thread-backed
/// backend can unwind its stack and run destructors. No other unwind may cross a
/// context boundary.
pub type Entry = unsafe extern "C-unwind" fn(from: *mut Context, current: *mut Context) -> !;
