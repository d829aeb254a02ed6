//! Per-target context switching backends.
//!
//! Exactly one backend module is compiled in. Every backend exports the same four
//! operations on [Context](struct.Context.html) plus two constants:
//!
//! * `MIN_STACK_SIZE` - smallest stack `initialize` accepts, checked in debug builds.
//! * `LIMITED_ADDRESS_SPACE` - true where address space is scarce enough that stack
//!   providers should default to small reservations. Nothing in the switching layer
//!   reads it; it is a sizing hint for allocators such as `stackbed`.
//!
//! Selection order: Emscripten targets are hardwired to the Asyncify backend, the
//! `pthread` feature forces the portable thread-backed backend on unix, the
//! `ucontext` feature forces ucontext where an assembly backend would otherwise be
//! picked, and the remaining targets fall through to their native implementation.

cfg_if::cfg_if! {
    if #[cfg(target_os = "emscripten")] {
        mod emscripten;
        pub use emscripten::{Context, LIMITED_ADDRESS_SPACE, MIN_STACK_SIZE};
    } else if #[cfg(all(unix, feature = "pthread"))] {
        mod pthread;
        pub use pthread::{Context, LIMITED_ADDRESS_SPACE, MIN_STACK_SIZE};
    } else if #[cfg(feature = "pthread")] {
        compile_error!("the `pthread` backend requires a unix target");
    } else if #[cfg(all(unix, feature = "ucontext"))] {
        mod ucontext;
        pub use ucontext::{Context, LIMITED_ADDRESS_SPACE, MIN_STACK_SIZE};
    } else if #[cfg(all(windows, target_arch = "x86_64"))] {
        mod win64;
        pub use win64::{Context, LIMITED_ADDRESS_SPACE, MIN_STACK_SIZE};
    } else if #[cfg(all(windows, target_arch = "x86"))] {
        mod win32;
        pub use win32::{Context, LIMITED_ADDRESS_SPACE, MIN_STACK_SIZE};
    } else if #[cfg(all(unix, target_arch = "arm"))] {
        mod arm32;
        pub use arm32::{Context, LIMITED_ADDRESS_SPACE, MIN_STACK_SIZE};
    } else if #[cfg(unix)] {
        mod ucontext;
        pub use ucontext::{Context, LIMITED_ADDRESS_SPACE, MIN_STACK_SIZE};
    } else {
        compile_error!("no context switching backend for this target");
    }
}
