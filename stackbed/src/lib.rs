//! Page-backed stack buffers for handoff contexts.
//!
//! handoff writes an initial frame into caller-owned memory and never allocates
//! any. This crate supplies that memory: [FixedStack](struct.FixedStack.html)
//! reserves a fixed-size region from the OS and keeps a guard page below the
//! usable area, so running off the end of a context's stack faults instead of
//! silently overwriting whatever the allocator placed next to it.

mod fixed_stack;
pub use fixed_stack::{page_size, FixedStack};

pub trait Stack: Sized {
    /// Returns a new stack with at least `len` usable bytes. `len` is rounded up
    /// to a whole number of pages.
    fn new(len: usize) -> Result<Self, std::io::Error>;

    /// Returns a pointer one past the highest usable byte. Stacks grow down from
    /// here.
    fn base(&self) -> *mut u8;

    /// Returns a pointer to the lowest usable byte. This is the address to hand
    /// to `handoff::Context::initialize`.
    fn limit(&self) -> *mut u8;

    /// Returns the start of the whole reservation, guard pages included. Windows
    /// tracks this separately from the limit (the TIB calls it the deallocation
    /// stack); on unix it is only useful for diagnostics.
    fn deallocation(&self) -> *mut u8;

    /// Returns the usable length in bytes, after rounding.
    fn len(&self) -> usize;
}
