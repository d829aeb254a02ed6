use libc::{mmap, mprotect, munmap};
use libc::{MAP_ANON, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE};
use std::io::Error;
use std::ptr;

use super::page_size;
use crate::Stack;

/// A fixed-size stack with one guard page below the usable area.
///
/// The whole region is mapped `PROT_NONE` first and only the usable part is made
/// readable and writable, so a context that overruns its stack hits the guard
/// page and faults. The mapping is page aligned, which also satisfies
/// `pthread_attr_setstack` on the thread-backed handoff backend.
pub struct FixedStack {
    allocation: *mut u8,
    limit: *mut u8,
    len: usize,
}

impl Stack for FixedStack {
    fn new(len: usize) -> Result<Self, Error> {
        let page = page_size();
        let len = (len.max(1) + page - 1) & !(page - 1);
        unsafe {
            let total = len + page;
            let allocation = mmap(
                ptr::null_mut(),
                total,
                PROT_NONE,
                MAP_PRIVATE | MAP_ANON | MAP_NORESERVE,
                -1,
                0,
            );
            if allocation == MAP_FAILED {
                return Err(Error::last_os_error());
            }
            let limit = (allocation as *mut u8).add(page);
            if mprotect(limit as *mut libc::c_void, len, PROT_READ | PROT_WRITE) != 0 {
                let err = Error::last_os_error();
                munmap(allocation, total);
                return Err(err);
            }
            Ok(Self {
                allocation: allocation as *mut u8,
                limit,
                len,
            })
        }
    }

    fn base(&self) -> *mut u8 {
        unsafe { self.limit.add(self.len) }
    }

    fn limit(&self) -> *mut u8 {
        self.limit
    }

    fn deallocation(&self) -> *mut u8 {
        self.allocation
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for FixedStack {
    fn drop(&mut self) {
        let total = self.len + page_size();
        let result = unsafe { munmap(self.allocation as *mut libc::c_void, total) };
        debug_assert_eq!(result, 0);
    }
}
