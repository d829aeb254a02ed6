use std::io::Error;
use std::ptr;

use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
use winapi::um::winnt::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_GUARD, PAGE_READWRITE};

use super::page_size;
use crate::Stack;

/// Pages kept reserved under the usable area so the exception handler still has
/// stack to run on after an overflow.
const EXCEPTION_ZONE_PAGES: usize = 4;

/// A fixed-size stack with a Windows guard page below the usable area.
///
/// Only the usable part is committed. The page right below it is committed with
/// `PAGE_GUARD`, and a few more pages stay reserved underneath so the kernel can
/// dispatch a stack overflow exception. The rest is the usual grow-on-fault
/// arrangement Windows applies to every thread stack.
pub struct FixedStack {
    allocation: *mut u8,
    limit: *mut u8,
    len: usize,
}

impl Stack for FixedStack {
    fn new(len: usize) -> Result<Self, Error> {
        let page = page_size();
        let len = (len.max(1) + page - 1) & !(page - 1);
        let zone = EXCEPTION_ZONE_PAGES * page;
        unsafe {
            let allocation = VirtualAlloc(ptr::null_mut(), len + zone, MEM_RESERVE, PAGE_READWRITE);
            if allocation.is_null() {
                return Err(Error::last_os_error());
            }
            let allocation = allocation as *mut u8;
            let limit = allocation.add(zone);

            if VirtualAlloc(
                limit as *mut winapi::ctypes::c_void,
                len,
                MEM_COMMIT,
                PAGE_READWRITE,
            )
            .is_null()
            {
                let err = Error::last_os_error();
                VirtualFree(allocation as *mut winapi::ctypes::c_void, 0, MEM_RELEASE);
                return Err(err);
            }

            if VirtualAlloc(
                limit.sub(page) as *mut winapi::ctypes::c_void,
                page,
                MEM_COMMIT,
                PAGE_GUARD | PAGE_READWRITE,
            )
            .is_null()
            {
                let err = Error::last_os_error();
                VirtualFree(allocation as *mut winapi::ctypes::c_void, 0, MEM_RELEASE);
                return Err(err);
            }

            Ok(Self {
                allocation,
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
        let result =
            unsafe { VirtualFree(self.allocation as *mut winapi::ctypes::c_void, 0, MEM_RELEASE) };
        debug_assert_ne!(result, 0);
    }
}
