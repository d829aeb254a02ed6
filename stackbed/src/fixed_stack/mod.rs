#[cfg(target_family = "unix")]
mod unix;
#[cfg(target_family = "windows")]
mod windows;

#[cfg(target_family = "unix")]
pub use self::unix::*;
#[cfg(target_family = "windows")]
pub use self::windows::*;

use std::sync::atomic::{AtomicUsize, Ordering};

impl FixedStack {
    /// Length to use when the caller has nothing better: 8 Mb, or 512 Kb on
    /// targets where address space is scarce.
    pub const fn default_len() -> usize {
        if handoff::LIMITED_ADDRESS_SPACE {
            512 * 1024
        } else {
            8 * 1024 * 1024
        }
    }
}

/// Returns page size in bytes.
pub fn page_size() -> usize {
    #[cold]
    #[cfg(target_family = "unix")]
    fn sys_page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }

    #[cold]
    #[cfg(target_family = "windows")]
    fn sys_page_size() -> usize {
        use winapi::um::sysinfoapi::GetSystemInfo;
        use winapi::um::sysinfoapi::{LPSYSTEM_INFO, SYSTEM_INFO};

        unsafe {
            let mut info: SYSTEM_INFO = std::mem::zeroed();
            GetSystemInfo(&mut info as LPSYSTEM_INFO);
            info.dwPageSize as usize
        }
    }

    static PAGE_SIZE_CACHE: AtomicUsize = AtomicUsize::new(0);
    match PAGE_SIZE_CACHE.load(Ordering::Relaxed) {
        0 => {
            let page_size = sys_page_size();
            PAGE_SIZE_CACHE.store(page_size, Ordering::Relaxed);
            page_size
        }
        page_size => page_size,
    }
}
