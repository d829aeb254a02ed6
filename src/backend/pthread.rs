//! Portable thread-backed backend, selected by the `pthread` feature.
//!
//! Every spawned context is carried by one OS thread that spends its whole life
//! parked, except for the moments control is handed to it. All contexts reachable
//! from one main context share a single guard mutex; a transfer marks the target
//! runnable, wakes its condvar and parks the caller, so exactly one thread of the
//! group runs at any instant and the symmetric transfer contract holds unchanged.
//!
//! The backing thread is created lazily on the first transfer into a context, with
//! the caller's buffer installed as the thread stack via `pthread_attr_setstack`.
//! Creation is the one fallible path in the whole crate: on failure the transfer
//! returns null and the target record is rolled back to its pre-start state.
//!
//! Destroying a suspended context wakes its thread with a cancellation flag. The
//! thread unwinds its stack with a private panic payload, which runs destructors
//! of everything still live there, and is then joined. The entry ABI is
//! `C-unwind` precisely so this unwind may cross it.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::trace::trace;
use crate::Entry;

/// Smallest stack `initialize` accepts, the PTHREAD_STACK_MIN of common libcs.
pub const MIN_STACK_SIZE: usize = 16384;

/// Hint for stack providers to default to small reservations.
pub const LIMITED_ADDRESS_SPACE: bool = cfg!(target_pointer_width = "32");

/// Group state shared by every context reachable from one main context.
struct Shared {
    guard: Mutex<()>,
}

/// Per-context wakeup state. Both flags are only touched with the group guard
/// held; relaxed ordering is enough because the mutex orders the accesses.
struct Signal {
    schedule: Condvar,
    scheduled: AtomicBool,
    cancelled: AtomicBool,
}

impl Signal {
    fn new() -> Signal {
        Signal {
            schedule: Condvar::new(),
            scheduled: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }
}

// Panic payload that unwinds a suspended context's stack when it is destroyed.
struct Retire;

/// One execution context carried by a parked OS thread.
///
/// The record must stay at a fixed address between initialization and `destroy`:
/// the backing thread and every suspended transfer hold raw pointers to it.
#[repr(C)]
pub struct Context {
    from: *mut Context,
    entry: Option<Entry>,
    stack: *mut u8,
    stack_size: usize,
    is_main: bool,
    thread: Option<libc::pthread_t>,
    shared: Option<Arc<Shared>>,
    signal: Option<Arc<Signal>>,
}

impl Context {
    /// Returns a blank record. It becomes usable after one of the initialize calls.
    pub fn empty() -> Context {
        Context {
            from: ptr::null_mut(),
            entry: None,
            stack: ptr::null_mut(),
            stack_size: 0,
            is_main: false,
            thread: None,
            shared: None,
            signal: None,
        }
    }

    /// Marks this record as the context of the thread the caller is already
    /// running on and creates the group state later contexts will share.
    ///
    /// # Safety
    ///
    /// Must be called on a blank record, at most once per native thread, before
    /// any transfer happens on that thread. The record must not move afterwards.
    pub unsafe fn initialize_main(&mut self) {
        debug_assert!(self.stack.is_null() && self.shared.is_none());
        self.from = ptr::null_mut();
        self.is_main = true;
        self.shared = Some(Arc::new(Shared {
            guard: Mutex::new(()),
        }));
        self.signal = Some(Arc::new(Signal::new()));
    }

    /// Records the entry function and stack. The backing thread is not created
    /// here; that happens on the first transfer into the context.
    ///
    /// # Safety
    ///
    /// `stack` must point to `size` writable bytes owned by the caller and kept
    /// alive until the context is destroyed, page aligned as
    /// `pthread_attr_setstack` demands, with `size` at least
    /// [MIN_STACK_SIZE](constant.MIN_STACK_SIZE.html). The record must not move
    /// afterwards.
    pub unsafe fn initialize(&mut self, entry: Entry, stack: *mut u8, size: usize) {
        debug_assert!(!stack.is_null());
        debug_assert!(size >= MIN_STACK_SIZE);
        debug_assert_eq!(stack as usize % 4096, 0, "thread stacks must be page aligned");

        self.entry = Some(entry);
        self.stack = stack;
        self.stack_size = size;
        self.from = ptr::null_mut();
    }

    /// Suspends `current` and resumes `target`, returning `target` once something
    /// transfers back into `current`. Returns null if the target's backing thread
    /// could not be created; the target is then rolled back to its pre-start
    /// state and may be destroyed or retried.
    ///
    /// # Safety
    ///
    /// Both pointers must be valid initialized records belonging to this group,
    /// with `current` the running context and `target` suspended or never yet
    /// resumed.
    pub unsafe fn transfer(current: *mut Context, target: *mut Context) -> *mut Context {
        debug_assert_ne!(current, target, "a context cannot transfer to itself");

        let previous = (*target).from;
        (*target).from = current;

        let shared = match &(*current).shared {
            Some(shared) => Arc::clone(shared),
            None => unreachable!("transfer from a context that never ran"),
        };
        let mut held = shared.guard.lock().unwrap();

        if (*target).shared.is_none() {
            // First transfer into this context: bring its thread up. The thread
            // blocks on the guard we hold until we are parked below, so the entry
            // function cannot run before this transfer is committed.
            (*target).shared = Some(Arc::clone(&shared));
            (*target).signal = Some(Arc::new(Signal::new()));
            trace!("spawning thread for context {:p}", target);
            match spawn(target) {
                Ok(id) => (*target).thread = Some(id),
                Err(_code) => {
                    trace!("thread creation for {:p} failed: {}", target, _code);
                    (*target).shared = None;
                    (*target).signal = None;
                    (*target).from = previous;
                    return ptr::null_mut();
                }
            }
        } else {
            let signal = match &(*target).signal {
                Some(signal) => Arc::clone(signal),
                None => unreachable!("started context without wakeup state"),
            };
            trace!("waking context {:p}", target);
            signal.scheduled.store(true, Ordering::Relaxed);
            signal.schedule.notify_one();
        }

        // Park until someone transfers back in, or until destroy retires us.
        let signal = match &(*current).signal {
            Some(signal) => Arc::clone(signal),
            None => unreachable!("running context without wakeup state"),
        };
        loop {
            if signal.cancelled.load(Ordering::Relaxed) {
                trace!("context {:p} woken for retirement", current);
                // Never unwind with the guard held, it would poison the group.
                drop(held);
                resume_unwind(Box::new(Retire));
            }
            if signal.scheduled.swap(false, Ordering::Relaxed) {
                break;
            }
            held = signal.schedule.wait(held).unwrap();
        }
        drop(held);

        (*target).from = previous;
        target
    }

    /// Releases backend bookkeeping. For a suspended context this retires the
    /// backing thread: it is woken, its stack unwinds (running destructors of
    /// everything still live on it) and the thread is joined before this call
    /// returns. The caller still owns and frees the stack memory afterwards.
    ///
    /// Destroying a blank or already destroyed record is a no-op.
    ///
    /// # Safety
    ///
    /// The context must not be running and must never be transferred into again.
    pub unsafe fn destroy(&mut self) {
        let shared = match self.shared.take() {
            Some(shared) => shared,
            // Never started, or already destroyed.
            None => {
                self.reset();
                return;
            }
        };

        if self.is_main {
            trace!("releasing main context {:p}", self as *mut Context);
        } else if let Some(signal) = self.signal.take() {
            trace!("retiring context {:p}", self as *mut Context);
            {
                let _held = shared.guard.lock().unwrap();
                signal.cancelled.store(true, Ordering::Relaxed);
                signal.schedule.notify_one();
            }
            if let Some(thread) = self.thread.take() {
                let rc = libc::pthread_join(thread, ptr::null_mut());
                debug_assert_eq!(rc, 0);
                trace!("joined context {:p}", self as *mut Context);
            }
        }

        self.reset();
    }

    /// The context that most recently transferred into this one.
    ///
    /// Meaningful from the moment something transfers in until that transfer call
    /// returns on the other side; outside that window the previous value has been
    /// restored.
    pub fn from(&self) -> *mut Context {
        self.from
    }

    fn reset(&mut self) {
        self.from = ptr::null_mut();
        self.entry = None;
        self.stack = ptr::null_mut();
        self.stack_size = 0;
        self.is_main = false;
        self.thread = None;
        self.shared = None;
        self.signal = None;
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // Backstop for owners that never called destroy; harmless if they did.
        unsafe { self.destroy() }
    }
}

unsafe fn spawn(context: *mut Context) -> Result<libc::pthread_t, libc::c_int> {
    let mut attr = std::mem::MaybeUninit::<libc::pthread_attr_t>::uninit();
    let rc = libc::pthread_attr_init(attr.as_mut_ptr());
    if rc != 0 {
        return Err(rc);
    }
    let mut attr = attr.assume_init();

    let rc = libc::pthread_attr_setstack(
        &mut attr,
        (*context).stack as *mut libc::c_void,
        (*context).stack_size,
    );
    let result = if rc != 0 {
        Err(rc)
    } else {
        let mut id: libc::pthread_t = std::mem::zeroed();
        let rc = libc::pthread_create(
            &mut id,
            &attr,
            thread_main,
            context as *mut libc::c_void,
        );
        if rc == 0 {
            Ok(id)
        } else {
            Err(rc)
        }
    };

    libc::pthread_attr_destroy(&mut attr);
    result
}

extern "C" fn thread_main(arg: *mut libc::c_void) -> *mut libc::c_void {
    let context = arg as *mut Context;

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        let shared = match &(*context).shared {
            Some(shared) => Arc::clone(shared),
            None => unreachable!("backing thread started without group state"),
        };
        // Rendezvous: the creator holds the guard until it parks itself, so the
        // entry function cannot observe a half-committed first transfer.
        drop(shared.guard.lock().unwrap());

        trace!("context {:p} starting", context);
        match (*context).entry {
            Some(entry) => entry((*context).from, context),
            None => unreachable!("transfer into a context that was never initialized"),
        }
    }));

    if let Err(payload) = result {
        if payload.is::<Retire>() {
            trace!("context {:p} unwound", context);
        } else {
            // The entry function let a panic escape. There is no caller on this
            // stack to rethrow it to.
            std::process::abort();
        }
    }
    ptr::null_mut()
}
