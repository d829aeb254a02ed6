use handoff::Context;
use stackbed::{FixedStack, Stack};

#[repr(C)]
struct Parked {
    context: Context,
    main: *mut Context,
}

unsafe extern "C-unwind" fn park(_from: *mut Context, current: *mut Context) -> ! {
    let this = &mut *(current as *mut Parked);
    loop {
        Context::transfer(current, this.main);
    }
}

#[test]
fn dropping_an_unused_context_is_a_no_op() {
    let stack = FixedStack::new(64 * 1024).unwrap();
    let mut context = Context::empty();
    unsafe { context.initialize(park, stack.limit(), stack.len()) };
    drop(context);
}

#[test]
fn dropping_a_blank_record_is_a_no_op() {
    drop(Context::empty());
}

#[test]
fn double_destroy_is_tolerated() {
    let stack = FixedStack::new(64 * 1024).unwrap();
    let mut main = Context::empty();
    unsafe { main.initialize_main() };

    let mut child = Parked {
        context: Context::empty(),
        main: &mut main,
    };
    unsafe { child.context.initialize(park, stack.limit(), stack.len()) };
    unsafe { Context::transfer(&mut main, &mut child.context) };

    unsafe { child.context.destroy() };
    unsafe { child.context.destroy() };
    // Drop adds a third pass on scope exit.
}

#[test]
fn record_is_reusable_after_destroy() {
    let stack = FixedStack::new(64 * 1024).unwrap();
    let mut main = Context::empty();
    unsafe { main.initialize_main() };

    let mut child = Parked {
        context: Context::empty(),
        main: &mut main,
    };
    unsafe { child.context.initialize(park, stack.limit(), stack.len()) };
    unsafe { Context::transfer(&mut main, &mut child.context) };
    unsafe { child.context.destroy() };

    // Same record, same memory, a fresh life.
    unsafe { child.context.initialize(park, stack.limit(), stack.len()) };
    unsafe { Context::transfer(&mut main, &mut child.context) };
    unsafe { child.context.destroy() };
}

// Retiring a suspended context on the thread-backed backend unwinds its stack,
// so values parked on it get their destructors run before destroy returns.
#[cfg(feature = "pthread")]
mod retirement {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    static CLEANED: AtomicBool = AtomicBool::new(false);

    struct SetOnDrop;

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            CLEANED.store(true, Ordering::SeqCst);
        }
    }

    unsafe extern "C-unwind" fn hold_a_value(_from: *mut Context, current: *mut Context) -> ! {
        let this = &mut *(current as *mut Parked);
        let _guard = SetOnDrop;
        loop {
            Context::transfer(current, this.main);
        }
    }

    #[test]
    fn destroy_unwinds_a_suspended_context() {
        let stack = FixedStack::new(64 * 1024).unwrap();
        let mut main = Context::empty();
        unsafe { main.initialize_main() };

        let mut child = Parked {
            context: Context::empty(),
            main: &mut main,
        };
        unsafe { child.context.initialize(hold_a_value, stack.limit(), stack.len()) };
        unsafe { Context::transfer(&mut main, &mut child.context) };

        assert!(!CLEANED.load(Ordering::SeqCst));
        unsafe { child.context.destroy() };
        assert!(CLEANED.load(Ordering::SeqCst));
    }
}
