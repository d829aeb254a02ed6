use std::ptr;

use handoff::Context;
#[cfg(debug_assertions)]
use handoff::MIN_STACK_SIZE;
use stackbed::{FixedStack, Stack};

// Each test embeds its Context at offset zero of a repr(C) struct, so the entry
// function can reach the surrounding fields through the `current` pointer.

#[repr(C)]
struct Introductions {
    context: Context,
    main: *mut Context,
    observed_from: *mut Context,
    observed_self: *mut Context,
}

unsafe extern "C-unwind" fn introduce(from: *mut Context, current: *mut Context) -> ! {
    let this = &mut *(current as *mut Introductions);
    this.observed_from = from;
    this.observed_self = current;
    loop {
        Context::transfer(current, this.main);
    }
}

#[test]
fn first_transfer_reaches_entry_with_both_pointers() {
    let stack = FixedStack::new(64 * 1024).unwrap();
    let mut main = Context::empty();
    unsafe { main.initialize_main() };

    let mut child = Introductions {
        context: Context::empty(),
        main: &mut main,
        observed_from: ptr::null_mut(),
        observed_self: ptr::null_mut(),
    };
    unsafe { child.context.initialize(introduce, stack.limit(), stack.len()) };

    let returned = unsafe { Context::transfer(&mut main, &mut child.context) };

    assert_eq!(returned, &mut child.context as *mut Context);
    assert_eq!(child.observed_from, &mut main as *mut Context);
    assert_eq!(child.observed_self, &mut child.context as *mut Context);
    // The child is suspended inside its transfer back, so the window in which
    // main's back-pointer names the child is still open. The child's own
    // back-pointer was already restored when our transfer returned.
    assert_eq!(main.from(), &mut child.context as *mut Context);
    assert_eq!(child.context.from(), ptr::null_mut());

    unsafe { child.context.destroy() };
}

#[repr(C)]
struct Ticker {
    context: Context,
    main: *mut Context,
    total: u64,
}

unsafe extern "C-unwind" fn tick(_from: *mut Context, current: *mut Context) -> ! {
    let ticker = &mut *(current as *mut Ticker);
    // Lives on the context's own stack and may only advance while it runs.
    let mut seen = 0u64;
    loop {
        seen += 1;
        ticker.total = seen;
        Context::transfer(current, ticker.main);
    }
}

#[test]
fn stack_locals_survive_suspension() {
    let stack = FixedStack::new(64 * 1024).unwrap();
    let mut main = Context::empty();
    unsafe { main.initialize_main() };

    let mut ticker = Ticker {
        context: Context::empty(),
        main: &mut main,
        total: 0,
    };
    unsafe { ticker.context.initialize(tick, stack.limit(), stack.len()) };

    for round in 1..=10u64 {
        unsafe { Context::transfer(&mut main, &mut ticker.context) };
        assert_eq!(ticker.total, round);
    }

    unsafe { ticker.context.destroy() };
}

#[repr(C)]
struct TwoSteps {
    context: Context,
    main: *mut Context,
    x: u32,
}

unsafe extern "C-unwind" fn two_steps(_from: *mut Context, current: *mut Context) -> ! {
    let this = &mut *(current as *mut TwoSteps);
    let mut x = 0u32;
    x += 1;
    this.x = x;
    Context::transfer(current, this.main);
    x += 1;
    this.x = x;
    loop {
        Context::transfer(current, this.main);
    }
}

#[test]
fn two_suspension_points_on_a_small_stack() {
    let stack = FixedStack::new(64 * 1024).unwrap();
    let mut main = Context::empty();
    unsafe { main.initialize_main() };

    let mut child = TwoSteps {
        context: Context::empty(),
        main: &mut main,
        x: 0,
    };
    unsafe { child.context.initialize(two_steps, stack.limit(), stack.len()) };

    unsafe { Context::transfer(&mut main, &mut child.context) };
    assert_eq!(child.x, 1);
    unsafe { Context::transfer(&mut main, &mut child.context) };
    assert_eq!(child.x, 2);

    unsafe { child.context.destroy() };
}

#[repr(C)]
struct Relay {
    context: Context,
    next: *mut Context,
    observed_from: *mut Context,
}

unsafe extern "C-unwind" fn relay(from: *mut Context, current: *mut Context) -> ! {
    let this = &mut *(current as *mut Relay);
    this.observed_from = from;
    loop {
        Context::transfer(current, this.next);
    }
}

// main -> b -> c -> main. The transfer out of main returns its original target b
// even though c is the context that actually woke main up, and every back-pointer
// along the chain still names its suspended predecessor.
#[test]
fn transfer_chain_restores_from_pointers() {
    let stack_b = FixedStack::new(64 * 1024).unwrap();
    let stack_c = FixedStack::new(64 * 1024).unwrap();
    let mut main = Context::empty();
    unsafe { main.initialize_main() };

    let mut c = Relay {
        context: Context::empty(),
        next: &mut main,
        observed_from: ptr::null_mut(),
    };
    let mut b = Relay {
        context: Context::empty(),
        next: &mut c.context,
        observed_from: ptr::null_mut(),
    };
    unsafe { b.context.initialize(relay, stack_b.limit(), stack_b.len()) };
    unsafe { c.context.initialize(relay, stack_c.limit(), stack_c.len()) };

    let returned = unsafe { Context::transfer(&mut main, &mut b.context) };

    assert_eq!(returned, &mut b.context as *mut Context);
    assert_eq!(b.observed_from, &mut main as *mut Context);
    assert_eq!(c.observed_from, &mut b.context as *mut Context);
    assert_eq!(b.context.from(), ptr::null_mut());
    assert_eq!(c.context.from(), &mut b.context as *mut Context);
    assert_eq!(main.from(), &mut c.context as *mut Context);

    unsafe { b.context.destroy() };
    unsafe { c.context.destroy() };
}

#[cfg(debug_assertions)]
unsafe extern "C-unwind" fn never_run(_from: *mut Context, _current: *mut Context) -> ! {
    unreachable!("this context is never resumed");
}

#[test]
#[cfg(debug_assertions)]
#[should_panic]
fn rejects_undersized_stack() {
    let stack = FixedStack::new(MIN_STACK_SIZE).unwrap();
    let mut context = Context::empty();
    // The buffer is big enough, the advertised size is not.
    unsafe { context.initialize(never_run, stack.limit(), MIN_STACK_SIZE / 2) };
}

#[test]
#[cfg(debug_assertions)]
#[should_panic]
fn rejects_initialize_main_on_dirty_record() {
    let stack = FixedStack::new(64 * 1024).unwrap();
    let mut context = Context::empty();
    unsafe { context.initialize(never_run, stack.limit(), stack.len()) };
    unsafe { context.initialize_main() };
}
