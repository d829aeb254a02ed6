//! A relay race: the baton visits four contexts before coming back.
//!
//! Each leg increments the shared counter and hands control to the next context
//! in the chain; the last one hands it back to the main context. Run with
//! `cargo run --example relay`.

use std::ptr;

use handoff::Context;
use stackbed::{FixedStack, Stack};

#[repr(C)]
struct Runner {
    context: Context,
    next: *mut Context,
    baton: *mut u32,
}

unsafe extern "C-unwind" fn run_leg(_from: *mut Context, current: *mut Context) -> ! {
    let runner = &mut *(current as *mut Runner);
    loop {
        *runner.baton += 1;
        Context::transfer(current, runner.next);
    }
}

fn main() {
    let mut baton = 0u32;
    let mut main_context = Context::empty();
    unsafe { main_context.initialize_main() };

    let stacks: Vec<FixedStack> = (0..4)
        .map(|_| FixedStack::new(64 * 1024).unwrap())
        .collect();

    // Boxed so the records keep their addresses while the vector moves around.
    let mut runners: Vec<Box<Runner>> = (0..4)
        .map(|_| {
            Box::new(Runner {
                context: Context::empty(),
                next: ptr::null_mut(),
                baton: &mut baton,
            })
        })
        .collect();

    // Wire the chain back to front; the last runner hands over to main.
    let mut next: *mut Context = &mut main_context;
    for runner in runners.iter_mut().rev() {
        runner.next = next;
        next = &mut runner.context;
    }

    for (runner, stack) in runners.iter_mut().zip(stacks.iter()) {
        unsafe { runner.context.initialize(run_leg, stack.limit(), stack.len()) };
    }

    // `next` now points at the first leg.
    unsafe { Context::transfer(&mut main_context, next) };
    println!("the baton came back after {} legs", baton);

    for runner in runners.iter_mut() {
        unsafe { runner.context.destroy() };
    }
}
