//! Two contexts taking turns, with the main context as the umpire.
//!
//! Run with `cargo run --example ping_pong`.

use handoff::Context;
use stackbed::{FixedStack, Stack};

#[repr(C)]
struct Player {
    context: Context,
    main: *mut Context,
    name: &'static str,
    hits: u32,
}

unsafe extern "C-unwind" fn play(_from: *mut Context, current: *mut Context) -> ! {
    let player = &mut *(current as *mut Player);
    loop {
        player.hits += 1;
        println!("{} hits the ball back (hit {})", player.name, player.hits);
        Context::transfer(current, player.main);
    }
}

fn main() {
    let ping_stack = FixedStack::new(FixedStack::default_len()).unwrap();
    let pong_stack = FixedStack::new(FixedStack::default_len()).unwrap();

    let mut umpire = Context::empty();
    unsafe { umpire.initialize_main() };

    let mut ping = Player {
        context: Context::empty(),
        main: &mut umpire,
        name: "ping",
        hits: 0,
    };
    let mut pong = Player {
        context: Context::empty(),
        main: &mut umpire,
        name: "pong",
        hits: 0,
    };
    unsafe { ping.context.initialize(play, ping_stack.limit(), ping_stack.len()) };
    unsafe { pong.context.initialize(play, pong_stack.limit(), pong_stack.len()) };

    for _ in 0..3 {
        unsafe { Context::transfer(&mut umpire, &mut ping.context) };
        unsafe { Context::transfer(&mut umpire, &mut pong.context) };
    }
    println!("rally over: {} and {}", ping.hits, pong.hits);

    unsafe { ping.context.destroy() };
    unsafe { pong.context.destroy() };
}
