use criterion::{criterion_group, criterion_main, Criterion};

use handoff::Context;
use stackbed::{FixedStack, Stack};

#[repr(C)]
struct PingPong {
    context: Context,
    main: *mut Context,
}

unsafe extern "C-unwind" fn pong(_from: *mut Context, current: *mut Context) -> ! {
    let this = &mut *(current as *mut PingPong);
    loop {
        Context::transfer(current, this.main);
    }
}

// One iteration is a full round trip: out to the other context and back.
fn transfer(c: &mut Criterion) {
    c.bench_function("transfer round trip", |b| {
        let stack = FixedStack::new(FixedStack::default_len()).unwrap();
        let mut main = Context::empty();
        unsafe { main.initialize_main() };

        let mut other = PingPong {
            context: Context::empty(),
            main: &mut main,
        };
        unsafe { other.context.initialize(pong, stack.limit(), stack.len()) };

        b.iter(|| unsafe { Context::transfer(&mut main, &mut other.context) });

        unsafe { other.context.destroy() };
    });
}

criterion_group!(benches, transfer);
criterion_main!(benches);
