use std::io::Error;

use stackbed::{page_size, FixedStack, Stack};

#[test]
fn create_a_stack() -> Result<(), Error> {
    let stack = FixedStack::new(64 * 1024)?;
    assert_eq!(stack.len(), 64 * 1024);
    Ok(())
}

#[test]
fn limit_and_base_bound_the_usable_area() {
    let stack = FixedStack::new(64 * 1024).unwrap();
    assert_eq!(unsafe { stack.limit().add(stack.len()) }, stack.base());
    assert!(stack.deallocation() < stack.limit());
    // Page aligned, as pthread_attr_setstack and the TIB fields expect.
    assert_eq!(stack.limit() as usize % page_size(), 0);
}

#[test]
fn tiny_requests_round_up_to_a_page() {
    let stack = FixedStack::new(1).unwrap();
    assert_eq!(stack.len(), page_size());
}

#[test]
fn the_whole_usable_area_is_writable() {
    let stack = FixedStack::new(64 * 1024).unwrap();
    unsafe {
        stack.limit().write(0xAA);
        stack.base().sub(1).write(0xBB);
        assert_eq!(stack.limit().read(), 0xAA);
        assert_eq!(stack.base().sub(1).read(), 0xBB);
    }
}

#[test]
fn many_stacks_at_once() {
    let mut stacks = vec![];
    for _i in 0..10_000 {
        let stack = FixedStack::new(64 * 1024);
        assert!(stack.is_ok());
        stacks.push(stack);
    }
}

#[test]
fn default_len_is_a_whole_number_of_pages() {
    assert_eq!(FixedStack::default_len() % page_size(), 0);
}
