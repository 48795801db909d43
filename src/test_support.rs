// Helpers shared by the unit tests
use allocator_api2::alloc::{ AllocError, Allocator };
use std::{
    alloc::Layout,
    cell::Cell,
    ptr::NonNull,
    rc::Rc
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Payload that counts how many times it was dropped
#[derive(Debug)]
pub struct Tracked {
    pub value: i32,
    drops: Rc<Cell<usize>>
}

impl Tracked {
    pub fn new(value: i32, drops: &Rc<Cell<usize>>) -> Self {
        Self { value, drops: drops.clone() }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

// Allocator that is always out of memory
pub struct Exhausted;

unsafe impl Allocator for Exhausted {
    fn allocate(&self, _: Layout) -> Result<NonNull<[u8]>, AllocError> { Err(AllocError) }
    unsafe fn deallocate(&self, _: NonNull<u8>, _: Layout) {}
}
