use super::base::RefCountBase;
use crate::error::MakeSharedError;
use allocator_api2::alloc::{ Allocator, Global };
use std::{
    alloc::Layout,
    cell::UnsafeCell,
    mem::{ self, MaybeUninit },
    ptr::{ self, NonNull }
};

// std::_Ref_count_obj2: counters and payload share a single allocation
#[repr(C)]
pub(crate) struct RefCountObj<T> {
    base: RefCountBase,
    storage: UnsafeCell<MaybeUninit<T>>
}

// Frees a block whose payload was never constructed, if constructing it panics or fails
struct Unconstructed(NonNull<RefCountBase>);

impl Drop for Unconstructed {
    fn drop(&mut self) {
        unsafe { RefCountBase::delete_this(self.0) }
    }
}

impl<T> RefCountObj<T> {
    pub(crate) fn get_layout() -> Layout { Layout::new::<Self>() }

    unsafe fn get_data_ptr(this: NonNull<Self>) -> NonNull<T> {
        unsafe { NonNull::new_unchecked(ptr::addr_of_mut!((*this.as_ptr()).storage) as *mut T) }
    }

    /// Allocates a block and builds the payload in place from `init`, returning the block and the
    /// payload address inside it.
    ///
    /// Blocks are always freed through `Global`, `alloc` is only allowed to differ from it if it
    /// never hands out memory.
    pub(crate) fn new_in<A, E, F>(init: F, alloc: &A) -> Result<(NonNull<RefCountBase>, NonNull<T>), MakeSharedError<E>>
    where A: Allocator,
          F: FnOnce() -> Result<T, E>
    {
        let mem = alloc.allocate(Self::get_layout())?.cast::<Self>();
        // the base goes in first, so the block can free itself if init doesn't come back
        unsafe {
            ptr::addr_of_mut!((*mem.as_ptr()).base)
                .write(RefCountBase::new(Self::destroy, Self::delete_this));
        }
        let guard = Unconstructed(mem.cast());
        let value = init().map_err(MakeSharedError::Construct)?;
        let data = unsafe { Self::get_data_ptr(mem) };
        unsafe { data.as_ptr().write(value) };
        mem::forget(guard);
        Ok((mem.cast(), data))
    }

    unsafe fn destroy(rep: NonNull<RefCountBase>) {
        unsafe { ptr::drop_in_place(Self::get_data_ptr(rep.cast()).as_ptr()) }
    }

    unsafe fn delete_this(rep: NonNull<RefCountBase>) {
        unsafe { Global.deallocate(rep.cast(), Self::get_layout()) }
    }
}
