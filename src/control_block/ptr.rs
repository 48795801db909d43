use super::base::RefCountBase;
use allocator_api2::alloc::{ AllocError, Allocator, Global };
use log::debug;
use std::{
    alloc::Layout,
    mem::ManuallyDrop,
    ptr::NonNull
};

/// Deleter used when adopting a pointer without an explicit one. Reclaims a pointer produced by
/// `Box::into_raw`, and like `delete nullptr` does nothing for a null pointer.
pub(crate) fn default_delete<T: ?Sized>(ptr: *mut T) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(ptr) });
    }
}

// std::_Ref_count_resource: a block for a payload that was allocated somewhere else
#[repr(C)]
pub(crate) struct RefCountPtr<T: ?Sized, D> {
    base: RefCountBase,
    ptr: *mut T,
    deleter: ManuallyDrop<D>
}

impl<T, D> RefCountPtr<T, D>
where T: ?Sized,
      D: FnOnce(*mut T)
{
    pub(crate) fn get_layout() -> Layout { Layout::new::<Self>() }

    /// Allocates a block adopting `ptr`. If the allocation fails `deleter` is run on `ptr` right
    /// away, so the adopted resource never leaks.
    ///
    /// Blocks are always freed through `Global`, `alloc` is only allowed to differ from it if it
    /// never hands out memory.
    pub(crate) fn new_in<A>(ptr: *mut T, deleter: D, alloc: &A) -> Result<NonNull<RefCountBase>, AllocError>
    where A: Allocator
    {
        let mem = match alloc.allocate(Self::get_layout()) {
            Ok(m) => m.cast::<Self>(),
            Err(e) => {
                debug!("control block allocation failed, running deleter on {:p}", ptr);
                deleter(ptr);
                return Err(e);
            }
        };
        unsafe {
            mem.as_ptr().write(Self {
                base: RefCountBase::new(Self::destroy, Self::delete_this),
                ptr,
                deleter: ManuallyDrop::new(deleter)
            });
        }
        Ok(mem.cast())
    }

    unsafe fn destroy(rep: NonNull<RefCountBase>) {
        let this = rep.cast::<Self>().as_ptr();
        unsafe {
            let deleter = ManuallyDrop::take(&mut (*this).deleter);
            deleter((*this).ptr);
        }
    }

    unsafe fn delete_this(rep: NonNull<RefCountBase>) {
        // the deleter was already moved out by destroy, nothing else in here needs dropping
        unsafe { Global.deallocate(rep.cast(), Self::get_layout()) }
    }
}

#[cfg(test)]
pub mod tests {
    use super::{ default_delete, RefCountPtr };
    use crate::{
        control_block::base::RefCountBase,
        test_support::{ init_logger, Exhausted, Tracked }
    };
    use allocator_api2::alloc::Global;
    use std::{
        cell::Cell,
        error::Error,
        rc::Rc
    };
    type TestReturn = Result<(), Box<dyn Error>>;

    #[test]
    fn deleter_runs_once_on_release() -> TestReturn {
        init_logger();
        let raw = Box::into_raw(Box::new(7u64));
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::new(Cell::new(std::ptr::null_mut()));
        let (c, s) = (calls.clone(), seen.clone());
        let rep = RefCountPtr::new_in(raw, move |p: *mut u64| {
            c.set(c.get() + 1);
            s.set(p);
            default_delete(p);
        }, &Global).map_err(|_| "control block allocation failed")?;
        unsafe {
            rep.as_ref().add_strong();
            RefCountBase::release_strong(rep);
            assert!(calls.get() == 0, "Deleter ran while a strong reference remains");
            RefCountBase::release_strong(rep);
            assert!(calls.get() == 1, "Deleter should run exactly once instead of {}", calls.get());
            assert!(seen.get() == raw, "Deleter should receive the adopted pointer");
            assert!(rep.as_ref().is_unused(), "Block should be unused after the last release");
            RefCountBase::delete_this(rep);
        }
        assert!(calls.get() == 1, "Freeing the block must not run the deleter again");
        Ok(())
    }

    #[test]
    fn failed_allocation_runs_deleter() -> TestReturn {
        let drops = Rc::new(Cell::new(0));
        let raw = Box::into_raw(Box::new(Tracked::new(1, &drops)));
        let res = RefCountPtr::new_in(raw, default_delete::<Tracked>, &Exhausted);
        assert!(res.is_err(), "Allocation through an exhausted allocator should fail");
        assert!(drops.get() == 1, "Adopted payload should be deleted when the block can't be allocated");
        Ok(())
    }

    #[test]
    fn default_delete_ignores_null() -> TestReturn {
        default_delete::<String>(std::ptr::null_mut());
        Ok(())
    }
}
