use log::trace;
use std::{
    cell::Cell,
    ptr::NonNull
};

// Equivalent of std::_Ref_count_base. Every concrete control block is #[repr(C)] and starts with
// this struct, so a pointer to the block can always be read as a pointer to its base.
#[repr(C)]
pub struct RefCountBase {
    // drops the payload (runs the deleter, or drops the inline object)
    destroy: unsafe fn(NonNull<RefCountBase>),
    // frees the memory of the block itself
    delete_this: unsafe fn(NonNull<RefCountBase>),
    uses: Cell<usize>,
    weaks: Cell<usize>
}

fn increment(count: &Cell<usize>) {
    match count.get().checked_add(1) {
        Some(v) => count.set(v),
        // same as std::rc, the only sane response to a counter wrapping around
        None => std::process::abort()
    }
}

impl RefCountBase {
    /// A fresh block is owned by exactly one strong reference.
    pub(crate) fn new(
        destroy: unsafe fn(NonNull<RefCountBase>),
        delete_this: unsafe fn(NonNull<RefCountBase>)
    ) -> Self {
        Self {
            destroy,
            delete_this,
            uses: Cell::new(1),
            weaks: Cell::new(0)
        }
    }

    pub fn strong_count(&self) -> usize { self.uses.get() }
    pub fn weak_count(&self) -> usize { self.weaks.get() }

    /// True once neither strong nor weak references remain and the block can be freed.
    pub fn is_unused(&self) -> bool { self.uses.get() == 0 && self.weaks.get() == 0 }

    pub(crate) fn add_strong(&self) { increment(&self.uses) }
    pub(crate) fn add_weak(&self) { increment(&self.weaks) }

    /// Drops one strong reference, destroying the payload when it was the last one. The block
    /// itself is left alone, callers free it with `delete_this` once `is_unused` holds.
    ///
    /// If the payload's `Drop` or a deleter panics, the weak reference held across `destroy` is
    /// never released and the block leaks, as with `Rc`. Deleters must not panic.
    ///
    /// # Safety
    /// `this` must point to a live block and the caller must own one of its strong references.
    pub(crate) unsafe fn release_strong(this: NonNull<Self>) {
        let rep = unsafe { this.as_ref() };
        debug_assert!(rep.uses.get() > 0, "Released a strong reference that was never added");
        let uses = rep.uses.get() - 1;
        rep.uses.set(uses);
        if uses == 0 {
            // the payload can own weak references to its own block, hold one of ours while it
            // runs so none of them frees the block in the middle of this release
            rep.add_weak();
            trace!("destroying payload of control block {:p}", this);
            let destroy = rep.destroy;
            unsafe { destroy(this) };
            rep.release_weak();
        }
    }

    pub(crate) fn release_weak(&self) {
        debug_assert!(self.weaks.get() > 0, "Released a weak reference that was never added");
        self.weaks.set(self.weaks.get() - 1);
    }

    /// # Safety
    /// `this` must point to a live block that no handle references anymore. The payload must
    /// already be destroyed, or never have been constructed.
    pub(crate) unsafe fn delete_this(this: NonNull<Self>) {
        trace!("deallocating control block {:p}", this);
        let delete_this = unsafe { this.as_ref() }.delete_this;
        unsafe { delete_this(this) }
    }
}
