use crate::{
    control_block::base::RefCountBase,
    shared_ptr::SharedPtr
};
use std::{
    fmt::Debug,
    mem,
    ptr::NonNull
};

// std::weak_ptr
/// Non-owning handle to an object managed by [`SharedPtr`]. Keeps the control block alive but not
/// the object, use [`WeakPtr::lock`] to get at the object while it still exists.
pub struct WeakPtr<T: ?Sized> {
    ptr: Option<NonNull<T>>,
    rep: Option<NonNull<RefCountBase>>,
    aliased: bool
}

impl<T: ?Sized> WeakPtr<T> {
    pub fn new(shared: &SharedPtr<T>) -> Self {
        let rep = shared.rep();
        if let Some(r) = rep {
            unsafe { r.as_ref() }.add_weak();
        }
        Self { ptr: shared.as_ptr(), rep, aliased: shared.is_aliased() }
    }

    fn get_rep(&self) -> Option<&RefCountBase> {
        self.rep.map(|r| unsafe { &*r.as_ptr() })
    }

    pub fn use_count(&self) -> usize { self.get_rep().map_or(0, |r| r.strong_count()) }
    pub fn weak_count(&self) -> usize { self.get_rep().map_or(0, |r| r.weak_count()) }

    pub fn expired(&self) -> bool { self.use_count() == 0 }

    /// Upgrades to a strong handle, or returns an empty one if the object is already gone. The
    /// check and the increment can't be interleaved with another release since the counters never
    /// leave the current thread.
    pub fn lock(&self) -> SharedPtr<T> {
        match self.get_rep() {
            Some(rep) if rep.strong_count() > 0 => {
                rep.add_strong();
                SharedPtr::from_parts(self.ptr, self.rep, self.aliased)
            },
            _ => SharedPtr::default()
        }
    }

    /// True if both handles observe the same control block.
    pub fn owner_eq<U: ?Sized>(&self, other: &WeakPtr<U>) -> bool { self.rep == other.rep }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.ptr, &mut other.ptr);
        mem::swap(&mut self.rep, &mut other.rep);
        mem::swap(&mut self.aliased, &mut other.aliased);
    }

    pub fn take(&mut self) -> Self { mem::take(self) }

    pub fn reset(&mut self) {
        Self::default().swap(self);
    }
}

impl<T: ?Sized> Default for WeakPtr<T> {
    fn default() -> Self { Self { ptr: None, rep: None, aliased: false } }
}

impl<T: ?Sized> From<&SharedPtr<T>> for WeakPtr<T> {
    fn from(value: &SharedPtr<T>) -> Self { Self::new(value) }
}

impl<T: ?Sized> Clone for WeakPtr<T> {
    fn clone(&self) -> Self {
        if let Some(rep) = self.get_rep() {
            rep.add_weak();
        }
        Self { ptr: self.ptr, rep: self.rep, aliased: self.aliased }
    }
}

impl<T: ?Sized> Drop for WeakPtr<T> {
    fn drop(&mut self) {
        let Some(rep) = self.rep else { return };
        unsafe {
            rep.as_ref().release_weak();
            // no other SharedPtr/WeakPtr is referencing this, safe to free
            if rep.as_ref().is_unused() {
                RefCountBase::delete_this(rep);
            }
        }
    }
}

impl<T> Debug for WeakPtr<T>
where T: ?Sized + Debug
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // read the counts before locking bumps the strong one
        let (strong, weak) = (self.use_count(), self.weak_count());
        let data = self.lock();
        write!(f, "WeakPtr {{ data: {:?}, strong: {}, weak: {} }}", data.get(), strong, weak)
    }
}
