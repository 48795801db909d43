use crate::{
    control_block::{
        base::RefCountBase,
        obj::RefCountObj,
        ptr::{ default_delete, RefCountPtr }
    },
    error::MakeSharedError,
    weak_ptr::WeakPtr
};
use allocator_api2::alloc::{ AllocError, Allocator, Global };
use std::{
    alloc::handle_alloc_error,
    convert::Infallible,
    fmt::{ Debug, Display, Pointer },
    hash::{ Hash, Hasher },
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::{ self, NonNull }
};

/// Null sentinel, the counterpart of C++ `nullptr`. Compares equal to every empty handle and
/// converts into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullPtr;

// std::shared_ptr
/// Owning handle to a reference counted object. Clones share the object, which is destroyed when
/// the last `SharedPtr` pointing at its control block goes away.
///
/// The control block and the exposed payload address are tracked separately, so a handle can keep
/// a whole object alive while only exposing a part of it (see [`SharedPtr::project`]). Counters
/// are not atomic and the type is neither `Send` nor `Sync`.
pub struct SharedPtr<T: ?Sized> {
    ptr: Option<NonNull<T>>,
    rep: Option<NonNull<RefCountBase>>,
    // set when ptr was supplied by aliasing/project rather than by the block, such a pointer is
    // only good for reads
    aliased: bool,
    // the handle can end up dropping a T
    _data: PhantomData<T>
}

impl<T> SharedPtr<T> {
    /// Construct an object of type T and wrap it in a SharedPtr. The counters and the object share
    /// a single allocation.
    pub fn make_shared(value: T) -> Self { Self::make_shared_with(|| value) }

    /// Like `make_shared`, but the object is built by `init` once storage for it exists.
    pub fn make_shared_with<F>(init: F) -> Self
    where F: FnOnce() -> T
    {
        match Self::try_make_shared_in(|| Ok::<T, Infallible>(init()), &Global) {
            Ok(v) => v,
            Err(MakeSharedError::Alloc(_)) => handle_alloc_error(RefCountObj::<T>::get_layout()),
            Err(MakeSharedError::Construct(e)) => match e {}
        }
    }

    pub fn try_make_shared(value: T) -> Result<Self, AllocError> {
        Self::try_make_shared_in(|| Ok::<T, Infallible>(value), &Global).map_err(|e| match e {
            MakeSharedError::Alloc(a) => a,
            MakeSharedError::Construct(e) => match e {}
        })
    }

    /// Combined allocation with a fallible constructor. On failure the block is freed again and
    /// the constructor's error is handed back.
    pub fn try_make_shared_with<E, F>(init: F) -> Result<Self, MakeSharedError<E>>
    where F: FnOnce() -> Result<T, E>
    {
        Self::try_make_shared_in(init, &Global)
    }

    pub(crate) fn try_make_shared_in<A, E, F>(init: F, alloc: &A) -> Result<Self, MakeSharedError<E>>
    where A: Allocator,
          F: FnOnce() -> Result<T, E>
    {
        let (rep, ptr) = RefCountObj::new_in(init, alloc)?;
        Ok(Self::from_parts(Some(ptr), Some(rep), false))
    }
}

impl<T: ?Sized> SharedPtr<T> {
    /// Adopts a pointer created by `Box::into_raw`.
    ///
    /// # Safety
    /// `ptr` must be null or come from `Box::into_raw`, and must not be owned by anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        unsafe { Self::adopt(ptr, default_delete::<T>) }
    }

    /// Adopts `ptr`, calling `deleter` on it once the last strong reference is released. If the
    /// control block can't be allocated `deleter` runs immediately before the allocation error is
    /// raised.
    ///
    /// # Safety
    /// `ptr` must stay valid for reads through the returned handle until `deleter` is called.
    pub unsafe fn from_raw_with<D>(ptr: *mut T, deleter: D) -> Self
    where D: FnOnce(*mut T) + 'static
    {
        unsafe { Self::adopt(ptr, deleter) }
    }

    /// # Safety
    /// See [`SharedPtr::from_raw`].
    pub unsafe fn try_from_raw(ptr: *mut T) -> Result<Self, AllocError> {
        unsafe { Self::try_from_raw_in(ptr, default_delete::<T>, &Global) }
    }

    /// # Safety
    /// See [`SharedPtr::from_raw_with`].
    pub unsafe fn try_from_raw_with<D>(ptr: *mut T, deleter: D) -> Result<Self, AllocError>
    where D: FnOnce(*mut T) + 'static
    {
        unsafe { Self::try_from_raw_in(ptr, deleter, &Global) }
    }

    // the public constructors ask for 'static deleters since the handle doesn't carry D's lifetime,
    // the default deleter only borrows through T, which the handle does carry
    unsafe fn adopt<D>(ptr: *mut T, deleter: D) -> Self
    where D: FnOnce(*mut T)
    {
        match unsafe { Self::try_from_raw_in(ptr, deleter, &Global) } {
            Ok(v) => v,
            Err(_) => handle_alloc_error(RefCountPtr::<T, D>::get_layout())
        }
    }

    pub(crate) unsafe fn try_from_raw_in<A, D>(ptr: *mut T, deleter: D, alloc: &A) -> Result<Self, AllocError>
    where A: Allocator,
          D: FnOnce(*mut T)
    {
        let rep = RefCountPtr::new_in(ptr, deleter, alloc)?;
        Ok(Self::from_parts(NonNull::new(ptr), Some(rep), false))
    }

    pub fn from_box(value: Box<T>) -> Self {
        unsafe { Self::from_raw(Box::into_raw(value)) }
    }

    /// Shares the control block of `owner` while exposing `ptr`. The result keeps the whole object
    /// of `owner` alive.
    ///
    /// The handle only ever reads through `ptr`, `get_mut` always returns `None` on it.
    ///
    /// # Safety
    /// `ptr` must stay valid for reads for as long as the object managed by `owner` is alive,
    /// typically by pointing into it. It doesn't need to be writable.
    pub unsafe fn aliasing<Y>(owner: &SharedPtr<Y>, ptr: *mut T) -> Self
    where Y: ?Sized + 'static
    {
        if let Some(rep) = owner.rep {
            unsafe { rep.as_ref() }.add_strong();
        }
        Self::from_parts(NonNull::new(ptr), owner.rep, true)
    }

    /// Safe form of the aliasing constructor: the exposed reference is derived from the current
    /// payload, for example a field of it or the payload as a trait object.
    pub fn project<U, F>(&self, f: F) -> SharedPtr<U>
    where T: 'static,
          U: ?Sized,
          F: FnOnce(&T) -> &U
    {
        let ptr = self.get().map(|v| NonNull::from(f(v)));
        if let Some(rep) = self.rep {
            unsafe { rep.as_ref() }.add_strong();
        }
        SharedPtr::from_parts(ptr, self.rep, true)
    }

    pub(crate) fn from_parts(ptr: Option<NonNull<T>>, rep: Option<NonNull<RefCountBase>>, aliased: bool) -> Self {
        Self { ptr, rep, aliased, _data: PhantomData }
    }

    pub(crate) fn is_aliased(&self) -> bool { self.aliased }

    pub(crate) fn rep(&self) -> Option<NonNull<RefCountBase>> { self.rep }

    fn get_rep(&self) -> Option<&RefCountBase> {
        self.rep.map(|r| unsafe { &*r.as_ptr() })
    }

    fn addr(&self) -> *const u8 {
        self.ptr.map_or(ptr::null(), |p| p.cast::<u8>().as_ptr())
    }

    pub fn get(&self) -> Option<&T> {
        self.ptr.map(|p| unsafe { &*p.as_ptr() })
    }

    /// # Safety
    /// The handle must not be null.
    pub unsafe fn get_unchecked(&self) -> &T {
        unsafe { &*self.ptr.unwrap_unchecked().as_ptr() }
    }

    /// Mutable access, granted only while this is the sole strong handle and no weak handle could
    /// upgrade behind its back. Handles made by `aliasing` or `project` never grant it.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.aliased {
            return None;
        }
        let rep = self.get_rep()?;
        if rep.strong_count() != 1 || rep.weak_count() != 0 {
            return None;
        }
        self.ptr.map(|p| unsafe { &mut *p.as_ptr() })
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> { self.ptr }

    pub fn is_null(&self) -> bool { self.ptr.is_none() }

    pub fn use_count(&self) -> usize { self.get_rep().map_or(0, |r| r.strong_count()) }
    pub fn weak_count(&self) -> usize { self.get_rep().map_or(0, |r| r.weak_count()) }
    pub fn unique(&self) -> bool { self.use_count() == 1 }

    /// True if both handles share a control block, whatever address they expose.
    pub fn owner_eq<U: ?Sized>(&self, other: &SharedPtr<U>) -> bool { self.rep == other.rep }

    pub fn downgrade(&self) -> WeakPtr<T> { WeakPtr::new(self) }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.ptr, &mut other.ptr);
        mem::swap(&mut self.rep, &mut other.rep);
        mem::swap(&mut self.aliased, &mut other.aliased);
    }

    /// Moves the handle out, leaving an empty one behind. Counters are untouched.
    pub fn take(&mut self) -> Self { mem::take(self) }

    pub fn reset(&mut self) {
        Self::default().swap(self);
    }

    /// # Safety
    /// See [`SharedPtr::from_raw`].
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) {
        unsafe { Self::from_raw(ptr) }.swap(self);
    }

    /// # Safety
    /// See [`SharedPtr::from_raw_with`].
    pub unsafe fn reset_with<D>(&mut self, ptr: *mut T, deleter: D)
    where D: FnOnce(*mut T) + 'static
    {
        unsafe { Self::from_raw_with(ptr, deleter) }.swap(self);
    }
}

/// Shorthand for [`SharedPtr::make_shared`].
pub fn make_shared<T>(value: T) -> SharedPtr<T> { SharedPtr::make_shared(value) }

/// Shorthand for [`SharedPtr::make_shared_with`].
pub fn make_shared_with<T, F>(init: F) -> SharedPtr<T>
where F: FnOnce() -> T
{
    SharedPtr::make_shared_with(init)
}

impl<T: ?Sized> Default for SharedPtr<T> {
    fn default() -> Self { Self::from_parts(None, None, false) }
}

impl<T: ?Sized> From<NullPtr> for SharedPtr<T> {
    fn from(_: NullPtr) -> Self { Self::default() }
}

impl<T: ?Sized> From<Box<T>> for SharedPtr<T> {
    fn from(value: Box<T>) -> Self { Self::from_box(value) }
}

impl<T: ?Sized> From<&WeakPtr<T>> for SharedPtr<T> {
    fn from(value: &WeakPtr<T>) -> Self { value.lock() }
}

impl<T: ?Sized> Clone for SharedPtr<T> {
    fn clone(&self) -> Self {
        if let Some(rep) = self.get_rep() {
            rep.add_strong();
        }
        Self::from_parts(self.ptr, self.rep, self.aliased)
    }
}

impl<T: ?Sized> Drop for SharedPtr<T> {
    fn drop(&mut self) {
        let Some(rep) = self.rep else { return };
        unsafe {
            RefCountBase::release_strong(rep);
            if rep.as_ref().is_unused() {
                RefCountBase::delete_this(rep);
            }
        }
    }
}

impl<T: ?Sized> Deref for SharedPtr<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(v) => v,
            None => panic!("Tried to dereference a null SharedPtr")
        }
    }
}

impl<T: ?Sized> AsRef<T> for SharedPtr<T> {
    fn as_ref(&self) -> &T { self }
}

impl<T: ?Sized, U: ?Sized> PartialEq<SharedPtr<U>> for SharedPtr<T> {
    fn eq(&self, other: &SharedPtr<U>) -> bool { self.addr() == other.addr() }
}

impl<T: ?Sized> Eq for SharedPtr<T> {}

impl<T: ?Sized> PartialEq<NullPtr> for SharedPtr<T> {
    fn eq(&self, _: &NullPtr) -> bool { self.is_null() }
}

impl<T: ?Sized> PartialEq<SharedPtr<T>> for NullPtr {
    fn eq(&self, other: &SharedPtr<T>) -> bool { other.is_null() }
}

impl<T: ?Sized> Hash for SharedPtr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) { self.addr().hash(state) }
}

impl<T> Debug for SharedPtr<T>
where T: ?Sized + Debug
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedPtr {{ data: {:?}, strong: {}, weak: {} }}",
            self.get(), self.use_count(), self.weak_count())
    }
}

impl<T> Display for SharedPtr<T>
where T: ?Sized + Display
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "nullptr")
        }
    }
}

impl<T: ?Sized> Pointer for SharedPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Pointer::fmt(&self.addr(), f)
    }
}
