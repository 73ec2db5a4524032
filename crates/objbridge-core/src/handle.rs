//! Two-word handles naming foreign objects across the host boundary.
//!
//! A foreign object is referenced from the host side by a [`RawHandle`]: the
//! two machine words of a trait-object pointer (data + vtable). The host never
//! interprets the words; it only hands them back through the foreign entry
//! points.
//!
//! Two typed wrappers give the words an ownership meaning:
//!
//! - [`PinnedHandle`] borrows. It is `Copy`, never triggers destruction and is
//!   invalid once its referent is gone.
//! - [`OwnedHandle`] owns. It is not `Copy`; [`OwnedHandle::take`] is the only
//!   way to get the words back out, and it invalidates the handle in the same
//!   step so destruction can be delivered at most once.

use std::ffi::c_void;
use std::fmt;
use std::mem::size_of;
use std::ptr;

/// The raw two-word representation of a foreign reference.
///
/// A handle is valid iff both words are non-null. Both words null is the
/// canonical invalidated state.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle {
    pub primary: *const c_void,
    pub secondary: *const c_void,
}

impl RawHandle {
    /// The invalidated handle.
    pub const INVALID: RawHandle = RawHandle {
        primary: ptr::null(),
        secondary: ptr::null(),
    };

    /// Split a two-word pointer (`*const dyn Trait`) into a handle.
    pub fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        const { assert!(size_of::<*const T>() == size_of::<RawHandle>()) };
        // SAFETY: both types are two plain words.
        unsafe { std::mem::transmute_copy::<*const T, RawHandle>(&ptr) }
    }

    /// Rebuild the pointer this handle was made from.
    ///
    /// # Safety
    ///
    /// The handle must have been produced by [`RawHandle::from_ptr`] with the
    /// same `T`.
    pub unsafe fn as_ptr<T: ?Sized>(self) -> *const T {
        const { assert!(size_of::<*const T>() == size_of::<RawHandle>()) };
        unsafe { std::mem::transmute_copy::<RawHandle, *const T>(&self) }
    }

    /// Rebuild the mutable pointer this handle was made from.
    ///
    /// # Safety
    ///
    /// Same as [`RawHandle::as_ptr`].
    pub unsafe fn as_mut_ptr<T: ?Sized>(self) -> *mut T {
        unsafe { self.as_ptr::<T>() as *mut T }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.primary.is_null() && !self.secondary.is_null()
    }
}

impl Default for RawHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:p}, {:p})", self.primary, self.secondary)
    }
}

/// A borrowed handle. Used for metadata queries and to find the foreign object
/// from the host side; never used for destruction.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PinnedHandle(RawHandle);

impl PinnedHandle {
    pub const INVALID: PinnedHandle = PinnedHandle(RawHandle::INVALID);

    pub fn new(raw: RawHandle) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> RawHandle {
        self.0
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0.is_valid()
    }

    /// Reset to the invalid state. The referent is not touched.
    #[inline]
    pub fn invalidate(&mut self) {
        self.0 = RawHandle::INVALID;
    }
}

/// An owning handle. Whoever calls [`OwnedHandle::take`] and gets `Some` is
/// responsible for delivering foreign destruction exactly once.
#[repr(transparent)]
#[derive(PartialEq, Eq)]
pub struct OwnedHandle(RawHandle);

impl OwnedHandle {
    /// A handle that owns nothing.
    pub const fn invalid() -> Self {
        Self(RawHandle::INVALID)
    }

    /// Take ownership of the object named by `raw`.
    ///
    /// # Safety
    ///
    /// `raw` must name a live foreign object that nothing else will destroy.
    pub unsafe fn from_raw(raw: RawHandle) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0.is_valid()
    }

    /// A borrowed view of the same object.
    pub fn pinned(&self) -> PinnedHandle {
        PinnedHandle(self.0)
    }

    /// Invalidate the handle and return the words it held, if any.
    ///
    /// After this call the handle is invalid, so a second call (including a
    /// reentrant one) returns `None`.
    #[inline]
    pub fn take(&mut self) -> Option<RawHandle> {
        let raw = std::mem::replace(&mut self.0, RawHandle::INVALID);
        raw.is_valid().then_some(raw)
    }
}

impl Default for OwnedHandle {
    fn default() -> Self {
        Self::invalid()
    }
}

impl fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnedHandle").field(&self.0).finish()
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if self.is_valid() {
            log::warn!("owned foreign handle {:?} dropped without release", self.0);
        }
    }
}
