//! The foreign side of the bridge: Rust values exposed as host objects.
//!
//! A Rust type becomes host-visible by implementing [`ForeignObject`] (dynamic
//! metadata + a [`HostPeer`] back-reference) and [`ForeignType`] (which host
//! base class its proxy extends). Handles name the value as a
//! `RefCell<dyn ForeignObject>`; the host reaches it only through the C-ABI
//! entry points in [`ForeignEntryPoints`].
//!
//! There are two ownership arrangements:
//!
//! - The Rust side keeps the value ([`ForeignPinned::get_or_create_host_object`]).
//!   The proxy only borrows it. Dropping the value posts
//!   [`EventType::FOREIGN_DELETE`](objbridge_core::EventType::FOREIGN_DELETE)
//!   so the host deletes the proxy.
//! - The host takes the value ([`ForeignBox::into_host`],
//!   [`ForeignBox::construct_in_place`]). The proxy owns it and destroys it
//!   from its own destructor.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::ffi::c_void;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

use objbridge_core::host::{self, HostPtr};
use objbridge_core::{
    BridgeError, BridgeResult, Event, HostBase, HostObject, MetaObject, OwnedHandle, PinnedHandle,
    RawHandle,
};

use crate::descriptor::ProxyDescriptor;
use crate::proxy::{ExtraDestructFn, ForeignProxy, ProxyInit};

/// How a foreign value is stored behind a handle.
type ForeignCell = RefCell<dyn ForeignObject>;

/// A Rust value that can stand behind a host object.
pub trait ForeignObject: Any {
    /// Metadata of the value's dynamic type.
    fn meta_object(&self) -> &'static MetaObject;

    /// Back-reference to the host object, if one was created.
    fn host_peer(&self) -> &HostPeer;
}

/// A concrete foreign type and the host class its proxies extend.
pub trait ForeignType: ForeignObject + Sized {
    type Base: HostBase;

    fn static_meta_object() -> &'static MetaObject;
}

/// The entry points the host calls on the foreign runtime.
///
/// `destroy` is not idempotent; the proxy guarantees at most one call per
/// owning handle. `detach` tells a value that its host object is gone, so
/// dropping the value later posts nothing.
#[repr(C)]
pub struct ForeignEntryPoints {
    pub metadata_for: extern "C" fn(handle: RawHandle) -> *const MetaObject,
    pub destroy: extern "C" fn(handle: RawHandle),
    pub detach: extern "C" fn(handle: RawHandle),
}

static RUST_ENTRY_POINTS: ForeignEntryPoints = ForeignEntryPoints {
    metadata_for,
    destroy,
    detach,
};

impl ForeignEntryPoints {
    /// Entry points for values stored as `RefCell<dyn ForeignObject>`.
    pub fn rust() -> &'static ForeignEntryPoints {
        &RUST_ENTRY_POINTS
    }
}

impl fmt::Debug for ForeignEntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignEntryPoints").finish_non_exhaustive()
    }
}

/// Metadata of the value named by `handle`, or null for an invalid handle.
pub extern "C" fn metadata_for(handle: RawHandle) -> *const MetaObject {
    if !handle.is_valid() {
        return ptr::null();
    }
    // SAFETY: handles are only built from `&ForeignCell` in this module.
    let cell = unsafe { &*handle.as_ptr::<ForeignCell>() };
    // The value may be mutably borrowed by code that is calling into the
    // host right now; only static data is read, so skip the borrow flag.
    let object = unsafe { &*cell.as_ptr() };
    object.meta_object()
}

/// Destroy the value owned by `handle`.
pub extern "C" fn destroy(handle: RawHandle) {
    debug_assert!(handle.is_valid(), "destroy called with an invalid handle");
    if !handle.is_valid() {
        return;
    }
    // SAFETY: owning handles are only built from leaked boxes in this module.
    let mut boxed: Box<ForeignCell> = unsafe { Box::from_raw(handle.as_mut_ptr::<ForeignCell>()) };
    // The host is already deleting the proxy; don't ask it to again.
    boxed.get_mut().host_peer().detach();
    drop(boxed);
}

/// Forget the host object of the value named by `handle`.
pub extern "C" fn detach(handle: RawHandle) {
    if !handle.is_valid() {
        return;
    }
    // SAFETY: a valid pinned handle names a live value.
    let cell = unsafe { &*handle.as_ptr::<ForeignCell>() };
    // Only the peer's Cell is touched, so an outstanding borrow is fine.
    let object = unsafe { &*cell.as_ptr() };
    object.host_peer().detach();
}

/// Check that the value behind `raw` is a `T` and view it as one.
///
/// # Safety
///
/// `raw` must be a live handle built by this module.
unsafe fn downcast_cell<'a, T: ForeignObject>(raw: RawHandle) -> BridgeResult<&'a RefCell<T>> {
    if !raw.is_valid() {
        return Err(BridgeError::InvalidHandle);
    }
    let cell = unsafe { &*raw.as_ptr::<ForeignCell>() };
    let object: &dyn Any = unsafe { &*cell.as_ptr() };
    if !object.is::<T>() {
        return Err(BridgeError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        });
    }
    Ok(unsafe { &*(raw.primary as *const RefCell<T>) })
}

/// Back-reference from a foreign value to its host object.
///
/// Dropping an attached peer asks the host to delete the object. Deleting
/// the object detaches the peer. A queued request must be delivered before
/// the host deletes the object by other means.
#[derive(Default)]
pub struct HostPeer {
    object: Cell<Option<HostPtr>>,
}

impl HostPeer {
    pub fn get(&self) -> Option<HostPtr> {
        self.object.get()
    }

    pub fn is_attached(&self) -> bool {
        self.object.get().is_some()
    }

    fn attach(&self, object: HostPtr) {
        debug_assert!(!self.is_attached(), "host peer attached twice");
        self.object.set(Some(object));
    }

    /// Forget the host object without notifying it.
    pub fn detach(&self) -> Option<HostPtr> {
        self.object.take()
    }
}

impl Drop for HostPeer {
    fn drop(&mut self) {
        if let Some(target) = self.object.take() {
            log::debug!("foreign value dropped; requesting host deletion of {:p}", target.as_ptr());
            // SAFETY: an attached peer's host object is alive until it
            // handles this event.
            unsafe { host::post_event(target, Event::foreign_delete()) };
        }
    }
}

impl fmt::Debug for HostPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(ptr) => write!(f, "HostPeer({:p})", ptr.as_ptr()),
            None => f.write_str("HostPeer(detached)"),
        }
    }
}

/// A foreign value that stays at a fixed address while host objects refer
/// to it.
pub struct ForeignPinned<'a, T: ?Sized> {
    cell: &'a RefCell<T>,
}

impl<T: ?Sized> Clone for ForeignPinned<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for ForeignPinned<'_, T> {}

impl<'a, T: ?Sized> ForeignPinned<'a, T> {
    /// # Safety
    ///
    /// `cell` must not move or be dropped while a host object refers to it,
    /// other than through [`HostPeer`]'s drop notification.
    pub unsafe fn new(cell: &'a RefCell<T>) -> Self {
        Self { cell }
    }

    pub fn borrow(&self) -> Ref<'a, T> {
        self.cell.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'a, T> {
        self.cell.borrow_mut()
    }

    pub fn as_ptr(&self) -> *mut T {
        self.cell.as_ptr()
    }
}

impl<'a, T: ForeignType> ForeignPinned<'a, T> {
    /// The borrowed handle naming this value.
    pub fn handle(&self) -> PinnedHandle {
        let cell: &ForeignCell = self.cell;
        PinnedHandle::new(RawHandle::from_ptr(cell as *const ForeignCell))
    }

    /// The host object for this value, if created.
    pub fn host_object(&self) -> Option<HostPtr> {
        self.peer().get()
    }

    /// The host object for this value, created on first use.
    ///
    /// The proxy borrows the value; the host owns the proxy.
    pub fn get_or_create_host_object(self) -> HostPtr {
        match self.host_object() {
            Some(existing) => existing,
            None => self.create_host_object(),
        }
    }

    /// Create the host object; fails if one exists already.
    pub fn try_create_host_object(self) -> BridgeResult<HostPtr> {
        if self.host_object().is_some() {
            return Err(BridgeError::AlreadyConstructed);
        }
        Ok(self.create_host_object())
    }

    fn create_host_object(self) -> HostPtr {
        let descriptor = ProxyDescriptor::of::<T::Base>();
        let object = host::into_host_ptr((descriptor.create)(ProxyInit::pinned(self.handle())));
        log::debug!(
            "created {} proxy for `{}`",
            descriptor.type_name(),
            T::static_meta_object().class_name()
        );
        self.peer().attach(object);
        object
    }

    fn peer(&self) -> &'a HostPeer {
        // SAFETY: the peer is a plain Cell; reading it does not conflict with
        // an outstanding borrow of the value.
        unsafe { (*self.cell.as_ptr()).host_peer() }
    }

    /// The value behind a host object created for a `T`.
    ///
    /// # Safety
    ///
    /// `object` must be alive for `'a`, and its foreign value with it.
    pub unsafe fn from_host(object: &dyn HostObject) -> BridgeResult<Self> {
        let descriptor = ProxyDescriptor::of::<T::Base>();
        let pinned = (descriptor.get_pinned)(object).ok_or(BridgeError::TypeMismatch {
            expected: descriptor.type_name(),
        })?;
        let cell = unsafe { downcast_cell::<T>(pinned.raw())? };
        Ok(Self { cell })
    }

    /// The value behind a base-class address, as received by static call
    /// entry points.
    ///
    /// # Safety
    ///
    /// `object` must be the address of a live `ForeignProxy<T::Base>`.
    pub unsafe fn from_base_ptr(object: *const c_void) -> BridgeResult<Self> {
        let proxy = unsafe { ForeignProxy::<T::Base>::from_base_ptr(object) };
        let cell = unsafe { downcast_cell::<T>(proxy.pinned().raw())? };
        Ok(Self { cell })
    }
}

impl<T: ?Sized> fmt::Debug for ForeignPinned<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForeignPinned").field(&self.cell.as_ptr()).finish()
    }
}

/// A heap-allocated foreign value.
///
/// Dropping the box drops the value, which deletes its host object if one
/// was created through [`ForeignBox::pinned`].
pub struct ForeignBox<T: ForeignType> {
    inner: Box<RefCell<T>>,
}

impl<T: ForeignType> ForeignBox<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Box::new(RefCell::new(value)),
        }
    }

    pub fn pinned(&self) -> ForeignPinned<'_, T> {
        // SAFETY: the value is boxed and does not move while the box lives;
        // dropping the box notifies the host through the peer.
        unsafe { ForeignPinned::new(&self.inner) }
    }

    pub fn host_object(&self) -> Option<HostPtr> {
        self.pinned().host_object()
    }

    /// Hand the value to the host. The returned heap object owns it and
    /// destroys it when the host deletes the object.
    pub fn into_host(self) -> BridgeResult<HostPtr> {
        self.into_host_with(None)
    }

    /// Like [`ForeignBox::into_host`], with a callback run during teardown
    /// before the value is destroyed.
    pub fn into_host_with(self, extra_destruct: Option<ExtraDestructFn>) -> BridgeResult<HostPtr> {
        if self.host_object().is_some() {
            return Err(BridgeError::AlreadyConstructed);
        }
        let descriptor = ProxyDescriptor::of::<T::Base>();
        let (init, peer) = self.into_owning_init(extra_destruct);
        let object = host::into_host_ptr((descriptor.create)(init));
        peer.attach(object);
        log::debug!(
            "moved `{}` into a host-owned {} proxy",
            T::static_meta_object().class_name(),
            descriptor.type_name()
        );
        Ok(object)
    }

    /// Build an owning proxy for the value in storage that someone else
    /// allocated and will free. The host finalizes it with
    /// [`host::finalize_in_place`].
    ///
    /// # Safety
    ///
    /// `storage` must be valid for `ProxyDescriptor::of::<T::Base>().size`
    /// bytes, aligned to its `align`, and outlive the proxy.
    pub unsafe fn construct_in_place(
        self,
        storage: NonNull<u8>,
        extra_destruct: Option<ExtraDestructFn>,
    ) -> BridgeResult<HostPtr> {
        if self.host_object().is_some() {
            return Err(BridgeError::AlreadyConstructed);
        }
        let descriptor = ProxyDescriptor::of::<T::Base>();
        let (init, peer) = self.into_owning_init(extra_destruct);
        let object = unsafe { (descriptor.construct_in_place)(storage, init) };
        peer.attach(object);
        Ok(object)
    }

    /// Like [`ForeignBox::construct_in_place`], validating the storage first.
    /// On error the value is dropped.
    ///
    /// # Safety
    ///
    /// `storage` must outlive the proxy.
    pub unsafe fn construct_in_storage(
        self,
        storage: &mut [MaybeUninit<u8>],
        extra_destruct: Option<ExtraDestructFn>,
    ) -> BridgeResult<HostPtr> {
        let descriptor = ProxyDescriptor::of::<T::Base>();
        descriptor.check_storage(storage.as_ptr() as *const u8, storage.len())?;
        let start = NonNull::from(storage).cast::<u8>();
        unsafe { self.construct_in_place(start, extra_destruct) }
    }

    /// Leak the value into an owning handle.
    fn into_owning_init(self, extra_destruct: Option<ExtraDestructFn>) -> (ProxyInit, &'static HostPeer) {
        let leaked: &'static RefCell<T> = Box::leak(self.inner);
        // SAFETY: the peer lives as long as the leaked value, which is
        // released only through `destroy`.
        let peer: &'static HostPeer = unsafe { (*leaked.as_ptr()).host_peer() };
        let cell: &ForeignCell = leaked;
        let raw = RawHandle::from_ptr(cell as *const ForeignCell);
        // SAFETY: the value was just leaked; the proxy becomes its only owner.
        let owned = unsafe { OwnedHandle::from_raw(raw) };
        let mut init = ProxyInit::owning(owned);
        init.extra_destruct = extra_destruct;
        (init, peer)
    }
}

impl<T: ForeignType + fmt::Debug> fmt::Debug for ForeignBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForeignBox").field(&self.inner).finish()
    }
}
