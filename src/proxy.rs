//! The proxy: a host object whose behavior comes from a foreign object.
//!
//! [`ForeignProxy<B>`] extends a host base class `B` with the handles naming
//! its foreign object. It overrides the host's metadata query and indexed
//! dispatch to consult the foreign object first, and it owns the teardown
//! protocol that keeps the two ownership regimes consistent.
//!
//! # Teardown
//!
//! A proxy is `Live` until its destructor runs, `TearingDown` while the
//! destructor works and `Destroyed` afterwards. Three paths lead there:
//!
//! - **Host deletion** (the host drops the heap object): the owned handle is
//!   taken (invalidating it), the value is detached from this object and the
//!   pinned handle invalidated, the extra destruction callback runs once,
//!   then foreign destruction runs once if the proxy owned the value.
//! - **Foreign deletion request** ([`EventType::FOREIGN_DELETE`]): the pinned
//!   handle is invalidated *before* the host is asked to delete the object,
//!   so the eventual destructor does not call back into a value that may be
//!   gone. An owning handle survives until the destructor destroys it. A
//!   repeated request is consumed and ignored.
//! - **In-place finalization**: same destructor ordering, storage untouched.
//!
//! Foreign destruction happens at most once because the owned handle is
//! emptied before anything that could re-enter teardown is called.

use std::ffi::c_void;
use std::fmt;

use bitflags::bitflags;
use objbridge_core::{
    Event, EventType, HostBase, HostObject, MetaObject, OwnedHandle, PinnedHandle,
};

use crate::dispatch::{DispatchLayer, ForeignLayer, HostLayer, fold_metacall};
use crate::foreign::ForeignEntryPoints;

/// Callback run once during teardown, before foreign destruction. Receives
/// the proxy's base-class address.
pub type ExtraDestructFn = extern "C" fn(object: *mut c_void);

bitflags! {
    /// Bookkeeping bits of a proxy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProxyFlags: u8 {
        /// Constructed in storage the bridge does not own.
        const IN_PLACE = 1 << 0;
        /// Created holding an owning handle.
        const FOREIGN_OWNED = 1 << 1;
        /// A foreign deletion request was acted upon.
        const DELETE_REQUESTED = 1 << 2;
        /// The extra destruction callback was entered. Visible to the
        /// callback itself.
        const EXTRA_DESTRUCT_RAN = 1 << 3;
    }
}

/// Lifecycle of a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Live,
    TearingDown,
    Destroyed,
}

/// Everything a proxy is initialized from.
pub struct ProxyInit {
    pub pinned: PinnedHandle,
    pub owned: OwnedHandle,
    pub extra_destruct: Option<ExtraDestructFn>,
    pub entry: &'static ForeignEntryPoints,
}

impl ProxyInit {
    /// A proxy that only borrows its foreign object.
    pub fn pinned(pinned: PinnedHandle) -> Self {
        Self {
            pinned,
            owned: OwnedHandle::invalid(),
            extra_destruct: None,
            entry: ForeignEntryPoints::rust(),
        }
    }

    /// A proxy that owns its foreign object. The pinned handle is derived
    /// from the owned one.
    pub fn owning(owned: OwnedHandle) -> Self {
        Self {
            pinned: owned.pinned(),
            owned,
            extra_destruct: None,
            entry: ForeignEntryPoints::rust(),
        }
    }

    /// Separate pinned and owned handles.
    pub fn split(pinned: PinnedHandle, owned: OwnedHandle) -> Self {
        Self {
            pinned,
            owned,
            extra_destruct: None,
            entry: ForeignEntryPoints::rust(),
        }
    }

    pub fn with_extra_destruct(mut self, f: ExtraDestructFn) -> Self {
        self.extra_destruct = Some(f);
        self
    }

    pub fn with_entry_points(mut self, entry: &'static ForeignEntryPoints) -> Self {
        self.entry = entry;
        self
    }
}

impl fmt::Debug for ProxyInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyInit")
            .field("pinned", &self.pinned)
            .field("owned", &self.owned)
            .field("extra_destruct", &self.extra_destruct.is_some())
            .finish_non_exhaustive()
    }
}

/// A host object of base class `B` backed by a foreign object.
///
/// The base is the first field, so the proxy's address is its base-class
/// address.
#[repr(C)]
pub struct ForeignProxy<B: HostBase> {
    base: B,
    pinned: PinnedHandle,
    owned: OwnedHandle,
    extra_destruct: Option<ExtraDestructFn>,
    entry: &'static ForeignEntryPoints,
    lifecycle: Lifecycle,
    flags: ProxyFlags,
}

impl<B: HostBase> ForeignProxy<B> {
    pub(crate) fn new(init: ProxyInit, mut flags: ProxyFlags) -> Self {
        if init.owned.is_valid() {
            flags |= ProxyFlags::FOREIGN_OWNED;
        }
        Self {
            base: B::default(),
            pinned: init.pinned,
            owned: init.owned,
            extra_destruct: init.extra_destruct,
            entry: init.entry,
            lifecycle: Lifecycle::Live,
            flags,
        }
    }

    /// Reinterpret a base-class address as a proxy.
    ///
    /// # Safety
    ///
    /// `object` must be the address of a live `ForeignProxy<B>`.
    pub unsafe fn from_base_ptr<'a>(object: *const c_void) -> &'a Self {
        unsafe { &*(object as *const Self) }
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut B {
        &mut self.base
    }

    /// The borrowed handle used for metadata queries.
    pub fn pinned(&self) -> PinnedHandle {
        self.pinned
    }

    /// Whether the proxy still refers to a foreign object. An invalid proxy
    /// answers queries from its base class alone.
    pub fn is_foreign_valid(&self) -> bool {
        self.pinned.is_valid()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn flags(&self) -> ProxyFlags {
        self.flags
    }

    /// The foreign object's metadata, if the proxy still has one.
    pub fn foreign_meta_object(&self) -> Option<&'static MetaObject> {
        if !self.pinned.is_valid() {
            return None;
        }
        let meta = (self.entry.metadata_for)(self.pinned.raw());
        // SAFETY: foreign metadata is static for the life of the program.
        unsafe { meta.as_ref() }
    }

    fn base_address(&mut self) -> *mut c_void {
        self as *mut Self as *mut c_void
    }

    /// Act on a foreign deletion request. Returns `true` either way: the
    /// event is reserved and never reaches the base class.
    ///
    /// The pinned handle is dropped without touching the value, which may
    /// already be gone. An owning handle is kept so teardown destroys the
    /// value exactly once.
    fn foreign_delete_requested(&mut self) -> bool {
        if self.flags.contains(ProxyFlags::DELETE_REQUESTED) || self.lifecycle != Lifecycle::Live {
            log::debug!("ignoring repeated foreign delete request");
            return true;
        }
        self.pinned.invalidate();
        self.flags |= ProxyFlags::DELETE_REQUESTED;
        log::debug!("foreign delete requested; scheduling host deletion");
        self.base.delete_later();
        true
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn tear_down(&mut self) {
        debug_assert_eq!(self.lifecycle, Lifecycle::Live, "proxy torn down twice");
        if self.lifecycle != Lifecycle::Live {
            return;
        }
        self.lifecycle = Lifecycle::TearingDown;

        let owned = self.owned.take();
        if self.pinned.is_valid() {
            // The value outlives a borrowing proxy; stop it from posting
            // deletion requests to this object.
            (self.entry.detach)(self.pinned.raw());
        }
        self.pinned.invalidate();

        if let Some(extra) = self.extra_destruct.take() {
            self.flags |= ProxyFlags::EXTRA_DESTRUCT_RAN;
            let object = self.base_address();
            extra(object);
        }
        if let Some(raw) = owned {
            log::debug!("destroying foreign object {raw:?}");
            (self.entry.destroy)(raw);
        }

        self.lifecycle = Lifecycle::Destroyed;
    }
}

impl<B: HostBase> HostObject for ForeignProxy<B> {
    fn meta_object(&self) -> &MetaObject {
        match self.foreign_meta_object() {
            Some(meta) => meta,
            None => self.base.meta_object(),
        }
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn metacall(&mut self, call: u32, index: i32, args: *mut *mut c_void) -> i32 {
        let object = self.base_address();
        let foreign = self.foreign_meta_object();
        let mut base = HostLayer::new(&mut self.base);
        // SAFETY: `args` comes from the host and matches `(call, index)`.
        unsafe {
            match foreign {
                Some(meta) => {
                    let mut layer = ForeignLayer::new(meta, object);
                    fold_metacall(
                        call,
                        index,
                        args,
                        &mut [&mut base as &mut dyn DispatchLayer, &mut layer],
                    )
                }
                None => fold_metacall(call, index, args, &mut [&mut base as &mut dyn DispatchLayer]),
            }
        }
    }

    fn event(&mut self, event: &mut Event) -> bool {
        if event.kind() == EventType::FOREIGN_DELETE {
            event.accept();
            return self.foreign_delete_requested();
        }
        self.base.event(event)
    }

    fn delete_later(&mut self) {
        self.base.delete_later();
    }
}

impl<B: HostBase> Drop for ForeignProxy<B> {
    fn drop(&mut self) {
        self.tear_down();
    }
}

impl<B: HostBase> fmt::Debug for ForeignProxy<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignProxy")
            .field("base", &std::any::type_name::<B>())
            .field("pinned", &self.pinned)
            .field("owned", &self.owned)
            .field("lifecycle", &self.lifecycle)
            .field("flags", &self.flags)
            .finish()
    }
}
