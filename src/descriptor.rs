//! Per-base-class construction descriptors.
//!
//! The foreign side does not know the layout of `ForeignProxy<B>`. It asks
//! for the descriptor of a host base class and uses it to create proxies on
//! the heap, construct them in storage it supplies, or recover the handle
//! from an existing host object.
//!
//! Descriptors are created once per base class and live for the rest of the
//! program.

use std::alloc::Layout;
use std::any::{Any, TypeId};
use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;
use std::sync::{Mutex, OnceLock, PoisonError};

use objbridge_core::{
    BridgeError, BridgeResult, HostBase, HostObject, HostPtr, MetaObject, PinnedHandle,
};
use rustc_hash::FxHashMap;

use crate::proxy::{ForeignProxy, ProxyFlags, ProxyInit};

static DESCRIPTORS: OnceLock<Mutex<FxHashMap<TypeId, &'static ProxyDescriptor>>> = OnceLock::new();

/// How to build and inspect proxies of one host base class.
pub struct ProxyDescriptor {
    /// Size in bytes of the proxy.
    pub size: usize,
    /// Required alignment of in-place storage.
    pub align: usize,
    pub base_meta_object: &'static MetaObject,
    /// Create a proxy on the heap.
    pub create: fn(ProxyInit) -> Box<dyn HostObject>,
    /// Construct a proxy at a caller-supplied address of at least `size`
    /// bytes aligned to `align`. The caller keeps the storage and finalizes
    /// the object with [`objbridge_core::host::finalize_in_place`].
    pub construct_in_place: unsafe fn(NonNull<u8>, ProxyInit) -> HostPtr,
    /// The pinned handle of a host object, if it is a proxy of this base.
    pub get_pinned: fn(&dyn HostObject) -> Option<PinnedHandle>,
    type_id: TypeId,
    type_name: &'static str,
}

impl ProxyDescriptor {
    /// The descriptor for proxies extending `B`.
    pub fn of<B: HostBase>() -> &'static ProxyDescriptor {
        let registry = DESCRIPTORS.get_or_init(|| Mutex::new(FxHashMap::default()));
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        *registry.entry(TypeId::of::<B>()).or_insert_with(|| {
            log::debug!("registering proxy descriptor for {}", std::any::type_name::<B>());
            Box::leak(Box::new(Self::build::<B>()))
        })
    }

    fn build<B: HostBase>() -> ProxyDescriptor {
        ProxyDescriptor {
            size: size_of::<ForeignProxy<B>>(),
            align: align_of::<ForeignProxy<B>>(),
            base_meta_object: B::static_meta_object(),
            create: create::<B>,
            construct_in_place: construct_in_place::<B>,
            get_pinned: get_pinned::<B>,
            type_id: TypeId::of::<B>(),
            type_name: std::any::type_name::<B>(),
        }
    }

    /// The host base class this descriptor serves.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn layout(&self) -> Layout {
        // Size and alignment come from a real type.
        Layout::from_size_align(self.size, self.align).unwrap_or_else(|_| Layout::new::<u8>())
    }

    /// Whether `len` bytes at `storage` can hold a proxy.
    pub fn check_storage(&self, storage: *const u8, len: usize) -> BridgeResult<()> {
        if len < self.size {
            return Err(BridgeError::StorageTooSmall {
                required: self.size,
                provided: len,
            });
        }
        if (storage as usize) % self.align != 0 {
            return Err(BridgeError::MisalignedStorage {
                required: self.align,
                address: storage as usize,
            });
        }
        Ok(())
    }

    /// [`ProxyDescriptor::construct_in_place`] after validating the storage.
    ///
    /// # Safety
    ///
    /// `storage` must stay valid until the proxy is finalized.
    pub unsafe fn checked_construct_in_place(
        &self,
        storage: NonNull<u8>,
        len: usize,
        init: ProxyInit,
    ) -> BridgeResult<HostPtr> {
        self.check_storage(storage.as_ptr(), len)?;
        Ok(unsafe { (self.construct_in_place)(storage, init) })
    }
}

impl fmt::Debug for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyDescriptor")
            .field("base", &self.type_name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("base_meta_object", &self.base_meta_object.class_name())
            .finish_non_exhaustive()
    }
}

fn create<B: HostBase>(init: ProxyInit) -> Box<dyn HostObject> {
    Box::new(ForeignProxy::<B>::new(init, ProxyFlags::empty()))
}

unsafe fn construct_in_place<B: HostBase>(storage: NonNull<u8>, init: ProxyInit) -> HostPtr {
    let slot = storage.cast::<ForeignProxy<B>>();
    debug_assert!(slot.is_aligned(), "in-place storage is misaligned");
    unsafe { slot.as_ptr().write(ForeignProxy::new(init, ProxyFlags::IN_PLACE)) };
    slot
}

fn get_pinned<B: HostBase>(object: &dyn HostObject) -> Option<PinnedHandle> {
    let object: &dyn Any = object;
    object.downcast_ref::<ForeignProxy<B>>().map(ForeignProxy::pinned)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::ffi::c_void;
    use std::mem::MaybeUninit;

    use objbridge_core::host;
    use objbridge_core::{Event, OwnedHandle, RawHandle};

    use super::*;
    use crate::foreign::ForeignEntryPoints;
    use crate::proxy::Lifecycle;

    static WIDGET_META: MetaObject = MetaObject::new(c"Widget", None).with_methods(1);
    static GADGET_META: MetaObject = MetaObject::new(c"Gadget", None);

    #[derive(Default)]
    struct Widget;

    impl HostObject for Widget {
        fn meta_object(&self) -> &MetaObject {
            &WIDGET_META
        }

        fn metacall(&mut self, call: u32, index: i32, _args: *mut *mut c_void) -> i32 {
            index - WIDGET_META.own_count(objbridge_core::CallClass::of_raw(call))
        }

        fn event(&mut self, _event: &mut Event) -> bool {
            false
        }

        fn delete_later(&mut self) {}
    }

    impl HostBase for Widget {
        fn static_meta_object() -> &'static MetaObject {
            &WIDGET_META
        }
    }

    #[derive(Default)]
    struct Gadget([u64; 4]);

    impl HostObject for Gadget {
        fn meta_object(&self) -> &MetaObject {
            &GADGET_META
        }

        fn metacall(&mut self, _call: u32, index: i32, _args: *mut *mut c_void) -> i32 {
            index
        }

        fn event(&mut self, _event: &mut Event) -> bool {
            false
        }

        fn delete_later(&mut self) {}
    }

    impl HostBase for Gadget {
        fn static_meta_object() -> &'static MetaObject {
            &GADGET_META
        }
    }

    thread_local! {
        static DESTROYED: Cell<u32> = const { Cell::new(0) };
    }

    extern "C" fn no_metadata(_handle: RawHandle) -> *const MetaObject {
        std::ptr::null()
    }

    extern "C" fn count_destroy(_handle: RawHandle) {
        DESTROYED.with(|d| d.set(d.get() + 1));
    }

    extern "C" fn ignore_detach(_handle: RawHandle) {}

    static COUNTING: ForeignEntryPoints = ForeignEntryPoints {
        metadata_for: no_metadata,
        destroy: count_destroy,
        detach: ignore_detach,
    };

    static TOKEN: u8 = 0;

    fn owning_init() -> ProxyInit {
        let raw = RawHandle::from_ptr(&TOKEN as *const u8 as *const dyn std::fmt::Debug);
        ProxyInit::owning(unsafe { OwnedHandle::from_raw(raw) }).with_entry_points(&COUNTING)
    }

    #[test]
    fn descriptor_is_shared_per_base() {
        let a = ProxyDescriptor::of::<Widget>();
        let b = ProxyDescriptor::of::<Widget>();
        let c = ProxyDescriptor::of::<Gadget>();

        assert!(std::ptr::eq(a, b));
        assert!(!std::ptr::eq(a, c));
        assert_eq!(a.type_id(), TypeId::of::<Widget>());
        assert_eq!(a.base_meta_object.class_name(), "Widget");
        assert_eq!(c.size, size_of::<ForeignProxy<Gadget>>());
        assert!(c.size >= size_of::<Gadget>());
    }

    #[test]
    fn get_pinned_rejects_other_bases() {
        let object = (ProxyDescriptor::of::<Widget>().create)(ProxyInit::pinned(PinnedHandle::INVALID));
        assert!((ProxyDescriptor::of::<Widget>().get_pinned)(&*object).is_some());
        assert!((ProxyDescriptor::of::<Gadget>().get_pinned)(&*object).is_none());
        assert!((ProxyDescriptor::of::<Widget>().get_pinned)(&Widget).is_none());
    }

    #[test]
    fn storage_checks() {
        let descriptor = ProxyDescriptor::of::<Gadget>();
        let mut storage = vec![MaybeUninit::<u64>::uninit(); descriptor.size / 8 + 2];
        let start = storage.as_mut_ptr() as *mut u8;

        assert_eq!(
            descriptor.check_storage(start, descriptor.size - 1),
            Err(BridgeError::StorageTooSmall {
                required: descriptor.size,
                provided: descriptor.size - 1,
            })
        );
        let shifted = start.wrapping_add(1);
        assert!(matches!(
            descriptor.check_storage(shifted, descriptor.size),
            Err(BridgeError::MisalignedStorage { .. })
        ));
        assert_eq!(descriptor.check_storage(start, descriptor.size), Ok(()));
    }

    #[test]
    fn in_place_proxy_is_flagged_and_finalized_once() {
        DESTROYED.with(|d| d.set(0));
        let descriptor = ProxyDescriptor::of::<Gadget>();
        let mut storage = vec![MaybeUninit::<u64>::uninit(); descriptor.size / 8 + 1];
        let start = NonNull::new(storage.as_mut_ptr() as *mut u8).unwrap();

        let object = unsafe {
            descriptor
                .checked_construct_in_place(start, storage.len() * 8, owning_init())
                .unwrap()
        };
        assert_eq!(host::base_address(object), start.as_ptr() as *mut c_void);

        let proxy = unsafe { ForeignProxy::<Gadget>::from_base_ptr(start.as_ptr() as *const c_void) };
        assert!(proxy.flags().contains(ProxyFlags::IN_PLACE | ProxyFlags::FOREIGN_OWNED));
        assert_eq!(proxy.lifecycle(), Lifecycle::Live);

        unsafe { host::finalize_in_place(object) };
        assert_eq!(DESTROYED.with(Cell::get), 1);
    }

    #[test]
    fn heap_proxy_destroys_owned_value() {
        DESTROYED.with(|d| d.set(0));
        let object = host::into_host_ptr((ProxyDescriptor::of::<Widget>().create)(owning_init()));
        unsafe { host::host_delete(object) };
        assert_eq!(DESTROYED.with(Cell::get), 1);
    }
}
