//! Indexed dispatch across class levels.
//!
//! The host numbers methods and properties of an object continuously, from
//! the root class downwards. Each level handles the indices that fall inside
//! its own table and otherwise subtracts its count and passes the rest on. A
//! negative result means "handled".
//!
//! [`fold_metacall`] runs that convention over a chain of [`DispatchLayer`]s.
//! A proxy's chain is the host base ([`HostLayer`]) followed by the foreign
//! object's level ([`ForeignLayer`]). The host layer overrides
//! [`DispatchLayer::fold`] and hands the whole index to the base's own
//! `metacall`, which folds every host level itself; only the foreign layer
//! goes through `own_count` and `dispatch`.

use std::ffi::c_void;

use objbridge_core::{CallClass, HostObject, MetaObject};

/// One step of the dispatch chain.
pub trait DispatchLayer {
    /// Members of `class` this layer consumes.
    fn own_count(&self, class: CallClass) -> i32;

    /// Execute a call that falls inside this layer's table.
    ///
    /// # Safety
    ///
    /// `args` must match what the layer expects for `(call, index)`.
    unsafe fn dispatch(&mut self, call: u32, index: i32, args: *mut *mut c_void);

    /// Handle `index` if it is ours, and return it re-based for the next
    /// layer. Call kinds that address neither table pass through unchanged.
    ///
    /// # Safety
    ///
    /// See [`DispatchLayer::dispatch`].
    unsafe fn fold(&mut self, call: u32, index: i32, args: *mut *mut c_void) -> i32 {
        let count = self.own_count(CallClass::of_raw(call));
        if (0..count).contains(&index) {
            unsafe { self.dispatch(call, index, args) };
        }
        index - count
    }
}

/// Run `index` through `layers` in order, stopping as soon as one handles it.
///
/// Returns the negative "handled" marker, or the index left over after every
/// layer subtracted its count.
///
/// # Safety
///
/// See [`DispatchLayer::dispatch`].
#[cfg_attr(feature = "profiling", profiling::function)]
pub unsafe fn fold_metacall(
    call: u32,
    mut index: i32,
    args: *mut *mut c_void,
    layers: &mut [&mut dyn DispatchLayer],
) -> i32 {
    if CallClass::of_raw(call) == CallClass::Other {
        log::trace!("call kind {call} passes through with index {index}");
    }
    for layer in layers.iter_mut() {
        if index < 0 {
            break;
        }
        index = unsafe { layer.fold(call, index, args) };
    }
    index
}

/// The host base class as a dispatch layer. It folds all of its own levels
/// through its `metacall`.
///
/// `own_count` and `dispatch` are not used by `fold`. They report the base's
/// total table and run a single call, for callers that inspect layers.
pub struct HostLayer<'a, B: HostObject + ?Sized> {
    base: &'a mut B,
}

impl<'a, B: HostObject + ?Sized> HostLayer<'a, B> {
    pub fn new(base: &'a mut B) -> Self {
        Self { base }
    }
}

impl<B: HostObject + ?Sized> DispatchLayer for HostLayer<'_, B> {
    fn own_count(&self, class: CallClass) -> i32 {
        let meta = self.base.meta_object();
        let inherited = match class {
            CallClass::Method => meta.method_offset(),
            CallClass::Property => meta.property_offset(),
            CallClass::Other => 0,
        };
        inherited + meta.own_count(class)
    }

    unsafe fn dispatch(&mut self, call: u32, index: i32, args: *mut *mut c_void) {
        self.base.metacall(call, index, args);
    }

    unsafe fn fold(&mut self, call: u32, index: i32, args: *mut *mut c_void) -> i32 {
        self.base.metacall(call, index, args)
    }
}

/// A foreign class level: a metadata record plus the object its static call
/// entry point receives.
pub struct ForeignLayer<'a> {
    meta: &'a MetaObject,
    object: *mut c_void,
}

impl<'a> ForeignLayer<'a> {
    /// `object` is the base-class address handed to `meta`'s static call.
    pub fn new(meta: &'a MetaObject, object: *mut c_void) -> Self {
        Self { meta, object }
    }
}

impl DispatchLayer for ForeignLayer<'_> {
    fn own_count(&self, class: CallClass) -> i32 {
        self.meta.own_count(class)
    }

    unsafe fn dispatch(&mut self, call: u32, index: i32, args: *mut *mut c_void) {
        log::trace!("foreign `{}` handles call {call}/{index}", self.meta.class_name());
        unsafe { self.meta.static_call(self.object, call, index, args) };
    }
}
