//! Static class metadata and the host's indexed call kinds.
//!
//! [`MetaObject`] is the narrow slice of the host's reflection record the
//! bridge needs: the super-class link, per-level member counts and the static
//! call entry point. The full metadata format (names, signatures, flags) is
//! owned by the reflection layer and is opaque here.

use std::ffi::{CStr, c_char, c_void};
use std::ptr;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Indexed call entry point of a class level.
///
/// `object` is the base-class address of the receiver, `index` is relative to
/// the level that owns the entry point.
pub type StaticMetacallFn =
    unsafe extern "C" fn(object: *mut c_void, call: u32, index: i32, args: *mut *mut c_void);

/// Kinds of indexed calls, numbered as the host encodes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum MetaCall {
    InvokeMetaMethod = 0,
    ReadProperty = 1,
    WriteProperty = 2,
    ResetProperty = 3,
    QueryPropertyDesignable = 4,
    QueryPropertyScriptable = 5,
    QueryPropertyStored = 6,
    QueryPropertyEditable = 7,
    QueryPropertyUser = 8,
    CreateInstance = 9,
    IndexOfMethod = 10,
    RegisterPropertyMetaType = 11,
    RegisterMethodArgumentMetaType = 12,
}

/// Which member table an indexed call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallClass {
    /// Indices count methods (invocation, argument type registration).
    Method,
    /// Indices count properties (read, write, reset, queries, type registration).
    Property,
    /// Neither table; the call is passed through untouched.
    Other,
}

impl MetaCall {
    /// Decode a raw call kind. Unknown values are `None`.
    pub fn decode(raw: u32) -> Option<MetaCall> {
        MetaCall::try_from(raw).ok()
    }

    pub fn class(self) -> CallClass {
        match self {
            MetaCall::InvokeMetaMethod | MetaCall::RegisterMethodArgumentMetaType => {
                CallClass::Method
            }
            MetaCall::ReadProperty
            | MetaCall::WriteProperty
            | MetaCall::ResetProperty
            | MetaCall::QueryPropertyDesignable
            | MetaCall::QueryPropertyScriptable
            | MetaCall::QueryPropertyStored
            | MetaCall::QueryPropertyEditable
            | MetaCall::QueryPropertyUser
            | MetaCall::RegisterPropertyMetaType => CallClass::Property,
            MetaCall::CreateInstance | MetaCall::IndexOfMethod => CallClass::Other,
        }
    }
}

impl CallClass {
    /// Classify a raw call kind; unknown values are [`CallClass::Other`].
    pub fn of_raw(raw: u32) -> CallClass {
        MetaCall::decode(raw).map_or(CallClass::Other, MetaCall::class)
    }
}

/// Static metadata of one class level.
///
/// Counts are for members declared at this level only; inherited members are
/// reached through `superdata`.
#[repr(C)]
#[derive(Debug)]
pub struct MetaObject {
    pub superdata: *const MetaObject,
    pub class_name: *const c_char,
    pub method_count: i32,
    pub property_count: i32,
    pub static_metacall: Option<StaticMetacallFn>,
}

// SAFETY: metadata is immutable after construction and only points at other
// immutable statics.
unsafe impl Sync for MetaObject {}

impl MetaObject {
    pub const fn new(class_name: &'static CStr, superclass: Option<&'static MetaObject>) -> Self {
        let superdata = match superclass {
            Some(s) => s as *const MetaObject,
            None => ptr::null(),
        };
        Self {
            superdata,
            class_name: class_name.as_ptr(),
            method_count: 0,
            property_count: 0,
            static_metacall: None,
        }
    }

    pub const fn with_methods(mut self, count: i32) -> Self {
        self.method_count = count;
        self
    }

    pub const fn with_properties(mut self, count: i32) -> Self {
        self.property_count = count;
        self
    }

    pub const fn with_static_metacall(mut self, f: StaticMetacallFn) -> Self {
        self.static_metacall = Some(f);
        self
    }

    pub fn class_name(&self) -> &str {
        if self.class_name.is_null() {
            return "";
        }
        // SAFETY: class_name comes from a 'static CStr (see `new`).
        unsafe { CStr::from_ptr(self.class_name) }
            .to_str()
            .unwrap_or("<non-utf8>")
    }

    pub fn superclass(&self) -> Option<&MetaObject> {
        // SAFETY: superdata is null or points at a 'static MetaObject.
        unsafe { self.superdata.as_ref() }
    }

    /// Members of `class` declared at this level.
    pub fn own_count(&self, class: CallClass) -> i32 {
        match class {
            CallClass::Method => self.method_count,
            CallClass::Property => self.property_count,
            CallClass::Other => 0,
        }
    }

    /// Number of methods declared by all super levels.
    pub fn method_offset(&self) -> i32 {
        self.ancestors().map(|m| m.method_count).sum()
    }

    /// Number of properties declared by all super levels.
    pub fn property_offset(&self) -> i32 {
        self.ancestors().map(|m| m.property_count).sum()
    }

    /// Whether `other` is this level or one of its super levels.
    pub fn inherits(&self, other: &MetaObject) -> bool {
        std::iter::once(self)
            .chain(self.ancestors())
            .any(|m| ptr::eq(m, other))
    }

    fn ancestors(&self) -> impl Iterator<Item = &MetaObject> {
        std::iter::successors(self.superclass(), |&m| m.superclass())
    }

    /// Run this level's static call entry point.
    ///
    /// An index outside this level's table is a contract violation: it
    /// asserts in debug builds and does nothing in release builds.
    ///
    /// # Safety
    ///
    /// `object` must be the base address of a live instance of this class and
    /// `args` must match what the entry point expects for `(call, index)`.
    pub unsafe fn static_call(&self, object: *mut c_void, call: u32, index: i32, args: *mut *mut c_void) {
        let count = self.own_count(CallClass::of_raw(call));
        debug_assert!(
            (0..count).contains(&index),
            "index {index} outside of `{}` table of {count}",
            self.class_name()
        );
        if !(0..count).contains(&index) {
            log::warn!("dropping out-of-range call {index} on `{}`", self.class_name());
            return;
        }
        if let Some(f) = self.static_metacall {
            unsafe { f(object, call, index, args) };
        }
    }
}
