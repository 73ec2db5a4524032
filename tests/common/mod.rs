//! A small host for integration tests.
//!
//! `TestBase` plays the host base class, `TestLoop` the host event loop with
//! deferred deletion, and `Counter`/`Gauge` are foreign types. Everything
//! observable lands in a per-thread journal so tests can assert on ordering.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::rc::Rc;

use objbridge::foreign;
use objbridge::host;
use objbridge::prelude::*;
use objbridge::{CallClass, RawHandle};

/// Something the host or the foreign side did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    BaseCall(u32, i32),
    BaseEvent(EventType),
    ForeignCall(u32, i32),
    DeleteLater(usize),
    ExtraDestruct { address: usize, foreign_valid: bool },
    Destroy,
    ForeignDropped(&'static str),
}

thread_local! {
    static JOURNAL: RefCell<Vec<Entry>> = const { RefCell::new(Vec::new()) };
    static DELETE_REQUESTS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

pub fn record(entry: Entry) {
    JOURNAL.with(|journal| journal.borrow_mut().push(entry));
}

/// Everything recorded since the last call.
pub fn take_journal() -> Vec<Entry> {
    JOURNAL.with(|journal| journal.take())
}

pub const INVOKE: u32 = MetaCall::InvokeMetaMethod as u32;
pub const READ: u32 = MetaCall::ReadProperty as u32;
pub const WRITE: u32 = MetaCall::WriteProperty as u32;
pub const INDEX_OF: u32 = MetaCall::IndexOfMethod as u32;

pub static BASE_META: MetaObject = MetaObject::new(c"TestBase", None)
    .with_methods(2)
    .with_properties(1);

/// Host base class with two methods and one property.
#[derive(Default)]
pub struct TestBase {
    pub handled: u32,
}

impl HostObject for TestBase {
    fn meta_object(&self) -> &MetaObject {
        &BASE_META
    }

    fn metacall(&mut self, call: u32, index: i32, _args: *mut *mut c_void) -> i32 {
        let own = BASE_META.own_count(CallClass::of_raw(call));
        if (0..own).contains(&index) {
            self.handled += 1;
            record(Entry::BaseCall(call, index));
            return -1;
        }
        index - own
    }

    fn event(&mut self, event: &mut Event) -> bool {
        record(Entry::BaseEvent(event.kind()));
        false
    }

    fn delete_later(&mut self) {
        let address = self as *mut Self as usize;
        record(Entry::DeleteLater(address));
        DELETE_REQUESTS.with(|requests| requests.borrow_mut().push(address));
    }
}

impl HostBase for TestBase {
    fn static_meta_object() -> &'static MetaObject {
        &BASE_META
    }
}

/// Host event loop: queued delivery plus deferred deletion of adopted
/// heap objects.
#[derive(Default)]
pub struct TestLoop {
    queue: RefCell<VecDeque<(HostPtr, Event)>>,
    objects: RefCell<Vec<HostPtr>>,
}

impl TestLoop {
    /// Install a fresh loop as this thread's event queue.
    pub fn install() -> Rc<TestLoop> {
        let event_loop = Rc::new(TestLoop::default());
        host::set_event_queue(Some(event_loop.clone()));
        event_loop
    }

    pub fn uninstall(&self) {
        host::set_event_queue(None);
    }

    /// Take responsibility for deleting `object` when it asks for it.
    pub fn adopt(&self, object: HostPtr) {
        self.objects.borrow_mut().push(object);
    }

    pub fn pending_events(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Deliver queued events. Returns how many were handled.
    pub fn deliver_events(&self) -> usize {
        let mut handled = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some((target, mut event)) = next else {
                break;
            };
            if unsafe { (*target.as_ptr()).event(&mut event) } {
                handled += 1;
            }
        }
        handled
    }

    /// Delete adopted objects that asked for deletion. Returns how many.
    pub fn run_deletions(&self) -> usize {
        let requests = DELETE_REQUESTS.with(|requests| requests.take());
        let mut deleted = 0;
        for address in requests {
            let position = self
                .objects
                .borrow()
                .iter()
                .position(|object| host::base_address(*object) as usize == address);
            if let Some(position) = position {
                let object = self.objects.borrow_mut().remove(position);
                unsafe { host::host_delete(object) };
                deleted += 1;
            }
        }
        deleted
    }

    /// One loop iteration.
    pub fn process_events(&self) -> usize {
        self.deliver_events();
        self.run_deletions()
    }
}

impl EventQueue for TestLoop {
    fn post_event(&self, target: HostPtr, event: Event) {
        self.queue.borrow_mut().push_back((target, event));
    }
}

impl Drop for TestLoop {
    fn drop(&mut self) {
        for object in self.objects.borrow_mut().drain(..) {
            unsafe { host::host_delete(object) };
        }
    }
}

pub static COUNTER_META: MetaObject = MetaObject::new(c"Counter", Some(&BASE_META))
    .with_methods(3)
    .with_properties(1)
    .with_static_metacall(counter_static_metacall);

/// Foreign type with three methods (`increment`, `reset`, `noop`) and one
/// property (`value`).
pub struct Counter {
    pub label: &'static str,
    pub value: i32,
    pub value_changed: SignalField<(i32,)>,
    pub reset: SignalField<()>,
    peer: HostPeer,
}

impl Counter {
    pub fn labelled(label: &'static str) -> Self {
        Self {
            label,
            value: 0,
            value_changed: SignalField::default(),
            reset: SignalField::default(),
            peer: HostPeer::default(),
        }
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::labelled("counter")
    }
}

impl ForeignObject for Counter {
    fn meta_object(&self) -> &'static MetaObject {
        &COUNTER_META
    }

    fn host_peer(&self) -> &HostPeer {
        &self.peer
    }
}

impl ForeignType for Counter {
    type Base = TestBase;

    fn static_meta_object() -> &'static MetaObject {
        &COUNTER_META
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        record(Entry::ForeignDropped(self.label));
    }
}

unsafe extern "C" fn counter_static_metacall(
    object: *mut c_void,
    call: u32,
    index: i32,
    args: *mut *mut c_void,
) {
    record(Entry::ForeignCall(call, index));
    let counter = unsafe { ForeignPinned::<Counter>::from_base_ptr(object) }
        .expect("static call on a proxy without a Counter");
    match (MetaCall::decode(call), index) {
        (Some(MetaCall::InvokeMetaMethod), 0) => counter.borrow_mut().value += 1,
        (Some(MetaCall::InvokeMetaMethod), 1) => counter.borrow_mut().value = 0,
        (Some(MetaCall::ReadProperty), 0) => unsafe {
            *(*args as *mut i32) = counter.borrow().value;
        },
        (Some(MetaCall::WriteProperty), 0) => unsafe {
            counter.borrow_mut().value = *(*args as *const i32);
        },
        _ => {}
    }
}

pub static GAUGE_META: MetaObject = MetaObject::new(c"Gauge", Some(&BASE_META)).with_properties(2);

/// A second foreign type on the same host base.
#[derive(Default)]
pub struct Gauge {
    pub reading: f64,
    peer: HostPeer,
}

impl ForeignObject for Gauge {
    fn meta_object(&self) -> &'static MetaObject {
        &GAUGE_META
    }

    fn host_peer(&self) -> &HostPeer {
        &self.peer
    }
}

impl ForeignType for Gauge {
    type Base = TestBase;

    fn static_meta_object() -> &'static MetaObject {
        &GAUGE_META
    }
}

/// Extra destruction callback that records what it saw.
pub extern "C" fn record_extra_destruct(object: *mut c_void) {
    let proxy = unsafe { ForeignProxy::<TestBase>::from_base_ptr(object) };
    record(Entry::ExtraDestruct {
        address: object as usize,
        foreign_valid: proxy.is_foreign_valid(),
    });
}

extern "C" fn recording_metadata_for(handle: RawHandle) -> *const MetaObject {
    foreign::metadata_for(handle)
}

extern "C" fn recording_destroy(handle: RawHandle) {
    record(Entry::Destroy);
    foreign::destroy(handle);
}

/// The Rust entry points, with destruction journaled.
pub static RECORDING_ENTRY_POINTS: ForeignEntryPoints = ForeignEntryPoints {
    metadata_for: recording_metadata_for,
    destroy: recording_destroy,
    detach: foreign::detach,
};

/// Run a raw dispatch on a host object.
pub fn metacall(object: HostPtr, call: u32, index: i32, args: *mut *mut c_void) -> i32 {
    unsafe { (*object.as_ptr()).metacall(call, index, args) }
}

/// Class name the host sees for `object`.
pub fn class_name(object: HostPtr) -> String {
    unsafe { (*object.as_ptr()).meta_object().class_name().to_owned() }
}

/// Read the first foreign property as an `i32`.
pub fn read_value(object: HostPtr) -> i32 {
    let mut value = 0i32;
    let mut args = [&mut value as *mut i32 as *mut c_void];
    let rest = metacall(object, READ, BASE_META.own_count(CallClass::Property), args.as_mut_ptr());
    assert!(rest < 0, "property read was not handled");
    value
}

/// View a heap or in-place object as the proxy it is.
pub fn proxy<'a>(object: HostPtr) -> &'a ForeignProxy<TestBase> {
    unsafe { ForeignProxy::<TestBase>::from_base_ptr(host::base_address(object)) }
}
