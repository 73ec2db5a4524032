//! The host object model, seen from the bridge.
//!
//! The host framework is an external collaborator. This module names the
//! small set of capabilities the bridge relies on:
//!
//! - [`HostObject`]: the virtual entry points of a host object (metadata
//!   query, indexed dispatch, event delivery, asynchronous deletion request).
//! - [`HostBase`]: a concrete base class that proxies can extend.
//! - [`EventQueue`]: posting into the host's event queue.
//! - [`host_delete`] / [`finalize_in_place`]: the two ways a host object's
//!   life ends (heap deletion, or finalization in storage owned elsewhere).
//!
//! All of it runs on the host's object-model thread. Nothing here is `Send`.

use std::any::Any;
use std::cell::RefCell;
use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use crate::event::Event;
use crate::meta::MetaObject;

/// Pointer to a host object, as the host holds it.
pub type HostPtr = NonNull<dyn HostObject>;

/// Virtual entry points of a host object.
pub trait HostObject: Any {
    /// Metadata describing the dynamic type of this object.
    fn meta_object(&self) -> &MetaObject;

    /// Indexed dispatch.
    ///
    /// Follows the host's folding convention: returns a negative value when
    /// the call was handled, otherwise `index` minus the members this object's
    /// levels declare, for the next level up to interpret.
    fn metacall(&mut self, call: u32, index: i32, args: *mut *mut c_void) -> i32;

    /// Deliver an event. Returns `true` if it was handled.
    fn event(&mut self, event: &mut Event) -> bool;

    /// Ask the host to delete this object once control returns to its event
    /// loop.
    fn delete_later(&mut self);
}

/// A host class that can serve as the base of a proxy.
pub trait HostBase: HostObject + Default {
    fn static_meta_object() -> &'static MetaObject;
}

/// The host's event queue.
pub trait EventQueue {
    /// Queue `event` for `target`. Events are delivered in posting order.
    fn post_event(&self, target: HostPtr, event: Event);
}

thread_local! {
    static EVENT_QUEUE: RefCell<Option<Rc<dyn EventQueue>>> = const { RefCell::new(None) };
}

/// Install the queue used by [`post_event`] on this thread, returning the
/// previous one.
pub fn set_event_queue(queue: Option<Rc<dyn EventQueue>>) -> Option<Rc<dyn EventQueue>> {
    EVENT_QUEUE.with(|slot| slot.replace(queue))
}

/// The queue installed on this thread, if any.
pub fn event_queue() -> Option<Rc<dyn EventQueue>> {
    EVENT_QUEUE.with(|slot| slot.borrow().clone())
}

/// Post `event` to `target` through the installed queue, or deliver it
/// synchronously when no queue is installed.
///
/// # Safety
///
/// `target` must point at a live host object. With a queue installed it must
/// stay alive until the queue delivers or drops the event.
pub unsafe fn post_event(target: HostPtr, event: Event) {
    match event_queue() {
        Some(queue) => queue.post_event(target, event),
        None => {
            let mut event = event;
            log::debug!("no event queue installed; sending {:?} directly", event.kind());
            unsafe { (*target.as_ptr()).event(&mut event) };
        }
    }
}

/// Hand a heap object over to the host.
pub fn into_host_ptr(object: Box<dyn HostObject>) -> HostPtr {
    NonNull::from(Box::leak(object))
}

/// The host's deletion convention for heap objects: run the destructor and
/// free the allocation.
///
/// # Safety
///
/// `object` must come from [`into_host_ptr`] and not be used afterwards.
pub unsafe fn host_delete(object: HostPtr) {
    drop(unsafe { Box::from_raw(object.as_ptr()) });
}

/// Finalize an object living in storage owned by someone else. The
/// destructor runs; the storage is left to its owner.
///
/// # Safety
///
/// `object` must have been constructed in place and not finalized before.
pub unsafe fn finalize_in_place(object: HostPtr) {
    unsafe { ptr::drop_in_place(object.as_ptr()) };
}

/// Base-class address of a host object, the form C callbacks receive.
pub fn base_address(object: HostPtr) -> *mut c_void {
    object.as_ptr() as *mut c_void
}
