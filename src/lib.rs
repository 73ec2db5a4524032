//! Expose Rust objects to a host object model through proxy objects.
//!
//! The host framework knows objects by base class, metadata and indexed
//! dispatch. A [`ForeignProxy`](proxy::ForeignProxy) is a host object that
//! extends a host base class and forwards metadata queries and dispatch to a
//! Rust value, while keeping the two sides' ownership rules from destroying
//! the value twice or calling into a value that is already gone.
//!
//! ```ignore
//! let value = ForeignBox::new(Counter::default());
//! let object = value.pinned().get_or_create_host_object();
//! // the host now dispatches on `object`; dropping `value` asks it to
//! // delete the proxy
//! ```
//!
//! The host-independent pieces (handles, metadata, events, signal tokens and
//! the host traits) live in `objbridge-core` and are re-exported here.

pub mod descriptor;
pub mod dispatch;
pub mod foreign;
pub mod proxy;

pub use objbridge_core::{error, event, handle, host, meta, signal};
pub use objbridge_core::{
    BridgeError, BridgeResult, CallClass, Event, EventQueue, EventType, HostBase, HostObject,
    HostPtr, MetaCall, MetaObject, NativeMemberFn, OwnedHandle, PinnedHandle, RawHandle, Signal,
    SignalField, SignalToken, StaticMetacallFn,
};

pub mod prelude {
    pub use crate::descriptor::ProxyDescriptor;
    pub use crate::dispatch::{DispatchLayer, fold_metacall};
    pub use crate::foreign::{
        ForeignBox, ForeignEntryPoints, ForeignObject, ForeignPinned, ForeignType, HostPeer,
    };
    pub use crate::proxy::{ExtraDestructFn, ForeignProxy, Lifecycle, ProxyFlags, ProxyInit};
    pub use objbridge_core::host::{finalize_in_place, host_delete, post_event, set_event_queue};
    pub use objbridge_core::{
        BridgeError, BridgeResult, Event, EventQueue, EventType, HostBase, HostObject, HostPtr,
        MetaCall, MetaObject, PinnedHandle, Signal, SignalField, SignalToken,
    };
}
