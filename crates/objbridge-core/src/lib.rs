//! Core types for the objbridge crate.
//!
//! This crate holds the pieces of the bridge that do not depend on the proxy
//! itself:
//!
//! - [`handle`]: two-word foreign handles (raw, pinned, owned)
//! - [`meta`]: static class metadata and indexed call kinds
//! - [`event`]: host events, including the reserved deletion request
//! - [`signal`]: comparison-stable signal tokens
//! - [`host`]: the host object model the bridge plugs into
//! - [`error`]: errors of the checked entry points

pub mod error;
pub mod event;
pub mod handle;
pub mod host;
pub mod meta;
pub mod signal;

pub use error::{BridgeError, BridgeResult};
pub use event::{Event, EventType};
pub use handle::{OwnedHandle, PinnedHandle, RawHandle};
pub use host::{EventQueue, HostBase, HostObject, HostPtr};
pub use meta::{CallClass, MetaCall, MetaObject, StaticMetacallFn};
pub use signal::{NativeMemberFn, Signal, SignalField, SignalToken};
