//! Error types for the recoverable entry points of the bridge.
//!
//! Most of the bridge sits on the host's per-call dispatch path, where contract
//! violations are programming errors and fail fast (`debug_assert!`). The
//! variants below cover the *checked* entry points: storage validation before
//! in-place construction, signal offset validation, and proxy lookups that
//! callers may legitimately probe.

use thiserror::Error;

/// Result alias used by the checked bridge APIs.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors reported by the checked bridge APIs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A handle with one or both words null was supplied where a live
    /// reference was required.
    #[error("foreign handle is invalid")]
    InvalidHandle,

    /// Caller-supplied storage is smaller than the proxy it should hold.
    #[error("storage of {provided} bytes cannot hold a proxy of {required} bytes")]
    StorageTooSmall { required: usize, provided: usize },

    /// Caller-supplied storage does not satisfy the proxy's alignment.
    #[error("storage at {address:#x} is not aligned to {required} bytes")]
    MisalignedStorage { required: usize, address: usize },

    /// A signal offset does not fall inside the object it claims to belong to.
    #[error("signal offset {offset} is outside of `{type_name}` ({size} bytes)")]
    SignalOutsideObject {
        offset: isize,
        type_name: &'static str,
        size: usize,
    },

    /// The host object is not a proxy of the expected type.
    #[error("host object is not a `{expected}`")]
    TypeMismatch { expected: &'static str },

    /// A proxy already exists for this foreign value.
    #[error("a host object was already created for this value")]
    AlreadyConstructed,
}
