//! Comparison-stable names for signals.
//!
//! The host identifies a signal by the bit pattern of a native callable
//! member (two words). Signals declared on the foreign side have no such
//! member; they are named by the byte offset of a [`SignalField`] inside the
//! owning struct instead. [`SignalToken`] stores either form in the same
//! two-word slot so it can be handed to the host's connection machinery
//! unmodified.
//!
//! Tokens are compared bit for bit. No tag separates the two forms: offsets
//! are small and never reach the address range of native callables, which is
//! guaranteed by the host's encoding.
//!
//! Neither token kind records which type it belongs to. Using a token with an
//! unrelated sender type may connect to the wrong signal or to none.

use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem::size_of;

use crate::error::{BridgeError, BridgeResult};

/// Bit pattern of a host-native callable member: code address plus receiver
/// adjustment.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NativeMemberFn {
    pub ptr: usize,
    pub adj: isize,
}

impl NativeMemberFn {
    /// A non-virtual member at `address` with no receiver adjustment.
    pub fn at_address(address: usize) -> Self {
        Self {
            ptr: address,
            adj: 0,
        }
    }
}

/// Opaque signal identifier, sized like the host's native representation.
#[repr(C)]
#[derive(Clone, Copy)]
pub union SignalToken {
    native: NativeMemberFn,
    offset: isize,
}

impl SignalToken {
    /// Store a host-native bit pattern verbatim.
    pub fn from_native(bits: NativeMemberFn) -> Self {
        SignalToken { native: bits }
    }

    /// Store a field offset verbatim. The remaining bits are zero so equal
    /// offsets always compare equal.
    pub fn from_offset_unchecked(offset: isize) -> Self {
        let mut token = SignalToken {
            native: NativeMemberFn::default(),
        };
        token.offset = offset;
        token
    }

    /// Store the offset of a signal field inside an `O`.
    pub fn from_offset<O>(offset: isize) -> BridgeResult<Self> {
        let size = size_of::<O>();
        if offset < 0 || offset as usize >= size {
            return Err(BridgeError::SignalOutsideObject {
                offset,
                type_name: std::any::type_name::<O>(),
                size,
            });
        }
        Ok(Self::from_offset_unchecked(offset))
    }

    /// The full two-word pattern, whichever way the token was built.
    pub fn bits(&self) -> NativeMemberFn {
        // SAFETY: every constructor initializes all bytes of `native`.
        unsafe { self.native }
    }

    /// Address of the token, in the form the host's connection call takes.
    pub fn as_raw(&self) -> *const c_void {
        self as *const SignalToken as *const c_void
    }
}

impl PartialEq for SignalToken {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for SignalToken {}

impl Hash for SignalToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl fmt::Debug for SignalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = self.bits();
        write!(f, "SignalToken({:#x}, {:#x})", bits.ptr, bits.adj)
    }
}

/// A signal token tagged with its argument list.
///
/// `Clone`/`Copy` are implemented by hand so `Args` does not need them.
pub struct Signal<Args> {
    token: SignalToken,
    phantom: PhantomData<Args>,
}

impl<Args> Signal<Args> {
    /// # Safety
    ///
    /// `token` must name a signal whose arguments are `Args`.
    pub unsafe fn new(token: SignalToken) -> Self {
        Self {
            token,
            phantom: PhantomData,
        }
    }

    pub fn token(&self) -> SignalToken {
        self.token
    }
}

impl<Args> Clone for Signal<Args> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Args> Copy for Signal<Args> {}

impl<Args> PartialEq for Signal<Args> {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl<Args> fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signal").field(&self.token).finish()
    }
}

/// Struct member standing for a foreign-declared signal.
///
/// It carries no behavior; its address inside the owning object is the
/// signal's identity.
pub struct SignalField<Args> {
    phantom: PhantomData<Args>,
    _u: bool, // gives the field a size, so distinct fields get distinct offsets
}

impl<Args> Default for SignalField<Args> {
    fn default() -> Self {
        Self {
            phantom: PhantomData,
            _u: false,
        }
    }
}

impl<Args> SignalField<Args> {
    /// The signal this field names inside `owner`.
    ///
    /// Fails if the field does not live inside `owner`.
    pub fn signal<O>(&self, owner: &O) -> BridgeResult<Signal<Args>> {
        let base = owner as *const O as isize;
        let field = self as *const Self as isize;
        let token = SignalToken::from_offset::<O>(field - base)?;
        // SAFETY: the field's own type carries the argument list.
        Ok(unsafe { Signal::new(token) })
    }
}

impl<Args> fmt::Debug for SignalField<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SignalField")
    }
}
