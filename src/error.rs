//! Crate-wide error taxonomy
//!
//! Every failure crossing the bridge boundary is recovered into one of these
//! variants; none of them propagates as a panic or an unhandled native fault
//! into either runtime.

use crate::target::TargetError;
use crate::value::{MarshalError, ObjectHandle};

pub type Result<T> = core::result::Result<T, BridgeError>;

/// Boundary-level failure of a bridge operation.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Handle not present in the reference table (and not an interface call).
    StaleReference(ObjectHandle),
    /// Class, constructor, or method lookup failed on the target runtime.
    Resolution(String),
    /// Argument or result could not cross the boundary.
    Marshal(MarshalError),
    /// The target runtime raised an exception (cleared; cause text preserved)
    /// or panicked inside the call.
    TargetFailure(String),
    /// Reverse dispatch on an interface/method nobody registered.
    NoSuchCallback { interface: String, method: String },
    /// No bridge attached to the process.
    NotAttached,
    /// A message port or lane queue was closed while a call depended on it.
    PortClosed,
}

impl core::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::StaleReference(h) => write!(f, "stale or unknown reference {}", h),
            Self::Resolution(what) => write!(f, "resolution failure: {}", what),
            Self::Marshal(e) => write!(f, "marshalling error: {}", e),
            Self::TargetFailure(cause) => write!(f, "target invocation failed: {}", cause),
            Self::NoSuchCallback { interface, method } => {
                write!(f, "no callback registered for {}.{}", interface, method)
            }
            Self::NotAttached => write!(f, "no bridge attached to this process"),
            Self::PortClosed => write!(f, "message port or lane queue closed"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Marshal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MarshalError> for BridgeError {
    fn from(e: MarshalError) -> Self {
        Self::Marshal(e)
    }
}

impl From<TargetError> for BridgeError {
    fn from(e: TargetError) -> Self {
        match e {
            TargetError::Exception(cause) => Self::TargetFailure(cause),
            TargetError::DeadHandle(h) => Self::StaleReference(h),
            other => Self::Resolution(other.to_string()),
        }
    }
}
