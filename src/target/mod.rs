//! Target-runtime collaborator seam
//!
//! The bridge never touches the object runtime directly; everything it needs
//! from that side goes through [`TargetRuntime`]: reflective construction and
//! invocation, global-pin management, dynamic proxy synthesis, and interface
//! metadata lookup. [`memory::MemoryRuntime`] is the crate's reference
//! implementation, driven by registered Rust closures instead of reflection.

pub mod memory;


use std::sync::Arc;

use crate::value::{HostValue, ObjectHandle, ValueTag};

/// What a forward call resolves against: an instance or a class (static).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    Instance(ObjectHandle),
    Class(String),
}

impl core::fmt::Display for CallTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Instance(h) => write!(f, "instance {}", h),
            Self::Class(name) => write!(f, "class {}", name),
        }
    }
}

/// Failure inside the target runtime. Exceptions are already cleared on the
/// target side by the time one of these crosses back; only the cause text
/// survives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    UnknownClass(String),
    UnknownInterface(String),
    NoSuchConstructor { class: String, signature: String },
    NoSuchMethod { owner: String, method: String, signature: String },
    DeadHandle(ObjectHandle),
    Exception(String),
}

impl core::fmt::Display for TargetError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownClass(name) => write!(f, "unknown class {}", name),
            Self::UnknownInterface(name) => write!(f, "unknown interface {}", name),
            Self::NoSuchConstructor { class, signature } => {
                write!(f, "no constructor {}({})", class, signature)
            }
            Self::NoSuchMethod {
                owner,
                method,
                signature,
            } => write!(f, "no method {}.{}({})", owner, method, signature),
            Self::DeadHandle(h) => write!(f, "handle {} is not a live object", h),
            Self::Exception(cause) => write!(f, "target exception: {}", cause),
        }
    }
}

impl std::error::Error for TargetError {}

/// Receiver for dynamic-proxy method bodies. A synthesized proxy forwards
/// every invoked interface method here; the bridge's implementation routes it
/// into the callback registry.
pub trait ProxyInvoker: Send + Sync {
    fn invoke(
        &self,
        interface: &str,
        method: &str,
        args: &[HostValue],
        ret: ValueTag,
    ) -> HostValue;
}

/// The managed object runtime, as the bridge consumes it.
///
/// Implementations must be `Send + Sync`; every method may be entered from
/// arbitrary native threads concurrently. Method resolution is by exact name
/// and tag-signature match; overload disambiguation is the caller's job.
pub trait TargetRuntime: Send + Sync {
    /// Construct an instance of `class`, resolving the constructor by exact
    /// signature. The returned handle carries no global pin yet; the caller
    /// pins it through the reference table before exposing it.
    fn construct(
        &self,
        class: &str,
        args: &[HostValue],
        sig: &[ValueTag],
    ) -> Result<ObjectHandle, TargetError>;

    /// Invoke `method` on `target`, resolving by exact name + signature.
    fn call(
        &self,
        target: &CallTarget,
        method: &str,
        args: &[HostValue],
        sig: &[ValueTag],
        ret: ValueTag,
    ) -> Result<HostValue, TargetError>;

    /// Create a global pin keeping `handle` alive across calls.
    fn retain_global(&self, handle: ObjectHandle);

    /// Drop one global pin; the target GC may collect the object afterwards.
    fn release_global(&self, handle: ObjectHandle);

    /// Synthesize a dynamic proxy implementing `interface`, with every method
    /// body forwarding to `invoker`.
    fn new_proxy(
        &self,
        interface: &str,
        invoker: Arc<dyn ProxyInvoker>,
    ) -> Result<ObjectHandle, TargetError>;

    /// Handle of the target-side host instance registered for `interface`.
    fn lookup_interface(&self, name: &str) -> Option<ObjectHandle>;

    /// Method-signature metadata string for `interface`.
    fn interface_signatures(&self, name: &str) -> Option<String>;

    /// Class name of a live object (interface name for proxies).
    fn class_name(&self, handle: ObjectHandle) -> Option<String>;
}

/// Render a tag signature the way resolution errors and metadata report it.
pub fn signature_key(sig: &[ValueTag]) -> String {
    let mut out = String::new();
    for (i, tag) in sig.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(tag.name());
    }
    out
}
