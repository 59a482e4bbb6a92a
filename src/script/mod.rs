//! Script-runtime collaborator seam
//!
//! The bridge reaches the script VM through two narrow contracts: post a unit
//! of work to a named message port (the owning script thread runs it exactly
//! once), and tie a script wrapper value's collection to an exactly-once
//! release callback. [`channel::ChannelHost`] is the crate's in-process
//! reference implementation.

pub mod channel;

#[cfg(test)]
mod tests;

use core::ffi::c_void;
use std::thread::ThreadId;

use crate::error::{BridgeError, Result};
use crate::value::ObjectHandle;

/// Addressable script-runtime message port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PortId(pub u64);

impl core::fmt::Display for PortId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "port#{}", self.0)
    }
}

/// Opaque identity of a script-side wrapper value, as handed through the C
/// surface for finalizer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ScriptRef(pub u64);

/// Deferred invocation closure. Queued onto a router lane or a script port
/// and executed exactly once; never retried.
pub type PendingWork = Box<dyn FnOnce() + Send + 'static>;

/// Release callback bound to a script value's collection.
pub type FinalizerFn = Box<dyn FnOnce(ObjectHandle) + Send + Sync + 'static>;

/// The script VM, as the bridge consumes it. Entered from arbitrary native
/// threads; implementations must be `Send + Sync`.
pub trait ScriptHost: Send + Sync {
    /// Queue `work` for the thread owning `port`. Errors with
    /// [`BridgeError::PortClosed`] when the port is gone; the work is dropped
    /// unexecuted in that case.
    fn post_work(&self, port: PortId, work: PendingWork) -> Result<()>;

    /// Thread currently owning `port`, if known. The router uses this to run
    /// primary-lane work inline instead of queueing onto itself.
    fn port_thread(&self, port: PortId) -> Option<ThreadId>;

    /// Tie `value`'s collection to `release(handle)`, invoked exactly once
    /// from whatever thread the script GC finalizes on.
    fn bind_finalizer(&self, value: ScriptRef, handle: ObjectHandle, release: FinalizerFn);
}

/// Leak a pending-work closure to a raw pointer for transport through a
/// script VM's native port. Paired with [`work_from_raw`] (or the C surface's
/// `objbridge_execute_work`).
pub fn work_into_raw(work: PendingWork) -> *mut c_void {
    Box::into_raw(Box::new(work)) as *mut c_void
}

/// Re-adopt a pointer produced by [`work_into_raw`].
///
/// # Safety
/// `ptr` must come from [`work_into_raw`] and must not be adopted twice.
pub unsafe fn work_from_raw(ptr: *mut c_void) -> PendingWork {
    *Box::from_raw(ptr as *mut PendingWork)
}

impl From<crossbeam_channel::SendError<PendingWork>> for BridgeError {
    fn from(_: crossbeam_channel::SendError<PendingWork>) -> Self {
        Self::PortClosed
    }
}
