//! Reference table - keeps target objects alive for the script side
//!
//! One counted pin per handle. The 0→1 transition creates the target-side
//! global pin and the 1→0 transition drops it, both under the map's shard
//! entry lock so the pin is created and destroyed exactly once even under
//! concurrent retain/release from arbitrary threads. Release arrives from
//! whatever thread the script GC runs its finalizers on; a release for an
//! untracked handle is a logged no-op, never a fault.


use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::logging::{debug, trace};
use crate::target::TargetRuntime;
use crate::value::ObjectHandle;

/// Process-wide table of script-reachable target objects.
pub struct ReferenceTable {
    runtime: Arc<dyn TargetRuntime>,
    pins: DashMap<ObjectHandle, u32>,
}

impl ReferenceTable {
    pub fn new(runtime: Arc<dyn TargetRuntime>) -> Self {
        Self {
            runtime,
            pins: DashMap::with_capacity(64),
        }
    }

    /// Record one script-side exposure of `handle`, pinning the target object
    /// on the first one. Null handles are ignored.
    pub fn retain(&self, handle: ObjectHandle) {
        if handle.is_null() {
            return;
        }
        match self.pins.entry(handle) {
            Entry::Occupied(mut e) => *e.get_mut() += 1,
            Entry::Vacant(v) => {
                self.runtime.retain_global(handle);
                v.insert(1);
            }
        }
        trace!(event = "retain", handle = %handle);
    }

    /// Drop one exposure of `handle`, unpinning the target object on the
    /// last one. Returns false for a handle not in the table (double release
    /// or never retained), which is ignored rather than treated as a fault.
    pub fn release(&self, handle: ObjectHandle) -> bool {
        if handle.is_null() {
            return false;
        }
        match self.pins.entry(handle) {
            Entry::Occupied(mut e) => {
                if *e.get() > 1 {
                    *e.get_mut() -= 1;
                } else {
                    e.remove();
                    self.runtime.release_global(handle);
                }
                trace!(event = "release", handle = %handle);
                true
            }
            Entry::Vacant(_) => {
                debug!(event = "release_ignored", handle = %handle, "release of untracked handle");
                false
            }
        }
    }

    /// Check whether `handle` is currently script-reachable.
    #[inline]
    pub fn is_live(&self, handle: ObjectHandle) -> bool {
        self.pins.contains_key(&handle)
    }

    /// Number of tracked handles.
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}
