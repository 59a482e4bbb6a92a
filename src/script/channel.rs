//! Channel-backed reference implementation of [`ScriptHost`]
//!
//! Ports are crossbeam channels; the script thread drains its port with
//! [`ChannelHost::pump`] (step) or [`ChannelHost::run`] (loop until closed).
//! Whichever thread pumps a port claims ownership of it, which is what the
//! router's inline-on-primary check reads. Finalizers are held per script
//! value and fired exactly once by [`ChannelHost::collect`], the in-process
//! stand-in for the script GC collecting a wrapper.

use std::thread::{self, ThreadId};

use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{BridgeError, Result};
use crate::logging::{debug, trace};
use crate::value::ObjectHandle;

use super::{FinalizerFn, PendingWork, PortId, ScriptHost, ScriptRef};

struct PortSlot {
    tx: Sender<PendingWork>,
    rx: Receiver<PendingWork>,
    owner: Mutex<ThreadId>,
}

struct Finalizer {
    handle: ObjectHandle,
    release: FinalizerFn,
}

/// In-process script host: a port registry plus a finalizer registry.
pub struct ChannelHost {
    ports: DashMap<u64, PortSlot>,
    finalizers: DashMap<ScriptRef, Finalizer>,
    next_port: AtomicU64,
}

impl Default for ChannelHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHost {
    pub fn new() -> Self {
        Self {
            ports: DashMap::new(),
            finalizers: DashMap::new(),
            next_port: AtomicU64::new(1),
        }
    }

    /// Open a fresh port owned by the calling thread until another thread
    /// pumps it.
    pub fn open_port(&self) -> PortId {
        let id = self.next_port.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded();
        self.ports.insert(
            id,
            PortSlot {
                tx,
                rx,
                owner: Mutex::new(thread::current().id()),
            },
        );
        debug!(event = "open_port", port = id);
        PortId(id)
    }

    /// Close a port; queued work is dropped and later posts fail.
    pub fn close_port(&self, port: PortId) {
        self.ports.remove(&port.0);
        debug!(event = "close_port", port = port.0);
    }

    /// Drain everything currently queued on `port`, running each item on the
    /// calling thread (which claims ownership). Returns the number of items
    /// executed.
    pub fn pump(&self, port: PortId) -> usize {
        let Some(rx) = self.claim(port) else {
            return 0;
        };
        let mut ran = 0;
        while let Ok(work) = rx.try_recv() {
            work();
            ran += 1;
        }
        ran
    }

    /// Run `port`'s queue on the calling thread until the port is closed.
    /// This is the script sequencing thread's main loop.
    pub fn run(&self, port: PortId) {
        let Some(rx) = self.claim(port) else {
            return;
        };
        while let Ok(work) = rx.recv() {
            work();
        }
    }

    /// Simulate the script GC collecting `value`: fire its finalizer exactly
    /// once. A second collect of the same value is a no-op.
    pub fn collect(&self, value: ScriptRef) -> bool {
        match self.finalizers.remove(&value) {
            Some((_, fin)) => {
                trace!(event = "collect", value = value.0, handle = %fin.handle);
                (fin.release)(fin.handle);
                true
            }
            None => false,
        }
    }

    /// Number of values with a pending finalizer.
    pub fn pending_finalizers(&self) -> usize {
        self.finalizers.len()
    }

    fn claim(&self, port: PortId) -> Option<Receiver<PendingWork>> {
        let slot = self.ports.get(&port.0)?;
        *slot.owner.lock() = thread::current().id();
        Some(slot.rx.clone())
    }
}

impl ScriptHost for ChannelHost {
    fn post_work(&self, port: PortId, work: PendingWork) -> Result<()> {
        let Some(slot) = self.ports.get(&port.0) else {
            return Err(BridgeError::PortClosed);
        };
        slot.tx.send(work)?;
        Ok(())
    }

    fn port_thread(&self, port: PortId) -> Option<ThreadId> {
        self.ports.get(&port.0).map(|slot| *slot.owner.lock())
    }

    fn bind_finalizer(&self, value: ScriptRef, handle: ObjectHandle, release: FinalizerFn) {
        trace!(event = "bind_finalizer", value = value.0, handle = %handle);
        if self
            .finalizers
            .insert(value, Finalizer { handle, release })
            .is_some()
        {
            debug!(value = value.0, "finalizer rebound, previous binding dropped");
        }
    }
}
