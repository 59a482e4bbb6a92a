//! Thread router - moves a call onto the lane it declares
//!
//! Lanes are the script runtime's primary sequencing thread plus a fixed pool
//! of worker threads, each draining its own queue. Dispatch rules:
//!
//! - primary lane, caller already on it: run inline, return the result
//! - primary lane, caller elsewhere: post to the script port and return
//!   deferred (fire-and-forget; the primary thread is never blocked on)
//! - worker lane, synchronous: enqueue, block the caller on a completion
//!   signal, return the lane's result
//! - worker lane, asynchronous: enqueue and return deferred
//!
//! Same-lane work from the same submitting thread runs FIFO. There is no
//! timeout or cancellation anywhere on the blocking paths; a work item that
//! never completes blocks its caller indefinitely.


use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::logging::{debug, error, trace};
use crate::script::{PendingWork, PortId, ScriptHost};
use crate::value::HostValue;

/// Execution lane a call declares. Worker indices wrap modulo the pool size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Primary,
    Worker(usize),
}

impl core::fmt::Display for Lane {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Worker(n) => write!(f, "worker-{}", n),
        }
    }
}

/// How a dispatched call came back to the native caller.
#[derive(Debug)]
pub enum Outcome {
    /// Completed synchronously (inline or after blocking on a worker lane).
    Completed(HostValue),
    /// Queued; any eventual result flows through the callback path.
    Deferred,
}

/// Unit of routed work: produces the call's result or a recovered error.
pub type LaneWork = Box<dyn FnOnce() -> Result<HostValue> + Send + 'static>;

/// Fixed-lane work router.
pub struct ThreadRouter {
    host: Arc<dyn ScriptHost>,
    primary_port: PortId,
    lanes: Vec<Sender<PendingWork>>,
    joins: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadRouter {
    /// Spawn `workers` (minimum 1) worker lanes. `primary_port` addresses the
    /// script sequencing thread.
    pub fn new(host: Arc<dyn ScriptHost>, primary_port: PortId, workers: usize) -> Self {
        let workers = workers.max(1);
        let mut lanes = Vec::with_capacity(workers);
        let mut joins = Vec::with_capacity(workers);
        for n in 0..workers {
            let (tx, rx) = unbounded::<PendingWork>();
            let join = thread::Builder::new()
                .name(format!("objbridge-worker-{}", n))
                .spawn(move || worker_loop(n, rx))
                .expect("failed to spawn worker lane");
            lanes.push(tx);
            joins.push(join);
        }
        debug!(event = "router_up", workers);
        Self {
            host,
            primary_port,
            lanes,
            joins: Mutex::new(joins),
        }
    }

    /// Number of worker lanes in the pool.
    pub fn workers(&self) -> usize {
        self.lanes.len()
    }

    /// Check whether the calling thread is the primary (script) thread.
    pub fn on_primary(&self) -> bool {
        self.host.port_thread(self.primary_port) == Some(thread::current().id())
    }

    /// Route `work` onto `lane` per the dispatch rules above. `sync` asks for
    /// the result to be delivered to the caller synchronously; it is honored
    /// on worker lanes and implied inline on the primary lane, but a
    /// primary-lane call from a foreign thread is always deferred.
    pub fn dispatch(&self, lane: Lane, sync: bool, work: LaneWork) -> Result<Outcome> {
        match lane {
            Lane::Primary => {
                if self.on_primary() {
                    trace!(event = "dispatch_inline", lane = %lane);
                    return Ok(Outcome::Completed(work()?));
                }
                trace!(event = "dispatch_post", lane = %lane, port = %self.primary_port);
                self.host.post_work(
                    self.primary_port,
                    Box::new(move || {
                        if let Err(e) = work() {
                            error!(error = %e, "deferred primary-lane call failed");
                        }
                    }),
                )?;
                Ok(Outcome::Deferred)
            }
            Lane::Worker(n) => {
                let tx = &self.lanes[n % self.lanes.len()];
                if sync {
                    let (done_tx, done_rx) = bounded(1);
                    tx.send(Box::new(move || {
                        let _ = done_tx.send(work());
                    }))
                    .map_err(|_| BridgeError::PortClosed)?;
                    // Blocks with no timeout until the lane signals.
                    match done_rx.recv() {
                        Ok(result) => Ok(Outcome::Completed(result?)),
                        Err(_) => Err(BridgeError::PortClosed),
                    }
                } else {
                    tx.send(Box::new(move || {
                        if let Err(e) = work() {
                            error!(error = %e, "asynchronous worker-lane call failed");
                        }
                    }))
                    .map_err(|_| BridgeError::PortClosed)?;
                    Ok(Outcome::Deferred)
                }
            }
        }
    }
}

impl Drop for ThreadRouter {
    fn drop(&mut self) {
        // Closing the queues ends the worker loops; then wait them out.
        self.lanes.clear();
        for join in self.joins.lock().drain(..) {
            let _ = join.join();
        }
    }
}

fn worker_loop(lane: usize, rx: Receiver<PendingWork>) {
    while let Ok(work) = rx.recv() {
        // One panicking item must not take the lane down with it.
        if catch_unwind(AssertUnwindSafe(work)).is_err() {
            error!(lane, "work item panicked; lane continues");
        }
    }
    debug!(event = "lane_down", lane);
}
