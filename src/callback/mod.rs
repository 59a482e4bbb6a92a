//! Callback/interface registry - the reverse (target→script) direction
//!
//! Per (interface, method): the script-side callback entry point plus the
//! thread/port affinity of the owning script object, recorded at registration
//! time. A target-initiated call looks the entry up first (absent fails fast,
//! nothing marshalled), marshals the arguments to script form, and then runs
//! the callback inline when the calling thread is the affinity thread or as a
//! blocking cross-thread post otherwise, so the target side always observes a
//! synchronous call. A `return_async` registration posts without blocking and
//! returns void immediately.


use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::bounded;
use dashmap::DashMap;

use crate::error::{BridgeError, Result};
use crate::logging::{debug, trace};
use crate::script::{PortId, ScriptHost};
use crate::value::{self, reverse_tag_list, HostValue, ObjectHandle, ScriptValue, ValueTag};

/// Script-side callback entry point, in owned Rust form. Receives the owning
/// script object, the method name, the marshalled arguments, and the tag list
/// (one entry per argument plus the trailing return tag); produces the result
/// in script wire form.
pub type CallbackFn =
    Arc<dyn Fn(ObjectHandle, &str, Vec<ScriptValue>, &[ValueTag]) -> ScriptValue + Send + Sync>;

/// One registered (interface, method) entry: callback plus thread affinity.
#[derive(Clone)]
pub struct CallbackEntry {
    pub callback: CallbackFn,
    /// Script object the callback belongs to; null for interface statics.
    pub receiver: ObjectHandle,
    /// Script port the owning object lives on.
    pub port: PortId,
    /// Thread the registration was made from; calls from this thread run
    /// inline.
    pub thread: ThreadId,
    /// Post-and-return instead of blocking on cross-thread delivery.
    pub return_async: bool,
}

impl CallbackEntry {
    pub fn new(callback: CallbackFn, receiver: ObjectHandle, port: PortId) -> Self {
        Self {
            callback,
            receiver,
            port,
            thread: thread::current().id(),
            return_async: false,
        }
    }

    pub fn with_return_async(mut self, return_async: bool) -> Self {
        self.return_async = return_async;
        self
    }
}

/// Process-wide (interface, method) → callback table.
pub struct CallbackRegistry {
    host: Arc<dyn ScriptHost>,
    entries: DashMap<(String, String), CallbackEntry>,
}

impl CallbackRegistry {
    pub fn new(host: Arc<dyn ScriptHost>) -> Self {
        Self {
            host,
            entries: DashMap::new(),
        }
    }

    /// Store or overwrite the entry for (interface, method). Last
    /// registration wins; there is no intermediate state.
    pub fn register(&self, interface: &str, method: &str, entry: CallbackEntry) {
        debug!(
            event = "register_callback",
            interface,
            method,
            port = %entry.port,
            return_async = entry.return_async,
        );
        self.entries
            .insert((interface.to_string(), method.to_string()), entry);
    }

    /// Check whether (interface, method) is registered.
    pub fn is_registered(&self, interface: &str, method: &str) -> bool {
        self.entries
            .contains_key(&(interface.to_string(), method.to_string()))
    }

    /// Deliver a target-initiated call to the registered script callback.
    pub fn dispatch(
        &self,
        interface: &str,
        method: &str,
        args: Vec<HostValue>,
        ret: ValueTag,
    ) -> Result<HostValue> {
        // Lookup before any marshalling; unregistered fails fast.
        let entry = self
            .entries
            .get(&(interface.to_string(), method.to_string()))
            .map(|e| e.value().clone())
            .ok_or_else(|| BridgeError::NoSuchCallback {
                interface: interface.to_string(),
                method: method.to_string(),
            })?;

        let tags = reverse_tag_list(&args, ret);
        let mut script_args = Vec::with_capacity(args.len());
        for arg in args {
            // Reverse-call strings cross as UTF-16 per the callback ABI.
            script_args.push(value::to_script(arg, true)?);
        }

        if entry.thread == thread::current().id() {
            trace!(event = "dispatch_inline", interface, method);
            let result = (entry.callback)(entry.receiver, method, script_args, &tags);
            return finish(result, ret);
        }

        if entry.return_async {
            trace!(event = "dispatch_async", interface, method, port = %entry.port);
            let method = method.to_string();
            self.host.post_work(
                entry.port,
                Box::new(move || {
                    (entry.callback)(entry.receiver, &method, script_args, &tags);
                }),
            )?;
            return Ok(HostValue::Void);
        }

        trace!(event = "dispatch_blocking", interface, method, port = %entry.port);
        let (done_tx, done_rx) = bounded(1);
        let method_owned = method.to_string();
        self.host.post_work(
            entry.port,
            Box::new(move || {
                let result = (entry.callback)(entry.receiver, &method_owned, script_args, &tags);
                let _ = done_tx.send(result);
            }),
        )?;
        // Blocks the native caller until the script thread signals; no
        // timeout, matching the forward direction.
        match done_rx.recv() {
            Ok(result) => finish(result, ret),
            Err(_) => Err(BridgeError::PortClosed),
        }
    }
}

/// Convert a callback's script-form result back to target form, checking it
/// against the declared return tag.
fn finish(result: ScriptValue, ret: ValueTag) -> Result<HostValue> {
    if ret == ValueTag::Void {
        return Ok(HostValue::Void);
    }
    if result.tag() != ret {
        return Err(BridgeError::Marshal(value::MarshalError::ReturnTag {
            expected: ret,
            got: result.tag(),
        }));
    }
    Ok(value::to_target_one(result)?)
}
