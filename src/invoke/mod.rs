//! Invocation engine - the forward (script→target) direction
//!
//! Resolves a method or constructor on the target runtime by exact name and
//! tag-signature match, performs the call, and handles both retain points:
//! constructor results and object-typed invocation results are pinned in the
//! reference table before crossing back to script code. Anything the target
//! runtime throws or panics with is captured and converted; nothing escapes
//! as an unhandled fault.

#[cfg(test)]
mod tests;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::logging::trace;
use crate::refs::ReferenceTable;
use crate::target::{CallTarget, TargetError, TargetRuntime};
use crate::value::{self, HostValue, ObjectHandle, ScriptValue, ValueTag};

/// Forward-call resolver and executor. Cheap to clone; moved into lane work
/// closures by the bridge.
#[derive(Clone)]
pub struct InvocationEngine {
    runtime: Arc<dyn TargetRuntime>,
    refs: Arc<ReferenceTable>,
}

impl InvocationEngine {
    pub fn new(runtime: Arc<dyn TargetRuntime>, refs: Arc<ReferenceTable>) -> Self {
        Self { runtime, refs }
    }

    /// Construct an instance of `class` and pin the fresh handle before
    /// returning it; the caller exposes it to script code.
    pub fn construct(
        &self,
        class: &str,
        args: Vec<ScriptValue>,
        sig: &[ValueTag],
    ) -> Result<ObjectHandle> {
        let host_args = value::to_target(args)?;
        let handle = guarded(|| self.runtime.construct(class, &host_args, sig))?;
        self.refs.retain(handle);
        trace!(event = "construct", class, handle = %handle);
        Ok(handle)
    }

    /// Invoke `method` on `target`. Instance targets must be live in the
    /// reference table unless the call is flagged as an interface call
    /// (bridge-owned proxy objects are trusted without registration).
    pub fn invoke(
        &self,
        target: &CallTarget,
        method: &str,
        args: Vec<ScriptValue>,
        sig: &[ValueTag],
        ret: ValueTag,
        is_interface: bool,
    ) -> Result<HostValue> {
        if let CallTarget::Instance(handle) = target {
            if !is_interface && !self.refs.is_live(*handle) {
                return Err(BridgeError::StaleReference(*handle));
            }
        }

        let host_args = value::to_target(args)?;
        let result = guarded(|| self.runtime.call(target, method, &host_args, sig, ret))?;

        // An object crossing back to script is a fresh exposure.
        if let HostValue::Object(handle) = &result {
            self.refs.retain(*handle);
        }
        trace!(event = "invoke", target = %target, method, ret = %ret);
        Ok(result)
    }
}

/// Run a target-runtime call, converting both its errors and any panic out
/// of the implementation into recovered bridge errors.
fn guarded<T>(f: impl FnOnce() -> core::result::Result<T, TargetError>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result.map_err(BridgeError::from),
        Err(payload) => Err(BridgeError::TargetFailure(panic_text(payload))),
    }
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in target runtime".to_string()
    }
}
