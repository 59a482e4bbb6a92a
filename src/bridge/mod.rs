//! Bridge orchestration and the process-scoped service slot
//!
//! [`Bridge`] wires the reference table, thread router, invocation engine,
//! and callback registry over the two collaborator seams, and owns both call
//! directions: forward calls route through the lane matrix, reverse calls
//! come in through [`Bridge::interface_invoke`]. The process keeps at most
//! one current bridge, installed at attach and cleared at detach; the C
//! surface resolves it through [`current`].


use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::callback::{CallbackEntry, CallbackFn, CallbackRegistry};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::invoke::InvocationEngine;
use crate::logging::{self, debug, info, warn};
use crate::proxy;
use crate::refs::ReferenceTable;
use crate::router::{Lane, LaneWork, Outcome, ThreadRouter};
use crate::script::{PortId, ScriptHost, ScriptRef};
use crate::target::{CallTarget, TargetRuntime};
use crate::value::{
    self, return_is_utf16, HostValue, ObjectHandle, ScriptValue, TagList, ValueTag,
};

static CURRENT: Lazy<RwLock<Option<Arc<Bridge>>>> = Lazy::new(|| RwLock::new(None));

/// Completion path for an asynchronous forward call: where and what to call
/// with the marshalled result.
#[derive(Clone)]
pub struct Completion {
    /// Invoked on the reply-port thread with the call's script-form result
    /// (void when the call failed; the failure itself is logged).
    pub callback: Arc<dyn Fn(ScriptValue) + Send + Sync>,
    /// Reply port the completion is posted to.
    pub port: PortId,
}

/// One forward call, fully described.
pub struct InvokeRequest {
    pub target: CallTarget,
    pub method: String,
    pub args: Vec<ScriptValue>,
    pub sig: TagList,
    pub ret: ValueTag,
    /// String-encoding bitmask; only the return bit matters past adoption.
    pub string_mask: u32,
    pub lane: Lane,
    /// Present means asynchronous: enqueue, return deferred, deliver the
    /// result through the completion. Absent means synchronous.
    pub completion: Option<Completion>,
    /// Interface calls are trusted without a reference-table entry.
    pub is_interface: bool,
}

/// What the native caller got back from a forward call.
#[derive(Debug)]
pub enum InvokeOutcome {
    Completed(ScriptValue),
    Deferred,
}

/// The invocation and lifecycle bridge service.
pub struct Bridge {
    runtime: Arc<dyn TargetRuntime>,
    host: Arc<dyn ScriptHost>,
    refs: Arc<ReferenceTable>,
    router: ThreadRouter,
    registry: CallbackRegistry,
    engine: InvocationEngine,
}

impl Bridge {
    /// Build a bridge without touching the process slot (unit tests construct
    /// bridges directly and run in parallel).
    pub fn new(
        config: &BridgeConfig,
        runtime: Arc<dyn TargetRuntime>,
        host: Arc<dyn ScriptHost>,
        primary_port: PortId,
    ) -> Arc<Self> {
        let refs = Arc::new(ReferenceTable::new(runtime.clone()));
        let router = ThreadRouter::new(host.clone(), primary_port, config.workers);
        let registry = CallbackRegistry::new(host.clone());
        let engine = InvocationEngine::new(runtime.clone(), refs.clone());
        Arc::new(Self {
            runtime,
            host,
            refs,
            router,
            registry,
            engine,
        })
    }

    /// Construct the process bridge and install it as current. Called once at
    /// process attach; a duplicate attach replaces the previous bridge with a
    /// warning.
    pub fn attach(
        config: BridgeConfig,
        runtime: Arc<dyn TargetRuntime>,
        host: Arc<dyn ScriptHost>,
        primary_port: PortId,
    ) -> Arc<Self> {
        logging::init_with_filter(config.log_level.as_deref());
        let bridge = Self::new(&config, runtime, host, primary_port);
        let previous = CURRENT.write().replace(bridge.clone());
        if previous.is_some() {
            warn!("bridge attach replaced a previously attached bridge");
        }
        info!(event = "attach", workers = config.workers);
        bridge
    }

    /// Tear down the process bridge slot.
    pub fn detach() {
        if CURRENT.write().take().is_some() {
            info!(event = "detach");
        }
    }

    pub(crate) fn runtime(&self) -> &Arc<dyn TargetRuntime> {
        &self.runtime
    }

    pub(crate) fn refs(&self) -> &Arc<ReferenceTable> {
        &self.refs
    }

    /// The reference table, for liveness checks from tests and embeddings.
    pub fn reference_table(&self) -> &ReferenceTable {
        &self.refs
    }

    /// Tie a script wrapper value's collection to exactly one release of
    /// `handle`.
    pub fn bind_finalizer(&self, value: ScriptRef, handle: ObjectHandle) {
        let refs = self.refs.clone();
        self.host.bind_finalizer(
            value,
            handle,
            Box::new(move |h| {
                refs.release(h);
            }),
        );
    }

    /// GC-driven release entry point; idempotent, callable from any thread.
    pub fn release_object(&self, handle: ObjectHandle) -> bool {
        self.refs.release(handle)
    }

    /// Construct a target object and pin it; runs on the calling thread.
    pub fn create_object(
        &self,
        class: &str,
        args: Vec<ScriptValue>,
        sig: &[ValueTag],
    ) -> Result<ObjectHandle> {
        self.engine.construct(class, args, sig)
    }

    /// Route one forward call per the lane matrix.
    pub fn invoke(&self, request: InvokeRequest) -> Result<InvokeOutcome> {
        // Fail stale handles before anything is queued.
        if let CallTarget::Instance(handle) = &request.target {
            if !request.is_interface && !self.refs.is_live(*handle) {
                return Err(BridgeError::StaleReference(*handle));
            }
        }

        let utf16_ret = return_is_utf16(request.string_mask);
        let sync = request.completion.is_none();
        let engine = self.engine.clone();
        let InvokeRequest {
            target,
            method,
            args,
            sig,
            ret,
            lane,
            completion,
            is_interface,
            ..
        } = request;

        let work: LaneWork = match completion {
            None => Box::new(move || engine.invoke(&target, &method, args, &sig, ret, is_interface)),
            Some(completion) => {
                let host = self.host.clone();
                Box::new(move || {
                    let result = engine.invoke(&target, &method, args, &sig, ret, is_interface);
                    let script = match result.and_then(|v| Ok(value::to_script(v, utf16_ret)?)) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(method = %method, error = %e, "asynchronous call failed");
                            ScriptValue::Void
                        }
                    };
                    let callback = completion.callback.clone();
                    host.post_work(completion.port, Box::new(move || callback(script)))?;
                    Ok(HostValue::Void)
                })
            }
        };

        match self.router.dispatch(lane, sync, work)? {
            Outcome::Completed(result) => {
                Ok(InvokeOutcome::Completed(value::to_script(result, utf16_ret)?))
            }
            Outcome::Deferred => Ok(InvokeOutcome::Deferred),
        }
    }

    /// Register a per-object script callback under (class, method).
    pub fn register_callback(
        &self,
        receiver: ObjectHandle,
        class: &str,
        method: &str,
        callback: CallbackFn,
        port: PortId,
    ) {
        self.registry
            .register(class, method, CallbackEntry::new(callback, receiver, port));
    }

    /// Register a script implementation of one interface method.
    pub fn register_interface_method(
        &self,
        interface: &str,
        method: &str,
        callback: CallbackFn,
        port: PortId,
        return_async: bool,
    ) {
        self.registry.register(
            interface,
            method,
            CallbackEntry::new(callback, ObjectHandle::NULL, port).with_return_async(return_async),
        );
    }

    /// Handle of the target-side host instance for `interface`, pinned as a
    /// fresh exposure.
    pub fn lookup_interface(&self, name: &str) -> Result<ObjectHandle> {
        let handle = self
            .runtime
            .lookup_interface(name)
            .ok_or_else(|| BridgeError::Resolution(format!("unknown interface {}", name)))?;
        self.refs.retain(handle);
        Ok(handle)
    }

    /// Method-signature metadata for `interface`.
    pub fn interface_signatures(&self, name: &str) -> Result<String> {
        self.runtime
            .interface_signatures(name)
            .ok_or_else(|| BridgeError::Resolution(format!("unknown interface {}", name)))
    }

    /// Synthesize and pin a dynamic proxy implementing `interface`.
    pub fn create_proxy(self: &Arc<Self>, interface: &str) -> Result<ObjectHandle> {
        proxy::create_proxy(self, interface)
    }

    /// Class name of a live object, for script-side diagnostics.
    pub fn object_class_name(&self, handle: ObjectHandle) -> Option<String> {
        self.runtime.class_name(handle)
    }

    /// The fixed reverse entry point: target-side code (a proxy method body
    /// or any embedder) delivers a call to the registered script callback.
    pub fn interface_invoke(
        &self,
        interface: &str,
        method: &str,
        args: Vec<HostValue>,
        ret: ValueTag,
    ) -> Result<HostValue> {
        debug!(event = "interface_invoke", interface, method);
        self.registry.dispatch(interface, method, args, ret)
    }
}

/// The currently attached process bridge.
pub fn current() -> Result<Arc<Bridge>> {
    CURRENT.read().clone().ok_or(BridgeError::NotAttached)
}
