//! In-process reference implementation of [`TargetRuntime`]
//!
//! A class table plus an instance table, both driven by registered Rust
//! closures. No reflection: constructors and methods are looked up by exact
//! (name, tag-signature) key, instances carry a named-field map as state, and
//! dynamic proxies are plain instances whose calls forward to a
//! [`ProxyInvoker`]. Objects stay alive exactly as long as they hold at least
//! one global pin; an unpinned handle is collectable and any later use of it
//! fails with [`TargetError::DeadHandle`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::logging::{debug, trace};
use crate::value::{HostValue, ObjectHandle, ValueTag};

use super::{signature_key, CallTarget, ProxyInvoker, TargetError, TargetRuntime};

/// Named-field state of one instance.
pub type Fields = HashMap<String, HostValue>;

/// Registered constructor body: arguments in, initial field map out.
pub type ConstructorFn = Arc<dyn Fn(&[HostValue]) -> Result<Fields, TargetError> + Send + Sync>;

/// Registered method body: instance state + arguments in, result out.
pub type MethodFn =
    Arc<dyn Fn(&mut Fields, &[HostValue]) -> Result<HostValue, TargetError> + Send + Sync>;

#[derive(Default)]
struct ClassDef {
    // Keyed by signature_key(sig).
    constructors: HashMap<String, ConstructorFn>,
    // Keyed by "method(signature_key)".
    methods: HashMap<String, MethodFn>,
}

enum Instance {
    Object {
        class: String,
        fields: Mutex<Fields>,
    },
    Proxy {
        interface: String,
        invoker: Arc<dyn ProxyInvoker>,
    },
}

struct InterfaceDef {
    host: ObjectHandle,
    signatures: String,
}

/// Closure-driven object runtime. Handles start at 1 and never repeat, so two
/// live objects can never alias.
pub struct MemoryRuntime {
    next_handle: AtomicU64,
    classes: RwLock<HashMap<String, Arc<ClassDef>>>,
    instances: DashMap<ObjectHandle, Arc<Instance>>,
    pins: DashMap<ObjectHandle, u32>,
    interfaces: RwLock<HashMap<String, InterfaceDef>>,
}

impl Default for MemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            classes: RwLock::new(HashMap::new()),
            instances: DashMap::new(),
            pins: DashMap::new(),
            interfaces: RwLock::new(HashMap::new()),
        }
    }

    /// Register a constructor for `class`, creating the class on first use.
    pub fn define_constructor(&self, class: &str, sig: &[ValueTag], body: ConstructorFn) {
        let mut classes = self.classes.write();
        let def = Arc::make_mut(classes.entry(class.to_string()).or_default());
        def.constructors.insert(signature_key(sig), body);
    }

    /// Register a method for `class`, creating the class on first use.
    pub fn define_method(&self, class: &str, method: &str, sig: &[ValueTag], body: MethodFn) {
        let mut classes = self.classes.write();
        let def = Arc::make_mut(classes.entry(class.to_string()).or_default());
        def.methods
            .insert(format!("{}({})", method, signature_key(sig)), body);
    }

    /// Register the host instance and signature metadata for an interface.
    pub fn define_interface(&self, name: &str, host: ObjectHandle, signatures: &str) {
        self.interfaces.write().insert(
            name.to_string(),
            InterfaceDef {
                host,
                signatures: signatures.to_string(),
            },
        );
    }

    /// Current pin count of a handle (0 when unpinned or collected).
    pub fn pin_count(&self, handle: ObjectHandle) -> u32 {
        self.pins.get(&handle).map(|e| *e.value()).unwrap_or(0)
    }

    /// Number of live (not yet collected) instances.
    pub fn live_instances(&self) -> usize {
        self.instances.len()
    }

    fn alloc_handle(&self) -> ObjectHandle {
        ObjectHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn class_def(&self, name: &str) -> Result<Arc<ClassDef>, TargetError> {
        self.classes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TargetError::UnknownClass(name.to_string()))
    }

    fn instance(&self, handle: ObjectHandle) -> Result<Arc<Instance>, TargetError> {
        self.instances
            .get(&handle)
            .map(|e| e.value().clone())
            .ok_or(TargetError::DeadHandle(handle))
    }
}

// Registration mutates shared class defs by clone-on-write under the write
// lock, so in-flight calls keep reading their snapshot untouched.
impl Clone for ClassDef {
    fn clone(&self) -> Self {
        Self {
            constructors: self.constructors.clone(),
            methods: self.methods.clone(),
        }
    }
}

impl TargetRuntime for MemoryRuntime {
    fn construct(
        &self,
        class: &str,
        args: &[HostValue],
        sig: &[ValueTag],
    ) -> Result<ObjectHandle, TargetError> {
        let def = self.class_def(class)?;
        let key = signature_key(sig);
        let ctor = def
            .constructors
            .get(&key)
            .ok_or_else(|| TargetError::NoSuchConstructor {
                class: class.to_string(),
                signature: key,
            })?;

        let fields = ctor(args)?;
        let handle = self.alloc_handle();
        self.instances.insert(
            handle,
            Arc::new(Instance::Object {
                class: class.to_string(),
                fields: Mutex::new(fields),
            }),
        );
        debug!(event = "construct", class, handle = %handle);
        Ok(handle)
    }

    fn call(
        &self,
        target: &CallTarget,
        method: &str,
        args: &[HostValue],
        sig: &[ValueTag],
        ret: ValueTag,
    ) -> Result<HostValue, TargetError> {
        let key = format!("{}({})", method, signature_key(sig));
        trace!(event = "call", target = %target, method, signature = %key);

        match target {
            CallTarget::Instance(handle) => match &*self.instance(*handle)? {
                Instance::Object { class, fields } => {
                    let def = self.class_def(class)?;
                    let body = def.methods.get(&key).ok_or_else(|| TargetError::NoSuchMethod {
                        owner: class.clone(),
                        method: method.to_string(),
                        signature: signature_key(sig),
                    })?;
                    body(&mut fields.lock(), args)
                }
                Instance::Proxy { interface, invoker } => {
                    Ok(invoker.invoke(interface, method, args, ret))
                }
            },
            // Static calls run against a transient empty field map.
            CallTarget::Class(class) => {
                let def = self.class_def(class)?;
                let body = def.methods.get(&key).ok_or_else(|| TargetError::NoSuchMethod {
                    owner: class.clone(),
                    method: method.to_string(),
                    signature: signature_key(sig),
                })?;
                body(&mut Fields::new(), args)
            }
        }
    }

    fn retain_global(&self, handle: ObjectHandle) {
        *self.pins.entry(handle).or_insert(0) += 1;
        trace!(event = "pin", handle = %handle);
    }

    fn release_global(&self, handle: ObjectHandle) {
        use dashmap::mapref::entry::Entry;
        match self.pins.entry(handle) {
            Entry::Occupied(mut e) => {
                if *e.get() > 1 {
                    *e.get_mut() -= 1;
                } else {
                    e.remove();
                    // Last pin gone: the object is garbage now.
                    self.instances.remove(&handle);
                    debug!(event = "collect", handle = %handle);
                }
            }
            Entry::Vacant(_) => {
                debug!(event = "unpin_ignored", handle = %handle, "release of unpinned handle");
            }
        }
    }

    fn new_proxy(
        &self,
        interface: &str,
        invoker: Arc<dyn ProxyInvoker>,
    ) -> Result<ObjectHandle, TargetError> {
        let handle = self.alloc_handle();
        self.instances.insert(
            handle,
            Arc::new(Instance::Proxy {
                interface: interface.to_string(),
                invoker,
            }),
        );
        debug!(event = "new_proxy", interface, handle = %handle);
        Ok(handle)
    }

    fn lookup_interface(&self, name: &str) -> Option<ObjectHandle> {
        self.interfaces.read().get(name).map(|d| d.host)
    }

    fn interface_signatures(&self, name: &str) -> Option<String> {
        self.interfaces.read().get(name).map(|d| d.signatures.clone())
    }

    fn class_name(&self, handle: ObjectHandle) -> Option<String> {
        match &*self.instances.get(&handle)?.value().clone() {
            Instance::Object { class, .. } => Some(class.clone()),
            Instance::Proxy { interface, .. } => Some(interface.clone()),
        }
    }
}
