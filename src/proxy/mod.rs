//! Interface proxy factory
//!
//! Asks the target runtime to synthesize a dynamic proxy implementing a named
//! interface; every method body forwards through the bridge's reverse entry
//! point into the callback registry. The fresh handle is pinned in the
//! reference table before it is exposed to script code, since the proxy is a
//! full target-side object with its own native lifetime.

use std::sync::{Arc, Weak};

use crate::bridge::Bridge;
use crate::error::Result;
use crate::logging::{debug, error};
use crate::target::ProxyInvoker;
use crate::value::{HostValue, ObjectHandle, ValueTag};

/// Proxy method receiver forwarding into the bridge's callback registry.
///
/// Holds the bridge weakly: the proxy lives inside the target runtime, which
/// the bridge owns, and a strong reference here would cycle.
struct RegistryInvoker {
    bridge: Weak<Bridge>,
}

impl ProxyInvoker for RegistryInvoker {
    fn invoke(
        &self,
        interface: &str,
        method: &str,
        args: &[HostValue],
        ret: ValueTag,
    ) -> HostValue {
        let Some(bridge) = self.bridge.upgrade() else {
            error!(interface, method, "proxy invoked after bridge teardown");
            return HostValue::Void;
        };
        match bridge.interface_invoke(interface, method, args.to_vec(), ret) {
            Ok(result) => result,
            Err(e) => {
                // Recovered at the boundary: the target caller sees void.
                error!(interface, method, error = %e, "proxy dispatch failed");
                HostValue::Void
            }
        }
    }
}

/// Synthesize and pin a dynamic proxy for `interface`.
pub fn create_proxy(bridge: &Arc<Bridge>, interface: &str) -> Result<ObjectHandle> {
    let invoker = Arc::new(RegistryInvoker {
        bridge: Arc::downgrade(bridge),
    });
    let handle = bridge.runtime().new_proxy(interface, invoker)?;
    bridge.refs().retain(handle);
    debug!(event = "create_proxy", interface, handle = %handle);
    Ok(handle)
}
