//! objbridge - invocation and lifecycle bridge between a managed scripting
//! runtime and a managed object runtime
//!
//! Script-side code instantiates target-side objects, invokes their methods,
//! and receives return values; target-side code calls back into script logic,
//! including through dynamically synthesized interface proxies. The two
//! runtimes keep independent garbage collectors and threading models; the
//! bridge keeps cross-referenced objects alive exactly as long as needed on
//! both sides and routes each call onto the thread its side requires.
//!
//! Components:
//! - [`refs`] - reference table pinning target objects while script proxies
//!   reference them
//! - [`router`] - thread router moving calls onto their declared lane
//! - [`value`] - tagged-value marshaller, including UTF-16 ⇄ UTF-8 strings
//! - [`invoke`] - forward invocation engine over the target runtime
//! - [`callback`] - reverse callback/interface registry
//! - [`proxy`] - dynamic interface proxy factory
//! - [`bridge`] - orchestration and the process-scoped service slot
//! - [`ffi`] - the extern "C" surface the script VM binds

pub mod bridge;
pub mod callback;
pub mod config;
pub mod error;
pub mod ffi;
pub mod invoke;
pub mod logging;
pub mod proxy;
pub mod refs;
pub mod router;
pub mod script;
pub mod target;
pub mod value;

pub use bridge::{Bridge, Completion, InvokeOutcome, InvokeRequest};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use refs::ReferenceTable;
pub use router::{Lane, Outcome, ThreadRouter};
pub use script::{PendingWork, PortId, ScriptHost, ScriptRef};
pub use target::{CallTarget, ProxyInvoker, TargetError, TargetRuntime};
pub use value::{HostValue, ObjectHandle, ScriptValue, TaggedSlot, ValueTag};
