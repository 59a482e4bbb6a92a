//! Extern "C" call surface bound by the script VM
//!
//! Thin wrappers over the process bridge resolved through
//! [`crate::bridge::current`]. Every entry point is null-safe and recovers
//! every failure into a null/zero/error-status result plus a diagnostic log;
//! no panic crosses this boundary.

#[cfg(test)]
mod tests;

use core::ffi::{c_char, c_void};
use std::ffi::{CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::bridge::{self, Completion, InvokeOutcome, InvokeRequest};
use crate::callback::CallbackFn;
use crate::logging::error;
use crate::router::Lane;
use crate::script::{self, PortId, ScriptRef};
use crate::target::CallTarget;
use crate::value::{
    self, ObjectHandle, RawSlot, ScriptString, ScriptValue, TagList, TaggedSlot, ValueTag,
};

/// Call completed synchronously; the result slot was written.
pub const OBJBRIDGE_OK: i32 = 0;
/// Call was queued; any result arrives through the completion callback.
pub const OBJBRIDGE_DEFERRED: i32 = 1;
/// Call failed; the failure was logged and nothing was written.
pub const OBJBRIDGE_ERROR: i32 = -1;

/// Script-side callback entry point, wire form. `args` holds `argc` slots,
/// `tags` holds `argc + 1` tag bytes (trailing return tag); the returned slot
/// carries the result with string payloads as UTF-16 buffers.
pub type ScriptMethodFn = extern "C" fn(
    receiver: u64,
    method: *const c_char,
    args: *mut TaggedSlot,
    tags: *const u8,
    argc: i32,
) -> TaggedSlot;

/// Completion callback for a deferred invoke, wire form.
pub type ResultFn = extern "C" fn(ctx: *mut c_void, result: TaggedSlot);

// Completion contexts are opaque to the bridge and only handed back to the
// script side, so moving the pointer across threads is the script VM's own
// contract.
struct CtxPtr(*mut c_void);
unsafe impl Send for CtxPtr {}
unsafe impl Sync for CtxPtr {}

impl CtxPtr {
    // Accessed through a method so closures capture the wrapper itself, not
    // the bare pointer field.
    fn raw(&self) -> *mut c_void {
        self.0
    }
}

/// Decode the lane selector: 0 and below is the primary lane, n > 0 is
/// worker lane n - 1.
fn decode_lane(lane: i32) -> Lane {
    if lane <= 0 {
        Lane::Primary
    } else {
        Lane::Worker((lane - 1) as usize)
    }
}

unsafe fn read_name(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Adopt the wire argument arrays, or log and return None.
unsafe fn read_args(
    args: *const RawSlot,
    tags: *const u8,
    argc: i32,
    mask: u32,
) -> Option<(Vec<ScriptValue>, TagList)> {
    let argc = argc.max(0) as usize;
    if argc == 0 {
        return Some((Vec::new(), TagList::new()));
    }
    if args.is_null() || tags.is_null() {
        error!("argument arrays are null with argc > 0");
        return None;
    }
    match value::adopt_args(args, tags, argc, mask) {
        Ok(adopted) => Some(adopted),
        Err(e) => {
            error!(error = %e, "argument adoption failed");
            None
        }
    }
}

/// Wrap a wire callback into the registry's owned form.
fn wrap_script_fn(f: ScriptMethodFn) -> CallbackFn {
    Arc::new(move |receiver, method, args, tags| {
        let method_c = CString::new(method).unwrap_or_default();
        let mut slots: SmallVec<[TaggedSlot; 8]> =
            args.into_iter().map(value::into_slot).collect();
        let tag_bytes: SmallVec<[u8; 8]> = tags.iter().map(|t| *t as u8).collect();
        let result = f(
            receiver.as_raw(),
            method_c.as_ptr(),
            slots.as_mut_ptr(),
            tag_bytes.as_ptr(),
            slots.len() as i32,
        );
        // Safety: the callback returns a slot it owns per the ABI.
        unsafe { value::adopt_slot(result) }.unwrap_or(ScriptValue::Void)
    })
}

/// Run an entry-point body, turning a panic into the failure value.
fn guard<T>(fail: T, body: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(v) => v,
        Err(_) => {
            error!("panic recovered at the C surface");
            fail
        }
    }
}

/// Tie a script wrapper value's collection to exactly one release of
/// `handle`.
#[no_mangle]
pub extern "C" fn objbridge_bind_finalizer(value: u64, handle: u64) {
    guard((), || {
        let Ok(bridge) = bridge::current() else {
            error!("bind_finalizer with no bridge attached");
            return;
        };
        bridge.bind_finalizer(ScriptRef(value), ObjectHandle::from_raw(handle));
    })
}

/// GC-driven release entry point. Idempotent; safe from any finalizer
/// thread.
#[no_mangle]
pub extern "C" fn objbridge_release_object(handle: u64) {
    guard((), || {
        if let Ok(bridge) = bridge::current() {
            bridge.release_object(ObjectHandle::from_raw(handle));
        }
    })
}

/// Construct a target object. Returns the pinned handle, or 0 on failure.
///
/// # Safety
/// `class` must be a valid C string; `args`/`tags` must hold `argc` entries
/// encoded per `mask`.
#[no_mangle]
pub unsafe extern "C" fn objbridge_create_object(
    class: *const c_char,
    args: *const RawSlot,
    tags: *const u8,
    argc: i32,
    mask: u32,
) -> u64 {
    guard(0, || {
        let Ok(bridge) = bridge::current() else {
            error!("create_object with no bridge attached");
            return 0;
        };
        let Some(class) = read_name(class) else {
            return 0;
        };
        let Some((values, sig)) = read_args(args, tags, argc, mask) else {
            return 0;
        };
        match bridge.create_object(&class, values, &sig) {
            Ok(handle) => handle.as_raw(),
            Err(e) => {
                error!(class = %class, error = %e, "create_object failed");
                0
            }
        }
    })
}

/// Invoke a method on a target object through the lane matrix.
///
/// Returns [`OBJBRIDGE_OK`] with `out_result` written for synchronous
/// completions, [`OBJBRIDGE_DEFERRED`] for queued calls (the result, if any,
/// arrives via `callback` on the reply-port thread), or [`OBJBRIDGE_ERROR`].
/// A null `callback` makes the call synchronous.
///
/// # Safety
/// Pointer arguments must satisfy the wire ABI; `out_result` must be
/// writable when the call can complete synchronously.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn objbridge_invoke(
    handle: u64,
    method: *const c_char,
    args: *const RawSlot,
    tags: *const u8,
    argc: i32,
    ret_tag: u8,
    mask: u32,
    callback: Option<ResultFn>,
    callback_ctx: *mut c_void,
    reply_port: u64,
    lane: i32,
    is_interface: bool,
    out_result: *mut TaggedSlot,
) -> i32 {
    guard(OBJBRIDGE_ERROR, || {
        let Ok(bridge) = bridge::current() else {
            error!("invoke with no bridge attached");
            return OBJBRIDGE_ERROR;
        };
        let Some(method) = read_name(method) else {
            return OBJBRIDGE_ERROR;
        };
        let Some(ret) = ValueTag::from_raw(ret_tag) else {
            error!(ret_tag, "unknown return tag");
            return OBJBRIDGE_ERROR;
        };
        if callback.is_none() && out_result.is_null() {
            error!(method = %method, "synchronous invoke without a result slot");
            return OBJBRIDGE_ERROR;
        }
        let Some((values, sig)) = read_args(args, tags, argc, mask) else {
            return OBJBRIDGE_ERROR;
        };

        let completion = callback.map(|f| {
            let ctx = CtxPtr(callback_ctx);
            Completion {
                callback: Arc::new(move |result: ScriptValue| {
                    f(ctx.raw(), value::into_slot(result));
                }),
                port: PortId(reply_port),
            }
        });

        let request = InvokeRequest {
            target: CallTarget::Instance(ObjectHandle::from_raw(handle)),
            method: method.clone(),
            args: values,
            sig,
            ret,
            string_mask: mask,
            lane: decode_lane(lane),
            completion,
            is_interface,
        };
        match bridge.invoke(request) {
            Ok(InvokeOutcome::Completed(result)) => {
                // A call with a completion callback may legitimately pass no
                // result slot even when the lane runs it inline; delivery
                // happened through the reply port in that case.
                if !out_result.is_null() {
                    *out_result = value::into_slot(result);
                }
                OBJBRIDGE_OK
            }
            Ok(InvokeOutcome::Deferred) => OBJBRIDGE_DEFERRED,
            Err(e) => {
                error!(method = %method, error = %e, "invoke failed");
                OBJBRIDGE_ERROR
            }
        }
    })
}

/// Register a per-object script callback under (class, method).
///
/// # Safety
/// `class` and `method` must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn objbridge_register_callback(
    receiver: u64,
    class: *const c_char,
    method: *const c_char,
    callback: ScriptMethodFn,
    reply_port: u64,
) {
    guard((), || {
        let Ok(bridge) = bridge::current() else {
            error!("register_callback with no bridge attached");
            return;
        };
        let (Some(class), Some(method)) = (read_name(class), read_name(method)) else {
            return;
        };
        bridge.register_callback(
            ObjectHandle::from_raw(receiver),
            &class,
            &method,
            wrap_script_fn(callback),
            PortId(reply_port),
        );
    })
}

/// Register a script implementation of one interface method.
///
/// # Safety
/// `interface` and `method` must be valid C strings.
#[no_mangle]
pub unsafe extern "C" fn objbridge_register_interface_method(
    interface: *const c_char,
    method: *const c_char,
    callback: ScriptMethodFn,
    reply_port: u64,
    return_async: i32,
) {
    guard((), || {
        let Ok(bridge) = bridge::current() else {
            error!("register_interface_method with no bridge attached");
            return;
        };
        let (Some(interface), Some(method)) = (read_name(interface), read_name(method)) else {
            return;
        };
        bridge.register_interface_method(
            &interface,
            &method,
            wrap_script_fn(callback),
            PortId(reply_port),
            return_async != 0,
        );
    })
}

/// Handle of the target-side host instance for a named interface, or 0.
///
/// # Safety
/// `name` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn objbridge_lookup_interface(name: *const c_char) -> u64 {
    guard(0, || {
        let Ok(bridge) = bridge::current() else {
            return 0;
        };
        let Some(name) = read_name(name) else {
            return 0;
        };
        match bridge.lookup_interface(&name) {
            Ok(handle) => handle.as_raw(),
            Err(e) => {
                error!(name = %name, error = %e, "interface lookup failed");
                0
            }
        }
    })
}

/// Method-signature metadata string for a named interface, or null. The
/// caller frees it via [`objbridge_string_free`].
///
/// # Safety
/// `name` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn objbridge_interface_signatures(name: *const c_char) -> *mut c_char {
    guard(std::ptr::null_mut(), || {
        let Ok(bridge) = bridge::current() else {
            return std::ptr::null_mut();
        };
        let Some(name) = read_name(name) else {
            return std::ptr::null_mut();
        };
        match bridge
            .interface_signatures(&name)
            .ok()
            .and_then(|s| CString::new(s).ok())
        {
            Some(s) => s.into_raw(),
            None => std::ptr::null_mut(),
        }
    })
}

/// Synthesize and pin a dynamic proxy for a named interface, or 0.
///
/// # Safety
/// `interface` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn objbridge_create_proxy(interface: *const c_char) -> u64 {
    guard(0, || {
        let Ok(bridge) = bridge::current() else {
            error!("create_proxy with no bridge attached");
            return 0;
        };
        let Some(interface) = read_name(interface) else {
            return 0;
        };
        match bridge.create_proxy(&interface) {
            Ok(handle) => handle.as_raw(),
            Err(e) => {
                error!(interface = %interface, error = %e, "create_proxy failed");
                0
            }
        }
    })
}

/// Class name of a live object, or null. The caller frees it via
/// [`objbridge_string_free`].
#[no_mangle]
pub extern "C" fn objbridge_object_class_name(handle: u64) -> *mut c_char {
    guard(std::ptr::null_mut(), || {
        let Ok(bridge) = bridge::current() else {
            return std::ptr::null_mut();
        };
        match bridge
            .object_class_name(ObjectHandle::from_raw(handle))
            .and_then(|s| CString::new(s).ok())
        {
            Some(s) => s.into_raw(),
            None => std::ptr::null_mut(),
        }
    })
}

/// Run one posted work item exactly once. The script pump calls this with
/// the pointer it received through its native port.
///
/// # Safety
/// `work` must come from the bridge's work transport and must not be
/// executed twice.
#[no_mangle]
pub unsafe extern "C" fn objbridge_execute_work(work: *mut c_void) {
    if work.is_null() {
        return;
    }
    let work = script::work_from_raw(work);
    guard((), move || work())
}

/// Allocate a zeroed length-prefixed UTF-16 buffer of `units` code units
/// from the bridge allocator. Ownership transfers back when the buffer is
/// passed as an argument (or via [`objbridge_utf16_free`]).
#[no_mangle]
pub extern "C" fn objbridge_utf16_alloc(units: u32) -> *mut u16 {
    ScriptString::with_capacity(units as usize).into_raw()
}

/// Free a UTF-16 buffer owned by the bridge allocator.
///
/// # Safety
/// `ptr` must come from the bridge allocator and not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn objbridge_utf16_free(ptr: *mut u16) {
    if !ptr.is_null() {
        drop(ScriptString::from_raw(ptr));
    }
}

/// Free a C string produced by this surface.
///
/// # Safety
/// `ptr` must come from this surface and not be freed twice.
#[no_mangle]
pub unsafe extern "C" fn objbridge_string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
