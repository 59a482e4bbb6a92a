//! Test suite for the extern "C" surface
//!
//! These are the only tests touching the process bridge slot, so they
//! serialize on a shared lock.

use std::ffi::CString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::*;
use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::script::channel::ChannelHost;
use crate::target::memory::{Fields, MemoryRuntime};
use crate::target::TargetRuntime;
use crate::value::HostValue;

static FFI_LOCK: Mutex<()> = Mutex::new(());

struct Attached {
    runtime: Arc<MemoryRuntime>,
    host: Arc<ChannelHost>,
    port: PortId,
    _guard: MutexGuard<'static, ()>,
}

impl Drop for Attached {
    fn drop(&mut self) {
        Bridge::detach();
    }
}

fn attach() -> Attached {
    let guard = FFI_LOCK.lock();

    let runtime = Arc::new(MemoryRuntime::new());
    runtime.define_constructor(
        "Widget",
        &[],
        Arc::new(|_| {
            let mut fields = Fields::new();
            fields.insert("name".into(), HostValue::Str("widget-one".into()));
            Ok(fields)
        }),
    );
    runtime.define_method(
        "Widget",
        "getName",
        &[],
        Arc::new(|fields, _| Ok(fields["name"].clone())),
    );
    runtime.define_method(
        "Widget",
        "setName",
        &[ValueTag::String],
        Arc::new(|fields, args| {
            fields.insert("name".into(), args[0].clone());
            Ok(HostValue::Void)
        }),
    );

    let host = Arc::new(ChannelHost::new());
    let port = host.open_port();
    Bridge::attach(
        BridgeConfig::default(),
        runtime.clone(),
        host.clone(),
        port,
    );
    Attached {
        runtime,
        host,
        port,
        _guard: guard,
    }
}

fn cstr(s: &str) -> CString {
    CString::new(s).unwrap()
}

unsafe fn create_widget() -> u64 {
    let class = cstr("Widget");
    objbridge_create_object(class.as_ptr(), std::ptr::null(), std::ptr::null(), 0, 0)
}

unsafe fn invoke_get_name(handle: u64, mask: u32) -> (i32, TaggedSlot) {
    let method = cstr("getName");
    let mut out = TaggedSlot::void();
    let status = objbridge_invoke(
        handle,
        method.as_ptr(),
        std::ptr::null(),
        std::ptr::null(),
        0,
        ValueTag::String as u8,
        mask,
        None,
        std::ptr::null_mut(),
        0,
        0,
        false,
        &mut out,
    );
    (status, out)
}

#[test]
fn test_create_and_invoke_sync() {
    let fixture = attach();
    unsafe {
        let handle = create_widget();
        assert_ne!(handle, 0);
        assert_eq!(fixture.runtime.pin_count(ObjectHandle::from_raw(handle)), 1);

        let (status, out) = invoke_get_name(handle, 0);
        assert_eq!(status, OBJBRIDGE_OK);
        assert_eq!(out.tag, ValueTag::String);
        // Mask 0: the result crossed as a UTF-8 C string we now own.
        let result = value::adopt_value(out.raw, out.tag, false).unwrap();
        assert_eq!(result, ScriptValue::Utf8(cstr("widget-one")));
    }
}

#[test]
fn test_release_makes_handle_stale() {
    let _fixture = attach();
    unsafe {
        let handle = create_widget();
        objbridge_release_object(handle);
        // Idempotent from any thread, including a second stray release.
        objbridge_release_object(handle);

        let (status, _) = invoke_get_name(handle, 0);
        assert_eq!(status, OBJBRIDGE_ERROR);
    }
}

#[test]
fn test_utf16_argument_round_trip() {
    let _fixture = attach();
    unsafe {
        let handle = create_widget();

        // Script side fills a bridge-allocated UTF-16 buffer in place and
        // hands it over as argument 0 (mask bit 0 set).
        let buf = objbridge_utf16_alloc(2);
        *buf.add(2) = 'h' as u16;
        *buf.add(3) = 'i' as u16;
        let args = [RawSlot {
            ptr: buf as *mut core::ffi::c_void,
        }];
        let tags = [ValueTag::String as u8];
        let method = cstr("setName");
        let mut out = TaggedSlot::void();
        let status = objbridge_invoke(
            handle,
            method.as_ptr(),
            args.as_ptr(),
            tags.as_ptr(),
            1,
            ValueTag::Void as u8,
            1,
            None,
            std::ptr::null_mut(),
            0,
            0,
            false,
            &mut out,
        );
        assert_eq!(status, OBJBRIDGE_OK);
        assert_eq!(out.tag, ValueTag::Void);

        // Ask for the result back as UTF-16 (bit 31).
        let (status, out) = invoke_get_name(handle, crate::value::RETURN_UTF16_BIT);
        assert_eq!(status, OBJBRIDGE_OK);
        let result = value::adopt_value(out.raw, out.tag, true).unwrap();
        match result {
            ScriptValue::Utf16(s) => assert_eq!(s.decode().unwrap(), "hi"),
            other => panic!("expected utf16 result, got {:?}", other),
        }
    }
}

extern "C" fn record_name(ctx: *mut c_void, result: TaggedSlot) {
    unsafe {
        let hits = &*(ctx as *const AtomicUsize);
        let value = value::adopt_value(result.raw, result.tag, false).unwrap();
        assert_eq!(value, ScriptValue::Utf8(CString::new("widget-one").unwrap()));
        objbridge_string_free(result.raw.ptr as *mut c_char);
        hits.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_callback_with_null_result_slot_completes_inline() {
    let fixture = attach();
    let hits = AtomicUsize::new(0);
    unsafe {
        let handle = create_widget();
        let method = cstr("getName");
        // From the port-owning thread the primary lane runs the call inline,
        // but a completion callback means the caller may pass no result slot;
        // the result still arrives through the reply port.
        let status = objbridge_invoke(
            handle,
            method.as_ptr(),
            std::ptr::null(),
            std::ptr::null(),
            0,
            ValueTag::String as u8,
            0,
            Some(record_name),
            &hits as *const AtomicUsize as *mut c_void,
            fixture.port.0,
            0,
            false,
            std::ptr::null_mut(),
        );
        assert_eq!(status, OBJBRIDGE_OK);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(fixture.host.pump(fixture.port), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

extern "C" fn triple_i32(
    _receiver: u64,
    _method: *const core::ffi::c_char,
    args: *mut TaggedSlot,
    tags: *const u8,
    argc: i32,
) -> TaggedSlot {
    assert_eq!(argc, 1);
    unsafe {
        assert_eq!(*tags, ValueTag::I32 as u8);
        // Trailing entry carries the return tag.
        assert_eq!(*tags.add(1), ValueTag::I32 as u8);
        let n = (*args).raw.i32;
        TaggedSlot::new(ValueTag::I32, RawSlot { i32: n * 3 })
    }
}

#[test]
fn test_interface_method_through_proxy() {
    let fixture = attach();
    unsafe {
        let interface = cstr("Listener");
        let method = cstr("onEvent");
        objbridge_register_interface_method(
            interface.as_ptr(),
            method.as_ptr(),
            triple_i32,
            fixture.port.0,
            0,
        );

        let proxy = objbridge_create_proxy(interface.as_ptr());
        assert_ne!(proxy, 0);

        // Target side invokes the proxy; same thread, so it runs inline.
        let out = fixture
            .runtime
            .call(
                &crate::target::CallTarget::Instance(ObjectHandle::from_raw(proxy)),
                "onEvent",
                &[HostValue::I32(14)],
                &[ValueTag::I32],
                ValueTag::I32,
            )
            .unwrap();
        assert_eq!(out, HostValue::I32(42));
    }
}

#[test]
fn test_interface_metadata_entry_points() {
    let fixture = attach();
    unsafe {
        let host_obj = fixture.runtime.construct("Widget", &[], &[]).unwrap();
        fixture
            .runtime
            .define_interface("Listener", host_obj, "onEvent:i32=>i32;");

        let name = cstr("Listener");
        let found = objbridge_lookup_interface(name.as_ptr());
        assert_eq!(found, host_obj.as_raw());

        let sig = objbridge_interface_signatures(name.as_ptr());
        assert!(!sig.is_null());
        assert_eq!(
            std::ffi::CStr::from_ptr(sig).to_str().unwrap(),
            "onEvent:i32=>i32;"
        );
        objbridge_string_free(sig);

        let class = objbridge_object_class_name(found);
        assert!(!class.is_null());
        assert_eq!(std::ffi::CStr::from_ptr(class).to_str().unwrap(), "Widget");
        objbridge_string_free(class);

        let missing = cstr("Nobody");
        assert_eq!(objbridge_lookup_interface(missing.as_ptr()), 0);
        assert!(objbridge_interface_signatures(missing.as_ptr()).is_null());
    }
}

#[test]
fn test_bind_finalizer_through_surface() {
    let fixture = attach();
    unsafe {
        let handle = create_widget();
        objbridge_bind_finalizer(9000, handle);
        assert!(fixture.host.collect(crate::script::ScriptRef(9000)));
        assert_eq!(fixture.runtime.pin_count(ObjectHandle::from_raw(handle)), 0);
    }
}

#[test]
fn test_execute_work_runs_exactly_once() {
    let _fixture = attach();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    let raw = script::work_into_raw(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    unsafe {
        objbridge_execute_work(raw);
        objbridge_execute_work(std::ptr::null_mut());
    }
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn test_entry_points_fail_closed_when_detached() {
    let _guard = FFI_LOCK.lock();
    Bridge::detach();
    unsafe {
        assert_eq!(create_widget(), 0);
        let (status, _) = invoke_get_name(1, 0);
        assert_eq!(status, OBJBRIDGE_ERROR);
        assert_eq!(objbridge_lookup_interface(cstr("X").as_ptr()), 0);
        // Null-safe no-ops.
        objbridge_release_object(7);
        objbridge_string_free(std::ptr::null_mut());
        objbridge_utf16_free(std::ptr::null_mut());
    }
}

#[test]
fn test_lane_decoding() {
    assert_eq!(decode_lane(0), crate::router::Lane::Primary);
    assert_eq!(decode_lane(-3), crate::router::Lane::Primary);
    assert_eq!(decode_lane(1), crate::router::Lane::Worker(0));
    assert_eq!(decode_lane(4), crate::router::Lane::Worker(3));
}
