//! Test suite for the invocation engine

use std::sync::Arc;

use super::*;
use crate::target::memory::{Fields, MemoryRuntime};
use crate::value::{MarshalError, ScriptString};

fn fixture() -> (Arc<MemoryRuntime>, Arc<ReferenceTable>, InvocationEngine) {
    let rt = Arc::new(MemoryRuntime::new());
    rt.define_constructor(
        "Widget",
        &[ValueTag::String],
        Arc::new(|args| {
            let mut fields = Fields::new();
            fields.insert("name".into(), args[0].clone());
            Ok(fields)
        }),
    );
    rt.define_method(
        "Widget",
        "getName",
        &[],
        Arc::new(|fields, _| Ok(fields["name"].clone())),
    );
    rt.define_method(
        "Widget",
        "explode",
        &[],
        Arc::new(|_, _| Err(TargetError::Exception("kaboom".into()))),
    );
    rt.define_method(
        "Widget",
        "meltdown",
        &[],
        Arc::new(|_, _| panic!("implementation bug")),
    );

    let refs: Arc<ReferenceTable> = Arc::new(ReferenceTable::new(rt.clone()));
    let engine = InvocationEngine::new(rt.clone(), refs.clone());
    (rt, refs, engine)
}

fn new_widget(engine: &InvocationEngine, name: &str) -> ObjectHandle {
    engine
        .construct(
            "Widget",
            vec![ScriptValue::Utf16(ScriptString::encode(name))],
            &[ValueTag::String],
        )
        .unwrap()
}

#[test]
fn test_construct_retains_fresh_handle() {
    let (rt, refs, engine) = fixture();
    let h = new_widget(&engine, "fresh");
    assert!(refs.is_live(h));
    assert_eq!(rt.pin_count(h), 1);
}

#[test]
fn test_invoke_marshals_arguments_and_result() {
    let (_, _, engine) = fixture();
    let h = new_widget(&engine, "marshalled");
    let out = engine
        .invoke(
            &CallTarget::Instance(h),
            "getName",
            vec![],
            &[],
            ValueTag::String,
            false,
        )
        .unwrap();
    assert_eq!(out, HostValue::Str("marshalled".into()));
}

#[test]
fn test_invoke_on_released_handle_is_stale() {
    let (_, refs, engine) = fixture();
    let h = new_widget(&engine, "short-lived");
    refs.release(h);

    let err = engine
        .invoke(
            &CallTarget::Instance(h),
            "getName",
            vec![],
            &[],
            ValueTag::String,
            false,
        )
        .unwrap_err();
    assert_eq!(err, BridgeError::StaleReference(h));
}

#[test]
fn test_interface_call_skips_table_check() {
    let (rt, refs, engine) = fixture();
    // A handle the bridge never registered (it owns the object itself).
    let h = rt
        .construct(
            "Widget",
            &[HostValue::Str("bridge-owned".into())],
            &[ValueTag::String],
        )
        .unwrap();
    assert!(!refs.is_live(h));

    let err = engine
        .invoke(
            &CallTarget::Instance(h),
            "getName",
            vec![],
            &[],
            ValueTag::String,
            false,
        )
        .unwrap_err();
    assert_eq!(err, BridgeError::StaleReference(h));

    let out = engine
        .invoke(
            &CallTarget::Instance(h),
            "getName",
            vec![],
            &[],
            ValueTag::String,
            true,
        )
        .unwrap();
    assert_eq!(out, HostValue::Str("bridge-owned".into()));
}

#[test]
fn test_target_exception_is_captured() {
    let (_, _, engine) = fixture();
    let h = new_widget(&engine, "doomed");
    let err = engine
        .invoke(
            &CallTarget::Instance(h),
            "explode",
            vec![],
            &[],
            ValueTag::Void,
            false,
        )
        .unwrap_err();
    assert_eq!(err, BridgeError::TargetFailure("kaboom".into()));
}

#[test]
fn test_target_panic_is_captured() {
    let (_, _, engine) = fixture();
    let h = new_widget(&engine, "buggy");
    let err = engine
        .invoke(
            &CallTarget::Instance(h),
            "meltdown",
            vec![],
            &[],
            ValueTag::Void,
            false,
        )
        .unwrap_err();
    assert_eq!(err, BridgeError::TargetFailure("implementation bug".into()));
}

#[test]
fn test_resolution_failure() {
    let (_, _, engine) = fixture();
    let h = new_widget(&engine, "plain");
    let err = engine
        .invoke(
            &CallTarget::Instance(h),
            "noSuchMethod",
            vec![],
            &[],
            ValueTag::Void,
            false,
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::Resolution(_)));

    let err = engine.construct("Gadget", vec![], &[]).unwrap_err();
    assert!(matches!(err, BridgeError::Resolution(_)));
}

#[test]
fn test_object_result_is_retained() {
    let rt = Arc::new(MemoryRuntime::new());
    rt.define_constructor("Factory", &[], Arc::new(|_| Ok(Fields::new())));
    rt.define_constructor("Widget", &[], Arc::new(|_| Ok(Fields::new())));

    // A method handing back another object: the runtime constructs it on the
    // fly and the engine must pin it as a fresh exposure.
    let inner_rt = rt.clone();
    rt.define_method(
        "Factory",
        "make",
        &[],
        Arc::new(move |_, _| {
            let h = inner_rt.construct("Widget", &[], &[])?;
            Ok(HostValue::Object(h))
        }),
    );

    let refs: Arc<ReferenceTable> = Arc::new(ReferenceTable::new(rt.clone()));
    let engine = InvocationEngine::new(rt.clone(), refs.clone());

    let factory = engine.construct("Factory", vec![], &[]).unwrap();
    let out = engine
        .invoke(
            &CallTarget::Instance(factory),
            "make",
            vec![],
            &[],
            ValueTag::Object,
            false,
        )
        .unwrap();
    let made = out.as_object().unwrap();
    assert!(refs.is_live(made));
    assert_eq!(rt.pin_count(made), 1);
}

#[test]
fn test_bad_argument_fails_before_the_call() {
    let (_, _, engine) = fixture();
    let h = new_widget(&engine, "intact");

    // Unpaired surrogate: transcoding fails, the call never reaches the
    // target runtime.
    let mut bad = ScriptString::with_capacity(1);
    bad.units_mut()[0] = 0xD800;

    let err = engine
        .invoke(
            &CallTarget::Instance(h),
            "getName",
            vec![ScriptValue::Utf16(bad)],
            &[ValueTag::String],
            ValueTag::Void,
            false,
        )
        .unwrap_err();
    assert_eq!(err, BridgeError::Marshal(MarshalError::BadUtf16));
}
