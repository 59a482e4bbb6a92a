//! Test suite for the script-host seam and the channel host

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::channel::ChannelHost;
use super::*;
use crate::value::ObjectHandle;

#[test]
fn test_post_and_pump_runs_in_order() {
    let host = ChannelHost::new();
    let port = host.open_port();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5 {
        let seen = seen.clone();
        host.post_work(port, Box::new(move || seen.lock().unwrap().push(i)))
            .unwrap();
    }
    assert_eq!(host.pump(port), 5);
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_post_to_closed_port_fails() {
    let host = ChannelHost::new();
    let port = host.open_port();
    host.close_port(port);
    let err = host.post_work(port, Box::new(|| {})).unwrap_err();
    assert_eq!(err, BridgeError::PortClosed);
}

#[test]
fn test_pump_claims_port_ownership() {
    let host = Arc::new(ChannelHost::new());
    let port = host.open_port();
    assert_eq!(host.port_thread(port), Some(std::thread::current().id()));

    let moved = host.clone();
    let other = std::thread::spawn(move || {
        moved.pump(port);
        std::thread::current().id()
    })
    .join()
    .unwrap();
    assert_eq!(host.port_thread(port), Some(other));
}

#[test]
fn test_run_loop_ends_when_port_closes() {
    let host = Arc::new(ChannelHost::new());
    let port = host.open_port();
    let ran = Arc::new(AtomicUsize::new(0));

    let pump_host = host.clone();
    let pump = std::thread::spawn(move || pump_host.run(port));

    for _ in 0..3 {
        let ran = ran.clone();
        host.post_work(
            port,
            Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    }
    // Give the loop its queue, then close the port to end it.
    while ran.load(Ordering::SeqCst) < 3 {
        std::thread::yield_now();
    }
    host.close_port(port);
    pump.join().unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 3);
}

#[test]
fn test_collect_fires_finalizer_exactly_once() {
    let host = ChannelHost::new();
    let value = ScriptRef(7);
    let handle = ObjectHandle::from_raw(42);
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = fired.clone();
    host.bind_finalizer(
        value,
        handle,
        Box::new(move |h| {
            assert_eq!(h, handle);
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert_eq!(host.pending_finalizers(), 1);

    assert!(host.collect(value));
    assert!(!host.collect(value));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(host.pending_finalizers(), 0);
}

#[test]
fn test_host_is_shared_across_threads() {
    // The trait object form must be usable from any native thread, finalizer
    // table included: bind on a foreign thread, collect on this one.
    let host = Arc::new(ChannelHost::new());
    let shared: Arc<dyn ScriptHost> = host.clone();
    let handle = ObjectHandle::from_raw(9);
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = fired.clone();
    std::thread::spawn(move || {
        shared.bind_finalizer(
            ScriptRef(1),
            handle,
            Box::new(move |h| {
                assert_eq!(h, handle);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
    })
    .join()
    .unwrap();

    assert!(host.collect(ScriptRef(1)));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_work_raw_round_trip() {
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    let raw = work_into_raw(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let work = unsafe { work_from_raw(raw) };
    work();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}
