// Completion Token Tests for iocbridge
// These tests verify asynchronous completion signalling

use iocbridge::host::MemoryHost;
use iocbridge::wire::{DbrValue, WireType};
use iocbridge::{Bridge, BridgeOptions, Error, Priority};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn setup() -> (Arc<MemoryHost>, Arc<Bridge>) {
    let host = Arc::new(
        MemoryHost::builder()
            .standard_record_types()
            .record("dev1", "ai")
            .record("dev2", "longin")
            .build()
            .unwrap(),
    );
    let bridge = Bridge::new(host.clone(), BridgeOptions::new().writer("test", "localhost")).unwrap();
    (host, Arc::new(bridge))
}

/// Test that a completion runs on the worker of the requested priority and
/// clears the processing-active flag
#[test]
fn test_signal_runs_on_priority_worker() {
    let (host, bridge) = setup();
    let (tx, rx) = mpsc::channel();
    host.set_completion_hook(move |record| {
        let thread_name = thread::current().name().unwrap_or_default().to_string();
        tx.send((record.name().to_string(), thread_name)).unwrap();
    });

    bridge.put_values("dev1.PACT", &[DbrValue::Int(1)], None).unwrap();
    let token = bridge.create_completion_token();
    bridge.signal_completion(Priority::High, "dev1", token).unwrap();

    let (name, thread_name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name, "dev1");
    assert_eq!(thread_name, "cbHigh");
    assert_eq!(
        bridge.get_values("dev1.PACT", WireType::Short, 1).unwrap(),
        vec![DbrValue::Int(0)]
    );
    assert_eq!(host.completions("dev1"), Some(1));
}

/// Test asynchronous device work completing from another thread
#[test]
fn test_signal_from_worker_thread() {
    let (host, bridge) = setup();
    let (tx, rx) = mpsc::channel();
    host.set_completion_hook(move |record| {
        tx.send(record.name().to_string()).unwrap();
    });

    let token = bridge.create_completion_token();
    let device = {
        let bridge = Arc::clone(&bridge);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            bridge.put_values("dev2.VAL", &[DbrValue::Int(99)], None).unwrap();
            bridge.signal_completion(Priority::Low, "dev2", token).unwrap();
        })
    };

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "dev2");
    device.join().unwrap();
    assert_eq!(
        bridge.get_values("dev2.VAL", WireType::Long, 1).unwrap(),
        vec![DbrValue::Int(99)]
    );
}

/// Test error cases leave the host untouched
#[test]
fn test_signal_errors() {
    let (host, bridge) = setup();

    let token = bridge.create_completion_token();
    assert!(matches!(
        bridge.signal_completion(Priority::Medium, "missing", token),
        Err(Error::UnknownRecord(name)) if name == "missing"
    ));

    let (_other_host, other) = setup();
    let foreign = other.create_completion_token();
    assert!(matches!(
        bridge.signal_completion(Priority::Medium, "dev1", foreign),
        Err(Error::InvalidToken)
    ));

    thread::sleep(Duration::from_millis(20));
    assert_eq!(host.completions("dev1"), Some(0));
}

/// Test that dropping an unsignalled token is harmless
#[test]
fn test_drop_unsignalled_token() {
    let (host, bridge) = setup();
    let token = bridge.create_completion_token();
    let id = token.id();
    drop(token);
    assert_ne!(bridge.create_completion_token().id(), id);
    assert_eq!(host.completions("dev1"), Some(0));
}
