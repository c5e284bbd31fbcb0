// Script Tests for iocbridge
// These tests run Lua scripts against the in-process host

use iocbridge::audit::AuditBuffer;
use iocbridge::host::MemoryHost;
use iocbridge::script::LuaRuntime;
use iocbridge::wire::{DbrValue, WireType};
use iocbridge::{AuditLogger, Bridge, BridgeOptions, Error};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn setup() -> (Arc<Bridge>, LuaRuntime) {
    let host = MemoryHost::builder()
        .base_path("/opt/host/base")
        .standard_record_types()
        .record("myrec", "ao")
        .record("status", "stringin")
        .record("wave", "waveform")
        .build()
        .unwrap();
    let bridge = Arc::new(
        Bridge::new(Arc::new(host), BridgeOptions::new().writer("alice", "workstation")).unwrap(),
    );
    let runtime = LuaRuntime::with_timeout(Arc::clone(&bridge), Some(Duration::from_secs(5)));
    (bridge, runtime)
}

/// Test the end-to-end scenario driven from Lua
#[test]
fn test_script_end_to_end() {
    let (bridge, runtime) = setup();
    let buffer = AuditBuffer::new();
    let mut acf = NamedTempFile::new().unwrap();
    writeln!(acf, "ASG(DEFAULT) {{ RULE(1, WRITE, TRAPWRITE) }}").unwrap();
    bridge
        .install_audit_logging_with(acf.path(), AuditLogger::with_sink(buffer.clone()))
        .unwrap();

    let script = format!(
        r#"
        ioc.install_audit_logging("{}")
        local fields = ioc.lookup_fields("ao", {{"VAL", "PREC"}})
        assert(fields.VAL and fields.PREC)
        ioc.put_field("myrec.VAL", ioc.DBR_DOUBLE, 3.14159265358979)
        return ioc.get_field("myrec.VAL", ioc.DBR_DOUBLE)
        "#,
        acf.path().display()
    );
    let result = runtime.execute_with_result(&script).unwrap();
    assert_eq!(result, Some("3.14159265358979".to_string()));
    assert_eq!(buffer.contents(), "alice@workstation myrec.VAL 0 -> 3.14159265358979\n");
}

/// Test metadata functions
#[test]
fn test_script_metadata() {
    let (_bridge, runtime) = setup();
    let result = runtime
        .execute_with_result(r#"
            local types = ioc.dbf_types()
            local offsets = ioc.field_offsets("ao")
            assert(offsets.VAL.type_name == "DBF_DOUBLE")
            return ioc.base_path() .. " " .. types.DBF_STRING .. " " .. types.DBF_NOACCESS
        "#)
        .unwrap();
    assert_eq!(result, Some("/opt/host/base 0 17".to_string()));
}

/// Test string fields and wire inference
#[test]
fn test_script_strings() {
    let (bridge, runtime) = setup();
    runtime
        .execute(r#"ioc.put_field("status", nil, "running")"#)
        .unwrap();
    assert_eq!(
        bridge.get_values("status.VAL", WireType::String, 1).unwrap(),
        vec![DbrValue::Str("running".into())]
    );
}

/// Test bad arguments surface as script errors
#[test]
fn test_script_errors() {
    let (_bridge, runtime) = setup();
    assert!(matches!(
        runtime.execute(r#"ioc.get_field("myrec.VAL", 42)"#),
        Err(Error::Script(_))
    ));
    assert!(matches!(
        runtime.execute(r#"ioc.put_field("myrec.VAL", nil, {})"#),
        Err(Error::Script(_))
    ));
    assert!(matches!(
        runtime.execute(r#"ioc.signal_completion(7, "myrec", ioc.create_completion_token())"#),
        Err(Error::Script(_))
    ));
    assert!(matches!(
        runtime.execute(r#"ioc.put_field("myrec.VAL", nil, print)"#),
        Err(Error::Script(_))
    ));
}

/// Test the execution lock is released once a script finishes
#[test]
fn test_lock_released_after_script() {
    let (bridge, runtime) = setup();
    runtime.execute("local x = 1").unwrap();
    assert!(!bridge.execution_lock().is_locked());
    let held = runtime.execute_with_result("return 1").unwrap();
    assert_eq!(held, Some("1".to_string()));
}

/// Test the runtime picks its timeout up from the options
#[test]
fn test_timeout_from_options() {
    let host = MemoryHost::builder().build().unwrap();
    let bridge = Bridge::new(Arc::new(host), BridgeOptions::new().script_timeout_ms(50)).unwrap();
    let runtime = LuaRuntime::new(Arc::new(bridge));
    assert_eq!(runtime.timeout(), Some(Duration::from_millis(50)));
    assert!(runtime.execute("while true do end").is_err());
}
