// Field Access Tests for iocbridge
// These tests verify get/put round trips through the bridge

use iocbridge::error::Transfer;
use iocbridge::host::MemoryHost;
use iocbridge::wire::{self, DbrValue, WireType, MAX_STRING_SIZE};
use iocbridge::{Bridge, BridgeOptions, Error};
use std::sync::Arc;

fn setup() -> Bridge {
    let host = MemoryHost::builder()
        .standard_record_types()
        .record("ao1", "ao")
        .record("li1", "longin")
        .record("so1", "stringout")
        .record("bo1", "bo")
        .record("wf1", "waveform")
        .record("ls1", "lsi")
        .build()
        .unwrap();
    Bridge::new(Arc::new(host), BridgeOptions::new().writer("test", "localhost")).unwrap()
}

/// Test put then get with the field's native wire type
#[test]
fn test_native_round_trips() {
    let bridge = setup();
    let cases = [
        ("ao1.VAL", WireType::Double, DbrValue::Float(-12.625)),
        ("ao1.PREC", WireType::Short, DbrValue::Int(-3)),
        ("li1.VAL", WireType::Long, DbrValue::Int(123_456_789)),
        ("so1.VAL", WireType::String, DbrValue::Str("hello world".into())),
        ("bo1.VAL", WireType::Enum, DbrValue::Int(1)),
    ];

    for (name, wire, value) in cases {
        let buf = wire::encode(wire, &[value]).unwrap();
        bridge.put_field(name, wire, &buf, 1).unwrap();

        let mut out = vec![0u8; buf.len()];
        let n = bridge.get_field(name, wire, &mut out, 1).unwrap();
        assert_eq!(n, 1, "{}", name);
        assert_eq!(out, buf, "{} did not round trip", name);
    }
}

/// Test array round trip with a native float buffer
#[test]
fn test_array_round_trip() {
    let bridge = setup();
    let values: Vec<DbrValue> = [0.5f32, -1.25, 3.0, 1e-3].iter().map(|v| DbrValue::Float(f64::from(*v))).collect();
    let buf = wire::encode(WireType::Float, &values).unwrap();
    bridge.put_field("wf1.VAL", WireType::Float, &buf, 4).unwrap();

    let mut out = vec![0u8; buf.len()];
    assert_eq!(bridge.get_field("wf1.VAL", WireType::Float, &mut out, 4).unwrap(), 4);
    assert_eq!(out, buf);
}

/// Test that reads are clipped to the field's element count
#[test]
fn test_get_more_than_capacity() {
    let bridge = setup();
    let mut out = vec![0u8; WireType::Double.buffer_len(10)];
    let n = bridge.get_field("wf1.VAL", WireType::Double, &mut out, 10).unwrap();
    assert_eq!(n, 4);
}

/// Test a char array field
#[test]
fn test_char_array() {
    let bridge = setup();
    let text: Vec<DbrValue> = "abc".bytes().map(|b| DbrValue::Int(i64::from(b))).collect();
    bridge.put_values("ls1.VAL", &text, Some(WireType::Char)).unwrap();
    let values = bridge.get_values("ls1.VAL", WireType::Char, 3).unwrap();
    assert_eq!(values, text);
}

/// Test type conversion through a different wire type
#[test]
fn test_conversion_between_types() {
    let bridge = setup();
    bridge.put_values("li1.VAL", &[DbrValue::Str("42".into())], None).unwrap();
    assert_eq!(bridge.get_values("li1.VAL", WireType::Double, 1).unwrap(), vec![DbrValue::Float(42.0)]);

    let mut out = vec![0u8; MAX_STRING_SIZE];
    bridge.get_field("li1.VAL", WireType::String, &mut out, 1).unwrap();
    assert_eq!(wire::c_string(&out), "42");
}

/// Test long strings are truncated to the slot size
#[test]
fn test_string_truncation() {
    let bridge = setup();
    let long = "x".repeat(100);
    bridge.put_values("so1.VAL", &[DbrValue::Str(long)], None).unwrap();
    let values = bridge.get_values("so1.VAL", WireType::String, 1).unwrap();
    assert_eq!(values, vec![DbrValue::Str("x".repeat(MAX_STRING_SIZE - 1))]);
}

/// Test error reporting
#[test]
fn test_errors() {
    let bridge = setup();
    let mut out = vec![0u8; 8];

    assert!(matches!(
        bridge.get_field("nobody.VAL", WireType::Double, &mut out, 1),
        Err(Error::UnknownField(name)) if name == "nobody.VAL"
    ));
    assert!(matches!(
        bridge.get_field("ao1.DPVT", WireType::Double, &mut out, 1),
        Err(Error::TransferFailed { op: Transfer::Get, .. })
    ));
    assert!(matches!(
        bridge.put_field("ao1.VAL", WireType::Double, &out[..4], 1),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        bridge.put_values("ao1.VAL", &[], None),
        Err(Error::InvalidArgument(_))
    ));
}
