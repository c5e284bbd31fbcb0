//! Named-field transfers.
//!
//! Every transfer resolves the field name afresh and then calls the host
//! with the execution lock released. The host takes the record lock inside
//! the transfer; holding the execution lock at that point would invert the
//! lock order used by host worker threads.

use crate::error::{Error, Result, Transfer};
use crate::host::DatabaseHost;
use crate::lock::ExecutionLock;
use crate::types::{FieldAddress, WriterIdentity};
use crate::wire::{self, DbrValue, WireType};

/// Get and put of named fields through a host.
pub struct FieldAccessor<'a> {
    host: &'a dyn DatabaseHost,
    lock: &'a ExecutionLock,
    writer: &'a WriterIdentity,
}

impl<'a> FieldAccessor<'a> {
    /// Creates an accessor. Puts are attributed to `writer`.
    pub fn new(host: &'a dyn DatabaseHost, lock: &'a ExecutionLock, writer: &'a WriterIdentity) -> Self {
        Self { host, lock, writer }
    }

    fn check_buffer(wire: WireType, len: usize, count: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::invalid_argument("Element count must be > 0"));
        }
        let needed = wire.buffer_len(count);
        if len < needed {
            return Err(Error::invalid_argument(format!(
                "Buffer of {} bytes is too small for {} x {} ({} bytes)",
                len, count, wire, needed
            )));
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<FieldAddress> {
        self.host.name_to_addr(name).map_err(|status| {
            log::debug!("Cannot resolve {}: {}", name, status);
            Error::UnknownField(name.to_string())
        })
    }

    /// Reads up to `count` elements of `name` into `buf` encoded as `wire`.
    ///
    /// Returns the number of elements the host transferred, which is less
    /// than `count` when the field holds fewer elements.
    pub fn get(&self, name: &str, wire: WireType, buf: &mut [u8], count: usize) -> Result<usize> {
        Self::check_buffer(wire, buf.len(), count)?;
        let addr = self.resolve(name)?;
        self.lock
            .allow_threads(|| self.host.get_field(&addr, wire, buf, count))
            .map_err(|status| Error::transfer_failed(Transfer::Get, name, status.code))
    }

    /// Writes `count` elements encoded as `wire` from `buf` into `name`.
    pub fn put(&self, name: &str, wire: WireType, buf: &[u8], count: usize) -> Result<()> {
        Self::check_buffer(wire, buf.len(), count)?;
        let addr = self.resolve(name)?;
        self.lock
            .allow_threads(|| self.host.put_field(&addr, wire, buf, count, self.writer))
            .map_err(|status| Error::transfer_failed(Transfer::Put, name, status.code))
    }

    /// Reads and decodes up to `count` elements.
    pub fn get_values(&self, name: &str, wire: WireType, count: usize) -> Result<Vec<DbrValue>> {
        let mut buf = vec![0u8; wire.buffer_len(count)];
        let read = self.get(name, wire, &mut buf, count)?;
        wire::decode(wire, &buf, read)
    }

    /// Encodes and writes `values`, inferring the wire type when `wire` is
    /// `None`.
    pub fn put_values(&self, name: &str, values: &[DbrValue], wire: Option<WireType>) -> Result<()> {
        if values.is_empty() {
            return Err(Error::invalid_argument(format!("No values to write to {}", name)));
        }
        let wire = wire.unwrap_or_else(|| wire::infer_wire_type(values));
        let buf = wire::encode(wire, values)?;
        self.put(name, wire, &buf, values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    fn host() -> MemoryHost {
        MemoryHost::builder()
            .standard_record_types()
            .record("myrec", "ao")
            .record("wave", "waveform")
            .record("label", "stringout")
            .build()
            .unwrap()
    }

    #[test]
    fn test_round_trip_native_type() {
        let host = host();
        let lock = ExecutionLock::new();
        let writer = WriterIdentity::new("test", "localhost");
        let accessor = FieldAccessor::new(&host, &lock, &writer);

        let buf = 2.75f64.to_ne_bytes();
        accessor.put("myrec.VAL", WireType::Double, &buf, 1).unwrap();
        let mut out = [0u8; 8];
        assert_eq!(accessor.get("myrec.VAL", WireType::Double, &mut out, 1).unwrap(), 1);
        assert_eq!(out, buf);
    }

    #[test]
    fn test_unknown_field() {
        let host = host();
        let lock = ExecutionLock::new();
        let writer = WriterIdentity::default();
        let accessor = FieldAccessor::new(&host, &lock, &writer);
        let mut out = [0u8; 8];
        let err = accessor.get("myrec.NOPE", WireType::Double, &mut out, 1).unwrap_err();
        assert!(matches!(err, Error::UnknownField(name) if name == "myrec.NOPE"));
    }

    #[test]
    fn test_bad_buffers() {
        let host = host();
        let lock = ExecutionLock::new();
        let writer = WriterIdentity::default();
        let accessor = FieldAccessor::new(&host, &lock, &writer);
        let mut out = [0u8; 4];
        assert!(matches!(
            accessor.get("myrec.VAL", WireType::Double, &mut out, 1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            accessor.get("myrec.VAL", WireType::Long, &mut out, 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_transfer_failure_names_field() {
        let host = host();
        let lock = ExecutionLock::new();
        let writer = WriterIdentity::default();
        let accessor = FieldAccessor::new(&host, &lock, &writer);
        let err = accessor
            .put_values("myrec.VAL", &[DbrValue::Str("not a number".into())], None)
            .unwrap_err();
        match err {
            Error::TransferFailed { op, field, .. } => {
                assert_eq!(op, Transfer::Put);
                assert_eq!(field, "myrec.VAL");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_typed_values() {
        let host = host();
        let lock = ExecutionLock::new();
        let writer = WriterIdentity::default();
        let accessor = FieldAccessor::new(&host, &lock, &writer);

        accessor
            .put_values("wave", &[DbrValue::Float(1.0), DbrValue::Float(2.0)], None)
            .unwrap();
        let values = accessor.get_values("wave", WireType::Double, 4).unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(values[1], DbrValue::Float(2.0));

        accessor.put_values("label.VAL", &[DbrValue::Str("ready".into())], None).unwrap();
        let values = accessor.get_values("label.VAL", WireType::String, 1).unwrap();
        assert_eq!(values, vec![DbrValue::Str("ready".into())]);
    }

    #[test]
    fn test_lock_released_during_transfer() {
        let host = host();
        let lock = ExecutionLock::new();
        let writer = WriterIdentity::default();
        let accessor = FieldAccessor::new(&host, &lock, &writer);

        let _guard = lock.acquire();
        accessor.put_values("myrec.VAL", &[DbrValue::Int(4)], None).unwrap();
        assert!(lock.is_held());
    }
}
