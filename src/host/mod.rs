//! Interface the bridge consumes from the database host.
//!
//! The host owns record storage, per-record locking, the write-trap
//! mechanism and the callback scheduler. The bridge reaches all of it through
//! [`DatabaseHost`]. [`MemoryHost`] is an in-process implementation used to
//! embed the bridge without an external database.
//!
//! # Locking contract
//!
//! `get_field`, `put_field` and `field_bytes` take the record lock of the
//! addressed record. Record locks must be recursive: write-trap listeners
//! run with the lock held and read the field being written.

pub mod access;
pub mod memory;
mod scheduler;

pub use access::{AccessConfig, AccessError};
pub use memory::{HostVersion, MemoryHost, MemoryHostBuilder, RecordTypeBuilder};
pub use scheduler::CompletionHook;

use crate::error::{Error, Result};
use crate::types::{FieldAddress, FieldType, RecordHandle, WriterIdentity};
use crate::wire::WireType;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Status reported by a failing host primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostStatus {
    /// Host status code, never zero.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
}

impl HostStatus {
    /// Creates a status.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.message, self.code)
    }
}

/// One field as reported by the static catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogField {
    /// Field name.
    pub name: String,
    /// Byte offset within the record.
    pub offset: u32,
    /// Byte size of the field.
    pub size: u32,
    /// Host numeric type code.
    pub type_code: i32,
}

/// Scoped iteration over the host's static catalog.
///
/// Dropping the cursor releases whatever the host allocated for it.
pub trait CatalogCursor {
    /// Positions the cursor on a record type.
    fn find_record_type(&mut self, record_type: &str) -> std::result::Result<(), HostStatus>;

    /// Returns the next field of the current record type.
    fn next_field(&mut self) -> Option<CatalogField>;
}

/// Scheduler priority for completion processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Lowest priority queue.
    Low = 0,
    /// Medium priority queue.
    #[default]
    Medium = 1,
    /// Highest priority queue.
    High = 2,
}

impl Priority {
    /// Every priority, lowest first.
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    /// Converts a numeric priority.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Priority::Low),
            1 => Ok(Priority::Medium),
            2 => Ok(Priority::High),
            _ => Err(Error::invalid_argument(format!("Invalid priority: {}", code))),
        }
    }

    /// Queue index.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

static NEXT_DESCRIPTOR: AtomicU64 = AtomicU64::new(1);

/// Native descriptor for one asynchronous completion request.
///
/// Filled in by the bridge when the completion is signalled and owned by
/// the host scheduler from then on.
#[derive(Debug)]
pub struct CallbackDescriptor {
    id: u64,
    priority: Priority,
    record: Option<RecordHandle>,
}

impl CallbackDescriptor {
    /// Allocates a fresh, unarmed descriptor.
    pub fn new() -> Self {
        Self {
            id: NEXT_DESCRIPTOR.fetch_add(1, Ordering::Relaxed),
            priority: Priority::default(),
            record: None,
        }
    }

    /// Arms the descriptor for processing `record` at `priority`.
    pub fn arm(&mut self, priority: Priority, record: RecordHandle) {
        self.priority = priority;
        self.record = Some(record);
    }

    /// Unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Requested priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Target record, once armed.
    pub fn record(&self) -> Option<&RecordHandle> {
        self.record.as_ref()
    }
}

impl Default for CallbackDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Phase of a trapped write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapPhase {
    /// Called before the new value is stored.
    Before,
    /// Called after the new value is stored.
    After,
}

/// Per-listener context for one trapped write.
///
/// The same event is passed to the listener's `Before` and `After` calls, so
/// a listener can park state in the attachment slot between the two.
pub struct WriteEvent<'a> {
    host: &'a dyn DatabaseHost,
    writer: &'a WriterIdentity,
    address: &'a FieldAddress,
    attachment: Option<Box<dyn Any + Send>>,
}

impl<'a> WriteEvent<'a> {
    /// Creates an event. Called by host implementations.
    pub fn new(host: &'a dyn DatabaseHost, writer: &'a WriterIdentity, address: &'a FieldAddress) -> Self {
        Self { host, writer, address, attachment: None }
    }

    /// The host performing the write.
    pub fn host(&self) -> &'a dyn DatabaseHost {
        self.host
    }

    /// Who is writing.
    pub fn writer(&self) -> &'a WriterIdentity {
        self.writer
    }

    /// Field being written.
    pub fn address(&self) -> &'a FieldAddress {
        self.address
    }

    /// Stores a value for the matching `After` call, replacing any previous one.
    pub fn attach(&mut self, value: Box<dyn Any + Send>) {
        self.attachment = Some(value);
    }

    /// Removes the stored value.
    pub fn take_attachment(&mut self) -> Option<Box<dyn Any + Send>> {
        self.attachment.take()
    }
}

/// Observer of trapped writes.
pub trait WriteTrapListener: Send + Sync {
    /// Called once before and once after each trapped write.
    fn on_write(&self, event: &mut WriteEvent<'_>, phase: TrapPhase);
}

/// The database host as seen by the bridge.
pub trait DatabaseHost: Send + Sync {
    /// Root path of the host distribution.
    fn base_path(&self) -> &str;

    /// The host's numeric code for every field type.
    fn field_type_codes(&self) -> Vec<(FieldType, i32)>;

    /// Opens a catalog cursor.
    fn open_catalog(&self) -> Box<dyn CatalogCursor + '_>;

    /// Resolves `record.field` to an address.
    fn name_to_addr(&self, name: &str) -> std::result::Result<FieldAddress, HostStatus>;

    /// Reads up to `count` elements into `buf` in the requested encoding and
    /// returns the number of elements read.
    fn get_field(
        &self,
        addr: &FieldAddress,
        wire: WireType,
        buf: &mut [u8],
        count: usize,
    ) -> std::result::Result<usize, HostStatus>;

    /// Writes `count` elements from `buf`, running write-trap listeners when
    /// access security requests it.
    fn put_field(
        &self,
        addr: &FieldAddress,
        wire: WireType,
        buf: &[u8],
        count: usize,
        writer: &WriterIdentity,
    ) -> std::result::Result<(), HostStatus>;

    /// Raw native bytes of the whole field.
    fn field_bytes(&self, addr: &FieldAddress) -> std::result::Result<Vec<u8>, HostStatus>;

    /// Loads an access security configuration file. Called with the
    /// execution lock held; must not take a record lock.
    fn load_access_security(&self, path: &Path) -> std::result::Result<(), HostStatus>;

    /// Adds a write-trap listener.
    fn register_write_listener(&self, listener: Arc<dyn WriteTrapListener>);

    /// Resolves a record instance by name.
    fn record_handle(&self, name: &str) -> Option<RecordHandle>;

    /// Queues completion processing for the descriptor's record. The host
    /// owns the descriptor from here on.
    fn request_callback(&self, descriptor: CallbackDescriptor) -> std::result::Result<(), HostStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_codes() {
        assert_eq!(Priority::from_code(0).unwrap(), Priority::Low);
        assert_eq!(Priority::from_code(2).unwrap(), Priority::High);
        assert!(Priority::from_code(3).is_err());
        assert_eq!(Priority::High.index(), 2);
    }

    #[test]
    fn test_descriptor_ids_are_unique() {
        let a = CallbackDescriptor::new();
        let b = CallbackDescriptor::new();
        assert_ne!(a.id(), b.id());
        assert!(a.record().is_none());
    }

    #[test]
    fn test_descriptor_arm() {
        let mut d = CallbackDescriptor::new();
        d.arm(Priority::High, RecordHandle::new("myrec", 3));
        assert_eq!(d.priority(), Priority::High);
        assert_eq!(d.record().map(|r| r.name()), Some("myrec"));
    }
}
