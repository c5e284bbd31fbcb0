//! In-process database host.
//!
//! Records are fixed-layout byte buffers described by record types built
//! with [`RecordTypeBuilder`]. Each record has its own recursive lock. Writes
//! run the registered write-trap listeners when the loaded access security
//! configuration traps writes by that writer, and completion requests are processed by one
//! worker thread per [`Priority`](super::Priority).
//!
//! # Example
//!
//! ```rust
//! use iocbridge::host::{DatabaseHost, MemoryHost};
//!
//! # fn main() -> Result<(), iocbridge::Error> {
//! let host = MemoryHost::builder()
//!     .standard_record_types()
//!     .record("myrec", "ao")
//!     .build()?;
//! let addr = host.name_to_addr("myrec.VAL").expect("field exists");
//! assert_eq!(addr.no_elements(), 1);
//! # Ok(())
//! # }
//! ```

use super::access::{AccessConfig, DEFAULT_GROUP};
use super::scheduler::{CallbackQueues, Job, SharedHook};
use super::{
    CallbackDescriptor, CatalogCursor, CatalogField, DatabaseHost, HostStatus, TrapPhase,
    WriteEvent, WriteTrapListener,
};
use crate::error::{Error, Result};
use crate::format::format_significant;
use crate::types::{
    split_field_name, FieldAddress, FieldType, HostSlot, RecordHandle, WriterIdentity,
};
use crate::wire::{self, c_string, put_c_string, DbrValue, WireType, MAX_STRING_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use parking_lot::{ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

const M_DB_ACCESS: i64 = 501 << 16;
const M_AS: i64 = 513 << 16;

/// Record or field not found.
pub const S_DB_NOT_FOUND: i64 = M_DB_ACCESS | 1;
/// Wire buffer could not be decoded.
pub const S_DB_BAD_DBR_TYPE: i64 = M_DB_ACCESS | 3;
/// Field cannot be accessed.
pub const S_DB_BAD_FIELD: i64 = M_DB_ACCESS | 5;
/// Bad element count or buffer size.
pub const S_DB_ERR_ARG: i64 = M_DB_ACCESS | 11;
/// Value cannot be converted to the field type.
pub const S_DB_BAD_VALUE: i64 = M_DB_ACCESS | 13;
/// Access security file could not be loaded.
pub const S_AS_BAD_CONFIG: i64 = M_AS | 1;

/// Base path reported when none is configured.
pub const DEFAULT_BASE_PATH: &str = "/opt/epics/base";

/// Significant digits of the host's generic float-to-string conversion.
const GENERIC_FLOAT_DIGITS: usize = 6;

/// Field type numbering scheme, which differs between host releases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostVersion {
    /// Sixteen consecutive codes, `DBF_STRING = 0` to `DBF_NOACCESS = 15`.
    Legacy,
    /// Codes 7 and 8 taken by 64-bit integers, shifting every later type.
    #[default]
    Modern,
}

impl HostVersion {
    /// Numeric code of a field type.
    pub fn code(&self, field_type: FieldType) -> i32 {
        let index = FieldType::ALL.iter().position(|t| *t == field_type).unwrap_or(0) as i32;
        match self {
            HostVersion::Legacy => index,
            HostVersion::Modern if index >= 7 => index + 2,
            HostVersion::Modern => index,
        }
    }

    /// Every field type with its code.
    pub fn type_codes(&self) -> Vec<(FieldType, i32)> {
        FieldType::ALL.iter().map(|t| (*t, self.code(*t))).collect()
    }
}

fn element_size(field_type: FieldType) -> u32 {
    match field_type {
        FieldType::String | FieldType::InLink | FieldType::OutLink | FieldType::FwdLink => {
            MAX_STRING_SIZE as u32
        }
        FieldType::Char | FieldType::UChar => 1,
        FieldType::Short | FieldType::UShort | FieldType::Enum | FieldType::Menu | FieldType::Device => 2,
        FieldType::Long | FieldType::ULong | FieldType::Float => 4,
        FieldType::Double | FieldType::NoAccess => 8,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FieldDef {
    name: String,
    field_type: FieldType,
    offset: u32,
    element_size: u32,
    count: u32,
}

impl FieldDef {
    fn size(&self) -> u32 {
        self.element_size * self.count
    }

    fn range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.size() as usize
    }
}

#[derive(Debug)]
pub(crate) struct RecordTypeDef {
    name: String,
    fields: Vec<FieldDef>,
    size: u32,
}

impl RecordTypeDef {
    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Builder for a record type's field layout.
///
/// Fields are laid out in declaration order, each aligned to its element
/// size (at most 8 bytes).
#[derive(Debug, Clone)]
pub struct RecordTypeBuilder {
    name: String,
    fields: Vec<FieldDef>,
    size: u32,
}

impl RecordTypeBuilder {
    /// Starts an empty record type.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: Vec::new(), size: 0 }
    }

    /// Adds a scalar field.
    pub fn field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.array(name, field_type, 1)
    }

    /// Adds a fixed-length array field.
    pub fn array(mut self, name: impl Into<String>, field_type: FieldType, count: u32) -> Self {
        let element_size = element_size(field_type);
        let align = element_size.clamp(1, 8);
        let offset = self.size.div_ceil(align) * align;
        self.fields.push(FieldDef {
            name: name.into(),
            field_type,
            offset,
            element_size,
            count: count.max(1),
        });
        self.size = offset + element_size * count.max(1);
        self
    }

    fn build(self) -> RecordTypeDef {
        RecordTypeDef { name: self.name, fields: self.fields, size: self.size }
    }
}

fn common_fields(name: &str) -> RecordTypeBuilder {
    RecordTypeBuilder::new(name)
        .field("NAME", FieldType::String)
        .field("DESC", FieldType::String)
        .field("SCAN", FieldType::Menu)
        .field("DTYP", FieldType::Device)
        .field("PACT", FieldType::UChar)
        .field("UDF", FieldType::UChar)
        .field("FLNK", FieldType::FwdLink)
        .field("TIME", FieldType::NoAccess)
        .field("DPVT", FieldType::NoAccess)
}

fn standard_types() -> Vec<RecordTypeBuilder> {
    vec![
        common_fields("ai")
            .field("INP", FieldType::InLink)
            .field("VAL", FieldType::Double)
            .field("RVAL", FieldType::Long)
            .field("PREC", FieldType::Short)
            .field("EGU", FieldType::String)
            .field("HOPR", FieldType::Double)
            .field("LOPR", FieldType::Double),
        common_fields("ao")
            .field("OUT", FieldType::OutLink)
            .field("VAL", FieldType::Double)
            .field("OVAL", FieldType::Double)
            .field("RVAL", FieldType::Long)
            .field("PREC", FieldType::Short)
            .field("EGU", FieldType::String)
            .field("HOPR", FieldType::Double)
            .field("LOPR", FieldType::Double)
            .field("OROC", FieldType::Double),
        common_fields("longin")
            .field("INP", FieldType::InLink)
            .field("VAL", FieldType::Long)
            .field("HOPR", FieldType::Long)
            .field("LOPR", FieldType::Long),
        common_fields("longout")
            .field("OUT", FieldType::OutLink)
            .field("VAL", FieldType::Long)
            .field("HOPR", FieldType::Long)
            .field("LOPR", FieldType::Long),
        common_fields("stringin")
            .field("INP", FieldType::InLink)
            .field("VAL", FieldType::String)
            .field("OVAL", FieldType::String),
        common_fields("stringout")
            .field("OUT", FieldType::OutLink)
            .field("VAL", FieldType::String)
            .field("OVAL", FieldType::String),
        common_fields("bo")
            .field("OUT", FieldType::OutLink)
            .field("VAL", FieldType::Enum)
            .field("ZNAM", FieldType::String)
            .field("ONAM", FieldType::String)
            .field("HIGH", FieldType::Double),
        common_fields("mbbo")
            .field("OUT", FieldType::OutLink)
            .field("VAL", FieldType::Enum)
            .field("RVAL", FieldType::ULong)
            .field("MASK", FieldType::ULong)
            .field("SHFT", FieldType::UShort),
        common_fields("lsi")
            .field("INP", FieldType::InLink)
            .array("VAL", FieldType::Char, 40)
            .field("SIZV", FieldType::UShort)
            .field("LEN", FieldType::ULong),
        common_fields("waveform")
            .field("INP", FieldType::InLink)
            .field("NELM", FieldType::ULong)
            .field("FTVL", FieldType::Menu)
            .array("VAL", FieldType::Float, 4),
    ]
}

pub(crate) struct Record {
    name: String,
    rtype: Arc<RecordTypeDef>,
    memory: ReentrantMutex<RefCell<Vec<u8>>>,
    completions: AtomicU64,
}

impl Record {
    fn new(name: &str, rtype: Arc<RecordTypeDef>) -> Self {
        let mut memory = vec![0u8; rtype.size as usize];
        if let Some(index) = rtype.field_index("NAME") {
            let field = &rtype.fields[index];
            let mut text = BytesMut::with_capacity(field.size() as usize);
            put_c_string(&mut text, name, field.size() as usize);
            memory[field.range()].copy_from_slice(&text);
        }
        Self {
            name: name.to_string(),
            rtype,
            memory: ReentrantMutex::new(RefCell::new(memory)),
            completions: AtomicU64::new(0),
        }
    }

    /// Finishes asynchronous processing: clears `PACT` and runs `then` with
    /// the record lock held.
    pub(crate) fn complete(&self, then: impl FnOnce()) {
        let guard = self.memory.lock();
        if let Some(index) = self.rtype.field_index("PACT") {
            let offset = self.rtype.fields[index].offset as usize;
            guard.borrow_mut()[offset] = 0;
        }
        self.completions.fetch_add(1, Ordering::SeqCst);
        then();
        drop(guard);
    }
}

fn read_element(field_type: FieldType, mut bytes: &[u8]) -> DbrValue {
    match field_type {
        FieldType::String | FieldType::InLink | FieldType::OutLink | FieldType::FwdLink => {
            DbrValue::Str(c_string(bytes))
        }
        FieldType::Char => DbrValue::Int(bytes.get_i8().into()),
        FieldType::UChar => DbrValue::Int(bytes.get_u8().into()),
        FieldType::Short => DbrValue::Int(bytes.get_i16_ne().into()),
        FieldType::UShort | FieldType::Enum | FieldType::Menu | FieldType::Device => {
            DbrValue::Int(bytes.get_u16_ne().into())
        }
        FieldType::Long => DbrValue::Int(bytes.get_i32_ne().into()),
        FieldType::ULong => DbrValue::Int(bytes.get_u32_ne().into()),
        FieldType::Float => DbrValue::Float(bytes.get_f32_ne().into()),
        FieldType::Double => DbrValue::Float(bytes.get_f64_ne()),
        FieldType::NoAccess => DbrValue::Int(0),
    }
}

fn write_element(field: &FieldDef, value: &DbrValue, buf: &mut BytesMut) -> std::result::Result<(), HostStatus> {
    let bad = |e: Error| HostStatus::new(S_DB_BAD_VALUE, e.to_string());
    match field.field_type {
        FieldType::String | FieldType::InLink | FieldType::OutLink | FieldType::FwdLink => {
            put_c_string(buf, &value.to_text(), field.element_size as usize)
        }
        FieldType::Char => buf.put_i8(value.to_i64().map_err(bad)? as i8),
        FieldType::UChar => buf.put_u8(value.to_i64().map_err(bad)? as u8),
        FieldType::Short => buf.put_i16_ne(value.to_i64().map_err(bad)? as i16),
        FieldType::UShort | FieldType::Enum | FieldType::Menu | FieldType::Device => {
            buf.put_u16_ne(value.to_i64().map_err(bad)? as u16)
        }
        FieldType::Long => buf.put_i32_ne(value.to_i64().map_err(bad)? as i32),
        FieldType::ULong => buf.put_u32_ne(value.to_i64().map_err(bad)? as u32),
        FieldType::Float => buf.put_f32_ne(value.to_f64().map_err(bad)? as f32),
        FieldType::Double => buf.put_f64_ne(value.to_f64().map_err(bad)?),
        FieldType::NoAccess => {
            return Err(HostStatus::new(S_DB_BAD_FIELD, format!("{} is not accessible", field.name)))
        }
    }
    Ok(())
}

/// Builder for a [`MemoryHost`].
#[derive(Debug, Default)]
pub struct MemoryHostBuilder {
    version: HostVersion,
    base_path: Option<String>,
    types: Vec<RecordTypeBuilder>,
    records: Vec<(String, String)>,
}

impl MemoryHostBuilder {
    /// Sets the field type numbering scheme.
    pub fn version(mut self, version: HostVersion) -> Self {
        self.version = version;
        self
    }

    /// Sets the reported base path.
    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Adds a record type.
    pub fn record_type(mut self, record_type: RecordTypeBuilder) -> Self {
        self.types.push(record_type);
        self
    }

    /// Adds the standard record types: `ai`, `ao`, `longin`, `longout`,
    /// `stringin`, `stringout`, `bo`, `mbbo`, `lsi` and `waveform`.
    pub fn standard_record_types(mut self) -> Self {
        self.types.extend(standard_types());
        self
    }

    /// Adds a record instance of an already declared type.
    pub fn record(mut self, name: impl Into<String>, record_type: impl Into<String>) -> Self {
        self.records.push((name.into(), record_type.into()));
        self
    }

    /// Creates the host and starts its callback threads.
    pub fn build(self) -> Result<MemoryHost> {
        let mut record_types = HashMap::new();
        for builder in self.types {
            let rtype = builder.build();
            if record_types.contains_key(&rtype.name) {
                return Err(Error::invalid_argument(format!("Duplicate record type: {}", rtype.name)));
            }
            record_types.insert(rtype.name.clone(), Arc::new(rtype));
        }

        let mut records = Vec::with_capacity(self.records.len());
        let mut record_index = HashMap::new();
        for (name, type_name) in self.records {
            let rtype = record_types
                .get(&type_name)
                .cloned()
                .ok_or_else(|| Error::invalid_argument(format!("Unknown record type {} for {}", type_name, name)))?;
            if record_index.contains_key(&name) {
                return Err(Error::invalid_argument(format!("Duplicate record: {}", name)));
            }
            record_index.insert(name.clone(), records.len());
            records.push(Arc::new(Record::new(&name, rtype)));
        }

        log::info!(
            "Memory host started with {} record types and {} records",
            record_types.len(),
            records.len()
        );

        let hook: SharedHook = Arc::new(RwLock::new(None));
        Ok(MemoryHost {
            version: self.version,
            base_path: self.base_path.unwrap_or_else(|| DEFAULT_BASE_PATH.to_string()),
            record_types,
            records,
            record_index,
            listeners: RwLock::new(Vec::new()),
            access: RwLock::new(None),
            open_cursors: AtomicUsize::new(0),
            queues: CallbackQueues::start(Arc::clone(&hook)),
            hook,
        })
    }
}

/// In-process database host.
pub struct MemoryHost {
    version: HostVersion,
    base_path: String,
    record_types: HashMap<String, Arc<RecordTypeDef>>,
    records: Vec<Arc<Record>>,
    record_index: HashMap<String, usize>,
    listeners: RwLock<Vec<Arc<dyn WriteTrapListener>>>,
    access: RwLock<Option<AccessConfig>>,
    open_cursors: AtomicUsize,
    hook: SharedHook,
    queues: CallbackQueues,
}

impl MemoryHost {
    /// Starts building a host.
    pub fn builder() -> MemoryHostBuilder {
        MemoryHostBuilder::default()
    }

    /// Field type numbering in use.
    pub fn version(&self) -> HostVersion {
        self.version
    }

    /// True if the loaded access security traps a write by `writer`.
    /// Every record belongs to the `DEFAULT` group.
    pub fn traps_write_by(&self, writer: &WriterIdentity) -> bool {
        self.access
            .read()
            .as_ref()
            .is_some_and(|config| config.traps_write_by(DEFAULT_GROUP, writer))
    }

    /// Number of catalog cursors currently open.
    pub fn open_catalog_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Number of completions processed for a record.
    pub fn completions(&self, name: &str) -> Option<u64> {
        let index = *self.record_index.get(name)?;
        Some(self.records[index].completions.load(Ordering::SeqCst))
    }

    /// Installs the hook run by callback workers after each completion. The
    /// hook runs with the record lock held.
    pub fn set_completion_hook(&self, hook: impl Fn(&RecordHandle) + Send + Sync + 'static) {
        *self.hook.write() = Some(Arc::new(hook));
    }

    /// Runs `f` holding the lock of the named record.
    pub fn with_record_locked<R>(&self, name: &str, f: impl FnOnce() -> R) -> Option<R> {
        let index = *self.record_index.get(name)?;
        let _guard = self.records[index].memory.lock();
        Some(f())
    }

    /// Write from an external client, attributed to `writer`.
    pub fn client_put(
        &self,
        writer: &WriterIdentity,
        name: &str,
        wire: WireType,
        buf: &[u8],
        count: usize,
    ) -> std::result::Result<(), HostStatus> {
        let addr = self.name_to_addr(name)?;
        self.put_field(&addr, wire, buf, count, writer)
    }

    fn type_code(&self, field_type: FieldType) -> i32 {
        self.version.code(field_type)
    }

    fn resolve(&self, addr: &FieldAddress) -> std::result::Result<(&Arc<Record>, &FieldDef), HostStatus> {
        let slot = addr.slot();
        let record = self
            .records
            .get(slot.record)
            .filter(|r| r.name == addr.record())
            .ok_or_else(|| HostStatus::new(S_DB_NOT_FOUND, format!("stale address {}", addr)))?;
        let field = record
            .rtype
            .fields
            .get(slot.field)
            .filter(|f| f.name == addr.field())
            .ok_or_else(|| HostStatus::new(S_DB_NOT_FOUND, format!("stale address {}", addr)))?;
        if field.field_type == FieldType::NoAccess {
            return Err(HostStatus::new(S_DB_BAD_FIELD, format!("{} is not accessible", addr)));
        }
        Ok((record, field))
    }

    fn check_buffer(wire: WireType, len: usize, count: usize) -> std::result::Result<(), HostStatus> {
        if count == 0 || len < wire.buffer_len(count) {
            return Err(HostStatus::new(
                S_DB_ERR_ARG,
                format!("{} bytes cannot hold {} x {}", len, count, wire),
            ));
        }
        Ok(())
    }
}

struct MemoryCursor<'a> {
    host: &'a MemoryHost,
    record_type: Option<&'a RecordTypeDef>,
    next: usize,
}

impl CatalogCursor for MemoryCursor<'_> {
    fn find_record_type(&mut self, record_type: &str) -> std::result::Result<(), HostStatus> {
        self.next = 0;
        self.record_type = self.host.record_types.get(record_type).map(|t| t.as_ref());
        match self.record_type {
            Some(_) => Ok(()),
            None => Err(HostStatus::new(S_DB_NOT_FOUND, format!("record type {} not found", record_type))),
        }
    }

    fn next_field(&mut self) -> Option<CatalogField> {
        let field = self.record_type?.fields.get(self.next)?;
        self.next += 1;
        Some(CatalogField {
            name: field.name.clone(),
            offset: field.offset,
            size: field.size(),
            type_code: self.host.type_code(field.field_type),
        })
    }
}

impl Drop for MemoryCursor<'_> {
    fn drop(&mut self) {
        self.host.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DatabaseHost for MemoryHost {
    fn base_path(&self) -> &str {
        &self.base_path
    }

    fn field_type_codes(&self) -> Vec<(FieldType, i32)> {
        self.version.type_codes()
    }

    fn open_catalog(&self) -> Box<dyn CatalogCursor + '_> {
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Box::new(MemoryCursor { host: self, record_type: None, next: 0 })
    }

    fn name_to_addr(&self, name: &str) -> std::result::Result<FieldAddress, HostStatus> {
        let (record, field) = split_field_name(name);
        let not_found = || HostStatus::new(S_DB_NOT_FOUND, format!("{} not found", name));
        let record_slot = *self.record_index.get(record).ok_or_else(not_found)?;
        let rtype = &self.records[record_slot].rtype;
        let field_slot = rtype.field_index(field).ok_or_else(not_found)?;
        let def = &rtype.fields[field_slot];
        Ok(FieldAddress::new(
            record,
            field,
            def.field_type,
            def.count as usize,
            HostSlot { record: record_slot, field: field_slot },
        ))
    }

    fn get_field(
        &self,
        addr: &FieldAddress,
        wire: WireType,
        buf: &mut [u8],
        count: usize,
    ) -> std::result::Result<usize, HostStatus> {
        let (record, field) = self.resolve(addr)?;
        Self::check_buffer(wire, buf.len(), count)?;
        let n = count.min(field.count as usize);
        let width = field.element_size as usize;

        let values: Vec<DbrValue> = {
            let guard = record.memory.lock();
            let memory = guard.borrow();
            memory[field.range()]
                .chunks_exact(width)
                .take(n)
                .map(|element| read_element(field.field_type, element))
                .collect()
        };

        let values = if wire == WireType::String {
            values
                .into_iter()
                .map(|v| match v {
                    DbrValue::Float(f) => DbrValue::Str(format_significant(f, GENERIC_FLOAT_DIGITS)),
                    other => other,
                })
                .collect()
        } else {
            values
        };

        let encoded = wire::encode(wire, &values).map_err(|e| HostStatus::new(S_DB_BAD_VALUE, e.to_string()))?;
        buf[..encoded.len()].copy_from_slice(&encoded);
        Ok(n)
    }

    fn put_field(
        &self,
        addr: &FieldAddress,
        wire: WireType,
        buf: &[u8],
        count: usize,
        writer: &WriterIdentity,
    ) -> std::result::Result<(), HostStatus> {
        let (record, field) = self.resolve(addr)?;
        Self::check_buffer(wire, buf.len(), count)?;
        let n = count.min(field.count as usize);

        let values = wire::decode(wire, buf, n).map_err(|e| HostStatus::new(S_DB_BAD_DBR_TYPE, e.to_string()))?;
        let mut encoded = BytesMut::with_capacity(field.size() as usize);
        for value in &values {
            write_element(field, value, &mut encoded)?;
        }

        let listeners = if self.traps_write_by(writer) {
            self.listeners.read().clone()
        } else {
            Vec::new()
        };

        let guard = record.memory.lock();
        let mut events: Vec<WriteEvent<'_>> =
            listeners.iter().map(|_| WriteEvent::new(self, writer, addr)).collect();
        for (listener, event) in listeners.iter().zip(events.iter_mut()) {
            listener.on_write(event, TrapPhase::Before);
        }

        {
            let mut memory = guard.borrow_mut();
            let start = field.offset as usize;
            memory[start..start + encoded.len()].copy_from_slice(&encoded);
        }

        for (listener, event) in listeners.iter().zip(events.iter_mut()) {
            listener.on_write(event, TrapPhase::After);
        }
        drop(events);
        drop(guard);
        Ok(())
    }

    fn field_bytes(&self, addr: &FieldAddress) -> std::result::Result<Vec<u8>, HostStatus> {
        let (record, field) = self.resolve(addr)?;
        let guard = record.memory.lock();
        let memory = guard.borrow();
        Ok(memory[field.range()].to_vec())
    }

    fn load_access_security(&self, path: &Path) -> std::result::Result<(), HostStatus> {
        let config = AccessConfig::from_file(path).map_err(|e| HostStatus::new(S_AS_BAD_CONFIG, e.to_string()))?;
        log::info!(
            "Loaded access security from {} ({} groups, trap writes: {})",
            path.display(),
            config.groups.len(),
            config.traps_writes()
        );
        *self.access.write() = Some(config);
        Ok(())
    }

    fn register_write_listener(&self, listener: Arc<dyn WriteTrapListener>) {
        self.listeners.write().push(listener);
    }

    fn record_handle(&self, name: &str) -> Option<RecordHandle> {
        let index = *self.record_index.get(name)?;
        Some(RecordHandle::new(name, index))
    }

    fn request_callback(&self, descriptor: CallbackDescriptor) -> std::result::Result<(), HostStatus> {
        let handle = descriptor
            .record()
            .cloned()
            .ok_or_else(|| HostStatus::new(S_DB_ERR_ARG, "completion descriptor not armed"))?;
        let record = self
            .records
            .get(handle.slot())
            .filter(|r| r.name == handle.name())
            .cloned()
            .ok_or_else(|| HostStatus::new(S_DB_NOT_FOUND, format!("record {} not found", handle.name())))?;
        self.queues.request(Job { record, handle, descriptor })
    }
}
