//! Field metadata types shared by the host interface and the bridge.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Declared type of a record field.
///
/// The numeric code of each kind belongs to the host and has changed between
/// host releases, so the enum carries no discriminants. Codes are looked up
/// through a [`FieldTypeMap`] derived from the running host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldType {
    /// Fixed-size character string.
    String,
    /// Signed 8-bit integer.
    Char,
    /// Unsigned 8-bit integer.
    UChar,
    /// Signed 16-bit integer.
    Short,
    /// Unsigned 16-bit integer.
    UShort,
    /// Signed 32-bit integer.
    Long,
    /// Unsigned 32-bit integer.
    ULong,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Enumerated value with record-defined states.
    Enum,
    /// Enumerated value with menu-defined states.
    Menu,
    /// Device support selector.
    Device,
    /// Input link.
    InLink,
    /// Output link.
    OutLink,
    /// Forward link.
    FwdLink,
    /// Private field, not accessible through the database.
    NoAccess,
}

impl FieldType {
    /// Every field type, in host declaration order.
    pub const ALL: [FieldType; 16] = [
        FieldType::String,
        FieldType::Char,
        FieldType::UChar,
        FieldType::Short,
        FieldType::UShort,
        FieldType::Long,
        FieldType::ULong,
        FieldType::Float,
        FieldType::Double,
        FieldType::Enum,
        FieldType::Menu,
        FieldType::Device,
        FieldType::InLink,
        FieldType::OutLink,
        FieldType::FwdLink,
        FieldType::NoAccess,
    ];

    /// The host's symbolic name, e.g. `DBF_DOUBLE`.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "DBF_STRING",
            FieldType::Char => "DBF_CHAR",
            FieldType::UChar => "DBF_UCHAR",
            FieldType::Short => "DBF_SHORT",
            FieldType::UShort => "DBF_USHORT",
            FieldType::Long => "DBF_LONG",
            FieldType::ULong => "DBF_ULONG",
            FieldType::Float => "DBF_FLOAT",
            FieldType::Double => "DBF_DOUBLE",
            FieldType::Enum => "DBF_ENUM",
            FieldType::Menu => "DBF_MENU",
            FieldType::Device => "DBF_DEVICE",
            FieldType::InLink => "DBF_INLINK",
            FieldType::OutLink => "DBF_OUTLINK",
            FieldType::FwdLink => "DBF_FWDLINK",
            FieldType::NoAccess => "DBF_NOACCESS",
        }
    }

    /// Looks a field type up by its symbolic name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// True for `DBF_FLOAT` and `DBF_DOUBLE`.
    pub fn is_float(&self) -> bool {
        matches!(self, FieldType::Float | FieldType::Double)
    }

    /// True for the three link kinds.
    pub fn is_link(&self) -> bool {
        matches!(self, FieldType::InLink | FieldType::OutLink | FieldType::FwdLink)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mapping between field types and the running host's numeric codes.
///
/// Built once from the host when a [`crate::Bridge`] starts and never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct FieldTypeMap {
    by_type: HashMap<FieldType, i32>,
    by_code: HashMap<i32, FieldType>,
}

impl FieldTypeMap {
    /// Builds the map from `(type, code)` pairs reported by a host.
    pub fn from_codes(codes: impl IntoIterator<Item = (FieldType, i32)>) -> Self {
        let mut by_type = HashMap::new();
        let mut by_code = HashMap::new();
        for (field_type, code) in codes {
            by_type.insert(field_type, code);
            by_code.insert(code, field_type);
        }
        Self { by_type, by_code }
    }

    /// The host code for a field type.
    pub fn code(&self, field_type: FieldType) -> Option<i32> {
        self.by_type.get(&field_type).copied()
    }

    /// The field type for a host code.
    pub fn field_type(&self, code: i32) -> Option<FieldType> {
        self.by_code.get(&code).copied()
    }

    /// Number of mapped types.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// True if the host reported no types.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Symbolic name to code, the form handed to scripts.
    pub fn to_name_map(&self) -> BTreeMap<String, i32> {
        self.by_type.iter().map(|(t, code)| (t.name().to_string(), *code)).collect()
    }
}

/// Layout of one field within a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name, e.g. `VAL`.
    pub name: String,
    /// Byte offset from the start of the record.
    pub byte_offset: u32,
    /// Size in bytes of the whole field.
    pub byte_size: u32,
    /// Declared type.
    pub declared_type: FieldType,
}

/// Host-private location of a field, meaningful only to the host that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSlot {
    /// Host index of the record.
    pub record: usize,
    /// Host index of the field within the record type.
    pub field: usize,
}

/// A resolved field handle.
///
/// Produced by [`crate::host::DatabaseHost::name_to_addr`] and consumed by
/// the transfer primitives. Deliberately not `Clone`: every access resolves
/// a fresh address from the name.
#[derive(Debug)]
pub struct FieldAddress {
    record: String,
    field: String,
    field_type: FieldType,
    no_elements: usize,
    slot: HostSlot,
}

impl FieldAddress {
    /// Creates an address. Called by host implementations.
    pub fn new(
        record: impl Into<String>,
        field: impl Into<String>,
        field_type: FieldType,
        no_elements: usize,
        slot: HostSlot,
    ) -> Self {
        Self {
            record: record.into(),
            field: field.into(),
            field_type,
            no_elements,
            slot,
        }
    }

    /// Record name.
    pub fn record(&self) -> &str {
        &self.record
    }

    /// Field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Declared type of the field.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Element capacity of the field (1 for scalars).
    pub fn no_elements(&self) -> usize {
        self.no_elements
    }

    /// Host-private slot.
    pub fn slot(&self) -> HostSlot {
        self.slot
    }
}

impl fmt::Display for FieldAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.record, self.field)
    }
}

/// Host handle for a record instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHandle {
    name: String,
    slot: usize,
}

impl RecordHandle {
    /// Creates a handle. Called by host implementations.
    pub fn new(name: impl Into<String>, slot: usize) -> Self {
        Self { name: name.into(), slot }
    }

    /// Record name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host index of the record.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Identity a write is attributed to in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterIdentity {
    /// User name.
    pub user: String,
    /// Host name the write came from.
    pub host: String,
}

impl WriterIdentity {
    /// Creates an identity.
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self { user: user.into(), host: host.into() }
    }
}

impl Default for WriterIdentity {
    fn default() -> Self {
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        Self { user, host }
    }
}

impl fmt::Display for WriterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

/// Splits `record.field` into its parts. A bare record name addresses `VAL`.
pub fn split_field_name(name: &str) -> (&str, &str) {
    match name.split_once('.') {
        Some((record, field)) => (record, field),
        None => (name, "VAL"),
    }
}
