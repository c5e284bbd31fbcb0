//! Wire buffer codec.
//!
//! A transfer buffer holds `count` elements of one wire type, packed in host
//! byte order with no padding. Strings occupy fixed 40-byte slots: at most
//! 39 bytes of text followed by NUL padding.

use crate::error::{Error, Result};
use crate::format::{format_significant, DOUBLE_DIGITS};
use crate::types::FieldType;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

/// Size of one string slot in a wire buffer or string field.
pub const MAX_STRING_SIZE: usize = 40;

/// Encoding a caller requests for a field transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum WireType {
    /// 40-byte NUL-padded strings.
    String = 0,
    /// Signed 16-bit integers.
    Short = 1,
    /// 32-bit floats.
    Float = 2,
    /// Unsigned 16-bit enum indices.
    Enum = 3,
    /// Signed 8-bit integers.
    Char = 4,
    /// Signed 32-bit integers.
    Long = 5,
    /// 64-bit floats.
    Double = 6,
}

impl WireType {
    /// Every wire type, by code.
    pub const ALL: [WireType; 7] = [
        WireType::String,
        WireType::Short,
        WireType::Float,
        WireType::Enum,
        WireType::Char,
        WireType::Long,
        WireType::Double,
    ];

    /// Converts a wire code.
    pub fn from_code(code: i64) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|w| i64::from(w.code()) == code)
            .ok_or_else(|| Error::invalid_argument(format!("Invalid wire type: {}", code)))
    }

    /// The wire code.
    pub fn code(&self) -> i16 {
        *self as i16
    }

    /// Symbolic name, e.g. `DBR_DOUBLE`.
    pub fn name(&self) -> &'static str {
        match self {
            WireType::String => "DBR_STRING",
            WireType::Short => "DBR_SHORT",
            WireType::Float => "DBR_FLOAT",
            WireType::Enum => "DBR_ENUM",
            WireType::Char => "DBR_CHAR",
            WireType::Long => "DBR_LONG",
            WireType::Double => "DBR_DOUBLE",
        }
    }

    /// Bytes per element.
    pub fn element_size(&self) -> usize {
        match self {
            WireType::String => MAX_STRING_SIZE,
            WireType::Short | WireType::Enum => 2,
            WireType::Float | WireType::Long => 4,
            WireType::Char => 1,
            WireType::Double => 8,
        }
    }

    /// Field type whose native representation matches this wire type.
    pub fn field_type(&self) -> FieldType {
        match self {
            WireType::String => FieldType::String,
            WireType::Short => FieldType::Short,
            WireType::Float => FieldType::Float,
            WireType::Enum => FieldType::Enum,
            WireType::Char => FieldType::Char,
            WireType::Long => FieldType::Long,
            WireType::Double => FieldType::Double,
        }
    }

    /// Buffer length needed for `count` elements.
    pub fn buffer_len(&self, count: usize) -> usize {
        self.element_size() * count
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded element.
#[derive(Debug, Clone, PartialEq)]
pub enum DbrValue {
    /// Text.
    Str(String),
    /// Any integer wire type.
    Int(i64),
    /// Any float wire type.
    Float(f64),
}

impl DbrValue {
    /// Numeric view; strings are parsed.
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            DbrValue::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::invalid_argument(format!("Cannot convert {:?} to a number", s))),
            DbrValue::Int(i) => Ok(*i as f64),
            DbrValue::Float(f) => Ok(*f),
        }
    }

    /// Integer view; floats truncate, strings are parsed.
    pub fn to_i64(&self) -> Result<i64> {
        match self {
            DbrValue::Str(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(i) => Ok(i),
                    Err(_) => DbrValue::Str(s.to_string()).to_f64().map(|f| f as i64),
                }
            }
            DbrValue::Int(i) => Ok(*i),
            DbrValue::Float(f) => Ok(*f as i64),
        }
    }

    /// Text view.
    pub fn to_text(&self) -> String {
        match self {
            DbrValue::Str(s) => s.clone(),
            DbrValue::Int(i) => i.to_string(),
            DbrValue::Float(f) => format_significant(*f, DOUBLE_DIGITS),
        }
    }
}

/// Reads a NUL-terminated string out of a fixed slot.
pub fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Writes `text` into a fixed string slot of `size` bytes, truncating so a
/// terminating NUL always fits.
pub fn put_c_string(buf: &mut BytesMut, text: &str, size: usize) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(size.saturating_sub(1));
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, size - n);
}

fn put_element(buf: &mut BytesMut, wire: WireType, value: &DbrValue) -> Result<()> {
    match wire {
        WireType::String => put_c_string(buf, &value.to_text(), MAX_STRING_SIZE),
        WireType::Short => buf.put_i16_ne(value.to_i64()? as i16),
        WireType::Float => buf.put_f32_ne(value.to_f64()? as f32),
        WireType::Enum => buf.put_u16_ne(value.to_i64()? as u16),
        WireType::Char => buf.put_i8(value.to_i64()? as i8),
        WireType::Long => buf.put_i32_ne(value.to_i64()? as i32),
        WireType::Double => buf.put_f64_ne(value.to_f64()?),
    }
    Ok(())
}

/// Encodes values into a wire buffer.
pub fn encode(wire: WireType, values: &[DbrValue]) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(wire.buffer_len(values.len()));
    for value in values {
        put_element(&mut buf, wire, value)?;
    }
    Ok(buf.to_vec())
}

/// Decodes `count` elements from a wire buffer.
pub fn decode(wire: WireType, buf: &[u8], count: usize) -> Result<Vec<DbrValue>> {
    let needed = wire.buffer_len(count);
    if buf.len() < needed {
        return Err(Error::invalid_argument(format!(
            "Buffer of {} bytes too short for {} x {}",
            buf.len(),
            count,
            wire
        )));
    }

    let mut cursor = &buf[..needed];
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let value = match wire {
            WireType::String => {
                let (slot, rest) = cursor.split_at(MAX_STRING_SIZE);
                cursor = rest;
                DbrValue::Str(c_string(slot))
            }
            WireType::Short => DbrValue::Int(i64::from(cursor.get_i16_ne())),
            WireType::Float => DbrValue::Float(f64::from(cursor.get_f32_ne())),
            WireType::Enum => DbrValue::Int(i64::from(cursor.get_u16_ne())),
            WireType::Char => DbrValue::Int(i64::from(cursor.get_i8())),
            WireType::Long => DbrValue::Int(i64::from(cursor.get_i32_ne())),
            WireType::Double => DbrValue::Float(cursor.get_f64_ne()),
        };
        values.push(value);
    }
    Ok(values)
}

/// Picks the wire type for a set of script values: any string forces
/// `DBR_STRING`, otherwise any float forces `DBR_DOUBLE`, otherwise
/// `DBR_LONG`.
pub fn infer_wire_type(values: &[DbrValue]) -> WireType {
    if values.iter().any(|v| matches!(v, DbrValue::Str(_))) {
        WireType::String
    } else if values.iter().any(|v| matches!(v, DbrValue::Float(_))) {
        WireType::Double
    } else {
        WireType::Long
    }
}
