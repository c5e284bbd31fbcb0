//! Display rendering of field values.
//!
//! The host's generic string conversion prints floats with six significant
//! digits, which loses information in audit output. [`ValueFormatter`] keeps
//! the host conversion for every other type but re-renders `DBF_FLOAT` and
//! `DBF_DOUBLE` elements from their raw bytes with 7 and 15 significant
//! digits respectively.

use crate::error::{Error, Result, Transfer};
use crate::host::DatabaseHost;
use crate::types::{FieldAddress, FieldType};
use crate::wire::{c_string, WireType, MAX_STRING_SIZE};
use bytes::Buf;
use std::fmt;

/// Significant digits used for `DBF_FLOAT` values.
pub const FLOAT_DIGITS: usize = 7;

/// Significant digits used for `DBF_DOUBLE` values.
pub const DOUBLE_DIGITS: usize = 15;

/// Placeholder rendered when a value could not be read.
pub const UNAVAILABLE: &str = "<unavailable>";

/// Renders `value` like C's `%.{digits}g`.
///
/// Uses fixed notation unless the decimal exponent is below -4 or at least
/// `digits`, in which case exponent notation with a signed, two-digit
/// minimum exponent is used. Trailing zeros of the fraction are removed.
///
/// ```rust
/// use iocbridge::format::format_significant;
///
/// assert_eq!(format_significant(3.14159265358979, 15), "3.14159265358979");
/// assert_eq!(format_significant(0.00001, 7), "1e-05");
/// assert_eq!(format_significant(123456789.0, 7), "1.234568e+08");
/// ```
pub fn format_significant(value: f64, digits: usize) -> String {
    if value.is_nan() {
        return if value.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }

    let precision = digits.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn fit_slot(mut text: String) -> String {
    if text.len() >= MAX_STRING_SIZE {
        let mut end = MAX_STRING_SIZE - 1;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

/// The rendered elements of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedValue {
    values: Vec<String>,
}

impl FormattedValue {
    /// Wraps already rendered elements.
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    /// A single [`UNAVAILABLE`] element.
    pub fn unavailable() -> Self {
        Self { values: vec![UNAVAILABLE.to_string()] }
    }

    /// Number of elements read.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no element was read.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Rendered elements in index order.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

impl fmt::Display for FormattedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.len() == 1 {
            return f.write_str(&self.values[0]);
        }
        write!(f, "[{}]", self.values.join(", "))
    }
}

/// Renders the current value of a field.
pub struct ValueFormatter<'a> {
    host: &'a dyn DatabaseHost,
}

impl<'a> ValueFormatter<'a> {
    /// Creates a formatter reading through `host`.
    pub fn new(host: &'a dyn DatabaseHost) -> Self {
        Self { host }
    }

    /// Reads and renders every element of the field.
    ///
    /// Takes the record lock of the field, so callers must not hold the
    /// execution lock.
    pub fn format(&self, addr: &FieldAddress) -> Result<FormattedValue> {
        let capacity = addr.no_elements().max(1);
        let mut buf = vec![0u8; WireType::String.buffer_len(capacity)];
        let count = self
            .host
            .get_field(addr, WireType::String, &mut buf, capacity)
            .map_err(|status| Error::transfer_failed(Transfer::Get, addr.to_string(), status.code))?;

        let mut values: Vec<String> = buf
            .chunks_exact(MAX_STRING_SIZE)
            .take(count)
            .map(c_string)
            .collect();

        if addr.field_type().is_float() {
            let raw = self
                .host
                .field_bytes(addr)
                .map_err(|status| Error::transfer_failed(Transfer::Get, addr.to_string(), status.code))?;
            match addr.field_type() {
                FieldType::Float => {
                    for (value, mut element) in values.iter_mut().zip(raw.chunks_exact(4)) {
                        *value = format_significant(element.get_f32_ne().into(), FLOAT_DIGITS);
                    }
                }
                _ => {
                    for (value, mut element) in values.iter_mut().zip(raw.chunks_exact(8)) {
                        *value = format_significant(element.get_f64_ne(), DOUBLE_DIGITS);
                    }
                }
            }
        }

        Ok(FormattedValue::new(values.into_iter().map(fit_slot).collect()))
    }
}
