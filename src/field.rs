use std::fmt::Display;
use std::io::{Error, ErrorKind, Result};

use crate::dialect::Dialect;

/// On-disk size of one field descriptor.
pub const DESCRIPTOR_SIZE: usize = 32;

/// Widest name the 10-byte descriptor slot can hold.
pub const MAX_NAME_LEN: usize = 10;

/// One column of a table.
///
/// `kind` is the uppercase type letter as stored on disk. `length` is the
/// effective slot width; for character fields it can exceed the single
/// length byte (the descriptor codec splits it across the decimal byte).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: u8,
    pub length: u32,
    pub precision: u8,
    /// Read and written back verbatim; never used for lookup.
    pub indexed: bool,
}

impl FieldDescriptor {
    /// Build a descriptor for a new column, enforcing the per-type length
    /// and precision rules. `V` and `X` columns cannot be created: their
    /// write paths do not exist.
    pub fn new(
        name: &str,
        kind: u8,
        length: Option<u32>,
        precision: Option<u8>,
    ) -> Result<FieldDescriptor> {
        let kind = kind.to_ascii_uppercase();

        let require = |max: u32| -> Result<u32> {
            let len = length.ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidInput,
                    format!("column {name}: length is required for type {}", kind as char),
                )
            })?;
            if len == 0 || len > max {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!(
                        "column {name}: length {len} out of range 1..={max} for type {}",
                        kind as char
                    ),
                ));
            }
            Ok(len)
        };

        let (length, precision) = match kind {
            b'N' => (require(20)?, precision.unwrap_or(0)),
            b'C' => (require(65536)?, 0),
            b'L' => (1, 0),
            b'D' => (8, 0),
            b'M' | b'B' | b'G' | b'P' => (10, 0),
            b'F' => (20, precision.unwrap_or(0)),
            b'Y' => (8, 4),
            b'T' | b'@' => (8, 0),
            b'I' | b'+' => (4, 0),
            b'O' => (8, 0),
            b'V' | b'X' => {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("column {name}: write of type {} is not supported", kind as char),
                ));
            }
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("column {name}: type {:#04x} is not supported", kind),
                ));
            }
        };

        Ok(FieldDescriptor {
            name: name.to_string(),
            kind,
            length,
            precision,
            indexed: false,
        })
    }

    /// Decode a 32-byte descriptor slot.
    ///
    /// Character fields always combine the decimal byte as the high byte
    /// of the length; numeric and integer fields do so only under dialects
    /// carrying the flag.
    pub fn from_bytes(buf: &[u8], dialect: &Dialect) -> FieldDescriptor {
        let name_end = buf[..MAX_NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_LEN);
        let name = String::from_utf8_lossy(&buf[..name_end]).into_owned();

        let kind = buf[11].to_ascii_uppercase();
        let len = buf[16] as u32;
        let dec = buf[17];
        let indexed = buf[31] != 0;

        let high_byte = kind == b'C'
            || (dialect.decimal_as_high_byte && (kind == b'N' || kind == b'I'));

        let (length, precision) = if high_byte {
            (dec as u32 * 256 + len, 0)
        } else {
            (len, dec)
        };

        FieldDescriptor {
            name,
            kind,
            length,
            precision,
            indexed,
        }
    }

    /// Encode the 32-byte descriptor slot. Names longer than the slot are
    /// truncated; lengths above 255 spill their high byte into the decimal
    /// byte.
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut buf = [0u8; DESCRIPTOR_SIZE];

        let name = self.name.as_bytes();
        let n = name.len().min(MAX_NAME_LEN);
        buf[..n].copy_from_slice(&name[..n]);

        buf[11] = self.kind;
        if self.length > 255 {
            buf[16] = (self.length & 0xff) as u8;
            buf[17] = (self.length >> 8) as u8;
        } else {
            buf[16] = self.length as u8;
            buf[17] = self.precision;
        }
        buf[31] = self.indexed as u8;

        buf
    }
}

impl Display for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}({},{})",
            self.name, self.kind as char, self.length, self.precision
        )
    }
}

/// One decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Character(String),
    /// `None` when the slot is blank or unparsable.
    Numeric(Option<f64>),
    Float(Option<f64>),
    Logical(Option<bool>),
    Integer(i32),
    /// `YYYYMMDD`.
    Date(String),
    /// Text memo body, already converted to the native encoding.
    Memo(String),
    /// Binary memo body, untouched.
    Blob(Vec<u8>),
    Double(f64),
    /// Decimal string with four fraction digits.
    Currency(String),
    /// Julian day pair.
    Timestamp { days: i32, ms: u32 },
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Character(s) | Value::Date(s) | Value::Memo(s) | Value::Currency(s) => {
                f.write_str(s)
            }
            Value::Numeric(Some(n)) | Value::Float(Some(n)) => write!(f, "{n}"),
            Value::Numeric(None) | Value::Float(None) | Value::Logical(None) => Ok(()),
            Value::Logical(Some(b)) => f.write_str(if *b { "T" } else { "F" }),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Timestamp { days, ms } => write!(f, "({days}, {ms})"),
        }
    }
}
