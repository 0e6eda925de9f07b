use std::io::{Error, ErrorKind, Result};

use crate::BlockPtr;
use crate::codepage::TextCodec;
use crate::convert;
use crate::dialect::Dialect;
use crate::field::{FieldDescriptor, Value};
use crate::mach;

/// Canonical interpretation of one field slot, selected at compile time
/// from the type letter, the slot length and the dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Character,
    Numeric,
    Float,
    Logical,
    Integer,
    Date,
    MemoText,
    MemoBinary,
    Double,
    Currency,
    Timestamp,
    /// V/X, FlagShip, 2-byte signed short. Read-only.
    VarShort,
    /// V/X, 3-byte short date. Read-only.
    VarDate,
    /// V/X, 4-byte signed int. Read-only.
    VarInt,
    /// V/X, FlagShip, 8-byte double. Read-only.
    VarDouble,
    /// V/X fallback, raw text. Read-only.
    VarText,
}

/// One compiled column: fixed byte range within the field area plus the
/// decode/encode rules. Offsets are relative to the byte after the
/// deletion marker.
#[derive(Debug, Clone)]
pub struct Slot {
    pub name: String,
    pub offset: usize,
    pub len: usize,
    pub precision: u8,
    pub kind: FieldKind,
    /// Text in this slot (or its memo body) is subject to code-page
    /// conversion.
    pub encoded: bool,
}

/// Result of decoding one slot. Memo slots yield the block pointer; the
/// engine resolves it through the memo store.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Value(Value),
    MemoRef { pointer: Option<BlockPtr>, binary: bool },
}

/// The compiled record layout: a scan/emit plan over the field area.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub slots: Vec<Slot>,
    /// Full record size including the deletion byte.
    pub record_size: usize,
}

impl Layout {
    pub fn compile(fields: &[FieldDescriptor], dialect: &Dialect) -> Layout {
        let mut slots = Vec::with_capacity(fields.len());
        let mut offset = 0usize;

        for f in fields {
            let len = f.length as usize;
            let (kind, encoded) = match f.kind {
                b'C' => (FieldKind::Character, true),
                b'N' => (FieldKind::Numeric, false),
                b'F' => (FieldKind::Float, false),
                b'L' => (FieldKind::Logical, false),
                b'I' | b'+' => (FieldKind::Integer, false),
                b'D' => (FieldKind::Date, false),
                b'M' | b'G' => (FieldKind::MemoText, true),
                b'B' | b'P' => (FieldKind::MemoBinary, false),
                b'O' => (FieldKind::Double, false),
                b'Y' => (FieldKind::Currency, false),
                b'T' | b'@' => (FieldKind::Timestamp, false),
                b'V' | b'X' => match (dialect.flagship, len) {
                    (true, 2) => (FieldKind::VarShort, false),
                    (_, 3) => (FieldKind::VarDate, false),
                    (_, 4) => (FieldKind::VarInt, false),
                    (true, 8) => (FieldKind::VarDouble, false),
                    _ => (FieldKind::VarText, true),
                },
                // Unknown types scan as raw text so the rest of the
                // record keeps its offsets.
                _ => (FieldKind::VarText, true),
            };

            slots.push(Slot {
                name: f.name.clone(),
                offset,
                len,
                precision: f.precision,
                kind,
                encoded,
            });
            offset += len;
        }

        Layout {
            slots,
            record_size: 1 + offset,
        }
    }

    pub fn slot_by_name(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

impl Slot {
    pub fn is_memo(&self) -> bool {
        matches!(self.kind, FieldKind::MemoText | FieldKind::MemoBinary)
    }

    fn raw<'a>(&self, area: &'a [u8]) -> &'a [u8] {
        &area[self.offset..self.offset + self.len]
    }

    fn text(&self, raw: &[u8], codec: &TextCodec) -> String {
        let s = if self.encoded {
            codec.decode(raw)
        } else {
            String::from_utf8_lossy(raw).into_owned()
        };
        s.trim_end_matches(['\0', ' ']).to_string()
    }

    /// Decode this slot out of the field area of one record.
    pub fn decode(&self, area: &[u8], codec: &TextCodec) -> Decoded {
        let raw = self.raw(area);

        let value = match self.kind {
            FieldKind::Character | FieldKind::VarText => Value::Character(self.text(raw, codec)),
            FieldKind::Numeric => Value::Numeric(parse_number(raw)),
            FieldKind::Float => Value::Float(parse_number(raw)),
            FieldKind::Logical => Value::Logical(match raw.first() {
                Some(b'Y' | b'y' | b'T' | b't') => Some(true),
                Some(b'N' | b'n' | b'F' | b'f') => Some(false),
                _ => None,
            }),
            FieldKind::Integer => Value::Integer(mach::read_i4(raw)),
            FieldKind::Date => Value::Date(ascii_trimmed(raw)),
            FieldKind::Double => Value::Double(mach::read_f8(raw)),
            FieldKind::Currency => Value::Currency(convert::currency_to_string(mach::read_8(raw))),
            FieldKind::Timestamp => Value::Timestamp {
                days: mach::read_i4(raw),
                ms: mach::read_4(&raw[4..]),
            },
            FieldKind::VarShort => Value::Integer(mach::read_i2(raw) as i32),
            FieldKind::VarDate => Value::Date(convert::bin_to_yyyymmdd([raw[0], raw[1], raw[2]])),
            FieldKind::VarInt => Value::Integer(mach::read_i4(raw)),
            FieldKind::VarDouble => Value::Double(mach::read_f8(raw)),
            FieldKind::MemoText | FieldKind::MemoBinary => {
                let pointer = ascii_trimmed(raw).parse::<BlockPtr>().ok().filter(|p| *p > 0);
                return Decoded::MemoRef {
                    pointer,
                    binary: self.kind == FieldKind::MemoBinary,
                };
            }
        };

        Decoded::Value(value)
    }

    /// Serialize a value into this slot. Memo slots are not handled here:
    /// the engine writes the body through the memo store first and then
    /// calls [`Slot::encode_pointer`].
    pub fn encode(&self, value: &Value, codec: &TextCodec) -> Result<Vec<u8>> {
        let bytes = match (self.kind, value) {
            (FieldKind::Character, Value::Character(s) | Value::Memo(s)) => {
                let mut b = if self.encoded {
                    codec.encode(s)
                } else {
                    s.as_bytes().to_vec()
                };
                b.truncate(self.len);
                b.resize(self.len, b' ');
                b
            }
            (FieldKind::Numeric | FieldKind::Float, v) => {
                let n = match v {
                    Value::Numeric(n) | Value::Float(n) => *n,
                    Value::Integer(i) => Some(*i as f64),
                    Value::Double(d) => Some(*d),
                    _ => return Err(self.mismatch(value)),
                };
                match n {
                    None => vec![b' '; self.len],
                    Some(n) => {
                        let s = format!("{:>1$.2$}", n, self.len, self.precision as usize);
                        if s.len() > self.len {
                            return Err(Error::new(
                                ErrorKind::InvalidInput,
                                format!("field {}: {n} does not fit {} bytes", self.name, self.len),
                            ));
                        }
                        s.into_bytes()
                    }
                }
            }
            (FieldKind::Logical, Value::Logical(b)) => {
                let mut out = vec![b' '; self.len.max(1)];
                out[0] = match b {
                    Some(true) => b'T',
                    Some(false) => b'F',
                    None => b'?',
                };
                out.truncate(self.len);
                out
            }
            (FieldKind::Integer, Value::Integer(v)) => {
                let mut out = vec![0u8; self.len];
                mach::write_i4(&mut out, *v);
                out
            }
            (FieldKind::Date, Value::Date(s) | Value::Character(s)) => {
                let mut b = s.as_bytes().to_vec();
                b.truncate(self.len);
                b.resize(self.len, b' ');
                b
            }
            (FieldKind::Double, Value::Double(v)) => {
                let mut out = vec![0u8; self.len];
                mach::write_f8(&mut out, *v);
                out
            }
            (FieldKind::Double, Value::Numeric(Some(v)) | Value::Float(Some(v))) => {
                let mut out = vec![0u8; self.len];
                mach::write_f8(&mut out, *v);
                out
            }
            (FieldKind::Currency, v) => {
                let raw = match v {
                    Value::Currency(s) | Value::Character(s) => convert::currency_to_bin(s)?,
                    Value::Numeric(Some(n)) => convert::currency_to_bin(&format!("{n:.4}"))?,
                    _ => return Err(self.mismatch(value)),
                };
                let mut out = vec![0u8; self.len];
                mach::write_8(&mut out, raw);
                out
            }
            (FieldKind::Timestamp, Value::Timestamp { days, ms }) => {
                let mut out = vec![0u8; self.len];
                mach::write_i4(&mut out[..4], *days);
                mach::write_4(&mut out[4..8], *ms);
                out
            }
            (
                FieldKind::VarShort
                | FieldKind::VarDate
                | FieldKind::VarInt
                | FieldKind::VarDouble
                | FieldKind::VarText,
                _,
            ) => {
                return Err(Error::new(
                    ErrorKind::Unsupported,
                    format!("field {}: this type is read-only", self.name),
                ));
            }
            _ => return Err(self.mismatch(value)),
        };

        debug_assert_eq!(bytes.len(), self.len);
        Ok(bytes)
    }

    /// Encoded body bytes for a memo slot, ready for the memo store.
    pub fn memo_body(&self, value: &Value, codec: &TextCodec) -> Result<Vec<u8>> {
        match (self.kind, value) {
            (FieldKind::MemoText, Value::Memo(s) | Value::Character(s)) => Ok(if self.encoded {
                codec.encode(s)
            } else {
                s.as_bytes().to_vec()
            }),
            (FieldKind::MemoBinary, Value::Blob(b)) => Ok(b.clone()),
            (FieldKind::MemoBinary, Value::Memo(s) | Value::Character(s)) => {
                Ok(s.as_bytes().to_vec())
            }
            _ => Err(self.mismatch(value)),
        }
    }

    /// The ASCII block-pointer slot of a memo field. An absent pointer is
    /// all spaces.
    pub fn encode_pointer(&self, ptr: Option<BlockPtr>) -> Vec<u8> {
        match ptr {
            Some(p) => format!("{:>1$}", p, self.len).into_bytes(),
            None => vec![b' '; self.len],
        }
    }

    fn mismatch(&self, value: &Value) -> Error {
        Error::new(
            ErrorKind::InvalidInput,
            format!("field {}: cannot store {value:?} in a {:?} slot", self.name, self.kind),
        )
    }
}

fn ascii_trimmed(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches(['\0', ' '])
        .to_string()
}

fn parse_number(raw: &[u8]) -> Option<f64> {
    let t = ascii_trimmed(raw);
    if t.is_empty() { None } else { t.parse().ok() }
}
