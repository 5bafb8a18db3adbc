//! Cell values and column types.

use crate::decoder::Decoder;
use crate::encoder::{delimited_len, varint_len, zigzag, Encoder};
use crate::error::{CodecError, CodecResult};

/// Declared type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    /// Boolean column.
    Bool = 1,
    /// 64-bit signed integer column.
    Int = 2,
    /// 64-bit float column.
    Float = 3,
    /// UTF-8 text column.
    Text = 4,
    /// Opaque bytes column.
    Bytes = 5,
}

impl ColumnType {
    /// Converts a wire code to a column type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Bool),
            2 => Some(Self::Int),
            3 => Some(Self::Float),
            4 => Some(Self::Text),
            5 => Some(Self::Bytes),
            _ => None,
        }
    }

    /// Converts the column type to its wire code.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single cell in a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Bytes(Vec<u8>),
}

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_TEXT: u8 = 4;
const TAG_BYTES: u8 = 5;

impl Value {
    /// The column type this value fits, or `None` for [`Value::Null`].
    #[must_use]
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Int(_) => Some(ColumnType::Int),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Bytes(_) => Some(ColumnType::Bytes),
        }
    }

    /// Exact encoded size, tag byte included.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(n) => varint_len(zigzag(*n)),
            Value::Float(_) => 8,
            Value::Text(s) => delimited_len(s.len()),
            Value::Bytes(b) => delimited_len(b.len()),
        }
    }

    pub(crate) fn encode(&self, enc: &mut Encoder<'_>) {
        match self {
            Value::Null => enc.put_u8(TAG_NULL),
            Value::Bool(b) => {
                enc.put_u8(TAG_BOOL);
                enc.put_u8(u8::from(*b));
            }
            Value::Int(n) => {
                enc.put_u8(TAG_INT);
                enc.put_signed(*n);
            }
            Value::Float(f) => {
                enc.put_u8(TAG_FLOAT);
                enc.put_f64(*f);
            }
            Value::Text(s) => {
                enc.put_u8(TAG_TEXT);
                enc.put_str(s);
            }
            Value::Bytes(b) => {
                enc.put_u8(TAG_BYTES);
                enc.put_bytes(b);
            }
        }
    }

    pub(crate) fn decode(dec: &mut Decoder<'_>) -> CodecResult<Self> {
        match dec.read_u8()? {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOL => match dec.read_u8()? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(CodecError::malformed(format!("invalid bool byte {other}"))),
            },
            TAG_INT => dec.read_signed().map(Value::Int),
            TAG_FLOAT => dec.read_f64().map(Value::Float),
            TAG_TEXT => dec.read_string().map(Value::Text),
            TAG_BYTES => dec.read_bytes().map(|b| Value::Bytes(b.to_vec())),
            tag => Err(CodecError::UnknownValueTag(tag)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}
