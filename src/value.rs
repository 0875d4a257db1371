//! Decoded column values and the pluggable per-column decode policy.

use crate::protocol::codec::to_string_lossy;
use crate::protocol::constant::ColumnType;
use crate::protocol::response::ColumnDefinition;

/// A decoded value from a text result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    /// DECIMAL values are kept in their exact text form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
}

/// Decode policy applied to every non-NULL cell of a text result row.
///
/// The decoder is infallible: a value it cannot interpret should be
/// returned as [`Value::Bytes`].
pub type DecodeFn = fn(&[u8], &ColumnDefinition) -> Value;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            Value::Int(i) => Some(i != 0),
            Value::UInt(u) => Some(u != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            Value::UInt(u) => i64::try_from(u).ok(),
            Value::Bool(b) => Some(b as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(u) => Some(u),
            Value::Int(i) => u64::try_from(i).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Decimal(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Text-like values (`Text` and `Decimal`) as `&str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Text(s) | Value::Decimal(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

fn parse_text<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    simdutf8::basic::from_utf8(bytes).ok()?.parse().ok()
}

fn text_or_bytes(bytes: &[u8], column: &ColumnDefinition) -> Value {
    if column.is_binary() {
        return Value::Bytes(bytes.to_vec());
    }
    Value::Text(to_string_lossy(bytes))
}

fn integer(bytes: &[u8], column: &ColumnDefinition) -> Value {
    let parsed = if column.is_unsigned() {
        parse_text::<u64>(bytes).map(Value::UInt)
    } else {
        parse_text::<i64>(bytes).map(Value::Int)
    };
    parsed.unwrap_or_else(|| Value::Bytes(bytes.to_vec()))
}

/// Default decode policy for text-protocol values.
///
/// - `BIT(1)` and `TINYINT(1)` become [`Value::Bool`]
/// - integer types become `Int` or `UInt` (by the UNSIGNED flag), `YEAR` becomes `Int`
/// - `FLOAT`/`DOUBLE` become `Double`, `DECIMAL` stays exact as `Decimal`
/// - temporal types and JSON are returned as `Text`
/// - string and blob types are `Text`, or `Bytes` when the BINARY flag is set
/// - everything else (geometry, multi-bit `BIT`, unknown codes) is `Bytes`
pub fn decode_record_value(bytes: &[u8], column: &ColumnDefinition) -> Value {
    use ColumnType::*;

    let Some(column_type) = column.column_type() else {
        return Value::Bytes(bytes.to_vec());
    };

    match column_type {
        Bit if column.column_length == 1 => Value::Bool(bytes.first().is_some_and(|&b| b != 0)),
        Tiny if column.column_length == 1 => match parse_text::<i64>(bytes) {
            Some(v) => Value::Bool(v != 0),
            None => Value::Bytes(bytes.to_vec()),
        },
        Tiny | Short | Int24 | Long | LongLong => integer(bytes, column),
        Year => parse_text::<i64>(bytes)
            .map(Value::Int)
            .unwrap_or_else(|| Value::Bytes(bytes.to_vec())),
        Float | Double => parse_text::<f64>(bytes)
            .map(Value::Double)
            .unwrap_or_else(|| Value::Bytes(bytes.to_vec())),
        NewDecimal => Value::Decimal(to_string_lossy(bytes)),
        Date | DateTime | Timestamp | Time | Json => Value::Text(to_string_lossy(bytes)),
        String | VarString | Blob => text_or_bytes(bytes, column),
        _ => Value::Bytes(bytes.to_vec()),
    }
}
