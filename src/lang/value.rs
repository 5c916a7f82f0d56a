use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Runtime value held in a frame slot.
///
/// Values are dynamically typed; opcodes request the representation they
/// need through the `to_*` coercions below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Slot that was never written.
    #[default]
    Unknown,

    /// Byte string. Not required to be valid UTF-8.
    String(Vec<u8>),

    /// 64-bit signed integer.
    Integer(i64),

    Boolean(bool),
}

/// The tag of a [`Value`], usable without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Unknown,
    String,
    Integer,
    Boolean,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::Unknown => "unknown",
            ValueType::String => "string",
            ValueType::Integer => "int",
            ValueType::Boolean => "bool",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    #[error("non-numeric string {0:?}")]
    NonNumeric(String),

    #[error("numeric string {0:?} is out of integer range")]
    OutOfRange(String),
}

impl Value {
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Value::String(bytes.into())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Unknown => ValueType::Unknown,
            Value::String(_) => ValueType::String,
            Value::Integer(_) => ValueType::Integer,
            Value::Boolean(_) => ValueType::Boolean,
        }
    }

    /// Overwrite tag and payload with a deep copy of `other`.
    pub fn copy_from(&mut self, other: &Value) {
        self.clone_from(other);
    }

    /// Integer view.
    ///
    /// Strings must be numeric. A leading-numeric string such as `"12abc"`
    /// yields its numeric prefix and logs a warning; a string without a
    /// numeric prefix is an error.
    pub fn to_int(&self) -> Result<i64, CoercionError> {
        match self {
            Value::Unknown => Ok(0),
            Value::Integer(n) => Ok(*n),
            Value::Boolean(b) => Ok(i64::from(*b)),
            Value::String(bytes) => parse_numeric(bytes),
        }
    }

    /// Truthiness. Total: every value has one.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Unknown => false,
            Value::Integer(n) => *n != 0,
            Value::Boolean(b) => *b,
            Value::String(bytes) => !(bytes.is_empty() || bytes.as_slice() == b"0"),
        }
    }

    /// String view. Total: every value has one.
    pub fn to_bytes(&self) -> std::borrow::Cow<'_, [u8]> {
        use std::borrow::Cow;
        match self {
            Value::Unknown => Cow::Borrowed(b""),
            Value::String(bytes) => Cow::Borrowed(bytes),
            Value::Integer(n) => Cow::Owned(n.to_string().into_bytes()),
            Value::Boolean(true) => Cow::Borrowed(b"1"),
            Value::Boolean(false) => Cow::Borrowed(b""),
        }
    }

    /// Loose (`==`) equality.
    ///
    /// Booleans compare by truthiness, two numeric values as integers,
    /// `Unknown` against an integer by truthiness, everything else by its
    /// string form.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Boolean(_), _) | (_, Value::Boolean(_)) => self.to_bool() == other.to_bool(),
            (Value::Unknown, Value::Integer(_)) | (Value::Integer(_), Value::Unknown) => {
                self.to_bool() == other.to_bool()
            }
            _ => match (self.as_numeric(), other.as_numeric()) {
                (Some(a), Some(b)) => a == b,
                _ => self.to_bytes() == other.to_bytes(),
            },
        }
    }

    /// Integer view only when the whole value reads as a number.
    /// Used by loose equality, never logs.
    pub fn as_numeric(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::String(bytes) => match split_numeric(bytes) {
                Some((n, rest)) if rest.iter().all(u8::is_ascii_whitespace) => Some(n),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Parse an optionally signed, whitespace-led decimal prefix.
/// Returns the number and the unparsed tail.
fn split_numeric(bytes: &[u8]) -> Option<(i64, &[u8])> {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace())?;
    let trimmed = &bytes[start..];
    let sign_len = usize::from(matches!(trimmed.first(), Some(b'+') | Some(b'-')));
    let digits = trimmed[sign_len..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    let end = sign_len + digits;
    // Sign and digits are ASCII, so this cannot fail.
    let text = std::str::from_utf8(&trimmed[..end]).ok()?;
    let n = text.parse::<i64>().ok()?;
    Some((n, &trimmed[end..]))
}

fn parse_numeric(bytes: &[u8]) -> Result<i64, CoercionError> {
    let lossy = || String::from_utf8_lossy(bytes).into_owned();
    match split_numeric(bytes) {
        Some((n, rest)) => {
            if !rest.iter().all(u8::is_ascii_whitespace) {
                tracing::warn!(value = %lossy(), "leading-numeric string used as integer");
            }
            Ok(n)
        }
        None => {
            let has_digits = bytes.iter().any(u8::is_ascii_digit);
            let trimmed = String::from_utf8_lossy(bytes);
            let t = trimmed.trim_start();
            let t = t.strip_prefix(['+', '-']).unwrap_or(t);
            if has_digits && t.starts_with(|c: char| c.is_ascii_digit()) {
                Err(CoercionError::OutOfRange(lossy()))
            } else {
                Err(CoercionError::NonNumeric(lossy()))
            }
        }
    }
}

impl std::fmt::Display for Value {
    /// Same text `echo` would produce.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.to_bytes()))
    }
}
