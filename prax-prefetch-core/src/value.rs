//! Column values, field types and relation keys.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::fmt;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(SmolStr),
}

impl Value {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of the value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of the value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view of the value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Hashable key for this value, `None` for null.
    pub fn key_part(&self) -> Option<KeyPart> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(KeyPart::Bool(*b)),
            Self::Int(v) => Some(KeyPart::Int(*v)),
            Self::Float(f) => Some(KeyPart::Float(f.to_bits())),
            Self::String(s) => Some(KeyPart::Str(s.clone())),
        }
    }

    /// Total order used for sorting rows: nulls first, then by type, then by value.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).total_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.total_cmp(&(*b as f64)),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::String(_) => 3,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(SmolStr::new(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(SmolStr::from(v))
    }
}

impl From<SmolStr> for Value {
    fn from(v: SmolStr) -> Self {
        Self::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// Declared type of a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FieldType {
    /// 64-bit integer.
    #[default]
    Int,
    /// 64-bit float.
    Float,
    /// Boolean.
    Bool,
    /// Text.
    String,
}

/// 2^63: floats in `[-2^63, 2^63)` convert to `i64` without saturating.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

impl FieldType {
    /// Convert a value to this type, as a database would when comparing columns
    /// of different declared types. Returns `Null` when no conversion exists.
    ///
    /// ```rust
    /// use prax_prefetch_core::{FieldType, Value};
    ///
    /// assert_eq!(FieldType::Int.coerce(&Value::from("42")), Value::Int(42));
    /// assert_eq!(FieldType::String.coerce(&Value::Int(7)), Value::from("7"));
    /// ```
    pub fn coerce(&self, value: &Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::Bool, Value::Bool(_))
            | (Self::String, Value::String(_)) => value.clone(),
            (Self::Int, Value::String(s)) => s.trim().parse().map(Value::Int).unwrap_or(Value::Null),
            (Self::Int, Value::Float(f)) if f.fract() == 0.0 => {
                if (-I64_BOUND..I64_BOUND).contains(f) {
                    Value::Int(*f as i64)
                } else {
                    value.clone()
                }
            }
            (Self::Int, Value::Bool(b)) => Value::Int(i64::from(*b)),
            (Self::Float, Value::Int(v)) => Value::Float(*v as f64),
            (Self::Float, Value::String(s)) => {
                s.trim().parse().map(Value::Float).unwrap_or(Value::Null)
            }
            (Self::String, other) => Value::String(SmolStr::new(other.to_string())),
            _ => Value::Null,
        }
    }
}

/// Hashable component of a relation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    /// Boolean key.
    Bool(bool),
    /// Integer key.
    Int(i64),
    /// Float key, compared bitwise.
    Float(u64),
    /// String key.
    Str(SmolStr),
}

/// Association key matching fetched children to their parents.
///
/// Plain relations use a single part; generic relations pair the content
/// type with the object id.
pub type RelKey = SmallVec<[KeyPart; 2]>;

/// Build a single-part key from a value, `None` when the value is null.
pub fn rel_key(value: &Value) -> Option<RelKey> {
    value.key_part().map(|part| smallvec::smallvec![part])
}
