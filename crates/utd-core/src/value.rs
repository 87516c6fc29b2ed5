//! Cell values held by [`Table`](crate::table::Table) columns.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single table cell.
///
/// Serialized untagged so a column reads as a plain JSON array
/// (`[1, "a", null, 2.5]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Hashable form of a non-missing [`Value`], used for joins and mappings.
///
/// Integral floats collapse onto `Int` so `1` and `1.0` join each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
}

impl Value {
    #[must_use]
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Missing: `Null` or a floating NaN.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the cell. Strings are parsed leniently (surrounding whitespace ignored).
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) if !f.is_nan() => Some(*f),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Join key for this cell; `None` for missing values, which never match.
    #[must_use]
    pub fn key(&self) -> Option<ValueKey> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(ValueKey::Bool(*b)),
            Self::Int(i) => Some(ValueKey::Int(*i)),
            Self::Float(f) if f.is_nan() => None,
            Self::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some(ValueKey::Int(*f as i64))
            }
            Self::Float(f) => Some(ValueKey::Float(f.to_bits())),
            Self::Str(s) => Some(ValueKey::Str(s.clone())),
        }
    }

    /// Display text used by string-based operations such as level truncation.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_covers_null_and_nan() {
        assert!(Value::Null.is_missing());
        assert!(Value::Float(f64::NAN).is_missing());
        assert!(!Value::str("").is_missing());
        assert!(Value::Float(f64::NAN).key().is_none());
    }

    #[test]
    fn integral_float_joins_int() {
        assert_eq!(Value::Float(3.0).key(), Value::Int(3).key());
        assert_ne!(Value::Float(3.5).key(), Value::Int(3).key());
        assert_ne!(Value::str("3").key(), Value::Int(3).key());
    }

    #[test]
    fn untagged_json_shape() {
        let values = vec![Value::Int(1), Value::str("a"), Value::Null, Value::Float(2.5)];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[1,"a",null,2.5]"#);
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }
}
