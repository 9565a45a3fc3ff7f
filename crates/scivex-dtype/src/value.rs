//! Host values crossing the `setitem` / `getitem` boundary.

use core::fmt;

/// The type of a host scalar, used for scalar-type claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
    Bytes,
}

/// A single host value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bytes(Vec<u8>),
}

impl Value {
    /// The scalar type of this value.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Value::Bool(_) => ScalarKind::Bool,
            Value::Int(_) => ScalarKind::Int,
            Value::UInt(_) => ScalarKind::UInt,
            Value::Float(_) => ScalarKind::Float,
            Value::Bytes(_) => ScalarKind::Bytes,
        }
    }

    /// Interpret as `i64`, truncating floats and wrapping large unsigned values.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Bool(b) => Some(i64::from(b)),
            Value::Int(v) => Some(v),
            Value::UInt(v) => Some(v as i64),
            Value::Float(v) => Some(v as i64),
            Value::Bytes(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "b{:?}", String::from_utf8_lossy(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(Value::Float(1.0).kind(), ScalarKind::Float);
        assert_eq!(Value::Bytes(b"ab".to_vec()).kind(), ScalarKind::Bytes);
    }

    #[test]
    fn test_lossy_conversions() {
        assert_eq!(Value::Float(3.7).as_i64(), Some(3));
        assert_eq!(Value::Float(-3.7).as_i64(), Some(-3));
        assert_eq!(Value::UInt(u64::MAX).as_i64(), Some(-1));
        assert_eq!(Value::Bytes(vec![]).as_i64(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Bytes(b"hi".to_vec()).to_string(), "b\"hi\"");
        assert_eq!(Value::Int(-4).to_string(), "-4");
    }
}
