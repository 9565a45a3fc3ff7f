//! Native element types backing the built-in numeric DTypes.
//!
//! Elements are read and written through native-endian byte copies, so
//! every loop built on them tolerates unaligned buffers.

use crate::value::Value;

/// A fixed-size native element stored in a byte buffer.
pub(crate) trait Element: Copy + PartialOrd + Send + Sync + 'static {
    /// Size of one element in bytes.
    const SIZE: usize;
    const IS_FLOAT: bool;

    /// The smallest representable value (`-inf` for floats).
    const MIN: Self;

    /// Read one native-endian element from the start of `bytes`.
    fn read(bytes: &[u8]) -> Self;

    /// Write `self` native-endian into the start of `bytes`.
    fn write(self, bytes: &mut [u8]);

    fn to_f64(self) -> f64;
    fn to_i64(self) -> i64;
    fn from_f64(v: f64) -> Self;
    fn from_i64(v: i64) -> Self;

    fn to_value(self) -> Value;

    fn add(self, other: Self) -> Self;
    fn mul(self, other: Self) -> Self;

    /// The larger of two values; NaN propagates for floats.
    fn max_elem(self, other: Self) -> Self;

    /// Convert from another element type the way a C cast would.
    #[inline]
    fn convert<S: Element>(src: S) -> Self {
        if Self::IS_FLOAT || S::IS_FLOAT {
            Self::from_f64(src.to_f64())
        } else {
            Self::from_i64(src.to_i64())
        }
    }

    /// Lossy conversion from a host value; `None` for non-numeric values.
    #[inline]
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(Self::from_f64(*v)),
            Value::Bytes(_) => None,
            other => other.as_i64().map(Self::from_i64),
        }
    }
}

// ===========================================================================
// Macro implementations
// ===========================================================================

macro_rules! impl_element_int {
    ($ty:ty) => {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_possible_wrap,
            clippy::cast_precision_loss,
            clippy::cast_lossless,
            clippy::unnecessary_cast
        )]
        impl Element for $ty {
            const SIZE: usize = core::mem::size_of::<$ty>();
            const IS_FLOAT: bool = false;
            const MIN: Self = <$ty>::MIN;

            #[inline]
            fn read(bytes: &[u8]) -> Self {
                let mut buf = [0u8; core::mem::size_of::<$ty>()];
                buf.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_ne_bytes(buf)
            }
            #[inline]
            fn write(self, bytes: &mut [u8]) {
                bytes[..Self::SIZE].copy_from_slice(&self.to_ne_bytes());
            }
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
            #[inline]
            fn to_i64(self) -> i64 {
                self as i64
            }
            #[inline]
            fn from_f64(v: f64) -> Self {
                v as Self
            }
            #[inline]
            fn from_i64(v: i64) -> Self {
                v as Self
            }
            #[inline]
            fn to_value(self) -> Value {
                Value::Int(self as i64)
            }
            #[inline]
            fn add(self, other: Self) -> Self {
                self.wrapping_add(other)
            }
            #[inline]
            fn mul(self, other: Self) -> Self {
                self.wrapping_mul(other)
            }
            #[inline]
            fn max_elem(self, other: Self) -> Self {
                if self >= other { self } else { other }
            }
        }
    };
}

impl_element_int!(i32);
impl_element_int!(i64);

macro_rules! impl_element_float {
    ($ty:ty) => {
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_precision_loss,
            clippy::cast_lossless,
            clippy::unnecessary_cast
        )]
        impl Element for $ty {
            const SIZE: usize = core::mem::size_of::<$ty>();
            const IS_FLOAT: bool = true;
            const MIN: Self = <$ty>::NEG_INFINITY;

            #[inline]
            fn read(bytes: &[u8]) -> Self {
                let mut buf = [0u8; core::mem::size_of::<$ty>()];
                buf.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_ne_bytes(buf)
            }
            #[inline]
            fn write(self, bytes: &mut [u8]) {
                bytes[..Self::SIZE].copy_from_slice(&self.to_ne_bytes());
            }
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
            #[inline]
            fn to_i64(self) -> i64 {
                self as i64
            }
            #[inline]
            fn from_f64(v: f64) -> Self {
                v as Self
            }
            #[inline]
            fn from_i64(v: i64) -> Self {
                v as Self
            }
            #[inline]
            fn to_value(self) -> Value {
                Value::Float(self as f64)
            }
            #[inline]
            fn add(self, other: Self) -> Self {
                self + other
            }
            #[inline]
            fn mul(self, other: Self) -> Self {
                self * other
            }
            #[inline]
            fn max_elem(self, other: Self) -> Self {
                if self.is_nan() || self >= other { self } else { other }
            }
        }
    };
}

impl_element_float!(f32);
impl_element_float!(f64);

impl Element for bool {
    const SIZE: usize = 1;
    const IS_FLOAT: bool = false;
    const MIN: Self = false;

    #[inline]
    fn read(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
    #[inline]
    fn write(self, bytes: &mut [u8]) {
        bytes[0] = u8::from(self);
    }
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(u8::from(self))
    }
    #[inline]
    fn to_i64(self) -> i64 {
        i64::from(self)
    }
    #[inline]
    #[allow(clippy::float_cmp)]
    fn from_f64(v: f64) -> Self {
        v != 0.0
    }
    #[inline]
    fn from_i64(v: i64) -> Self {
        v != 0
    }
    #[inline]
    fn to_value(self) -> Value {
        Value::Bool(self)
    }
    #[inline]
    fn add(self, other: Self) -> Self {
        self || other
    }
    #[inline]
    fn mul(self, other: Self) -> Self {
        self && other
    }
    #[inline]
    fn max_elem(self, other: Self) -> Self {
        self || other
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_unaligned() {
        let mut buf = [0u8; 9];
        1.5f64.write(&mut buf[1..]);
        assert_eq!(f64::read(&buf[1..]), 1.5);
    }

    #[test]
    fn test_convert() {
        assert_eq!(i32::convert(3.9f64), 3);
        assert_eq!(f64::convert(7i64), 7.0);
        assert_eq!(i32::convert(i64::from(i32::MAX) + 1), i32::MIN);
        assert!(bool::convert(2i32));
        assert_eq!(f32::convert(true), 1.0);
    }

    #[test]
    fn test_from_value_is_lossy() {
        assert_eq!(i64::from_value(&Value::Float(3.7)), Some(3));
        assert_eq!(i32::from_value(&Value::UInt(u64::MAX)), Some(-1));
        assert_eq!(f64::from_value(&Value::Bool(true)), Some(1.0));
        assert_eq!(f64::from_value(&Value::Bytes(vec![1])), None);
    }

    #[test]
    fn test_maximum_propagates_nan() {
        assert!(f64::NAN.max_elem(1.0).is_nan());
        assert!(1.0f64.max_elem(f64::NAN).is_nan());
        assert_eq!(3i64.max_elem(-2), 3);
    }

    #[test]
    fn test_wrapping_int_ops() {
        assert_eq!(Element::add(i32::MAX, 1), i32::MIN);
        assert_eq!(Element::mul(3i64, 4), 12);
    }
}
