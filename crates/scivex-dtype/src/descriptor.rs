//! Concrete element-type descriptors.
//!
//! A [`Descriptor`] fully specifies one storage layout of a DType: its byte
//! order, item size and alignment. Descriptors are immutable and shared
//! through [`Descr`] handles; the longest holder determines their lifetime.

use core::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::dtype::DType;

/// Shared handle to an immutable [`Descriptor`].
pub type Descr = Arc<Descriptor>;

/// Descriptor list for one method invocation, one entry per operand.
pub type Descrs = SmallVec<[Descr; 3]>;

/// Possibly incomplete descriptor list; `None` means "infer this operand".
pub type GivenDescrs = SmallVec<[Option<Descr>; 3]>;

// ---------------------------------------------------------------------------
// ByteOrder
// ---------------------------------------------------------------------------

/// Byte order of a stored element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
    /// Single-byte or byte-string data where order is meaningless.
    NotApplicable,
}

impl ByteOrder {
    /// The byte order of the running machine.
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::Little;
    /// The byte order of the running machine.
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::Big;

    /// The opposite byte order of the running machine.
    #[cfg(target_endian = "little")]
    pub const SWAPPED: ByteOrder = ByteOrder::Big;
    /// The opposite byte order of the running machine.
    #[cfg(target_endian = "big")]
    pub const SWAPPED: ByteOrder = ByteOrder::Little;

    /// Whether data in this order can be read without swapping.
    #[inline]
    pub fn is_native(self) -> bool {
        self == ByteOrder::NATIVE || self == ByteOrder::NotApplicable
    }

    const fn prefix(self) -> &'static str {
        match self {
            ByteOrder::Little => "<",
            ByteOrder::Big => ">",
            ByteOrder::NotApplicable => "|",
        }
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Size and alignment of one element, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    pub itemsize: usize,
    pub alignment: usize,
}

impl Layout {
    /// A layout whose alignment equals its size (plain numbers).
    pub const fn natural(itemsize: usize) -> Self {
        Self {
            itemsize,
            alignment: itemsize,
        }
    }

    /// A byte-aligned layout of `itemsize` bytes (strings, records).
    pub const fn packed(itemsize: usize) -> Self {
        Self {
            itemsize,
            alignment: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// One concrete, fully specified element type.
#[derive(Clone)]
pub struct Descriptor {
    dtype: DType,
    byte_order: ByteOrder,
    layout: Layout,
}

impl Descriptor {
    /// Create a descriptor of `dtype` in native byte order.
    ///
    /// Single-byte layouts get [`ByteOrder::NotApplicable`].
    pub fn new(dtype: &DType, layout: Layout) -> Descr {
        let byte_order = if layout.itemsize <= 1 || dtype.is_parametric() {
            ByteOrder::NotApplicable
        } else {
            ByteOrder::NATIVE
        };
        Self::with_byte_order(dtype, layout, byte_order)
    }

    /// Create a descriptor with an explicit byte order.
    pub fn with_byte_order(dtype: &DType, layout: Layout, byte_order: ByteOrder) -> Descr {
        Arc::new(Self {
            dtype: dtype.clone(),
            byte_order,
            layout,
        })
    }

    /// A copy of `self` with a different byte order.
    pub fn new_byte_order(&self, byte_order: ByteOrder) -> Descr {
        if self.byte_order == ByteOrder::NotApplicable {
            return Arc::new(self.clone());
        }
        Self::with_byte_order(&self.dtype, self.layout, byte_order)
    }

    /// The DType this descriptor is an instance of.
    #[inline]
    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Size of one element in bytes.
    #[inline]
    pub fn itemsize(&self) -> usize {
        self.layout.itemsize
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout.alignment
    }

    /// Whether the stored bytes can be read without swapping.
    #[inline]
    pub fn is_native(&self) -> bool {
        self.byte_order.is_native()
    }

    /// Whether two descriptors share a bit layout, so a buffer of one may be
    /// reinterpreted as the other without any conversion.
    pub fn is_view_compatible(&self, other: &Descriptor) -> bool {
        self.layout == other.layout && self.is_native() == other.is_native()
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype
            && self.byte_order == other.byte_order
            && self.layout == other.layout
    }
}

impl Eq for Descriptor {}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor({self})")
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_native() {
            f.write_str(self.byte_order.prefix())?;
        }
        if self.dtype.is_parametric() {
            write!(f, "{}[{}]", self.dtype.name(), self.itemsize())
        } else {
            f.write_str(self.dtype.name())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;

    #[test]
    fn test_native_descriptor() {
        let reg = Registry::with_builtins();
        let f8 = reg.dtype("Float64").unwrap();
        let d = Descriptor::new(f8, Layout::natural(8));
        assert_eq!(d.itemsize(), 8);
        assert_eq!(d.byte_order(), ByteOrder::NATIVE);
        assert!(d.is_native());
        assert_eq!(d.to_string(), "Float64");
    }

    #[test]
    fn test_swapped_descriptor() {
        let reg = Registry::with_builtins();
        let f8 = reg.dtype("Float64").unwrap();
        let d = Descriptor::with_byte_order(f8, Layout::natural(8), ByteOrder::SWAPPED);
        assert!(!d.is_native());
        assert!(d.to_string().ends_with("Float64"));
        let native = d.new_byte_order(ByteOrder::NATIVE);
        assert!(native.is_native());
        assert_ne!(*d, *native);
        assert!(!d.is_view_compatible(&native));
    }

    #[test]
    fn test_parametric_display() {
        let reg = Registry::with_builtins();
        let bytes = reg.dtype("Bytes").unwrap();
        let d = Descriptor::new(bytes, Layout::packed(5));
        assert_eq!(d.byte_order(), ByteOrder::NotApplicable);
        assert_eq!(d.to_string(), "Bytes[5]");
        assert_eq!(*d.new_byte_order(ByteOrder::SWAPPED), *d);
    }

    #[test]
    fn test_structural_equality() {
        let reg = Registry::with_builtins();
        let i8_ = reg.dtype("Int64").unwrap();
        let a = Descriptor::new(i8_, Layout::natural(8));
        let b = Descriptor::new(i8_, Layout::natural(8));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
    }
}
