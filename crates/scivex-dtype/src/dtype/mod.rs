//! DType classes: the "type of a descriptor type".
//!
//! A [`DType`] is a shared handle to a [`DTypeMeta`], which holds the
//! behavior shared by every [`Descriptor`] of one element-type family:
//! scalar-type claims, canonicalization, promotion and the single-element
//! boundary conversions. Classes are created once at registration and live
//! for the rest of the process.
//!
//! Every behavior is optional. When a slot is missing, the structural
//! default implied by the class flags is used:
//!
//! | Behavior | Default |
//! |----------|---------|
//! | `discover_descr_from_pyobject` | `default_descr` when the scalar type is claimed |
//! | `is_known_scalar_type` | matches the class's own scalar type |
//! | `default_descr` | the singleton |
//! | `common_dtype` | identical classes only |
//! | `common_instance` | equal canonical instances of non-parametric classes |
//! | `ensure_canonical` | native byte order |
//! | `setitem` / `getitem` | none, reported as [`DTypeError::MissingSlot`] |

pub mod slots;

use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::Deref;
use std::sync::{Arc, OnceLock};

pub use slots::{CommonDType, DTypeSlot};

use self::slots::DTypeSlotTable;
use crate::config::API_VERSION;
use crate::descriptor::{ByteOrder, Descr, Descriptor, Layout};
use crate::error::{DTypeError, Result};
use crate::flags::DTypeFlags;
use crate::method::ArrayMethodSpec;
use crate::value::{ScalarKind, Value};

// ---------------------------------------------------------------------------
// DTypeSpec — the registration record
// ---------------------------------------------------------------------------

/// Registration record for a new DType.
///
/// Casts listed in [`casts`](Self::casts) may use `None` in their dtype list
/// to refer to the DType being created.
#[derive(Clone)]
pub struct DTypeSpec {
    pub name: String,
    /// Legacy numeric type tag, usually absent.
    pub type_num: Option<i32>,
    pub scalar_type: Option<ScalarKind>,
    pub flags: DTypeFlags,
    /// Layout of the singleton instance; absent for abstract and fully
    /// parametric classes.
    pub singleton: Option<Layout>,
    pub slots: Vec<DTypeSlot>,
    pub casts: Vec<ArrayMethodSpec>,
    pub api_version: u32,
}

impl DTypeSpec {
    /// A record with no flags, no slots and no casts.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_num: None,
            scalar_type: None,
            flags: DTypeFlags::empty(),
            singleton: None,
            slots: Vec::new(),
            casts: Vec::new(),
            api_version: API_VERSION,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: DTypeFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_type_num(mut self, type_num: i32) -> Self {
        self.type_num = Some(type_num);
        self
    }

    #[must_use]
    pub fn with_scalar_type(mut self, scalar_type: ScalarKind) -> Self {
        self.scalar_type = Some(scalar_type);
        self
    }

    #[must_use]
    pub fn with_singleton(mut self, layout: Layout) -> Self {
        self.singleton = Some(layout);
        self
    }

    #[must_use]
    pub fn with_slot(mut self, slot: DTypeSlot) -> Self {
        self.slots.push(slot);
        self
    }

    #[must_use]
    pub fn with_cast(mut self, cast: ArrayMethodSpec) -> Self {
        self.casts.push(cast);
        self
    }
}

// ---------------------------------------------------------------------------
// DTypeMeta
// ---------------------------------------------------------------------------

/// Class-level data of a DType.
pub struct DTypeMeta {
    name: String,
    type_num: Option<i32>,
    scalar_type: Option<ScalarKind>,
    flags: DTypeFlags,
    singleton: OnceLock<Descr>,
    slots: DTypeSlotTable,
}

impl DTypeMeta {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Legacy numeric type tag, if any.
    #[inline]
    pub fn type_num(&self) -> Option<i32> {
        self.type_num
    }

    /// The host scalar type instances of this class map to.
    #[inline]
    pub fn scalar_type(&self) -> Option<ScalarKind> {
        self.scalar_type
    }

    #[inline]
    pub fn flags(&self) -> DTypeFlags {
        self.flags
    }

    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(DTypeFlags::ABSTRACT)
    }

    #[inline]
    pub fn is_parametric(&self) -> bool {
        self.flags.contains(DTypeFlags::PARAMETRIC)
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.flags.contains(DTypeFlags::NUMERIC)
    }

    /// The default instance, absent for abstract and fully parametric classes.
    #[inline]
    pub fn singleton(&self) -> Option<&Descr> {
        self.singleton.get()
    }

    /// Whether the slot with stable identifier `id` was registered.
    pub fn implements(&self, id: u32) -> bool {
        self.slots.has(id)
    }
}

// ---------------------------------------------------------------------------
// DType — shared class handle
// ---------------------------------------------------------------------------

/// Shared handle to a DType class. Equality and hashing are by identity.
#[derive(Clone)]
pub struct DType(Arc<DTypeMeta>);

impl DType {
    /// Build a class from its registration record. Casts are not looked at.
    pub(crate) fn from_spec(spec: &DTypeSpec) -> Result<Self> {
        let name = spec.name.as_str();
        if spec.flags.contains(DTypeFlags::ABSTRACT) && spec.singleton.is_some() {
            return Err(DTypeError::invalid_spec(
                name,
                "abstract DTypes cannot have a singleton",
            ));
        }
        let slots = DTypeSlotTable::from_slots(name, spec.slots.clone())?;
        if !spec.flags.contains(DTypeFlags::ABSTRACT)
            && spec.singleton.is_none()
            && slots.default_descr.is_none()
        {
            return Err(DTypeError::invalid_spec(
                name,
                "a DType without singleton must provide `default_descr`",
            ));
        }

        let dtype = DType(Arc::new(DTypeMeta {
            name: spec.name.clone(),
            type_num: spec.type_num,
            scalar_type: spec.scalar_type,
            flags: spec.flags,
            singleton: OnceLock::new(),
            slots,
        }));
        // The singleton holds its class, so classes are never freed.
        if let Some(layout) = spec.singleton {
            let _ = dtype.0.singleton.set(Descriptor::new(&dtype, layout));
        }
        Ok(dtype)
    }

    /// Whether two handles refer to the same class.
    #[inline]
    pub fn same(&self, other: &DType) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether `descr` is a valid instance of this class. Instances of a
    /// non-parametric class share the singleton's layout.
    pub fn fits(&self, descr: &Descriptor) -> bool {
        descr.dtype() == self
            && (self.is_parametric()
                || self
                    .singleton()
                    .is_none_or(|s| s.layout() == descr.layout()))
    }

    fn check_fits(&self, descr: &Descriptor) -> Result<()> {
        if self.fits(descr) {
            return Ok(());
        }
        Err(DTypeError::InvalidDescriptor {
            dtype: self.name().to_owned(),
            reason: format!(
                "{descr} with {}-byte layout is not an instance of this class",
                descr.itemsize()
            ),
        })
    }

    fn check_owns(&self, descr: &Descriptor, what: &str) -> Result<()> {
        if descr.dtype() != self {
            return Err(DTypeError::InvalidValue {
                dtype: self.name().to_owned(),
                reason: format!("{what} returned a descriptor of {}", descr.dtype()),
            });
        }
        self.check_fits(descr)
    }

    fn check_buffer(descr: &Descriptor, len: usize) -> Result<()> {
        if len < descr.itemsize() {
            return Err(DTypeError::BufferTooSmall {
                needed: descr.itemsize(),
                got: len,
            });
        }
        Ok(())
    }

    /// Infer the most specific descriptor of this class able to hold `value`.
    pub fn discover_descr_from_value(&self, value: &Value) -> Result<Descr> {
        let descr = match &self.slots.discover_descr {
            Some(f) => f(self, value)?,
            None if self.is_known_scalar_type(value.kind()) => self.default_descr()?,
            None => {
                return Err(DTypeError::InvalidValue {
                    dtype: self.name().to_owned(),
                    reason: format!("cannot hold {value}"),
                });
            }
        };
        self.check_owns(&descr, "discover_descr_from_pyobject")?;
        Ok(descr)
    }

    /// Whether this class claims host scalars of kind `scalar`.
    pub fn is_known_scalar_type(&self, scalar: ScalarKind) -> bool {
        match &self.slots.is_known_scalar_type {
            Some(f) => f(self, scalar),
            None => self.scalar_type == Some(scalar),
        }
    }

    /// The canonical default descriptor of this class.
    pub fn default_descr(&self) -> Result<Descr> {
        let descr = match (&self.slots.default_descr, self.singleton()) {
            (Some(f), _) => f(self)?,
            (None, Some(singleton)) => singleton.clone(),
            (None, None) => {
                return Err(DTypeError::MissingSlot {
                    dtype: self.name().to_owned(),
                    slot: "default_descr",
                });
            }
        };
        self.check_owns(&descr, "default_descr")?;
        Ok(descr)
    }

    /// Query this class's promotion rule against `other`.
    pub fn common_dtype(&self, other: &DType) -> Result<CommonDType> {
        match &self.slots.common_dtype {
            Some(f) => f(self, other),
            None if self == other => Ok(CommonDType::Common(self.clone())),
            None => Ok(CommonDType::NotImplemented),
        }
    }

    /// A descriptor of this class able to represent both `d1` and `d2`.
    pub fn common_instance(&self, d1: &Descr, d2: &Descr) -> Result<Descr> {
        if d1.dtype() != self || d2.dtype() != self {
            return Err(DTypeError::InvalidValue {
                dtype: self.name().to_owned(),
                reason: format!("common_instance of {d1} and {d2}"),
            });
        }
        let descr = match &self.slots.common_instance {
            Some(f) => f(d1, d2)?,
            None => {
                let c1 = self.ensure_canonical(d1)?;
                let c2 = self.ensure_canonical(d2)?;
                if self.is_parametric() || c1 != c2 {
                    return Err(DTypeError::MissingSlot {
                        dtype: self.name().to_owned(),
                        slot: "common_instance",
                    });
                }
                c1
            }
        };
        self.check_owns(&descr, "common_instance")?;
        Ok(descr)
    }

    /// The canonical descriptor equivalent to `descr`. Idempotent.
    pub fn ensure_canonical(&self, descr: &Descr) -> Result<Descr> {
        self.check_fits(descr)?;
        match &self.slots.ensure_canonical {
            Some(f) => {
                let canonical = f(descr)?;
                self.check_owns(&canonical, "ensure_canonical")?;
                Ok(canonical)
            }
            None if descr.is_native() => Ok(descr.clone()),
            None => Ok(descr.new_byte_order(ByteOrder::NATIVE)),
        }
    }

    /// Store `value` into the element at the start of `data`.
    ///
    /// Unlike registered casts this may be lossy: storing `3.7` into an
    /// integer descriptor truncates rather than failing.
    pub fn setitem(&self, descr: &Descr, value: &Value, data: &mut [u8]) -> Result<()> {
        let Some(f) = &self.slots.setitem else {
            return Err(DTypeError::MissingSlot {
                dtype: self.name().to_owned(),
                slot: "setitem",
            });
        };
        self.check_fits(descr)?;
        Self::check_buffer(descr, data.len())?;
        f(descr, value, data)
    }

    /// Read the element at the start of `data` as a host value.
    pub fn getitem(&self, descr: &Descr, data: &[u8]) -> Result<Value> {
        let Some(f) = &self.slots.getitem else {
            return Err(DTypeError::MissingSlot {
                dtype: self.name().to_owned(),
                slot: "getitem",
            });
        };
        self.check_fits(descr)?;
        Self::check_buffer(descr, data.len())?;
        f(descr, data)
    }
}

impl Deref for DType {
    type Target = DTypeMeta;

    #[inline]
    fn deref(&self) -> &DTypeMeta {
        &self.0
    }
}

impl PartialEq for DType {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for DType {}

impl Hash for DType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DType({})", self.name)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(name: &str) -> DType {
        DType::from_spec(&DTypeSpec::new(name).with_singleton(Layout::natural(4))).unwrap()
    }

    #[test]
    fn test_identity_equality() {
        let a = plain("A");
        let b = plain("A");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_singleton_is_default() {
        let a = plain("A");
        let d = a.default_descr().unwrap();
        assert!(Arc::ptr_eq(&d, a.singleton().unwrap()));
        assert_eq!(d.dtype(), &a);
    }

    #[test]
    fn test_abstract_with_singleton_rejected() {
        let spec = DTypeSpec::new("X")
            .with_flags(DTypeFlags::ABSTRACT)
            .with_singleton(Layout::natural(4));
        assert!(DType::from_spec(&spec).is_err());
    }

    #[test]
    fn test_missing_default_rejected() {
        assert!(DType::from_spec(&DTypeSpec::new("Y")).is_err());
        let abstract_ = DType::from_spec(&DTypeSpec::new("Z").with_flags(DTypeFlags::ABSTRACT));
        assert!(abstract_.unwrap().default_descr().is_err());
    }

    #[test]
    fn test_default_common_dtype() {
        let a = plain("A");
        let b = plain("B");
        assert_eq!(a.common_dtype(&a).unwrap(), CommonDType::Common(a.clone()));
        assert_eq!(a.common_dtype(&b).unwrap(), CommonDType::NotImplemented);
    }

    #[test]
    fn test_default_ensure_canonical() {
        let a = plain("A");
        let swapped = a.singleton().unwrap().new_byte_order(ByteOrder::SWAPPED);
        let c = a.ensure_canonical(&swapped).unwrap();
        assert!(c.is_native());
        assert_eq!(a.ensure_canonical(&c).unwrap(), c);
    }

    #[test]
    fn test_default_common_instance() {
        let a = plain("A");
        let d = a.default_descr().unwrap();
        let swapped = d.new_byte_order(ByteOrder::SWAPPED);
        assert_eq!(a.common_instance(&d, &swapped).unwrap(), d);
        let b = plain("B");
        assert!(a.common_instance(&d, &b.default_descr().unwrap()).is_err());
    }

    #[test]
    fn test_missing_items() {
        let a = plain("A");
        let d = a.default_descr().unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            a.setitem(&d, &Value::Int(1), &mut buf),
            Err(DTypeError::MissingSlot { slot: "setitem", .. })
        ));
        assert!(a.getitem(&d, &buf).is_err());
    }

    #[test]
    fn test_discover_rejects_foreign_descriptor() {
        let other = plain("Other");
        let spec = DTypeSpec::new("Liar")
            .with_singleton(Layout::natural(4))
            .with_slot(DTypeSlot::discover_descr(move |_, _| other.default_descr()));
        let liar = DType::from_spec(&spec).unwrap();
        assert!(liar.discover_descr_from_value(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_discover_uses_scalar_claim() {
        let spec = DTypeSpec::new("I")
            .with_scalar_type(ScalarKind::Int)
            .with_singleton(Layout::natural(8));
        let i = DType::from_spec(&spec).unwrap();
        assert!(i.discover_descr_from_value(&Value::Int(3)).is_ok());
        assert!(i.discover_descr_from_value(&Value::Float(3.0)).is_err());
    }
}
