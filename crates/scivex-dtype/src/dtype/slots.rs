//! The DType behavior table.
//!
//! Behaviors are registered as [`DTypeSlot`] values. Each variant carries
//! its implementation and maps to a stable numeric identifier; identifiers
//! this version does not know arrive as [`DTypeSlot::Unknown`] and are
//! skipped.

use std::sync::Arc;

use tracing::debug;

use super::DType;
use crate::descriptor::Descr;
use crate::error::{DTypeError, Result};
use crate::value::{ScalarKind, Value};

/// Stable identifiers of the DType slots.
pub mod ids {
    pub const DISCOVER_DESCR_FROM_PYOBJECT: u32 = 1;
    pub const IS_KNOWN_SCALAR_TYPE: u32 = 2;
    pub const DEFAULT_DESCR: u32 = 3;
    pub const COMMON_DTYPE: u32 = 4;
    pub const COMMON_INSTANCE: u32 = 5;
    pub const ENSURE_CANONICAL: u32 = 6;
    pub const SETITEM: u32 = 7;
    pub const GETITEM: u32 = 8;
}

/// Result of a `common_dtype` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonDType {
    /// Both classes promote to this class.
    Common(DType),
    /// No rule from this side; the caller tries the reverse order.
    NotImplemented,
}

pub type DiscoverDescrFn = Arc<dyn Fn(&DType, &Value) -> Result<Descr> + Send + Sync>;
pub type IsKnownScalarTypeFn = Arc<dyn Fn(&DType, ScalarKind) -> bool + Send + Sync>;
pub type DefaultDescrFn = Arc<dyn Fn(&DType) -> Result<Descr> + Send + Sync>;
pub type CommonDTypeFn = Arc<dyn Fn(&DType, &DType) -> Result<CommonDType> + Send + Sync>;
pub type CommonInstanceFn = Arc<dyn Fn(&Descr, &Descr) -> Result<Descr> + Send + Sync>;
pub type EnsureCanonicalFn = Arc<dyn Fn(&Descr) -> Result<Descr> + Send + Sync>;
pub type SetItemFn = Arc<dyn Fn(&Descr, &Value, &mut [u8]) -> Result<()> + Send + Sync>;
pub type GetItemFn = Arc<dyn Fn(&Descr, &[u8]) -> Result<Value> + Send + Sync>;

/// One entry of a DType registration record.
#[derive(Clone)]
pub enum DTypeSlot {
    DiscoverDescrFromPyObject(DiscoverDescrFn),
    IsKnownScalarType(IsKnownScalarTypeFn),
    DefaultDescr(DefaultDescrFn),
    CommonDType(CommonDTypeFn),
    CommonInstance(CommonInstanceFn),
    EnsureCanonical(EnsureCanonicalFn),
    SetItem(SetItemFn),
    GetItem(GetItemFn),
    /// A slot identifier from a newer record format.
    Unknown(u32),
}

impl DTypeSlot {
    /// The stable identifier of this slot.
    pub const fn id(&self) -> u32 {
        match self {
            Self::DiscoverDescrFromPyObject(_) => ids::DISCOVER_DESCR_FROM_PYOBJECT,
            Self::IsKnownScalarType(_) => ids::IS_KNOWN_SCALAR_TYPE,
            Self::DefaultDescr(_) => ids::DEFAULT_DESCR,
            Self::CommonDType(_) => ids::COMMON_DTYPE,
            Self::CommonInstance(_) => ids::COMMON_INSTANCE,
            Self::EnsureCanonical(_) => ids::ENSURE_CANONICAL,
            Self::SetItem(_) => ids::SETITEM,
            Self::GetItem(_) => ids::GETITEM,
            Self::Unknown(id) => *id,
        }
    }

    pub fn discover_descr<F>(f: F) -> Self
    where
        F: Fn(&DType, &Value) -> Result<Descr> + Send + Sync + 'static,
    {
        Self::DiscoverDescrFromPyObject(Arc::new(f))
    }

    pub fn is_known_scalar_type<F>(f: F) -> Self
    where
        F: Fn(&DType, ScalarKind) -> bool + Send + Sync + 'static,
    {
        Self::IsKnownScalarType(Arc::new(f))
    }

    pub fn default_descr<F>(f: F) -> Self
    where
        F: Fn(&DType) -> Result<Descr> + Send + Sync + 'static,
    {
        Self::DefaultDescr(Arc::new(f))
    }

    pub fn common_dtype<F>(f: F) -> Self
    where
        F: Fn(&DType, &DType) -> Result<CommonDType> + Send + Sync + 'static,
    {
        Self::CommonDType(Arc::new(f))
    }

    pub fn common_instance<F>(f: F) -> Self
    where
        F: Fn(&Descr, &Descr) -> Result<Descr> + Send + Sync + 'static,
    {
        Self::CommonInstance(Arc::new(f))
    }

    pub fn ensure_canonical<F>(f: F) -> Self
    where
        F: Fn(&Descr) -> Result<Descr> + Send + Sync + 'static,
    {
        Self::EnsureCanonical(Arc::new(f))
    }

    pub fn setitem<F>(f: F) -> Self
    where
        F: Fn(&Descr, &Value, &mut [u8]) -> Result<()> + Send + Sync + 'static,
    {
        Self::SetItem(Arc::new(f))
    }

    pub fn getitem<F>(f: F) -> Self
    where
        F: Fn(&Descr, &[u8]) -> Result<Value> + Send + Sync + 'static,
    {
        Self::GetItem(Arc::new(f))
    }
}

/// The resolved behavior table of one DType. Absent entries fall back to the
/// structural defaults implemented on [`DType`].
#[derive(Clone, Default)]
pub(crate) struct DTypeSlotTable {
    pub(crate) discover_descr: Option<DiscoverDescrFn>,
    pub(crate) is_known_scalar_type: Option<IsKnownScalarTypeFn>,
    pub(crate) default_descr: Option<DefaultDescrFn>,
    pub(crate) common_dtype: Option<CommonDTypeFn>,
    pub(crate) common_instance: Option<CommonInstanceFn>,
    pub(crate) ensure_canonical: Option<EnsureCanonicalFn>,
    pub(crate) setitem: Option<SetItemFn>,
    pub(crate) getitem: Option<GetItemFn>,
}

impl DTypeSlotTable {
    pub(crate) fn from_slots(name: &str, slots: Vec<DTypeSlot>) -> Result<Self> {
        let mut table = Self::default();
        for slot in slots {
            let id = slot.id();
            let filled = match slot {
                DTypeSlot::DiscoverDescrFromPyObject(f) => {
                    table.discover_descr.replace(f).is_some()
                }
                DTypeSlot::IsKnownScalarType(f) => table.is_known_scalar_type.replace(f).is_some(),
                DTypeSlot::DefaultDescr(f) => table.default_descr.replace(f).is_some(),
                DTypeSlot::CommonDType(f) => table.common_dtype.replace(f).is_some(),
                DTypeSlot::CommonInstance(f) => table.common_instance.replace(f).is_some(),
                DTypeSlot::EnsureCanonical(f) => table.ensure_canonical.replace(f).is_some(),
                DTypeSlot::SetItem(f) => table.setitem.replace(f).is_some(),
                DTypeSlot::GetItem(f) => table.getitem.replace(f).is_some(),
                DTypeSlot::Unknown(id) => {
                    debug!(dtype = name, slot = id, "ignoring unknown DType slot");
                    false
                }
            };
            if filled {
                return Err(DTypeError::invalid_spec(
                    name,
                    format!("slot {id} given more than once"),
                ));
            }
        }
        Ok(table)
    }

    /// Whether the slot with identifier `id` was supplied.
    pub(crate) fn has(&self, id: u32) -> bool {
        match id {
            ids::DISCOVER_DESCR_FROM_PYOBJECT => self.discover_descr.is_some(),
            ids::IS_KNOWN_SCALAR_TYPE => self.is_known_scalar_type.is_some(),
            ids::DEFAULT_DESCR => self.default_descr.is_some(),
            ids::COMMON_DTYPE => self.common_dtype.is_some(),
            ids::COMMON_INSTANCE => self.common_instance.is_some(),
            ids::ENSURE_CANONICAL => self.ensure_canonical.is_some(),
            ids::SETITEM => self.setitem.is_some(),
            ids::GETITEM => self.getitem.is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_ids_are_stable() {
        let slot = DTypeSlot::getitem(|_, _| Ok(Value::Int(0)));
        assert_eq!(slot.id(), 8);
        let slot = DTypeSlot::common_instance(|a, _| Ok(a.clone()));
        assert_eq!(slot.id(), 5);
        assert_eq!(DTypeSlot::Unknown(42).id(), 42);
    }

    #[test]
    fn test_unknown_slots_are_ignored() {
        let table = DTypeSlotTable::from_slots(
            "t",
            vec![
                DTypeSlot::Unknown(99),
                DTypeSlot::getitem(|_, _| Ok(Value::Int(0))),
            ],
        )
        .unwrap();
        assert!(table.has(ids::GETITEM));
        assert!(!table.has(ids::SETITEM));
        assert!(!table.has(99));
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let r = DTypeSlotTable::from_slots(
            "t",
            vec![
                DTypeSlot::getitem(|_, _| Ok(Value::Int(0))),
                DTypeSlot::getitem(|_, _| Ok(Value::Int(1))),
            ],
        );
        assert!(matches!(r, Err(DTypeError::InvalidSpec { .. })));
    }
}
