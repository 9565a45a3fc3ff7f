//! Built-in numeric DTypes and the casts between them.

use std::sync::{Arc, OnceLock};

use smallvec::smallvec;

use super::element::Element;
use crate::casting::Casting;
use crate::descriptor::{Descr, Layout};
use crate::dtype::{CommonDType, DType, DTypeSlot, DTypeSpec};
use crate::error::{DTypeError, Result};
use crate::flags::{DTypeFlags, MethodFlags};
use crate::method::{
    ArrayMethod, ArrayMethodSpec, AuxData, LoopRequest, LoopSelection, MethodContext, MethodSlot,
    Resolution, ResolvedDescriptors, StridedLoop,
};
use crate::registry::{CAST, Registry};
use crate::value::{ScalarKind, Value};

/// The built-in numeric element families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Numeric {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

/// Registered classes, indexed by [`Numeric::index`].
pub(crate) type NumericTable = [DType; 5];

/// Expand `$body` with `$T` bound to the element type of `$kind`.
macro_rules! with_element {
    ($kind:expr, $T:ident => $body:expr) => {
        match $kind {
            Numeric::Bool => {
                type $T = bool;
                $body
            }
            Numeric::Int32 => {
                type $T = i32;
                $body
            }
            Numeric::Int64 => {
                type $T = i64;
                $body
            }
            Numeric::Float32 => {
                type $T = f32;
                $body
            }
            Numeric::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}

pub(crate) use with_element;

impl Numeric {
    pub(crate) const ALL: [Numeric; 5] = [
        Numeric::Bool,
        Numeric::Int32,
        Numeric::Int64,
        Numeric::Float32,
        Numeric::Float64,
    ];

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            Numeric::Bool => "Bool",
            Numeric::Int32 => "Int32",
            Numeric::Int64 => "Int64",
            Numeric::Float32 => "Float32",
            Numeric::Float64 => "Float64",
        }
    }

    /// Legacy type tag.
    const fn type_num(self) -> i32 {
        match self {
            Numeric::Bool => 0,
            Numeric::Int32 => 5,
            Numeric::Int64 => 9,
            Numeric::Float32 => 11,
            Numeric::Float64 => 12,
        }
    }

    const fn itemsize(self) -> usize {
        match self {
            Numeric::Bool => 1,
            Numeric::Int32 | Numeric::Float32 => 4,
            Numeric::Int64 | Numeric::Float64 => 8,
        }
    }

    const fn scalar_type(self) -> Option<ScalarKind> {
        match self {
            Numeric::Bool => Some(ScalarKind::Bool),
            Numeric::Int64 => Some(ScalarKind::Int),
            Numeric::Float64 => Some(ScalarKind::Float),
            Numeric::Int32 | Numeric::Float32 => None,
        }
    }

    const fn is_float(self) -> bool {
        matches!(self, Numeric::Float32 | Numeric::Float64)
    }

    /// Safety of casting a value of `self` into `to`.
    pub(crate) fn cast_safety(self, to: Numeric) -> Casting {
        use Numeric::{Bool, Float32, Float64, Int32, Int64};
        match (self, to) {
            (a, b) if a == b => Casting::NoCast,
            (Bool, _) | (Int32 | Int64, Float64) | (Int32, Int64) | (Float32, Float64) => {
                Casting::Safe
            }
            (Int32, Float32) | (Int64, Int32 | Float32) | (Float64, Float32) => Casting::SameKind,
            _ => Casting::Unsafe,
        }
    }

    /// The smallest family both `self` and `other` cast into safely.
    pub(crate) fn promote(self, other: Numeric) -> Numeric {
        use Numeric::{Bool, Float32, Float64, Int32, Int64};
        match (self, other) {
            (Bool, x) | (x, Bool) => x,
            (Int32, Int64) | (Int64, Int32) => Int64,
            (Float32, Float32) => Float32,
            (Float32 | Float64, _) | (_, Float32 | Float64) => Float64,
            (a, _) => a,
        }
    }

    fn of(table: &NumericTable, dtype: &DType) -> Option<Numeric> {
        Numeric::ALL
            .into_iter()
            .find(|kind| table[kind.index()] == *dtype)
    }
}

// ---------------------------------------------------------------------------
// Item access
// ---------------------------------------------------------------------------

fn setitem<T: Element>(descr: &Descr, value: &Value, data: &mut [u8]) -> Result<()> {
    let v = T::from_value(value).ok_or_else(|| DTypeError::InvalidValue {
        dtype: descr.dtype().name().to_owned(),
        reason: format!("cannot store {value}"),
    })?;
    v.write(data);
    if !descr.is_native() {
        data[..T::SIZE].reverse();
    }
    Ok(())
}

fn getitem<T: Element>(descr: &Descr, data: &[u8]) -> Result<Value> {
    let mut buf = [0u8; 8];
    let buf = &mut buf[..T::SIZE];
    buf.copy_from_slice(&data[..T::SIZE]);
    if !descr.is_native() {
        buf.reverse();
    }
    Ok(T::read(buf).to_value())
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

fn cast_strided<S: Element, D: Element>(
    _context: &MethodContext,
    inputs: &[&[u8]],
    outputs: &mut [&mut [u8]],
    len: usize,
    strides: &[usize],
    _auxdata: Option<&AuxData>,
) -> Result<()> {
    let src = inputs[0];
    let dst = &mut *outputs[0];
    for i in 0..len {
        let v = S::read(&src[i * strides[0]..]);
        D::convert(v).write(&mut dst[i * strides[1]..]);
    }
    Ok(())
}

fn cast_contiguous<S: Element, D: Element>(
    _context: &MethodContext,
    inputs: &[&[u8]],
    outputs: &mut [&mut [u8]],
    len: usize,
    _strides: &[usize],
    _auxdata: Option<&AuxData>,
) -> Result<()> {
    let src = inputs[0].chunks_exact(S::SIZE);
    let dst = outputs[0].chunks_exact_mut(D::SIZE);
    for (s, d) in src.zip(dst).take(len) {
        D::convert(S::read(s)).write(d);
    }
    Ok(())
}

fn copy_strided(
    context: &MethodContext,
    inputs: &[&[u8]],
    outputs: &mut [&mut [u8]],
    len: usize,
    strides: &[usize],
    _auxdata: Option<&AuxData>,
) -> Result<()> {
    let n = context.descriptors()[0].itemsize();
    let src = inputs[0];
    let dst = &mut *outputs[0];
    for i in 0..len {
        let (s, d) = (i * strides[0], i * strides[1]);
        dst[d..d + n].copy_from_slice(&src[s..s + n]);
    }
    Ok(())
}

fn swap_strided(
    context: &MethodContext,
    inputs: &[&[u8]],
    outputs: &mut [&mut [u8]],
    len: usize,
    strides: &[usize],
    _auxdata: Option<&AuxData>,
) -> Result<()> {
    let n = context.descriptors()[0].itemsize();
    let src = inputs[0];
    let dst = &mut *outputs[0];
    for i in 0..len {
        let (s, d) = (i * strides[0], i * strides[1]);
        let out = &mut dst[d..d + n];
        out.copy_from_slice(&src[s..s + n]);
        out.reverse();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Within-class casts
// ---------------------------------------------------------------------------

/// Resolution of a cast between two descriptors of one numeric class.
///
/// Matching byte orders are a view; differing ones need a byte swap and
/// are `equiv`.
pub(crate) fn resolve_same_dtype(
    method: &ArrayMethod,
    dtypes: &[DType],
    given: &[Option<Descr>],
) -> Result<Resolution> {
    let from = given[0]
        .clone()
        .ok_or_else(|| DTypeError::resolution(method.name(), "input 0 has no descriptor"))?;
    let to = match &given[1] {
        Some(to) => to.clone(),
        None => dtypes[1].ensure_canonical(&from)?,
    };
    if from.layout() != to.layout() {
        return Ok(Resolution::NotPossible);
    }
    let resolved = if from.byte_order() == to.byte_order() {
        ResolvedDescriptors::new(Casting::NoCast, smallvec![from, to]).with_view_offset(0)
    } else {
        ResolvedDescriptors::new(Casting::Equivalent, smallvec![from, to])
    };
    Ok(Resolution::Resolved(resolved))
}

fn copy_or_swap_loop(context: &MethodContext, _request: &LoopRequest<'_>) -> Result<LoopSelection> {
    let descrs = context.descriptors();
    let loop_fn: StridedLoop = if descrs[0].byte_order() == descrs[1].byte_order() {
        copy_strided
    } else {
        swap_strided
    };
    Ok(LoopSelection::new(
        loop_fn,
        context.method().flags().runtime(),
    ))
}

fn identity_cast(name: &str) -> ArrayMethodSpec {
    ArrayMethodSpec::new(
        format!("{name}_to_{name}_cast"),
        1,
        1,
        Casting::NoCast,
        vec![None, None],
    )
    .with_flags(MethodFlags::NO_FLOATINGPOINT_ERRORS | MethodFlags::SUPPORTS_UNALIGNED)
    .with_slot(MethodSlot::resolve_descriptors(resolve_same_dtype))
    .with_slot(MethodSlot::get_loop(copy_or_swap_loop))
}

fn cast_spec(from: Numeric, to: Numeric, table: &NumericTable) -> ArrayMethodSpec {
    let (strided, contiguous): (StridedLoop, StridedLoop) = with_element!(from, S => {
        with_element!(to, D => (cast_strided::<S, D>, cast_contiguous::<S, D>))
    });
    let mut flags = MethodFlags::SUPPORTS_UNALIGNED;
    if !from.is_float() && !to.is_float() {
        flags |= MethodFlags::NO_FLOATINGPOINT_ERRORS;
    }
    ArrayMethodSpec::cast(
        format!("{}_to_{}_cast", from.name(), to.name()),
        from.cast_safety(to),
        &table[from.index()],
        &table[to.index()],
    )
    .with_flags(flags)
    .with_slot(MethodSlot::StridedLoop(strided))
    .with_slot(MethodSlot::ContiguousLoop(contiguous))
    .with_slot(MethodSlot::UnalignedStridedLoop(strided))
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

fn promote_slot(cell: &OnceLock<NumericTable>, this: &DType, other: &DType) -> CommonDType {
    let Some(table) = cell.get() else {
        return CommonDType::NotImplemented;
    };
    match (Numeric::of(table, this), Numeric::of(table, other)) {
        (Some(a), Some(b)) => CommonDType::Common(table[a.promote(b).index()].clone()),
        _ => CommonDType::NotImplemented,
    }
}

fn numeric_spec(kind: Numeric, cell: &Arc<OnceLock<NumericTable>>) -> DTypeSpec {
    let (set, get) = with_element!(kind, T => (
        DTypeSlot::setitem(setitem::<T>),
        DTypeSlot::getitem(getitem::<T>),
    ));
    let cell = Arc::clone(cell);
    let mut spec = DTypeSpec::new(kind.name())
        .with_flags(DTypeFlags::NUMERIC)
        .with_type_num(kind.type_num())
        .with_singleton(Layout::natural(kind.itemsize()))
        .with_slot(DTypeSlot::common_dtype(move |this, other| {
            Ok(promote_slot(&cell, this, other))
        }))
        .with_slot(set)
        .with_slot(get)
        .with_cast(identity_cast(kind.name()));
    if let Some(scalar) = kind.scalar_type() {
        spec = spec.with_scalar_type(scalar);
    }
    if matches!(kind, Numeric::Int64 | Numeric::Float64) {
        spec = spec
            .with_slot(DTypeSlot::is_known_scalar_type(|dtype, scalar| {
                scalar == ScalarKind::UInt || dtype.scalar_type() == Some(scalar)
            }))
            .with_slot(DTypeSlot::discover_descr(discover_numeric));
    }
    spec
}

/// Discovery for classes that also claim unsigned host integers. `Int64`
/// declines values above `i64::MAX` so that a wider claimant takes them.
fn discover_numeric(dtype: &DType, value: &Value) -> Result<Descr> {
    let holds = match value {
        Value::UInt(v) => {
            dtype.scalar_type() != Some(ScalarKind::Int) || i64::try_from(*v).is_ok()
        }
        other => dtype.is_known_scalar_type(other.kind()),
    };
    if !holds {
        return Err(DTypeError::InvalidValue {
            dtype: dtype.name().to_owned(),
            reason: format!("{value} is out of range"),
        });
    }
    dtype.default_descr()
}

/// Register the numeric DTypes and every cast between them.
pub(crate) fn register(registry: &mut Registry) -> Result<NumericTable> {
    let cell = Arc::new(OnceLock::new());
    let table: NumericTable = [
        registry.register_dtype(numeric_spec(Numeric::Bool, &cell))?,
        registry.register_dtype(numeric_spec(Numeric::Int32, &cell))?,
        registry.register_dtype(numeric_spec(Numeric::Int64, &cell))?,
        registry.register_dtype(numeric_spec(Numeric::Float32, &cell))?,
        registry.register_dtype(numeric_spec(Numeric::Float64, &cell))?,
    ];
    let _ = cell.set(table.clone());

    for from in Numeric::ALL {
        for to in Numeric::ALL {
            if from != to {
                registry.register_method(CAST, cast_spec(from, to, &table))?;
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::descriptor::{ByteOrder, Descriptor};

    #[test]
    fn test_safety_table() {
        use Numeric::{Bool, Float32, Float64, Int32, Int64};
        assert_eq!(Int32.cast_safety(Int32), Casting::NoCast);
        assert_eq!(Bool.cast_safety(Float64), Casting::Safe);
        assert_eq!(Int64.cast_safety(Float64), Casting::Safe);
        assert_eq!(Int32.cast_safety(Float32), Casting::SameKind);
        assert_eq!(Float64.cast_safety(Float32), Casting::SameKind);
        assert_eq!(Float32.cast_safety(Int64), Casting::Unsafe);
        assert_eq!(Int64.cast_safety(Bool), Casting::Unsafe);
    }

    #[test]
    fn test_promotion_is_commutative() {
        for a in Numeric::ALL {
            for b in Numeric::ALL {
                assert_eq!(a.promote(b), b.promote(a), "{a:?} {b:?}");
                let p = a.promote(b);
                assert!(a.cast_safety(p) >= Casting::SameKind, "{a:?} -> {p:?}");
            }
        }
        assert_eq!(Numeric::Int64.promote(Numeric::Float32), Numeric::Float64);
    }

    #[test]
    fn test_foreign_layout_rejected() {
        let reg = Registry::with_builtins();
        let i4 = reg.dtype("Int32").unwrap();
        let short = Descriptor::new(i4, Layout::natural(2));
        assert!(!i4.fits(&short));
        let mut buf = [0u8; 2];
        assert!(matches!(
            i4.setitem(&short, &Value::Int(1), &mut buf),
            Err(DTypeError::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            i4.getitem(&short, &buf),
            Err(DTypeError::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            i4.ensure_canonical(&short),
            Err(DTypeError::InvalidDescriptor { .. })
        ));
        let cast = reg.get_cast(i4, reg.dtype("Float64").unwrap()).unwrap();
        assert!(matches!(
            cast.resolve_descriptors(&[Some(short), None]),
            Err(DTypeError::Resolution { .. })
        ));
    }

    #[test]
    fn test_unsigned_values_discovered() {
        let reg = Registry::with_builtins();
        let d = reg.discover_descriptor(&Value::UInt(5)).unwrap();
        assert_eq!(d.dtype().name(), "Int64");
        let d = reg.discover_descriptor(&Value::UInt(u64::MAX)).unwrap();
        assert_eq!(d.dtype().name(), "Float64");
        let i8_ = reg.dtype("Int64").unwrap();
        assert!(i8_.discover_descr_from_value(&Value::UInt(u64::MAX)).is_err());
        assert!(i8_.is_known_scalar_type(ScalarKind::Int));
        assert!(!reg.dtype("Int32").unwrap().is_known_scalar_type(ScalarKind::UInt));
    }

    #[test]
    fn test_setitem_swapped() {
        let reg = Registry::with_builtins();
        let i4 = reg.dtype("Int32").unwrap();
        let native = i4.default_descr().unwrap();
        let swapped = native.new_byte_order(ByteOrder::SWAPPED);
        let mut buf = [0u8; 4];
        i4.setitem(&swapped, &Value::Int(1), &mut buf).unwrap();
        assert_eq!(i32::from_ne_bytes(buf), 1i32.swap_bytes());
        assert_eq!(i4.getitem(&swapped, &buf).unwrap(), Value::Int(1));
        assert_eq!(i4.getitem(&native, &buf).unwrap(), Value::Int(i64::from(1i32.swap_bytes())));
    }

    #[test]
    fn test_setitem_is_lossy() {
        let reg = Registry::with_builtins();
        let i8_ = reg.dtype("Int64").unwrap();
        let d = i8_.default_descr().unwrap();
        let mut buf = [0u8; 8];
        i8_.setitem(&d, &Value::Float(3.7), &mut buf).unwrap();
        assert_eq!(i8_.getitem(&d, &buf).unwrap(), Value::Int(3));
        assert!(i8_.setitem(&d, &Value::Bytes(b"1".to_vec()), &mut buf).is_err());
    }

    #[test]
    fn test_same_dtype_resolution() {
        let reg = Registry::with_builtins();
        let f8 = reg.dtype("Float64").unwrap();
        let cast = reg.get_cast(f8, f8).unwrap();
        let d = f8.default_descr().unwrap();
        let r = cast.resolve_descriptors(&[Some(d.clone()), None]).unwrap();
        let r = r.into_resolved().unwrap();
        assert_eq!(r.casting, Casting::NoCast);
        assert_eq!(r.view_offset, Some(0));

        let swapped = d.new_byte_order(ByteOrder::SWAPPED);
        let r = cast.resolve_descriptors(&[Some(swapped), None]).unwrap();
        let r = r.into_resolved().unwrap();
        assert_eq!(r.casting, Casting::Equivalent);
        assert_eq!(r.view_offset, None);
        assert!(r.descriptors[1].is_native());
    }
}
