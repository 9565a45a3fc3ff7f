//! Built-in binary loops: `add`, `multiply` and `maximum`.

use super::element::Element;
use super::numeric::{Numeric, NumericTable, with_element};
use crate::casting::Casting;
use crate::error::{DTypeError, Result};
use crate::flags::MethodFlags;
use crate::method::{
    ArrayMethodSpec, AuxData, IndexedLoop, MethodContext, MethodSlot, StridedLoop,
    reduction_initial_from_values,
};
use crate::registry::Registry;
use crate::value::Value;

/// A binary element operation.
trait BinaryOp: Send + Sync + 'static {
    const NAME: &'static str;

    fn apply<T: Element>(a: T, b: T) -> T;
}

enum Add {}
enum Multiply {}
enum Maximum {}

impl BinaryOp for Add {
    const NAME: &'static str = "add";

    #[inline]
    fn apply<T: Element>(a: T, b: T) -> T {
        a.add(b)
    }
}

impl BinaryOp for Multiply {
    const NAME: &'static str = "multiply";

    #[inline]
    fn apply<T: Element>(a: T, b: T) -> T {
        a.mul(b)
    }
}

impl BinaryOp for Maximum {
    const NAME: &'static str = "maximum";

    #[inline]
    fn apply<T: Element>(a: T, b: T) -> T {
        a.max_elem(b)
    }
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

fn binary_strided<T: Element, Op: BinaryOp>(
    _context: &MethodContext,
    inputs: &[&[u8]],
    outputs: &mut [&mut [u8]],
    len: usize,
    strides: &[usize],
    _auxdata: Option<&AuxData>,
) -> Result<()> {
    let (a, b) = (inputs[0], inputs[1]);
    let out = &mut *outputs[0];
    for i in 0..len {
        let x = T::read(&a[i * strides[0]..]);
        let y = T::read(&b[i * strides[1]..]);
        Op::apply(x, y).write(&mut out[i * strides[2]..]);
    }
    Ok(())
}

fn binary_contiguous<T: Element, Op: BinaryOp>(
    _context: &MethodContext,
    inputs: &[&[u8]],
    outputs: &mut [&mut [u8]],
    len: usize,
    _strides: &[usize],
    _auxdata: Option<&AuxData>,
) -> Result<()> {
    let a = inputs[0].chunks_exact(T::SIZE);
    let b = inputs[1].chunks_exact(T::SIZE);
    let out = outputs[0].chunks_exact_mut(T::SIZE);
    for ((x, y), o) in a.zip(b).zip(out).take(len) {
        Op::apply(T::read(x), T::read(y)).write(o);
    }
    Ok(())
}

fn binary_indexed<T: Element, Op: BinaryOp>(
    context: &MethodContext,
    target: &mut [u8],
    indices: &[usize],
    values: &[u8],
    _auxdata: Option<&AuxData>,
) -> Result<()> {
    if values.len() < indices.len() * T::SIZE {
        return Err(DTypeError::BufferTooSmall {
            needed: indices.len() * T::SIZE,
            got: values.len(),
        });
    }
    let slots = target.len() / T::SIZE;
    for (&index, value) in indices.iter().zip(values.chunks_exact(T::SIZE)) {
        if index >= slots {
            return Err(DTypeError::loop_execution(
                context.method().name(),
                format!("index {index} out of bounds for {slots} elements"),
            ));
        }
        let cell = &mut target[index * T::SIZE..(index + 1) * T::SIZE];
        Op::apply(T::read(cell), T::read(value)).write(cell);
    }
    Ok(())
}

fn method_spec<T: Element, Op: BinaryOp>(table: &NumericTable, kind: Numeric) -> ArrayMethodSpec {
    let dt = &table[kind.index()];
    let strided: StridedLoop = binary_strided::<T, Op>;
    let contiguous: StridedLoop = binary_contiguous::<T, Op>;
    let indexed: IndexedLoop = binary_indexed::<T, Op>;
    let mut flags = MethodFlags::IS_REORDERABLE | MethodFlags::SUPPORTS_UNALIGNED;
    if !T::IS_FLOAT {
        flags |= MethodFlags::NO_FLOATINGPOINT_ERRORS;
    }
    ArrayMethodSpec::new(
        format!("{}_{}", Op::NAME, kind.name()),
        2,
        1,
        Casting::NoCast,
        vec![Some(dt.clone()), Some(dt.clone()), Some(dt.clone())],
    )
    .with_flags(flags)
    .with_slot(MethodSlot::StridedLoop(strided))
    .with_slot(MethodSlot::ContiguousLoop(contiguous))
    .with_slot(MethodSlot::UnalignedStridedLoop(strided))
    .with_slot(MethodSlot::ContiguousIndexedLoop(indexed))
}

/// Seed and empty-reduction values of `operation` for `kind`.
fn reduction_values(operation: &str, kind: Numeric) -> (Option<Value>, Option<Value>) {
    let float = matches!(kind, Numeric::Float32 | Numeric::Float64);
    match (operation, float) {
        ("add", true) => (Some(Value::Float(-0.0)), Some(Value::Float(0.0))),
        ("add", false) => (Some(Value::Int(0)), Some(Value::Int(0))),
        ("multiply", true) => (Some(Value::Float(1.0)), Some(Value::Float(1.0))),
        ("multiply", false) => (Some(Value::Int(1)), Some(Value::Int(1))),
        ("maximum", _) => {
            let min = with_element!(kind, T => <T as Element>::MIN.to_value());
            (Some(min), None)
        }
        _ => (None, None),
    }
}

fn spec_for<Op: BinaryOp>(table: &NumericTable, kind: Numeric) -> ArrayMethodSpec {
    let spec = with_element!(kind, T => method_spec::<T, Op>(table, kind));
    let (identity, empty) = reduction_values(Op::NAME, kind);
    spec.with_slot(MethodSlot::GetReductionInitial(
        reduction_initial_from_values(identity, empty),
    ))
}

/// Register the built-in binary loops.
pub(crate) fn register(registry: &mut Registry, table: &NumericTable) -> Result<()> {
    for kind in [Numeric::Int64, Numeric::Float64] {
        registry.register_method(Add::NAME, spec_for::<Add>(table, kind))?;
        registry.register_method(Multiply::NAME, spec_for::<Multiply>(table, kind))?;
        registry.register_method(Maximum::NAME, spec_for::<Maximum>(table, kind))?;
    }
    registry.register_method(Add::NAME, spec_for::<Add>(table, Numeric::Float32))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_reduction_values() {
        let (seed, empty) = reduction_values("add", Numeric::Float64);
        assert!(matches!(seed, Some(Value::Float(v)) if v == 0.0 && v.is_sign_negative()));
        assert!(matches!(empty, Some(Value::Float(v)) if v == 0.0 && v.is_sign_positive()));
        assert_eq!(
            reduction_values("maximum", Numeric::Int64),
            (Some(Value::Int(i64::MIN)), None)
        );
        assert_eq!(
            reduction_values("maximum", Numeric::Float64),
            (Some(Value::Float(f64::NEG_INFINITY)), None)
        );
    }

    #[test]
    fn test_indexed_loop_accumulates() {
        let reg = Registry::with_builtins();
        let i8_ = reg.dtype("Int64").unwrap().clone();
        let add = reg.lookup("add", &[i8_.clone(), i8_.clone(), i8_.clone()]).unwrap();
        let d = i8_.default_descr().unwrap();
        let ctx = MethodContext::new(add.clone(), [d.clone(), d.clone(), d].into_iter().collect())
            .unwrap();
        let mut target = vec![0u8; 3 * 8];
        let values: Vec<u8> = [1i64, 2, 3].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let indexed = add.indexed_loop().unwrap();
        indexed(&ctx, &mut target, &[0, 2, 0], &values, None).unwrap();
        let read = |i: usize| i64::read(&target[i * 8..]);
        assert_eq!((read(0), read(1), read(2)), (4, 0, 2));
        assert!(indexed(&ctx, &mut target, &[3], &values, None).is_err());
    }

    #[test]
    fn test_registered_names() {
        let reg = Registry::with_builtins();
        let f4 = reg.dtype("Float32").unwrap().clone();
        let add = reg.lookup("add", &[f4.clone(), f4.clone(), f4.clone()]).unwrap();
        assert_eq!(add.name(), "add_Float32");
        assert!(reg.lookup("maximum", &[f4.clone(), f4.clone(), f4]).is_none());
    }
}
