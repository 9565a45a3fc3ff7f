//! The parametric fixed-width byte-string DType.
//!
//! The length of a `Bytes` descriptor is its item size. Values shorter than
//! the item size are padded with NUL bytes, and trailing NULs are stripped
//! again on read.

use smallvec::smallvec;

use crate::casting::Casting;
use crate::descriptor::{Descr, Descriptor, Layout};
use crate::dtype::{DType, DTypeSlot, DTypeSpec};
use crate::error::{DTypeError, Result};
use crate::flags::{DTypeFlags, MethodFlags};
use crate::method::{
    ArrayMethod, ArrayMethodSpec, AuxData, MethodContext, MethodSlot, Resolution,
    ResolvedDescriptors,
};
use crate::registry::Registry;
use crate::value::{ScalarKind, Value};

pub(crate) const NAME: &str = "Bytes";
const TYPE_NUM: i32 = 18;

/// A `Bytes` descriptor of `len` bytes; zero lengths are widened to one.
pub(crate) fn descr(dtype: &DType, len: usize) -> Descr {
    Descriptor::new(dtype, Layout::packed(len.max(1)))
}

fn encode(value: &Value) -> Vec<u8> {
    match value {
        Value::Bytes(b) => b.clone(),
        other => other.to_string().into_bytes(),
    }
}

fn discover(dtype: &DType, value: &Value) -> Result<Descr> {
    Ok(descr(dtype, encode(value).len()))
}

fn common_instance(d1: &Descr, d2: &Descr) -> Result<Descr> {
    Ok(if d1.itemsize() >= d2.itemsize() {
        d1.clone()
    } else {
        d2.clone()
    })
}

fn setitem(descr: &Descr, value: &Value, data: &mut [u8]) -> Result<()> {
    let encoded = encode(value);
    let out = &mut data[..descr.itemsize()];
    let n = encoded.len().min(out.len());
    out[..n].copy_from_slice(&encoded[..n]);
    out[n..].fill(0);
    Ok(())
}

fn getitem(descr: &Descr, data: &[u8]) -> Result<Value> {
    let raw = &data[..descr.itemsize()];
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    Ok(Value::Bytes(raw[..end].to_vec()))
}

/// Equal lengths are a view, widening is safe, narrowing truncates in
/// place and is `same_kind`.
fn resolve_bytes_cast(
    method: &ArrayMethod,
    _dtypes: &[DType],
    given: &[Option<Descr>],
) -> Result<Resolution> {
    let from = given[0]
        .clone()
        .ok_or_else(|| DTypeError::resolution(method.name(), "input 0 has no descriptor"))?;
    let to = given[1].clone().unwrap_or_else(|| from.clone());
    let resolved = match to.itemsize().cmp(&from.itemsize()) {
        core::cmp::Ordering::Equal => {
            ResolvedDescriptors::new(Casting::NoCast, smallvec![from, to]).with_view_offset(0)
        }
        core::cmp::Ordering::Greater => ResolvedDescriptors::new(Casting::Safe, smallvec![from, to]),
        core::cmp::Ordering::Less => {
            ResolvedDescriptors::new(Casting::SameKind, smallvec![from, to]).with_view_offset(0)
        }
    };
    Ok(Resolution::Resolved(resolved))
}

fn bytes_cast_strided(
    context: &MethodContext,
    inputs: &[&[u8]],
    outputs: &mut [&mut [u8]],
    len: usize,
    strides: &[usize],
    _auxdata: Option<&AuxData>,
) -> Result<()> {
    let descrs = context.descriptors();
    let (n_in, n_out) = (descrs[0].itemsize(), descrs[1].itemsize());
    let n = n_in.min(n_out);
    let src = inputs[0];
    let dst = &mut *outputs[0];
    for i in 0..len {
        let (s, d) = (i * strides[0], i * strides[1]);
        let out = &mut dst[d..d + n_out];
        out[..n].copy_from_slice(&src[s..s + n]);
        out[n..].fill(0);
    }
    Ok(())
}

fn bytes_spec() -> DTypeSpec {
    let cast = ArrayMethodSpec::new("Bytes_to_Bytes_cast", 1, 1, Casting::NoCast, vec![None, None])
        .with_flags(MethodFlags::NO_FLOATINGPOINT_ERRORS | MethodFlags::SUPPORTS_UNALIGNED)
        .with_slot(MethodSlot::resolve_descriptors(resolve_bytes_cast))
        .with_slot(MethodSlot::StridedLoop(bytes_cast_strided))
        .with_slot(MethodSlot::UnalignedStridedLoop(bytes_cast_strided));
    DTypeSpec::new(NAME)
        .with_flags(DTypeFlags::PARAMETRIC)
        .with_type_num(TYPE_NUM)
        .with_scalar_type(ScalarKind::Bytes)
        .with_slot(DTypeSlot::default_descr(|dtype| Ok(descr(dtype, 1))))
        .with_slot(DTypeSlot::discover_descr(discover))
        .with_slot(DTypeSlot::common_instance(common_instance))
        .with_slot(DTypeSlot::setitem(setitem))
        .with_slot(DTypeSlot::getitem(getitem))
        .with_cast(cast)
}

/// Register the `Bytes` DType and its within-class cast.
pub(crate) fn register(registry: &mut Registry) -> Result<DType> {
    registry.register_dtype(bytes_spec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_instance_takes_longer() {
        let reg = Registry::with_builtins();
        let b = reg.dtype(NAME).unwrap();
        let (d5, d9) = (descr(b, 5), descr(b, 9));
        assert_eq!(b.common_instance(&d5, &d9).unwrap().itemsize(), 9);
        assert_eq!(b.common_instance(&d9, &d5).unwrap().itemsize(), 9);
    }

    #[test]
    fn test_items_pad_and_strip() {
        let reg = Registry::with_builtins();
        let b = reg.dtype(NAME).unwrap();
        let d = descr(b, 4);
        let mut buf = [0xffu8; 4];
        b.setitem(&d, &Value::Bytes(b"ab".to_vec()), &mut buf).unwrap();
        assert_eq!(&buf, b"ab\0\0");
        assert_eq!(b.getitem(&d, &buf).unwrap(), Value::Bytes(b"ab".to_vec()));

        b.setitem(&d, &Value::Int(123_456), &mut buf).unwrap();
        assert_eq!(&buf, b"1234");
    }

    #[test]
    fn test_discover_from_values() {
        let reg = Registry::with_builtins();
        let b = reg.dtype(NAME).unwrap();
        let d = b.discover_descr_from_value(&Value::Bytes(b"hello".to_vec())).unwrap();
        assert_eq!(d.itemsize(), 5);
        let d = b.discover_descr_from_value(&Value::Bytes(Vec::new())).unwrap();
        assert_eq!(d.itemsize(), 1);
        assert_eq!(d.to_string(), "Bytes[1]");
    }

    #[test]
    fn test_cast_safety_by_length() {
        let reg = Registry::with_builtins();
        let b = reg.dtype(NAME).unwrap();
        let cast = reg.get_cast(b, b).unwrap();
        let resolve = |from, to| {
            cast.resolve_descriptors(&[Some(descr(b, from)), Some(descr(b, to))])
                .unwrap()
                .into_resolved()
                .unwrap()
        };
        assert_eq!(resolve(5, 5).casting, Casting::NoCast);
        assert_eq!(resolve(5, 9).casting, Casting::Safe);
        let narrow = resolve(9, 5);
        assert_eq!(narrow.casting, Casting::SameKind);
        assert_eq!(narrow.view_offset, Some(0));
    }
}
