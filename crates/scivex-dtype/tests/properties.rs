//! Property tests for descriptor canonicalization, promotion and the
//! built-in loops.

#![cfg(not(miri))]

use proptest::prelude::*;
use scivex_dtype::{
    ByteOrder, Casting, Descr, Descriptor, Dispatch, DispatchRequest, Layout, Registry, Value,
};

const NUMERIC: [&str; 5] = ["Bool", "Int32", "Int64", "Float32", "Float64"];

fn bytes_descr(reg: &Registry, len: usize) -> Descr {
    let bytes = reg.dtype("Bytes").unwrap();
    Descriptor::new(bytes, Layout::packed(len))
}

proptest! {
    #[test]
    fn ensure_canonical_is_idempotent(idx in 0usize..5, swap in any::<bool>()) {
        let reg = Registry::with_builtins();
        let dt = reg.dtype(NUMERIC[idx]).unwrap();
        let mut d = dt.default_descr().unwrap();
        if swap {
            d = d.new_byte_order(ByteOrder::SWAPPED);
        }
        let once = dt.ensure_canonical(&d).unwrap();
        let twice = dt.ensure_canonical(&once).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert!(once.is_native());
    }

    #[test]
    fn bytes_common_instance_commutes(a in 1usize..64, b in 1usize..64) {
        let reg = Registry::with_builtins();
        let (da, db) = (bytes_descr(&reg, a), bytes_descr(&reg, b));
        let ab = reg.common_descriptor(&da, &db).unwrap();
        let ba = reg.common_descriptor(&db, &da).unwrap();
        prop_assert_eq!(ab.itemsize(), ba.itemsize());
        prop_assert_eq!(ab.itemsize(), a.max(b));
    }

    #[test]
    fn bytes_cast_safety_follows_length(a in 1usize..64, b in 1usize..64) {
        let reg = Registry::with_builtins();
        let (da, db) = (bytes_descr(&reg, a), bytes_descr(&reg, b));
        let safety = reg.cast_safety(&da, &db).unwrap().unwrap();
        prop_assert!(safety.casting <= Casting::NoCast);
        let expected = match b.cmp(&a) {
            core::cmp::Ordering::Equal => Casting::NoCast,
            core::cmp::Ordering::Greater => Casting::Safe,
            core::cmp::Ordering::Less => Casting::SameKind,
        };
        prop_assert_eq!(safety.casting, expected);
    }

    #[test]
    fn numeric_promotion_commutes(i in 0usize..5, j in 0usize..5) {
        let reg = Registry::with_builtins();
        let (a, b) = (reg.dtype(NUMERIC[i]).unwrap(), reg.dtype(NUMERIC[j]).unwrap());
        let ab = reg.common_dtype(a, b).unwrap();
        let ba = reg.common_dtype(b, a).unwrap();
        prop_assert_eq!(&ab, &ba);
        let da = a.default_descr().unwrap();
        let dc = ab.default_descr().unwrap();
        prop_assert!(reg.can_cast(&da, &dc, Casting::SameKind).unwrap());
    }

    #[test]
    fn int_add_matches_scalar_fold(pairs in proptest::collection::vec(any::<(i64, i64)>(), 1..32)) {
        let reg = Registry::with_builtins();
        let i8_ = reg.dtype("Int64").unwrap().clone();
        let d = i8_.default_descr().unwrap();
        let dtypes = [i8_.clone(), i8_.clone(), i8_];
        let given = [Some(d.clone()), Some(d), None];
        let Dispatch::Loop(add) = reg
            .dispatch(&DispatchRequest::new("add", &dtypes, &given, &[8, 8, 8]))
            .unwrap()
        else {
            panic!("add is registered for Int64");
        };
        let a: Vec<u8> = pairs.iter().flat_map(|p| p.0.to_ne_bytes()).collect();
        let b: Vec<u8> = pairs.iter().flat_map(|p| p.1.to_ne_bytes()).collect();
        let mut out = vec![0u8; a.len()];
        add.run(&[&a[..], &b[..]], &mut [&mut out[..]], pairs.len()).unwrap();
        for (i, (x, y)) in pairs.iter().enumerate() {
            let out_descr = &add.descriptors()[2];
            let got = out_descr.dtype().getitem(out_descr, &out[i * 8..]).unwrap();
            prop_assert_eq!(got, Value::Int(x.wrapping_add(*y)));
        }
    }
}
