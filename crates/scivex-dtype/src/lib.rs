//! `scivex-dtype` — Extensible element types and operation dispatch.
//!
//! Element types are described on two levels. A [`DType`] is a class of
//! element types sharing behavior (all 64-bit floats, all fixed-width byte
//! strings); a [`Descriptor`] is one concrete instance of it with a byte
//! order and item size. Operations such as casts and binary loops are
//! [`ArrayMethod`]s registered for an exact tuple of DTypes.
//!
//! Invoking a method follows one protocol:
//!
//! 1. look the method up by operation name and operand DTypes,
//! 2. resolve concrete loop descriptors and a [`Casting`] verdict,
//! 3. acquire a strided loop for those descriptors,
//! 4. drive the loop over buffers.
//!
//! [`Registry::dispatch`] performs steps 1 to 3.
//!
//! ```
//! use scivex_dtype::prelude::*;
//!
//! let registry = Registry::with_builtins();
//! let f8 = registry.dtype("Float64").unwrap().clone();
//! let dtypes = [f8.clone(), f8.clone(), f8.clone()];
//! let d = f8.default_descr().unwrap();
//! let given = [Some(d.clone()), Some(d), None];
//! let strides = [8, 8, 8];
//!
//! let request = DispatchRequest::new("add", &dtypes, &given, &strides);
//! let Dispatch::Loop(prepared) = registry.dispatch(&request).unwrap() else {
//!     panic!("add is registered for Float64");
//! };
//!
//! let a: Vec<u8> = [1.0f64, 2.0].iter().flat_map(|v| v.to_ne_bytes()).collect();
//! let b: Vec<u8> = [0.5f64, 0.25].iter().flat_map(|v| v.to_ne_bytes()).collect();
//! let mut out = vec![0u8; 16];
//! prepared.run(&[a.as_slice(), b.as_slice()], &mut [out.as_mut_slice()], 2).unwrap();
//! assert_eq!(f64::from_ne_bytes(out[8..].try_into().unwrap()), 2.25);
//! ```

pub mod casting;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod dtype;
pub mod error;
pub mod flags;
pub mod method;
pub mod registry;
pub mod value;
pub mod wrapping;

mod builtin;

// Re-export key types at crate root for convenience.
pub use casting::Casting;
pub use config::{API_VERSION, RegistryConfig};
pub use descriptor::{ByteOrder, Descr, Descriptor, Descrs, GivenDescrs, Layout};
pub use dispatch::{Dispatch, DispatchRequest, PreparedLoop};
pub use dtype::{CommonDType, DType, DTypeMeta, DTypeSlot, DTypeSpec};
pub use error::{DTypeError, Result};
pub use flags::{DTypeFlags, MethodFlags};
pub use method::{
    ArrayMethod, ArrayMethodSpec, AuxData, IndexedLoop, LoopRequest, LoopSelection,
    MethodContext, MethodSlot, ReductionInitial, Resolution, ResolvedDescriptors, StridedLoop,
    reduction_initial_from_values,
};
pub use registry::{CAST, CastSafety, Registry};
pub use value::{ScalarKind, Value};
pub use wrapping::{TranslateGivenDescrsFn, TranslateLoopDescrsFn};

/// Items intended for glob-import: `use scivex_dtype::prelude::*;`
pub mod prelude {
    pub use crate::casting::Casting;
    pub use crate::descriptor::{ByteOrder, Descr, Descriptor, Layout};
    pub use crate::dispatch::{Dispatch, DispatchRequest};
    pub use crate::dtype::{DType, DTypeSlot, DTypeSpec};
    pub use crate::error::{DTypeError, Result};
    pub use crate::flags::{DTypeFlags, MethodFlags};
    pub use crate::method::{ArrayMethodSpec, MethodSlot, ReductionInitial, Resolution};
    pub use crate::registry::Registry;
    pub use crate::value::Value;
}
