//! Built-in DTypes and methods installed by [`Registry::with_builtins`].
//!
//! | DType | Type tag | Item size | Scalar claim |
//! |-------|----------|-----------|--------------|
//! | `Bool` | 0 | 1 | `Bool` |
//! | `Int32` | 5 | 4 | none |
//! | `Int64` | 9 | 8 | `Int` |
//! | `Float32` | 11 | 4 | none |
//! | `Float64` | 12 | 8 | `Float` |
//! | `Bytes` | 18 | length | `Bytes` |
//!
//! Every numeric pair has a cast. `add`, `multiply` and `maximum` loops are
//! registered for `Int64` and `Float64`, and `add` for `Float32`.

mod bytes;
mod element;
mod numeric;
mod ufuncs;

use crate::error::Result;
use crate::registry::Registry;

pub(crate) fn install(registry: &mut Registry) -> Result<()> {
    let table = numeric::register(registry)?;
    bytes::register(registry)?;
    ufuncs::register(registry, &table)?;
    tracing::debug!(dtypes = registry.dtypes().len(), "installed built-in DTypes");
    Ok(())
}
