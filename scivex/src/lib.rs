//! # Scivex
//!
//! Numeric arrays in pure Rust.
//!
//! One `use scivex::prelude::*;` gives you the element-type system: DTypes,
//! descriptors, casts and loop dispatch.
//!
//! ## Feature Flags
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `dtype` *(default)* | DTypes, descriptors, ArrayMethod registration and dispatch |

#[cfg(feature = "dtype")]
pub use scivex_dtype as dtype;

/// Glob-import convenience: `use scivex::prelude::*;`
pub mod prelude {
    #[cfg(feature = "dtype")]
    pub use scivex_dtype::prelude::*;
}
