//! Reduction identities.
//!
//! A reduction may be seeded with two different values: the *identity*
//! used to start a fold over non-empty input, and the *default* returned for
//! an empty reduction. They can legitimately differ; float addition seeds
//! with `-0.0` so that `sum([-0.0])` keeps its sign, yet reports `+0.0` for
//! `sum([])`.

use std::sync::Arc;

use super::context::MethodContext;
use super::slots::GetReductionInitialFn;
use crate::error::Result;
use crate::value::Value;

/// Outcome of a reduction-initial query that is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionInitial {
    /// No initial value; the reduction proceeds without seeding.
    Unavailable,
    /// The buffer now holds the initial value.
    Filled,
}

/// Build a `get_reduction_initial` slot from two host values.
///
/// `identity` seeds non-empty reductions and `empty_default` is the result
/// of empty ones. Values are written with the output descriptor's `setitem`.
pub fn reduction_initial_from_values(
    identity: Option<Value>,
    empty_default: Option<Value>,
) -> GetReductionInitialFn {
    Arc::new(
        move |context: &MethodContext,
              reduction_is_empty: bool,
              initial: &mut [u8]|
              -> Result<ReductionInitial> {
            let value = if reduction_is_empty {
                &empty_default
            } else {
                &identity
            };
            let Some(value) = value else {
                return Ok(ReductionInitial::Unavailable);
            };
            let descr = context.output_descriptor();
            descr.dtype().setitem(descr, value, initial)?;
            Ok(ReductionInitial::Filled)
        },
    )
}
