//! Descriptor resolution results and the structural default resolver.

use crate::casting::Casting;
use crate::descriptor::{Descr, Descrs};
use crate::dtype::DType;
use crate::error::{DTypeError, Result};

use super::ArrayMethod;

/// Outcome of `resolve_descriptors` that is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Concrete loop descriptors were found.
    Resolved(ResolvedDescriptors),
    /// The method cannot handle these descriptors; no error is raised and
    /// the caller may try another method.
    NotPossible,
}

/// Concrete descriptors for one invocation and their casting safety.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDescriptors {
    /// Safety of this exact descriptor combination.
    pub casting: Casting,
    /// One canonical descriptor per operand.
    pub descriptors: Descrs,
    /// Byte offset at which input and output are bit-identical, making the
    /// operation a free reinterpretation.
    pub view_offset: Option<isize>,
}

impl ResolvedDescriptors {
    pub fn new(casting: Casting, descriptors: Descrs) -> Self {
        Self {
            casting,
            descriptors,
            view_offset: None,
        }
    }

    #[must_use]
    pub fn with_view_offset(mut self, offset: isize) -> Self {
        self.view_offset = Some(offset);
        self
    }
}

impl Resolution {
    /// Shorthand for [`Resolution::Resolved`] without a view offset.
    pub fn resolved(casting: Casting, descriptors: Descrs) -> Self {
        Self::Resolved(ResolvedDescriptors::new(casting, descriptors))
    }

    /// The resolved descriptors, or `None` when not possible.
    pub fn into_resolved(self) -> Option<ResolvedDescriptors> {
        match self {
            Self::Resolved(r) => Some(r),
            Self::NotPossible => None,
        }
    }
}

/// Resolution used when a method has no `resolve_descriptors` slot.
///
/// Inputs are canonicalized, outputs are canonicalized when given and take
/// the DType's default descriptor otherwise. The declared casting is
/// returned unchanged.
pub(crate) fn default_resolve_descriptors(
    method: &ArrayMethod,
    dtypes: &[DType],
    given: &[Option<Descr>],
) -> Result<Resolution> {
    let mut descriptors = Descrs::with_capacity(given.len());
    for (i, (dtype, given)) in dtypes.iter().zip(given).enumerate() {
        let descr = match given {
            Some(d) => dtype.ensure_canonical(d)?,
            None if i < method.nin() => {
                return Err(DTypeError::resolution(
                    method.name(),
                    format!("input {i} has no descriptor"),
                ));
            }
            None => dtype.default_descr()?,
        };
        descriptors.push(descr);
    }
    Ok(Resolution::resolved(method.casting(), descriptors))
}
