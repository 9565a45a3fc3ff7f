//! ArrayMethod slot definitions and function signatures.

use core::any::Any;
use std::sync::Arc;

use super::context::MethodContext;
use super::get_loop::{LoopRequest, LoopSelection};
use super::reduction::ReductionInitial;
use super::resolve::Resolution;
use super::ArrayMethod;
use crate::descriptor::Descr;
use crate::dtype::DType;
use crate::error::Result;

/// Stable identifiers of the ArrayMethod slots.
pub mod ids {
    pub const RESOLVE_DESCRIPTORS: u32 = 1;
    pub const GET_LOOP: u32 = 2;
    pub const GET_REDUCTION_INITIAL: u32 = 3;
    pub const STRIDED_LOOP: u32 = 4;
    pub const CONTIGUOUS_LOOP: u32 = 5;
    pub const UNALIGNED_STRIDED_LOOP: u32 = 6;
    pub const UNALIGNED_CONTIGUOUS_LOOP: u32 = 7;
    pub const CONTIGUOUS_INDEXED_LOOP: u32 = 8;
}

/// Per-loop state produced at loop acquisition and handed to every call.
pub type AuxData = dyn Any + Send + Sync;

/// Resolve concrete loop descriptors from the given ones.
///
/// Receives the method, its registered DTypes and one entry per operand;
/// inputs are always `Some`, outputs may be `None`.
pub type ResolveDescriptorsFn =
    Arc<dyn Fn(&ArrayMethod, &[DType], &[Option<Descr>]) -> Result<Resolution> + Send + Sync>;

/// Acquire a strided loop for resolved descriptors.
pub type GetLoopFn =
    Arc<dyn Fn(&MethodContext, &LoopRequest<'_>) -> Result<LoopSelection> + Send + Sync>;

/// Fill the initial value of a reduction, see
/// [`ArrayMethod::get_reduction_initial`].
pub type GetReductionInitialFn =
    Arc<dyn Fn(&MethodContext, bool, &mut [u8]) -> Result<ReductionInitial> + Send + Sync>;

/// A strided inner loop.
///
/// Processes `len` elements; element `i` of operand `k` starts at byte
/// `i * strides[k]` of its buffer. Outputs follow inputs in `strides`.
pub type StridedLoop = fn(
    context: &MethodContext,
    inputs: &[&[u8]],
    outputs: &mut [&mut [u8]],
    len: usize,
    strides: &[usize],
    auxdata: Option<&AuxData>,
) -> Result<()>;

/// A contiguous indexed loop updating `target` in place:
/// `target[indices[i]] = op(target[indices[i]], values[i])`.
pub type IndexedLoop = fn(
    context: &MethodContext,
    target: &mut [u8],
    indices: &[usize],
    values: &[u8],
    auxdata: Option<&AuxData>,
) -> Result<()>;

/// One entry of an ArrayMethod registration record.
#[derive(Clone)]
pub enum MethodSlot {
    ResolveDescriptors(ResolveDescriptorsFn),
    GetLoop(GetLoopFn),
    GetReductionInitial(GetReductionInitialFn),
    StridedLoop(StridedLoop),
    ContiguousLoop(StridedLoop),
    UnalignedStridedLoop(StridedLoop),
    UnalignedContiguousLoop(StridedLoop),
    ContiguousIndexedLoop(IndexedLoop),
    /// A slot identifier from a newer record format.
    Unknown(u32),
}

impl MethodSlot {
    /// The stable identifier of this slot.
    pub const fn id(&self) -> u32 {
        match self {
            Self::ResolveDescriptors(_) => ids::RESOLVE_DESCRIPTORS,
            Self::GetLoop(_) => ids::GET_LOOP,
            Self::GetReductionInitial(_) => ids::GET_REDUCTION_INITIAL,
            Self::StridedLoop(_) => ids::STRIDED_LOOP,
            Self::ContiguousLoop(_) => ids::CONTIGUOUS_LOOP,
            Self::UnalignedStridedLoop(_) => ids::UNALIGNED_STRIDED_LOOP,
            Self::UnalignedContiguousLoop(_) => ids::UNALIGNED_CONTIGUOUS_LOOP,
            Self::ContiguousIndexedLoop(_) => ids::CONTIGUOUS_INDEXED_LOOP,
            Self::Unknown(id) => *id,
        }
    }

    pub fn resolve_descriptors<F>(f: F) -> Self
    where
        F: Fn(&ArrayMethod, &[DType], &[Option<Descr>]) -> Result<Resolution>
            + Send
            + Sync
            + 'static,
    {
        Self::ResolveDescriptors(Arc::new(f))
    }

    pub fn get_loop<F>(f: F) -> Self
    where
        F: Fn(&MethodContext, &LoopRequest<'_>) -> Result<LoopSelection> + Send + Sync + 'static,
    {
        Self::GetLoop(Arc::new(f))
    }

    pub fn get_reduction_initial<F>(f: F) -> Self
    where
        F: Fn(&MethodContext, bool, &mut [u8]) -> Result<ReductionInitial> + Send + Sync + 'static,
    {
        Self::GetReductionInitial(Arc::new(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(
        _: &MethodContext,
        _: &[&[u8]],
        _: &mut [&mut [u8]],
        _: usize,
        _: &[usize],
        _: Option<&AuxData>,
    ) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_slot_ids_are_stable() {
        assert_eq!(MethodSlot::StridedLoop(noop).id(), 4);
        assert_eq!(MethodSlot::ContiguousLoop(noop).id(), 5);
        assert_eq!(MethodSlot::UnalignedStridedLoop(noop).id(), 6);
        assert_eq!(MethodSlot::UnalignedContiguousLoop(noop).id(), 7);
        assert_eq!(
            MethodSlot::get_reduction_initial(|_, _, _| Ok(ReductionInitial::Unavailable)).id(),
            3
        );
        assert_eq!(MethodSlot::Unknown(1000).id(), 1000);
    }
}
