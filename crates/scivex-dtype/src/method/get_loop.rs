//! Loop acquisition: requests, selections and the default selector.

use core::fmt;

use tracing::trace;

use super::context::MethodContext;
use super::slots::{AuxData, StridedLoop};
use crate::error::{DTypeError, Result};
use crate::flags::MethodFlags;

/// Acquisition-time switches for choosing a loop.
///
/// None of these are part of a method's identity; the same method may
/// return a different loop for each combination.
#[derive(Debug, Clone, Copy)]
pub struct LoopRequest<'a> {
    /// Every operand buffer is naturally aligned for its descriptor.
    pub aligned: bool,
    /// The loop takes ownership of references moved out of the inputs.
    pub move_references: bool,
    /// Fixed byte strides, one per operand, inputs first.
    pub strides: &'a [usize],
}

impl<'a> LoopRequest<'a> {
    /// An aligned request that does not move references.
    pub fn aligned(strides: &'a [usize]) -> Self {
        Self {
            aligned: true,
            move_references: false,
            strides,
        }
    }

    /// An unaligned request that does not move references.
    pub fn unaligned(strides: &'a [usize]) -> Self {
        Self {
            aligned: false,
            move_references: false,
            strides,
        }
    }
}

/// An acquired loop with its auxiliary data and flags.
pub struct LoopSelection {
    pub loop_fn: StridedLoop,
    pub auxdata: Option<Box<AuxData>>,
    pub flags: MethodFlags,
}

impl LoopSelection {
    pub fn new(loop_fn: StridedLoop, flags: MethodFlags) -> Self {
        Self {
            loop_fn,
            auxdata: None,
            flags,
        }
    }

    #[must_use]
    pub fn with_auxdata(mut self, auxdata: Box<AuxData>) -> Self {
        self.auxdata = Some(auxdata);
        self
    }
}

impl fmt::Debug for LoopSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopSelection")
            .field("has_auxdata", &self.auxdata.is_some())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// The registered loop variants of a method.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LoopVariants {
    pub(crate) strided: Option<StridedLoop>,
    pub(crate) contiguous: Option<StridedLoop>,
    pub(crate) unaligned_strided: Option<StridedLoop>,
    pub(crate) unaligned_contiguous: Option<StridedLoop>,
}

impl LoopVariants {
    /// Fill blank variants from the ones given.
    pub(crate) fn fill_blanks(&mut self) {
        if self.unaligned_contiguous.is_none() {
            self.unaligned_contiguous = self.unaligned_strided;
        }
        if self.strided.is_none() {
            self.strided = self.unaligned_strided;
        }
        if self.contiguous.is_none() {
            self.contiguous = self.strided;
        }
    }
}

/// Whether every operand stride equals its descriptor's item size.
fn is_contiguous(context: &MethodContext, strides: &[usize]) -> bool {
    context
        .descriptors()
        .iter()
        .zip(strides)
        .all(|(d, &s)| s == d.itemsize())
}

/// Loop selection used when a method has no `get_loop` slot.
pub(crate) fn default_get_loop(
    context: &MethodContext,
    request: &LoopRequest<'_>,
) -> Result<LoopSelection> {
    let method = context.method();
    let loops = method.loop_variants();
    let contiguous = is_contiguous(context, request.strides);
    let chosen = if request.aligned {
        if contiguous { loops.contiguous } else { loops.strided }
    } else if method.flags().contains(MethodFlags::SUPPORTS_UNALIGNED) {
        if contiguous {
            loops.unaligned_contiguous
        } else {
            loops.unaligned_strided
        }
    } else {
        return Err(DTypeError::loop_acquisition(
            method.name(),
            "method does not support unaligned buffers",
        ));
    };
    let loop_fn = chosen.ok_or_else(|| {
        DTypeError::loop_acquisition(method.name(), "no loop registered for this request")
    })?;
    trace!(
        method = method.name(),
        aligned = request.aligned,
        contiguous,
        "selected default loop"
    );
    Ok(LoopSelection::new(loop_fn, method.flags().runtime()))
}
