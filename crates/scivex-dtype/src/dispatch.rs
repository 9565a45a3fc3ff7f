//! The per-invocation driver: lookup, resolution and loop acquisition.

use core::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::casting::Casting;
use crate::descriptor::{Descr, Descrs};
use crate::dtype::DType;
use crate::error::{DTypeError, Result};
use crate::flags::MethodFlags;
use crate::method::{
    AuxData, LoopRequest, MethodContext, ReductionInitial, Resolution, StridedLoop,
};
use crate::registry::Registry;

/// One operation invocation to prepare.
#[derive(Debug, Clone)]
pub struct DispatchRequest<'a> {
    pub operation: &'a str,
    /// Name of the invoking operation, kept in the method context.
    pub caller: Option<Arc<str>>,
    /// Operand DTypes, inputs first.
    pub dtypes: &'a [DType],
    /// Given descriptors; outputs may be `None`.
    pub given: &'a [Option<Descr>],
    pub aligned: bool,
    pub move_references: bool,
    /// Fixed byte strides, one per operand.
    pub strides: &'a [usize],
}

impl<'a> DispatchRequest<'a> {
    /// An aligned request that does not move references.
    pub fn new(
        operation: &'a str,
        dtypes: &'a [DType],
        given: &'a [Option<Descr>],
        strides: &'a [usize],
    ) -> Self {
        Self {
            operation,
            caller: None,
            dtypes,
            given,
            aligned: true,
            move_references: false,
            strides,
        }
    }

    #[must_use]
    pub fn with_caller(mut self, caller: impl Into<Arc<str>>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    #[must_use]
    pub fn unaligned(mut self) -> Self {
        self.aligned = false;
        self
    }

    #[must_use]
    pub fn moving_references(mut self) -> Self {
        self.move_references = true;
        self
    }
}

/// Result of preparing an invocation.
#[derive(Debug)]
pub enum Dispatch {
    /// No method handles these operands. Not an error.
    NotPossible,
    /// The cast is a reinterpretation; no loop needs to run.
    View {
        descriptors: Descrs,
        casting: Casting,
        view_offset: isize,
    },
    /// A loop ready to be driven over buffers.
    Loop(PreparedLoop),
}

/// A loop acquired for one invocation, owning its context.
pub struct PreparedLoop {
    context: MethodContext,
    casting: Casting,
    strides: Vec<usize>,
    loop_fn: StridedLoop,
    auxdata: Option<Box<AuxData>>,
    flags: MethodFlags,
}

impl PreparedLoop {
    #[inline]
    pub fn context(&self) -> &MethodContext {
        &self.context
    }

    /// Loop descriptors, inputs first.
    #[inline]
    pub fn descriptors(&self) -> &[Descr] {
        self.context.descriptors()
    }

    #[inline]
    pub fn casting(&self) -> Casting {
        self.casting
    }

    /// Static and runtime flags of the acquired loop.
    #[inline]
    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    fn check_operand(&self, index: usize, got: usize, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let needed = (len - 1)
            .checked_mul(self.strides[index])
            .and_then(|span| span.checked_add(self.descriptors()[index].itemsize()))
            .ok_or_else(|| {
                DTypeError::loop_execution(
                    self.context.method().name(),
                    format!("operand {index} overflows the address space at {len} elements"),
                )
            })?;
        if got < needed {
            return Err(DTypeError::BufferTooSmall { needed, got });
        }
        Ok(())
    }

    /// Run the loop over `len` elements with the strides it was acquired
    /// for.
    pub fn run(&self, inputs: &[&[u8]], outputs: &mut [&mut [u8]], len: usize) -> Result<()> {
        let method = self.context.method();
        if inputs.len() != method.nin() || outputs.len() != method.nout() {
            return Err(DTypeError::loop_execution(
                method.name(),
                format!(
                    "expected {} inputs and {} outputs, got {} and {}",
                    method.nin(),
                    method.nout(),
                    inputs.len(),
                    outputs.len()
                ),
            ));
        }
        for (i, buf) in inputs.iter().enumerate() {
            self.check_operand(i, buf.len(), len)?;
        }
        for (i, buf) in outputs.iter().enumerate() {
            self.check_operand(method.nin() + i, buf.len(), len)?;
        }
        (self.loop_fn)(
            &self.context,
            inputs,
            outputs,
            len,
            &self.strides,
            self.auxdata.as_deref(),
        )
    }

    /// Apply the method's indexed loop: `target[indices[i]] op= values[i]`.
    pub fn run_indexed(&self, target: &mut [u8], indices: &[usize], values: &[u8]) -> Result<()> {
        let method = self.context.method();
        let indexed = method.indexed_loop().ok_or_else(|| {
            DTypeError::loop_acquisition(method.name(), "no contiguous indexed loop registered")
        })?;
        indexed(
            &self.context,
            target,
            indices,
            values,
            self.auxdata.as_deref(),
        )
    }

    /// Fill `initial` with the reduction seed (or the empty result).
    pub fn reduction_initial(&self, is_empty: bool, initial: &mut [u8]) -> Result<ReductionInitial> {
        self.context
            .method()
            .get_reduction_initial(&self.context, is_empty, initial)
    }
}

impl fmt::Debug for PreparedLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedLoop")
            .field("method", &self.context.method().name())
            .field("descriptors", &self.context.descriptors())
            .field("casting", &self.casting)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Prepare one invocation of `request.operation`.
    ///
    /// A missing method or a resolver declining the descriptors yields
    /// [`Dispatch::NotPossible`]; resolution and acquisition failures are
    /// returned as errors. Casts resolved with a view offset skip loop
    /// acquisition.
    pub fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<Dispatch> {
        let Some(method) = self.lookup(request.operation, request.dtypes) else {
            trace!(operation = request.operation, "no method registered");
            return Ok(Dispatch::NotPossible);
        };
        let Resolution::Resolved(resolved) = method.resolve_descriptors(request.given)? else {
            return Ok(Dispatch::NotPossible);
        };
        if let (true, Some(view_offset)) = (method.is_cast(), resolved.view_offset) {
            trace!(
                operation = request.operation,
                method = method.name(),
                view_offset,
                "cast is a view"
            );
            return Ok(Dispatch::View {
                descriptors: resolved.descriptors,
                casting: resolved.casting,
                view_offset,
            });
        }
        let context = MethodContext::new(method.clone(), resolved.descriptors)?
            .with_caller(request.caller.clone());
        let loop_request = LoopRequest {
            aligned: request.aligned,
            move_references: request.move_references,
            strides: request.strides,
        };
        let selection = method.get_strided_loop(&context, &loop_request)?;
        trace!(
            operation = request.operation,
            method = method.name(),
            flags = ?selection.flags,
            "prepared loop"
        );
        Ok(Dispatch::Loop(PreparedLoop {
            context,
            casting: resolved.casting,
            strides: request.strides.to_vec(),
            loop_fn: selection.loop_fn,
            auxdata: selection.auxdata,
            flags: selection.flags,
        }))
    }
}
