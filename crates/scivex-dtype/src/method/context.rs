use std::sync::Arc;

use super::ArrayMethod;
use crate::descriptor::{Descr, Descrs};
use crate::error::{DTypeError, Result};

/// Call-scoped state of one method invocation: the caller, the method and
/// the descriptors filled in by resolution.
///
/// A context has a single owner and is dropped when the operation
/// completes; it is never shared between concurrent loop calls.
#[derive(Debug, Clone)]
pub struct MethodContext {
    caller: Option<Arc<str>>,
    method: Arc<ArrayMethod>,
    descriptors: Descrs,
}

impl MethodContext {
    /// Bundle `method` with its resolved loop descriptors.
    pub fn new(method: Arc<ArrayMethod>, descriptors: Descrs) -> Result<Self> {
        if descriptors.len() != method.nargs() {
            return Err(DTypeError::resolution(
                method.name(),
                format!(
                    "context needs {} descriptors, got {}",
                    method.nargs(),
                    descriptors.len()
                ),
            ));
        }
        Ok(Self {
            caller: None,
            method,
            descriptors,
        })
    }

    /// Attach the name of the invoking operation.
    #[must_use]
    pub fn with_caller(mut self, caller: Option<Arc<str>>) -> Self {
        self.caller = caller;
        self
    }

    #[inline]
    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    #[inline]
    pub(crate) fn caller_handle(&self) -> Option<Arc<str>> {
        self.caller.clone()
    }

    #[inline]
    pub fn method(&self) -> &Arc<ArrayMethod> {
        &self.method
    }

    /// Loop descriptors, inputs first.
    #[inline]
    pub fn descriptors(&self) -> &[Descr] {
        &self.descriptors
    }

    /// The descriptor of the first output.
    #[inline]
    pub fn output_descriptor(&self) -> &Descr {
        &self.descriptors[self.method.nin()]
    }
}
