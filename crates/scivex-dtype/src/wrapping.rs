//! Methods implemented in terms of another registered method.
//!
//! A wrapper is registered for DTypes that share their memory layout with
//! the DTypes of an existing method (for example a unit-carrying float and
//! the plain float). Two translation hooks move descriptors across the
//! boundary; the wrapper never converts data itself.
//!
//! The translation is not cached: it runs once per resolution and once
//! per loop acquisition.

use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::descriptor::{Descr, Descriptor, Descrs, GivenDescrs};
use crate::dtype::DType;
use crate::error::{DTypeError, Result};
use crate::method::{
    ArrayMethod, ArrayMethodSpec, AuxData, LoopSelection, MethodContext, MethodSlot, Resolution,
    ResolvedDescriptors, StridedLoop,
};

/// Map the outer given descriptors to those the wrapped method expects.
///
/// Arguments are `nin`, `nout`, the wrapped method's DTypes and the outer
/// given descriptors. Unknown outputs (`None`) must stay `None`.
pub type TranslateGivenDescrsFn = Arc<
    dyn Fn(usize, usize, &[DType], &[Option<Descr>]) -> Result<GivenDescrs> + Send + Sync,
>;

/// Map the wrapped method's resolved descriptors back to the outer DTypes.
///
/// Arguments are `nin`, `nout`, the outer DTypes, the outer given
/// descriptors and the wrapped loop descriptors. Results must be
/// view-compatible with the wrapped loop descriptors.
pub type TranslateLoopDescrsFn = Arc<
    dyn Fn(usize, usize, &[DType], &[Option<Descr>], &[Descr]) -> Result<Descrs> + Send + Sync,
>;

/// Reinterpret `descr` as an instance of `dtype` with the same layout.
pub fn relabel(descr: &Descriptor, dtype: &DType) -> Descr {
    if descr.dtype() == dtype {
        return Arc::new(descr.clone());
    }
    Descriptor::with_byte_order(dtype, descr.layout(), descr.byte_order())
}

/// A given-descriptor translation that relabels every known descriptor.
pub fn relabel_given() -> TranslateGivenDescrsFn {
    Arc::new(|_, _, dtypes, given| {
        Ok(given
            .iter()
            .zip(dtypes)
            .map(|(d, dt)| d.as_ref().map(|d| relabel(d, dt)))
            .collect())
    })
}

/// A loop-descriptor translation that relabels every resolved descriptor.
pub fn relabel_loop() -> TranslateLoopDescrsFn {
    Arc::new(|_, _, dtypes, _, loop_descrs| {
        Ok(loop_descrs
            .iter()
            .zip(dtypes)
            .map(|(d, dt)| relabel(d, dt))
            .collect())
    })
}

/// Loop state of a wrapper: the wrapped context, loop and auxiliary data.
struct WrappingAuxData {
    context: MethodContext,
    loop_fn: StridedLoop,
    auxdata: Option<Box<AuxData>>,
}

fn wrapping_loop(
    context: &MethodContext,
    inputs: &[&[u8]],
    outputs: &mut [&mut [u8]],
    len: usize,
    strides: &[usize],
    auxdata: Option<&AuxData>,
) -> Result<()> {
    let aux = auxdata
        .and_then(|a| a.downcast_ref::<WrappingAuxData>())
        .ok_or_else(|| {
            DTypeError::loop_execution(context.method().name(), "missing wrapping loop state")
        })?;
    (aux.loop_fn)(
        &aux.context,
        inputs,
        outputs,
        len,
        strides,
        aux.auxdata.as_deref(),
    )
}

fn translate_given_checked(
    wrapped: &ArrayMethod,
    translate: &TranslateGivenDescrsFn,
    given: &[Option<Descr>],
) -> Result<GivenDescrs> {
    let translated = translate(wrapped.nin(), wrapped.nout(), wrapped.dtypes(), given)?;
    if translated.len() != given.len() {
        return Err(DTypeError::resolution(
            wrapped.name(),
            format!(
                "given-descriptor translation returned {} entries for {}",
                translated.len(),
                given.len()
            ),
        ));
    }
    if translated
        .iter()
        .zip(given)
        .any(|(t, g)| t.is_some() != g.is_some())
    {
        return Err(DTypeError::resolution(
            wrapped.name(),
            "given-descriptor translation must keep unknown outputs unknown",
        ));
    }
    Ok(translated)
}

/// Build the wrapped method's context for an outer `context`.
fn wrapped_context(
    wrapped: &Arc<ArrayMethod>,
    translate: &TranslateGivenDescrsFn,
    context: &MethodContext,
) -> Result<MethodContext> {
    let given: GivenDescrs = context.descriptors().iter().cloned().map(Some).collect();
    let translated = translate_given_checked(wrapped, translate, &given)?;
    let resolved = wrapped
        .resolve_descriptors(&translated)?
        .into_resolved()
        .ok_or_else(|| {
            DTypeError::loop_acquisition(
                wrapped.name(),
                "wrapped method cannot handle the translated descriptors",
            )
        })?;
    Ok(MethodContext::new(wrapped.clone(), resolved.descriptors)?
        .with_caller(context.caller_handle()))
}

/// Build a method for `new_dtypes` that delegates to `wrapped`.
///
/// The wrapper is named `wrapped-<name>` and inherits the wrapped method's
/// arity, casting and flags.
pub fn wrap_method(
    config: &RegistryConfig,
    new_dtypes: &[DType],
    wrapped: Arc<ArrayMethod>,
    translate_given: TranslateGivenDescrsFn,
    translate_loop: TranslateLoopDescrsFn,
) -> Result<ArrayMethod> {
    let name = format!("wrapped-{}", wrapped.name());
    if new_dtypes.len() != wrapped.nargs() {
        return Err(DTypeError::invalid_spec(
            &name,
            format!(
                "wrapping a {}-operand method with {} DTypes",
                wrapped.nargs(),
                new_dtypes.len()
            ),
        ));
    }

    let resolve_wrapped = wrapped.clone();
    let resolve_translate = translate_given.clone();
    let loop_wrapped = wrapped.clone();
    let loop_translate = translate_given.clone();

    let mut spec = ArrayMethodSpec::new(
        name,
        wrapped.nin(),
        wrapped.nout(),
        wrapped.casting(),
        new_dtypes.iter().cloned().map(Some).collect(),
    )
    .with_flags(wrapped.flags())
    .with_slot(MethodSlot::resolve_descriptors(move |method, dtypes, given| {
        let orig_given = translate_given_checked(&resolve_wrapped, &resolve_translate, given)?;
        let Resolution::Resolved(orig) = resolve_wrapped.resolve_descriptors(&orig_given)? else {
            return Ok(Resolution::NotPossible);
        };
        let descriptors = translate_loop(
            method.nin(),
            method.nout(),
            dtypes,
            given,
            &orig.descriptors,
        )?;
        if descriptors.len() != orig.descriptors.len() {
            return Err(DTypeError::resolution(
                method.name(),
                "loop-descriptor translation changed the operand count",
            ));
        }
        if let Some((new, old)) = descriptors
            .iter()
            .zip(&orig.descriptors)
            .find(|(new, old)| !new.is_view_compatible(old))
        {
            return Err(DTypeError::resolution(
                method.name(),
                format!("{new} is not view-compatible with wrapped {old}"),
            ));
        }
        Ok(Resolution::Resolved(ResolvedDescriptors {
            casting: orig.casting,
            descriptors,
            view_offset: orig.view_offset,
        }))
    }))
    .with_slot(MethodSlot::get_loop(move |context, request| {
        let inner = wrapped_context(&loop_wrapped, &loop_translate, context)?;
        let selection = loop_wrapped.get_strided_loop(&inner, request)?;
        let state = WrappingAuxData {
            context: inner,
            loop_fn: selection.loop_fn,
            auxdata: selection.auxdata,
        };
        Ok(LoopSelection::new(wrapping_loop, selection.flags).with_auxdata(Box::new(state)))
    }));

    if wrapped.has_reduction_initial() {
        let initial_wrapped = wrapped.clone();
        spec = spec.with_slot(MethodSlot::get_reduction_initial(
            move |context, is_empty, initial| {
                let inner = wrapped_context(&initial_wrapped, &translate_given, context)?;
                initial_wrapped.get_reduction_initial(&inner, is_empty, initial)
            },
        ));
    }

    let mut method = ArrayMethod::from_spec(spec, config, None)?;
    method.set_wrapped(wrapped);
    Ok(method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;
    use crate::descriptor::Layout;
    use crate::dtype::DTypeSpec;

    #[test]
    fn test_relabel_keeps_layout() {
        let reg = Registry::with_builtins();
        let f64_dt = reg.dtype("Float64").unwrap().clone();
        let meters = reg_meters();
        let d = f64_dt.default_descr().unwrap();
        let r = relabel(&d, &meters);
        assert_eq!(r.dtype(), &meters);
        assert!(r.is_view_compatible(&d));
        assert_eq!(r.byte_order(), d.byte_order());
    }

    fn reg_meters() -> DType {
        DType::from_spec(&DTypeSpec::new("Meters").with_singleton(Layout::natural(8))).unwrap()
    }

    #[test]
    fn test_wrapper_arity_mismatch() {
        let reg = Registry::with_builtins();
        let f64_dt = reg.dtype("Float64").unwrap().clone();
        let add = reg.lookup("add", &[f64_dt.clone(), f64_dt.clone(), f64_dt]).unwrap();
        let m = reg_meters();
        let r = wrap_method(
            reg.config(),
            &[m.clone(), m],
            add,
            relabel_given(),
            relabel_loop(),
        );
        assert!(matches!(r, Err(DTypeError::InvalidSpec { .. })));
    }

    #[test]
    fn test_wrapper_name_and_flags() {
        let reg = Registry::with_builtins();
        let f64_dt = reg.dtype("Float64").unwrap().clone();
        let add = reg.lookup("add", &[f64_dt.clone(), f64_dt.clone(), f64_dt]).unwrap();
        let m = reg_meters();
        let w = wrap_method(
            reg.config(),
            &[m.clone(), m.clone(), m],
            add.clone(),
            relabel_given(),
            relabel_loop(),
        )
        .unwrap();
        assert_eq!(w.name(), "wrapped-add_Float64");
        assert_eq!(w.flags(), add.flags());
        assert_eq!(w.casting(), add.casting());
        assert!(Arc::ptr_eq(w.wrapped().unwrap(), &add));
        assert!(w.has_reduction_initial());
    }
}
