//! ArrayMethods: registered operations bound to a fixed tuple of DTypes.
//!
//! An [`ArrayMethod`] implements one cast or one element-wise inner loop for
//! an ordered list of DTypes (inputs first). Using it is a three step
//! protocol:
//!
//! 1. [`resolve_descriptors`](ArrayMethod::resolve_descriptors) turns the
//!    given descriptors (outputs may be missing) into concrete loop
//!    descriptors and a [`Casting`] verdict for exactly that combination.
//! 2. [`get_strided_loop`](ArrayMethod::get_strided_loop) picks a loop for a
//!    [`MethodContext`] holding those descriptors.
//! 3. The caller drives the returned [`StridedLoop`] over its buffers.
//!
//! Reductions may additionally ask for an initial value through
//! [`get_reduction_initial`](ArrayMethod::get_reduction_initial).

pub mod context;
pub mod get_loop;
pub mod reduction;
pub mod resolve;
pub mod slots;

use core::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

pub use context::MethodContext;
pub use get_loop::{LoopRequest, LoopSelection};
pub use reduction::{ReductionInitial, reduction_initial_from_values};
pub use resolve::{Resolution, ResolvedDescriptors};
pub use slots::{AuxData, IndexedLoop, MethodSlot, StridedLoop};

use self::get_loop::LoopVariants;
use self::slots::{GetLoopFn, GetReductionInitialFn, ResolveDescriptorsFn};
use crate::casting::Casting;
use crate::config::{API_VERSION, RegistryConfig};
use crate::descriptor::Descr;
use crate::dtype::DType;
use crate::error::{DTypeError, Result};
use crate::flags::MethodFlags;

// ---------------------------------------------------------------------------
// ArrayMethodSpec — the registration record
// ---------------------------------------------------------------------------

/// Registration record for an ArrayMethod.
#[derive(Clone)]
pub struct ArrayMethodSpec {
    pub name: String,
    pub nin: usize,
    pub nout: usize,
    /// Casting safety of the typical call.
    pub casting: Casting,
    pub flags: MethodFlags,
    /// One entry per operand. `None` stands for the DType being created and
    /// is only valid inside a [`DTypeSpec`](crate::DTypeSpec).
    pub dtypes: Vec<Option<DType>>,
    pub slots: Vec<MethodSlot>,
    pub api_version: u32,
}

impl ArrayMethodSpec {
    pub fn new(
        name: impl Into<String>,
        nin: usize,
        nout: usize,
        casting: Casting,
        dtypes: Vec<Option<DType>>,
    ) -> Self {
        Self {
            name: name.into(),
            nin,
            nout,
            casting,
            flags: MethodFlags::empty(),
            dtypes,
            slots: Vec::new(),
            api_version: API_VERSION,
        }
    }

    /// A one-input, one-output cast record between two known DTypes.
    pub fn cast(name: impl Into<String>, casting: Casting, from: &DType, to: &DType) -> Self {
        Self::new(
            name,
            1,
            1,
            casting,
            vec![Some(from.clone()), Some(to.clone())],
        )
    }

    #[must_use]
    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_slot(mut self, slot: MethodSlot) -> Self {
        self.slots.push(slot);
        self
    }
}

// ---------------------------------------------------------------------------
// ArrayMethod
// ---------------------------------------------------------------------------

/// A registered, immutable operation implementation.
pub struct ArrayMethod {
    name: String,
    nin: usize,
    nout: usize,
    casting: Casting,
    flags: MethodFlags,
    dtypes: Vec<DType>,
    resolve_descriptors: Option<ResolveDescriptorsFn>,
    get_loop: Option<GetLoopFn>,
    get_reduction_initial: Option<GetReductionInitialFn>,
    loops: LoopVariants,
    indexed_loop: Option<IndexedLoop>,
    wrapped: Option<Arc<ArrayMethod>>,
}

impl ArrayMethod {
    /// Validate a registration record and build the method.
    ///
    /// `new_dtype` replaces `None` entries of the dtype list; outside DType
    /// registration it is `None` and such entries are rejected.
    pub(crate) fn from_spec(
        spec: ArrayMethodSpec,
        config: &RegistryConfig,
        new_dtype: Option<&DType>,
    ) -> Result<Self> {
        let name = spec.name.as_str();
        if !config.accepts(spec.api_version) {
            return Err(DTypeError::UnsupportedApiVersion {
                requested: spec.api_version,
                supported: config.api_version,
            });
        }
        let nargs = spec.nin + spec.nout;
        if spec.nout == 0 {
            return Err(DTypeError::invalid_spec(name, "a method needs at least one output"));
        }
        if nargs > config.max_args {
            return Err(DTypeError::invalid_spec(
                name,
                format!("{nargs} operands exceed the limit of {}", config.max_args),
            ));
        }
        if spec.dtypes.len() != nargs {
            return Err(DTypeError::invalid_spec(
                name,
                format!("expected {nargs} DTypes, got {}", spec.dtypes.len()),
            ));
        }
        if spec.casting == Casting::Impossible {
            return Err(DTypeError::invalid_spec(
                name,
                "declared casting cannot be `impossible`",
            ));
        }

        let dtypes = spec
            .dtypes
            .iter()
            .map(|dt| match (dt, new_dtype) {
                (Some(dt), _) => Ok(dt.clone()),
                (None, Some(new)) => Ok(new.clone()),
                (None, None) => Err(DTypeError::invalid_spec(
                    name,
                    "`None` DTypes are only allowed while registering a DType",
                )),
            })
            .collect::<Result<Vec<_>>>()?;

        let is_cast = spec.nin == 1 && spec.nout == 1;
        if is_cast && dtypes.iter().any(|dt| dt.is_abstract()) {
            return Err(DTypeError::invalid_spec(name, "casts cannot involve abstract DTypes"));
        }

        let mut method = Self {
            name: spec.name.clone(),
            nin: spec.nin,
            nout: spec.nout,
            casting: spec.casting,
            flags: spec.flags,
            dtypes,
            resolve_descriptors: None,
            get_loop: None,
            get_reduction_initial: None,
            loops: LoopVariants::default(),
            indexed_loop: None,
            wrapped: None,
        };
        method.fill_slots(spec.slots)?;
        method.validate_loops()?;
        debug!(
            method = %method.name,
            nin = method.nin,
            nout = method.nout,
            casting = %method.casting,
            "built ArrayMethod"
        );
        Ok(method)
    }

    fn fill_slots(&mut self, slots: Vec<MethodSlot>) -> Result<()> {
        for slot in slots {
            let id = slot.id();
            let filled = match slot {
                MethodSlot::ResolveDescriptors(f) => self.resolve_descriptors.replace(f).is_some(),
                MethodSlot::GetLoop(f) => self.get_loop.replace(f).is_some(),
                MethodSlot::GetReductionInitial(f) => {
                    self.get_reduction_initial.replace(f).is_some()
                }
                MethodSlot::StridedLoop(f) => self.loops.strided.replace(f).is_some(),
                MethodSlot::ContiguousLoop(f) => self.loops.contiguous.replace(f).is_some(),
                MethodSlot::UnalignedStridedLoop(f) => {
                    self.loops.unaligned_strided.replace(f).is_some()
                }
                MethodSlot::UnalignedContiguousLoop(f) => {
                    self.loops.unaligned_contiguous.replace(f).is_some()
                }
                MethodSlot::ContiguousIndexedLoop(f) => self.indexed_loop.replace(f).is_some(),
                MethodSlot::Unknown(id) => {
                    debug!(method = %self.name, slot = id, "ignoring unknown method slot");
                    false
                }
            };
            if filled {
                return Err(DTypeError::invalid_spec(
                    &self.name,
                    format!("slot {id} given more than once"),
                ));
            }
        }
        Ok(())
    }

    fn validate_loops(&mut self) -> Result<()> {
        if self.resolve_descriptors.is_none() && self.dtypes.iter().any(|dt| dt.is_parametric()) {
            return Err(DTypeError::invalid_spec(
                &self.name,
                "parametric DTypes require `resolve_descriptors`",
            ));
        }
        if self.get_loop.is_some() {
            return Ok(());
        }
        let unaligned = self.flags.contains(MethodFlags::SUPPORTS_UNALIGNED);
        let has_unaligned = self.loops.unaligned_strided.is_some();
        if unaligned && !has_unaligned {
            return Err(DTypeError::invalid_spec(
                &self.name,
                "`SUPPORTS_UNALIGNED` requires an unaligned strided loop",
            ));
        }
        if !unaligned && has_unaligned {
            return Err(DTypeError::invalid_spec(
                &self.name,
                "an unaligned strided loop requires `SUPPORTS_UNALIGNED`",
            ));
        }
        self.loops.fill_blanks();
        if self.loops.strided.is_none() {
            return Err(DTypeError::invalid_spec(
                &self.name,
                "a strided loop or `get_loop` is required",
            ));
        }
        Ok(())
    }

    pub(crate) fn set_wrapped(&mut self, wrapped: Arc<ArrayMethod>) {
        self.wrapped = Some(wrapped);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn nin(&self) -> usize {
        self.nin
    }

    #[inline]
    pub fn nout(&self) -> usize {
        self.nout
    }

    /// Total number of operands.
    #[inline]
    pub fn nargs(&self) -> usize {
        self.nin + self.nout
    }

    /// Declared casting of the typical call.
    #[inline]
    pub fn casting(&self) -> Casting {
        self.casting
    }

    /// Static flags fixed at registration.
    #[inline]
    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    /// Registered DTypes, inputs first.
    #[inline]
    pub fn dtypes(&self) -> &[DType] {
        &self.dtypes
    }

    /// Whether this method is a one-to-one cast.
    #[inline]
    pub fn is_cast(&self) -> bool {
        self.nin == 1 && self.nout == 1
    }

    /// The method this one delegates its loops to, if it is a wrapper.
    #[inline]
    pub fn wrapped(&self) -> Option<&Arc<ArrayMethod>> {
        self.wrapped.as_ref()
    }

    /// The contiguous indexed loop, if registered.
    #[inline]
    pub fn indexed_loop(&self) -> Option<IndexedLoop> {
        self.indexed_loop
    }

    #[inline]
    pub(crate) fn loop_variants(&self) -> &LoopVariants {
        &self.loops
    }

    #[inline]
    pub fn has_reduction_initial(&self) -> bool {
        self.get_reduction_initial.is_some()
    }

    // ------------------------------------------------------------------
    // Protocol
    // ------------------------------------------------------------------

    /// Resolve concrete loop descriptors.
    ///
    /// `given` holds one entry per operand: inputs must be `Some`, outputs
    /// may be `None` to be inferred. Every descriptor must belong to the
    /// DType registered at its position.
    pub fn resolve_descriptors(&self, given: &[Option<Descr>]) -> Result<Resolution> {
        if given.len() != self.nargs() {
            return Err(DTypeError::resolution(
                &self.name,
                format!("expected {} descriptors, got {}", self.nargs(), given.len()),
            ));
        }
        for (i, (descr, dtype)) in given.iter().zip(&self.dtypes).enumerate() {
            match descr {
                None if i < self.nin => {
                    return Err(DTypeError::resolution(
                        &self.name,
                        format!("input {i} has no descriptor"),
                    ));
                }
                Some(d) if d.dtype() != dtype => {
                    return Err(DTypeError::resolution(
                        &self.name,
                        format!("operand {i} is {d}, expected a {dtype} descriptor"),
                    ));
                }
                Some(d) if !dtype.fits(d) => {
                    return Err(DTypeError::resolution(
                        &self.name,
                        format!(
                            "operand {i} has a {}-byte layout that {dtype} does not use",
                            d.itemsize()
                        ),
                    ));
                }
                _ => {}
            }
        }

        let resolution = match &self.resolve_descriptors {
            Some(f) => f(self, &self.dtypes, given)?,
            None => resolve::default_resolve_descriptors(self, &self.dtypes, given)?,
        };

        if let Resolution::Resolved(resolved) = &resolution {
            self.check_resolved(resolved)?;
            trace!(
                method = %self.name,
                casting = %resolved.casting,
                view_offset = ?resolved.view_offset,
                "resolved descriptors"
            );
        } else {
            trace!(method = %self.name, "resolution not possible");
        }
        Ok(resolution)
    }

    fn check_resolved(&self, resolved: &ResolvedDescriptors) -> Result<()> {
        if resolved.descriptors.len() != self.nargs() {
            return Err(DTypeError::resolution(
                &self.name,
                format!(
                    "resolver returned {} descriptors for {} operands",
                    resolved.descriptors.len(),
                    self.nargs()
                ),
            ));
        }
        if resolved.casting == Casting::Impossible {
            return Err(DTypeError::resolution(
                &self.name,
                "resolver returned `impossible` instead of not-possible",
            ));
        }
        for (d, dtype) in resolved.descriptors.iter().zip(&self.dtypes) {
            if !dtype.fits(d) {
                return Err(DTypeError::resolution(
                    &self.name,
                    format!("resolver returned {d} where a {dtype} descriptor was required"),
                ));
            }
        }
        Ok(())
    }

    /// Acquire a loop for the descriptors held by `context`.
    ///
    /// The returned flags are the union of this method's static flags and
    /// the runtime flags reported for this acquisition.
    pub fn get_strided_loop(
        &self,
        context: &MethodContext,
        request: &LoopRequest<'_>,
    ) -> Result<LoopSelection> {
        if !core::ptr::eq(context.method().as_ref(), self) {
            return Err(DTypeError::loop_acquisition(
                &self.name,
                format!("context belongs to `{}`", context.method().name()),
            ));
        }
        if request.strides.len() != self.nargs() {
            return Err(DTypeError::loop_acquisition(
                &self.name,
                format!(
                    "expected {} strides, got {}",
                    self.nargs(),
                    request.strides.len()
                ),
            ));
        }
        let mut selection = match &self.get_loop {
            Some(f) => f(context, request)?,
            None => get_loop::default_get_loop(context, request)?,
        };
        selection.flags = self.flags | selection.flags.runtime();
        Ok(selection)
    }

    /// Query the initial value of a reduction into `initial`.
    ///
    /// When `reduction_is_empty` is set the value is the result of an empty
    /// reduction, which may differ from the identity used to seed a
    /// non-empty one. Methods without the slot report
    /// [`ReductionInitial::Unavailable`].
    pub fn get_reduction_initial(
        &self,
        context: &MethodContext,
        reduction_is_empty: bool,
        initial: &mut [u8],
    ) -> Result<ReductionInitial> {
        let Some(f) = &self.get_reduction_initial else {
            return Ok(ReductionInitial::Unavailable);
        };
        let needed = context.output_descriptor().itemsize();
        if initial.len() < needed {
            return Err(DTypeError::BufferTooSmall {
                needed,
                got: initial.len(),
            });
        }
        f(context, reduction_is_empty, initial)
    }
}

impl fmt::Debug for ArrayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayMethod")
            .field("name", &self.name)
            .field("nin", &self.nin)
            .field("nout", &self.nout)
            .field("casting", &self.casting)
            .field("flags", &self.flags)
            .field("dtypes", &self.dtypes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Descrs, Layout};
    use crate::dtype::{DTypeSpec, DTypeSlot};
    use crate::flags::DTypeFlags;

    fn copy_loop(
        _: &MethodContext,
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
        len: usize,
        _: &[usize],
        _: Option<&AuxData>,
    ) -> Result<()> {
        outputs[0][..len * 4].copy_from_slice(&inputs[0][..len * 4]);
        Ok(())
    }

    fn plain() -> DType {
        DType::from_spec(&DTypeSpec::new("P").with_singleton(Layout::natural(4))).unwrap()
    }

    fn parametric() -> DType {
        let spec = DTypeSpec::new("S")
            .with_flags(DTypeFlags::PARAMETRIC)
            .with_slot(DTypeSlot::default_descr(|cls| {
                Ok(crate::Descriptor::new(cls, Layout::packed(1)))
            }));
        DType::from_spec(&spec).unwrap()
    }

    fn build(spec: ArrayMethodSpec) -> Result<ArrayMethod> {
        ArrayMethod::from_spec(spec, &RegistryConfig::default(), None)
    }

    #[test]
    fn test_default_resolution() {
        let p = plain();
        let spec = ArrayMethodSpec::cast("copy", Casting::NoCast, &p, &p)
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        let m = build(spec).unwrap();
        let d = p.default_descr().unwrap();
        let r = m.resolve_descriptors(&[Some(d.clone()), None]).unwrap();
        let r = r.into_resolved().unwrap();
        assert_eq!(r.casting, Casting::NoCast);
        assert_eq!(r.descriptors.as_slice(), &[d.clone(), d]);
        assert_eq!(r.view_offset, None);
    }

    #[test]
    fn test_missing_input_is_error() {
        let p = plain();
        let spec = ArrayMethodSpec::cast("copy", Casting::NoCast, &p, &p)
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        let m = build(spec).unwrap();
        assert!(matches!(
            m.resolve_descriptors(&[None, None]),
            Err(DTypeError::Resolution { .. })
        ));
        assert!(m.resolve_descriptors(&[None]).is_err());
    }

    #[test]
    fn test_wrong_class_is_error() {
        let p = plain();
        let q = plain();
        let spec = ArrayMethodSpec::cast("copy", Casting::NoCast, &p, &p)
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        let m = build(spec).unwrap();
        let foreign = q.default_descr().unwrap();
        assert!(m.resolve_descriptors(&[Some(foreign), None]).is_err());
    }

    #[test]
    fn test_foreign_layout_is_error() {
        let p = plain();
        let spec = ArrayMethodSpec::cast("copy", Casting::NoCast, &p, &p)
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        let m = build(spec).unwrap();
        let short = crate::Descriptor::new(&p, Layout::natural(2));
        assert!(matches!(
            m.resolve_descriptors(&[Some(short.clone()), None]),
            Err(DTypeError::Resolution { .. })
        ));
        let d = p.default_descr().unwrap();
        assert!(matches!(
            m.resolve_descriptors(&[Some(d), Some(short)]),
            Err(DTypeError::Resolution { .. })
        ));
    }

    #[test]
    fn test_spec_validation() {
        let p = plain();
        let no_loop = ArrayMethodSpec::cast("x", Casting::Safe, &p, &p);
        assert!(build(no_loop).is_err());

        let impossible = ArrayMethodSpec::cast("x", Casting::Impossible, &p, &p)
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        assert!(build(impossible).is_err());

        let arity = ArrayMethodSpec::new("x", 2, 1, Casting::Safe, vec![Some(p.clone())])
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        assert!(build(arity).is_err());

        let none_dtype = ArrayMethodSpec::new("x", 1, 1, Casting::Safe, vec![Some(p.clone()), None])
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        assert!(build(none_dtype).is_err());

        let mut newer = ArrayMethodSpec::cast("x", Casting::Safe, &p, &p)
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        newer.api_version = API_VERSION + 1;
        assert!(matches!(
            build(newer),
            Err(DTypeError::UnsupportedApiVersion { .. })
        ));
    }

    #[test]
    fn test_unaligned_flag_validation() {
        let p = plain();
        let flag_only = ArrayMethodSpec::cast("x", Casting::Safe, &p, &p)
            .with_flags(MethodFlags::SUPPORTS_UNALIGNED)
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        assert!(build(flag_only).is_err());

        let loop_only = ArrayMethodSpec::cast("x", Casting::Safe, &p, &p)
            .with_slot(MethodSlot::UnalignedStridedLoop(copy_loop));
        assert!(build(loop_only).is_err());

        let both = ArrayMethodSpec::cast("x", Casting::Safe, &p, &p)
            .with_flags(MethodFlags::SUPPORTS_UNALIGNED)
            .with_slot(MethodSlot::UnalignedStridedLoop(copy_loop));
        let m = build(both).unwrap();
        assert!(m.loop_variants().strided.is_some());
        assert!(m.loop_variants().contiguous.is_some());
    }

    #[test]
    fn test_parametric_requires_resolver() {
        let s = parametric();
        let spec = ArrayMethodSpec::cast("x", Casting::Safe, &s, &s)
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        assert!(build(spec).is_err());
    }

    #[test]
    fn test_unknown_slot_ignored() {
        let p = plain();
        let spec = ArrayMethodSpec::cast("x", Casting::Safe, &p, &p)
            .with_slot(MethodSlot::Unknown(77))
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        assert!(build(spec).is_ok());
    }

    #[test]
    fn test_flags_union_on_acquisition() {
        let p = plain();
        let spec = ArrayMethodSpec::cast("x", Casting::NoCast, &p, &p)
            .with_flags(MethodFlags::REQUIRES_PYAPI | MethodFlags::IS_REORDERABLE)
            .with_slot(MethodSlot::get_loop(|_, _| {
                Ok(LoopSelection::new(copy_loop, MethodFlags::empty()))
            }));
        let m = Arc::new(build(spec).unwrap());
        let d = p.default_descr().unwrap();
        let ctx = MethodContext::new(m.clone(), Descrs::from_iter([d.clone(), d])).unwrap();
        let sel = m.get_strided_loop(&ctx, &LoopRequest::aligned(&[4, 4])).unwrap();
        assert!(sel.flags.contains(MethodFlags::REQUIRES_PYAPI));
        assert!(sel.flags.contains(MethodFlags::IS_REORDERABLE));
    }

    #[test]
    fn test_unaligned_request_rejected() {
        let p = plain();
        let spec = ArrayMethodSpec::cast("x", Casting::NoCast, &p, &p)
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        let m = Arc::new(build(spec).unwrap());
        let d = p.default_descr().unwrap();
        let ctx = MethodContext::new(m.clone(), Descrs::from_iter([d.clone(), d])).unwrap();
        let r = m.get_strided_loop(&ctx, &LoopRequest::unaligned(&[4, 4]));
        assert!(matches!(r, Err(DTypeError::LoopAcquisition { .. })));
        assert!(m.get_strided_loop(&ctx, &LoopRequest::aligned(&[4])).is_err());
    }

    #[test]
    fn test_reduction_initial_unavailable_without_slot() {
        let p = plain();
        let spec = ArrayMethodSpec::cast("x", Casting::NoCast, &p, &p)
            .with_slot(MethodSlot::StridedLoop(copy_loop));
        let m = Arc::new(build(spec).unwrap());
        let d = p.default_descr().unwrap();
        let ctx = MethodContext::new(m.clone(), Descrs::from_iter([d.clone(), d])).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            m.get_reduction_initial(&ctx, true, &mut buf).unwrap(),
            ReductionInitial::Unavailable
        );
    }
}
