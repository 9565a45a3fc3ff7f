//! The explicit registry of DTypes and ArrayMethods.
//!
//! A [`Registry`] is filled during a single-threaded setup phase and is
//! read-only afterwards; share it behind an `Arc` for concurrent lookups.
//! Methods are keyed by operation name and the exact ordered tuple of
//! operand DTypes. No inheritance-based fallback is applied.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::casting::Casting;
use crate::config::RegistryConfig;
use crate::descriptor::Descr;
use crate::dtype::{CommonDType, DType, DTypeSpec};
use crate::error::{DTypeError, Result};
use crate::method::{ArrayMethod, ArrayMethodSpec, Resolution};
use crate::value::Value;
use crate::wrapping::{self, TranslateGivenDescrsFn, TranslateLoopDescrsFn};

/// Operation name under which casts are registered.
pub const CAST: &str = "cast";

type MethodTable = FxHashMap<Vec<DType>, Arc<ArrayMethod>>;

/// Safety of one concrete descriptor-to-descriptor cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastSafety {
    pub casting: Casting,
    /// Byte offset at which the cast is a plain reinterpretation.
    pub view_offset: Option<isize>,
}

/// Registered DTypes and ArrayMethods.
pub struct Registry {
    config: RegistryConfig,
    dtypes: Vec<DType>,
    methods: FxHashMap<String, MethodTable>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl Registry {
    /// An empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            dtypes: Vec::new(),
            methods: FxHashMap::default(),
        }
    }

    /// A registry holding the built-in numeric and byte-string DTypes with
    /// their casts and `add` / `multiply` / `maximum` loops.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry
            .install_builtins()
            .expect("built-in registrations are valid");
        registry
    }

    /// Register the built-in DTypes and methods into this registry.
    ///
    /// The built-ins are staged in a scratch registry with the same
    /// configuration and merged only once all of them registered, so a
    /// failure leaves `self` unchanged.
    pub fn install_builtins(&mut self) -> Result<()> {
        let mut staged = Registry::new(self.config);
        crate::builtin::install(&mut staged)?;
        if let Some(taken) = staged.dtypes.iter().find(|dt| self.dtype(dt.name()).is_some()) {
            return Err(DTypeError::DuplicateRegistration {
                name: taken.name().to_owned(),
            });
        }
        self.dtypes.extend(staged.dtypes);
        for (operation, table) in staged.methods {
            self.methods.entry(operation).or_default().extend(table);
        }
        Ok(())
    }

    #[inline]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// A registered DType by name.
    pub fn dtype(&self, name: &str) -> Option<&DType> {
        self.dtypes.iter().find(|dt| dt.name() == name)
    }

    /// All registered DTypes in registration order.
    #[inline]
    pub fn dtypes(&self) -> &[DType] {
        &self.dtypes
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Create and register a DType together with the casts in its record.
    ///
    /// Every cast must involve the new DType; `None` entries in a cast's
    /// DType list stand for it. Nothing is registered if any part fails.
    pub fn register_dtype(&mut self, spec: DTypeSpec) -> Result<DType> {
        if !self.config.accepts(spec.api_version) {
            return Err(DTypeError::UnsupportedApiVersion {
                requested: spec.api_version,
                supported: self.config.api_version,
            });
        }
        if self.dtype(&spec.name).is_some() {
            return Err(DTypeError::DuplicateRegistration { name: spec.name });
        }
        let dtype = DType::from_spec(&spec)?;

        let mut casts = Vec::with_capacity(spec.casts.len());
        for cast in spec.casts {
            let name = cast.name.clone();
            if cast.nin != 1 || cast.nout != 1 {
                return Err(DTypeError::invalid_spec(&name, "casts take one input and one output"));
            }
            let involves_new = cast
                .dtypes
                .iter()
                .any(|dt| dt.as_ref().is_none_or(|dt| *dt == dtype));
            if !involves_new {
                return Err(DTypeError::invalid_spec(
                    &name,
                    format!("cast registered with {} must involve it", dtype.name()),
                ));
            }
            let method = ArrayMethod::from_spec(cast, &self.config, Some(&dtype))?;
            let key = method.dtypes().to_vec();
            if self.lookup(CAST, &key).is_some() || casts.iter().any(|(k, _)| *k == key) {
                return Err(DTypeError::DuplicateRegistration {
                    name: describe_key(CAST, &key),
                });
            }
            casts.push((key, Arc::new(method)));
        }

        let table = self.methods.entry(CAST.to_owned()).or_default();
        for (key, method) in casts {
            table.insert(key, method);
        }
        debug!(
            dtype = dtype.name(),
            parametric = dtype.is_parametric(),
            "registered DType"
        );
        self.dtypes.push(dtype.clone());
        Ok(dtype)
    }

    /// Register a method for `operation`. Use [`CAST`] for casts.
    pub fn register_method(
        &mut self,
        operation: &str,
        spec: ArrayMethodSpec,
    ) -> Result<Arc<ArrayMethod>> {
        let method = ArrayMethod::from_spec(spec, &self.config, None)?;
        self.insert_method(operation, method)
    }

    /// Register a method for `new_dtypes` that delegates to the `operation`
    /// method already registered for `wrapped_dtypes`.
    pub fn add_wrapping_loop(
        &mut self,
        operation: &str,
        new_dtypes: &[DType],
        wrapped_dtypes: &[DType],
        translate_given: TranslateGivenDescrsFn,
        translate_loop: TranslateLoopDescrsFn,
    ) -> Result<Arc<ArrayMethod>> {
        let wrapped = self.lookup(operation, wrapped_dtypes).ok_or_else(|| {
            DTypeError::invalid_spec(
                operation,
                format!("nothing to wrap: {} is not registered", describe_key(operation, wrapped_dtypes)),
            )
        })?;
        let method = wrapping::wrap_method(
            &self.config,
            new_dtypes,
            wrapped,
            translate_given,
            translate_loop,
        )?;
        self.insert_method(operation, method)
    }

    fn insert_method(&mut self, operation: &str, method: ArrayMethod) -> Result<Arc<ArrayMethod>> {
        let key = method.dtypes().to_vec();
        let table = self.methods.entry(operation.to_owned()).or_default();
        if table.contains_key(&key) {
            return Err(DTypeError::DuplicateRegistration {
                name: describe_key(operation, &key),
            });
        }
        let method = Arc::new(method);
        debug!(
            operation,
            method = method.name(),
            key = %describe_key(operation, &key),
            "registered ArrayMethod"
        );
        table.insert(key, method.clone());
        Ok(method)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// The method registered for exactly this operand tuple.
    pub fn lookup(&self, operation: &str, dtypes: &[DType]) -> Option<Arc<ArrayMethod>> {
        self.methods.get(operation)?.get(dtypes).cloned()
    }

    /// The cast registered from `from` to `to`.
    pub fn get_cast(&self, from: &DType, to: &DType) -> Option<Arc<ArrayMethod>> {
        self.lookup(CAST, &[from.clone(), to.clone()])
    }

    // ------------------------------------------------------------------
    // Promotion
    // ------------------------------------------------------------------

    /// The promoted DType of `a` and `b`.
    ///
    /// Identical classes promote to themselves; otherwise `a`'s rule is
    /// asked first and `b`'s second.
    pub fn common_dtype(&self, a: &DType, b: &DType) -> Result<DType> {
        if a == b {
            return Ok(a.clone());
        }
        if let CommonDType::Common(dt) = a.common_dtype(b)? {
            return Ok(dt);
        }
        match b.common_dtype(a)? {
            CommonDType::Common(dt) => Ok(dt),
            CommonDType::NotImplemented => Err(DTypeError::NoCommonDType {
                left: a.name().to_owned(),
                right: b.name().to_owned(),
            }),
        }
    }

    /// Fold [`common_dtype`](Self::common_dtype) over a non-empty list.
    pub fn promote_dtypes(&self, dtypes: &[DType]) -> Result<DType> {
        let (first, rest) = dtypes.split_first().ok_or_else(|| DTypeError::InvalidValue {
            dtype: "promotion".to_owned(),
            reason: "no DTypes to promote".to_owned(),
        })?;
        rest.iter()
            .try_fold(first.clone(), |acc, dt| self.common_dtype(&acc, dt))
    }

    /// A single descriptor able to represent both `d1` and `d2`.
    pub fn common_descriptor(&self, d1: &Descr, d2: &Descr) -> Result<Descr> {
        let common = self.common_dtype(d1.dtype(), d2.dtype())?;
        let c1 = self.cast_descr_to_dtype(d1, &common)?;
        let c2 = self.cast_descr_to_dtype(d2, &common)?;
        common.common_instance(&c1, &c2)
    }

    /// The descriptor of `to` that `descr` casts into.
    pub fn cast_descr_to_dtype(&self, descr: &Descr, to: &DType) -> Result<Descr> {
        if descr.dtype() == to {
            return to.ensure_canonical(descr);
        }
        let cast = self.get_cast(descr.dtype(), to).ok_or_else(|| {
            DTypeError::resolution(CAST, format!("no cast from {} to {to}", descr.dtype()))
        })?;
        match cast.resolve_descriptors(&[Some(descr.clone()), None])? {
            Resolution::Resolved(r) => Ok(r.descriptors[1].clone()),
            Resolution::NotPossible => Err(DTypeError::resolution(
                cast.name(),
                format!("{descr} cannot be cast to {to}"),
            )),
        }
    }

    /// The descriptor holding `value`, from the first registered DType that
    /// claims its scalar type and accepts it. A claimant that declines the
    /// value passes it on to the next one.
    pub fn discover_descriptor(&self, value: &Value) -> Result<Descr> {
        let kind = value.kind();
        let mut declined = None;
        for dtype in self.dtypes.iter().filter(|dt| dt.is_known_scalar_type(kind)) {
            match dtype.discover_descr_from_value(value) {
                Ok(descr) => return Ok(descr),
                Err(err) => {
                    trace!(dtype = dtype.name(), error = %err, "discovery declined");
                    declined = Some(err);
                }
            }
        }
        Err(declined.unwrap_or_else(|| DTypeError::InvalidValue {
            dtype: format!("{kind:?}"),
            reason: format!("no registered DType claims {value}"),
        }))
    }

    // ------------------------------------------------------------------
    // Cast queries
    // ------------------------------------------------------------------

    /// Safety of casting `from` into exactly `to`, or `None` if impossible.
    ///
    /// When the cast's loop descriptors differ from the given ones, the
    /// within-class casts needed to reach them are folded in.
    pub fn cast_safety(&self, from: &Descr, to: &Descr) -> Result<Option<CastSafety>> {
        self.cast_safety_inner(from, to.dtype(), Some(to))
    }

    /// Safety of casting `from` into the descriptor `to` would choose.
    pub fn cast_safety_to_dtype(&self, from: &Descr, to: &DType) -> Result<Option<CastSafety>> {
        self.cast_safety_inner(from, to, None)
    }

    fn cast_safety_inner(
        &self,
        from: &Descr,
        to_dtype: &DType,
        to: Option<&Descr>,
    ) -> Result<Option<CastSafety>> {
        let Some(cast) = self.get_cast(from.dtype(), to_dtype) else {
            trace!(from = %from, to = %to_dtype, "no cast registered");
            return Ok(None);
        };
        let Resolution::Resolved(resolved) =
            cast.resolve_descriptors(&[Some(from.clone()), to.cloned()])?
        else {
            return Ok(None);
        };
        let mut safety = CastSafety {
            casting: resolved.casting,
            view_offset: resolved.view_offset,
        };
        let mut steps = Vec::with_capacity(2);
        if **from != *resolved.descriptors[0] {
            steps.push((from, &resolved.descriptors[0]));
        }
        if let Some(to) = to {
            if **to != *resolved.descriptors[1] {
                steps.push((&resolved.descriptors[1], to));
            }
        }
        for (src, dst) in steps {
            let Some(step) = self.within_class_cast(src, dst)? else {
                return Ok(None);
            };
            safety.casting = safety.casting.combine(step.casting);
            if step.view_offset != Some(0) {
                safety.view_offset = None;
            }
        }
        Ok(Some(safety))
    }

    fn within_class_cast(&self, from: &Descr, to: &Descr) -> Result<Option<CastSafety>> {
        let Some(cast) = self.get_cast(from.dtype(), to.dtype()) else {
            return Ok(None);
        };
        Ok(cast
            .resolve_descriptors(&[Some(from.clone()), Some(to.clone())])?
            .into_resolved()
            .map(|r| CastSafety {
                casting: r.casting,
                view_offset: r.view_offset,
            }))
    }

    /// Whether `from` may be cast to `to` under the `allowed` level.
    pub fn can_cast(&self, from: &Descr, to: &Descr, allowed: Casting) -> Result<bool> {
        Ok(self
            .cast_safety(from, to)?
            .is_some_and(|s| s.casting.is_allowed_by(allowed)))
    }
}

fn describe_key(operation: &str, dtypes: &[DType]) -> String {
    let names: Vec<&str> = dtypes.iter().map(|dt| dt.name()).collect();
    format!("{operation}({})", names.join(", "))
}
