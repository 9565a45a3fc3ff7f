use thiserror::Error;

/// All errors returned by `scivex-dtype`.
///
/// "Not possible" results and missing reduction identities are *not* errors;
/// they are reported through [`Resolution::NotPossible`](crate::Resolution)
/// and [`ReductionInitial::Unavailable`](crate::ReductionInitial).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DTypeError {
    /// A registration record is malformed.
    #[error("invalid spec for `{name}`: {reason}")]
    InvalidSpec { name: String, reason: String },

    /// A method or DType was registered twice under the same key.
    #[error("`{name}` is already registered")]
    DuplicateRegistration { name: String },

    /// The registration record targets a newer API than this registry speaks.
    #[error("API version {requested} is not supported (registry speaks {supported})")]
    UnsupportedApiVersion { requested: u32, supported: u32 },

    /// Descriptor resolution failed with malformed or incompatible input.
    #[error("cannot resolve descriptors for `{method}`: {reason}")]
    Resolution { method: String, reason: String },

    /// Two DTypes have no promotion rule in either order.
    #[error("no common DType for {left} and {right}")]
    NoCommonDType { left: String, right: String },

    /// A loop could not be built for otherwise resolved descriptors.
    #[error("cannot acquire loop for `{method}`: {reason}")]
    LoopAcquisition { method: String, reason: String },

    /// A strided loop failed while processing elements.
    #[error("loop for `{method}` failed: {reason}")]
    LoopExecution { method: String, reason: String },

    /// A DType lacks a behavior that has no structural default.
    #[error("DType {dtype} does not implement `{slot}`")]
    MissingSlot { dtype: String, slot: &'static str },

    /// A descriptor is not a valid instance of its class.
    #[error("invalid descriptor for {dtype}: {reason}")]
    InvalidDescriptor { dtype: String, reason: String },

    /// A host value could not be converted to or from a DType.
    #[error("invalid value for {dtype}: {reason}")]
    InvalidValue { dtype: String, reason: String },

    /// A buffer handed to a loop or item accessor is too short.
    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
}

impl DTypeError {
    pub(crate) fn invalid_spec(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            name: name.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn resolution(method: &str, reason: impl Into<String>) -> Self {
        Self::Resolution {
            method: method.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn loop_acquisition(method: &str, reason: impl Into<String>) -> Self {
        Self::LoopAcquisition {
            method: method.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn loop_execution(method: &str, reason: impl Into<String>) -> Self {
        Self::LoopExecution {
            method: method.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout `scivex-dtype`.
pub type Result<T> = std::result::Result<T, DTypeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = DTypeError::invalid_spec("add", "missing strided loop");
        assert_eq!(
            e.to_string(),
            "invalid spec for `add`: missing strided loop"
        );
        let e = DTypeError::BufferTooSmall { needed: 8, got: 4 };
        assert_eq!(e.to_string(), "buffer too small: need 8 bytes, got 4");
    }

    #[test]
    fn test_version_message() {
        let e = DTypeError::UnsupportedApiVersion {
            requested: 9,
            supported: 8,
        };
        assert!(e.to_string().contains("API version 9"));
    }
}
