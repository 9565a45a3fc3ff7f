//! Registry configuration and API version negotiation.

/// The registration-record version this crate implements.
pub const API_VERSION: u32 = 8;

/// Default upper bound on the number of operands of one method.
pub const DEFAULT_MAX_ARGS: usize = 64;

/// Options controlling a [`Registry`](crate::Registry).
///
/// ```
/// use scivex_dtype::{Registry, RegistryConfig};
///
/// let config = RegistryConfig {
///     max_args: 8,
///     ..RegistryConfig::default()
/// };
/// let registry = Registry::new(config);
/// assert_eq!(registry.config().max_args, 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Highest record version accepted during registration.
    pub api_version: u32,
    /// Maximum `nin + nout` of a registered method.
    pub max_args: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION,
            max_args: DEFAULT_MAX_ARGS,
        }
    }
}

impl RegistryConfig {
    /// Whether a record declaring `requested` can be read.
    #[inline]
    pub fn accepts(&self, requested: u32) -> bool {
        requested <= self.api_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let c = RegistryConfig::default();
        assert_eq!(c.api_version, API_VERSION);
        assert_eq!(c.max_args, DEFAULT_MAX_ARGS);
    }

    #[test]
    fn test_accepts_older_versions() {
        let c = RegistryConfig::default();
        assert!(c.accepts(1));
        assert!(c.accepts(API_VERSION));
        assert!(!c.accepts(API_VERSION + 1));
    }
}
