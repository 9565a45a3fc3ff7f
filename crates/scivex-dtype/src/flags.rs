//! Flag sets for DTypes and ArrayMethods.
//!
//! Bit positions are part of the registration contract and never change.

use bitflags::bitflags;

bitflags! {
    /// Class-level flags of a DType.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DTypeFlags: u64 {
        /// The class cannot be instantiated; it never has a singleton.
        const ABSTRACT = 1 << 1;
        /// Instances carry parameters (e.g. a string length).
        const PARAMETRIC = 1 << 2;
        /// The class represents numbers.
        const NUMERIC = 1 << 3;
    }
}

bitflags! {
    /// Flags of an ArrayMethod.
    ///
    /// Only [`MethodFlags::RUNTIME`] bits may change per loop acquisition,
    /// the rest are fixed at registration.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MethodFlags: u32 {
        /// The loop needs exclusive access to the host runtime.
        const REQUIRES_PYAPI = 1 << 0;
        /// The loop never sets floating point error flags.
        const NO_FLOATINGPOINT_ERRORS = 1 << 1;
        /// The method provides loops for unaligned buffers.
        const SUPPORTS_UNALIGNED = 1 << 2;
        /// The operation may be reassociated (e.g. for parallel reduction).
        const IS_REORDERABLE = 1 << 3;
        /// Inputs may always be cast to the loop dtypes. Unstable.
        const FORCE_CAST_INPUTS = 1 << 17;

        /// All flags that may change at runtime.
        const RUNTIME = Self::REQUIRES_PYAPI.bits() | Self::NO_FLOATINGPOINT_ERRORS.bits();
    }
}

impl MethodFlags {
    /// The runtime-mutable subset of `self`.
    #[inline]
    #[must_use]
    pub fn runtime(self) -> Self {
        self & Self::RUNTIME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_bits() {
        assert_eq!(MethodFlags::REQUIRES_PYAPI.bits(), 1);
        assert_eq!(MethodFlags::NO_FLOATINGPOINT_ERRORS.bits(), 2);
        assert_eq!(MethodFlags::SUPPORTS_UNALIGNED.bits(), 4);
        assert_eq!(MethodFlags::IS_REORDERABLE.bits(), 8);
        assert_eq!(MethodFlags::FORCE_CAST_INPUTS.bits(), 1 << 17);
        assert_eq!(DTypeFlags::PARAMETRIC.bits(), 4);
    }

    #[test]
    fn test_runtime_subset() {
        let f = MethodFlags::REQUIRES_PYAPI | MethodFlags::IS_REORDERABLE;
        assert_eq!(f.runtime(), MethodFlags::REQUIRES_PYAPI);
    }

    #[test]
    fn test_unknown_bits_are_dropped() {
        let f = MethodFlags::from_bits_truncate(1 | (1 << 30));
        assert_eq!(f, MethodFlags::REQUIRES_PYAPI);
    }
}
