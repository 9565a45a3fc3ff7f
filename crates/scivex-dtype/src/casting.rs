//! The casting-safety lattice.
//!
//! Every conversion between two descriptors is classified by how much
//! information it may lose. The classification is totally ordered from the
//! least safe to the most safe:
//!
//! ```text
//! Impossible < Unsafe < SameKind < Safe < Equivalent < NoCast
//! ```
//!
//! Combining two steps of a conversion chain yields the *less* safe of the
//! two (see [`Casting::combine`]).

use core::fmt;

/// Casting safety of a conversion, ordered from least to most safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Casting {
    /// The conversion cannot be performed at all.
    Impossible,
    /// Any conversion, values may be lost or changed.
    Unsafe,
    /// Conversions within a kind, e.g. `float64 -> float32`.
    SameKind,
    /// Conversions that preserve every value.
    Safe,
    /// Only byte-order changes.
    Equivalent,
    /// Bit-identical types, no conversion at all.
    NoCast,
}

impl Casting {
    /// All values from least to most safe.
    pub const ALL: [Casting; 6] = [
        Casting::Impossible,
        Casting::Unsafe,
        Casting::SameKind,
        Casting::Safe,
        Casting::Equivalent,
        Casting::NoCast,
    ];

    /// The less safe of two castings.
    #[inline]
    #[must_use]
    pub fn combine(self, other: Casting) -> Casting {
        self.min(other)
    }

    /// Whether a conversion with safety `self` is permitted when the caller
    /// allows at most `allowed`.
    ///
    /// ```
    /// use scivex_dtype::Casting;
    /// assert!(Casting::Safe.is_allowed_by(Casting::SameKind));
    /// assert!(!Casting::SameKind.is_allowed_by(Casting::Safe));
    /// assert!(!Casting::Impossible.is_allowed_by(Casting::Unsafe));
    /// ```
    #[inline]
    pub fn is_allowed_by(self, allowed: Casting) -> bool {
        self != Casting::Impossible && self >= allowed
    }

    /// The lowercase name used in messages (`"same_kind"`, `"no"`, ...).
    pub const fn as_str(self) -> &'static str {
        match self {
            Casting::Impossible => "impossible",
            Casting::Unsafe => "unsafe",
            Casting::SameKind => "same_kind",
            Casting::Safe => "safe",
            Casting::Equivalent => "equiv",
            Casting::NoCast => "no",
        }
    }
}

impl fmt::Display for Casting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        for pair in Casting::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_combine_takes_less_safe() {
        assert_eq!(Casting::Safe.combine(Casting::NoCast), Casting::Safe);
        assert_eq!(Casting::NoCast.combine(Casting::Unsafe), Casting::Unsafe);
        assert_eq!(
            Casting::Impossible.combine(Casting::Safe),
            Casting::Impossible
        );
    }

    #[test]
    fn test_is_allowed_by() {
        assert!(Casting::NoCast.is_allowed_by(Casting::NoCast));
        assert!(Casting::Equivalent.is_allowed_by(Casting::Safe));
        assert!(!Casting::Unsafe.is_allowed_by(Casting::SameKind));
        assert!(Casting::Unsafe.is_allowed_by(Casting::Unsafe));
    }

    #[test]
    fn test_display() {
        assert_eq!(Casting::SameKind.to_string(), "same_kind");
    }
}
