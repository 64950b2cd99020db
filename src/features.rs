//! The feature registry: a bitmask of the WebAssembly proposals the generator may draw on.
use std::ops::{BitOr, BitOrAssign};

/// A set of enabled proposals. `MVP` is the empty set; feature sets combine with `|`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub struct FeatureSet(u32);

impl FeatureSet {
    pub const MVP: Self = Self(0);
    pub const SIMD: Self = Self(1 << 0);
    pub const MULTIVALUE: Self = Self(1 << 1);
    pub const GC: Self = Self(1 << 2);
    pub const EXCEPTION_HANDLING: Self = Self(1 << 3);
    pub const SHARED_EVERYTHING: Self = Self(1 << 4);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn has_simd(self) -> bool {
        self.contains(Self::SIMD)
    }

    pub fn has_multivalue(self) -> bool {
        self.contains(Self::MULTIVALUE)
    }

    pub fn has_gc(self) -> bool {
        self.contains(Self::GC)
    }

    pub fn has_exception_handling(self) -> bool {
        self.contains(Self::EXCEPTION_HANDLING)
    }

    pub fn has_shared_everything(self) -> bool {
        self.contains(Self::SHARED_EVERYTHING)
    }
}

impl BitOr for FeatureSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FeatureSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
