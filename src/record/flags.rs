//! SAM flag bits.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Set of SAM alignment flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AlignmentFlags(u16);

impl AlignmentFlags {
    pub const PAIRED: Self = Self(0x1);
    pub const PROPER_PAIR: Self = Self(0x2);
    pub const UNMAPPED: Self = Self(0x4);
    pub const MATE_UNMAPPED: Self = Self(0x8);
    pub const REVERSE: Self = Self(0x10);
    pub const MATE_REVERSE: Self = Self(0x20);
    pub const READ1: Self = Self(0x40);
    pub const READ2: Self = Self(0x80);
    pub const SECONDARY: Self = Self(0x100);
    pub const QC_FAIL: Self = Self(0x200);
    pub const DUPLICATE: Self = Self(0x400);
    pub const SUPPLEMENTARY: Self = Self(0x800);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    /// All bits of `other` are set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// At least one bit of `other` is set.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub const fn is_paired(self) -> bool {
        self.contains(Self::PAIRED)
    }

    pub const fn is_proper_pair(self) -> bool {
        self.contains(Self::PROPER_PAIR)
    }

    pub const fn is_unmapped(self) -> bool {
        self.contains(Self::UNMAPPED)
    }

    pub const fn is_mate_unmapped(self) -> bool {
        self.contains(Self::MATE_UNMAPPED)
    }

    pub const fn is_reverse(self) -> bool {
        self.contains(Self::REVERSE)
    }

    pub const fn is_mate_reverse(self) -> bool {
        self.contains(Self::MATE_REVERSE)
    }

    pub const fn is_read1(self) -> bool {
        self.contains(Self::READ1)
    }

    pub const fn is_read2(self) -> bool {
        self.contains(Self::READ2)
    }

    pub const fn is_secondary(self) -> bool {
        self.contains(Self::SECONDARY)
    }

    pub const fn is_qc_fail(self) -> bool {
        self.contains(Self::QC_FAIL)
    }

    pub const fn is_duplicate(self) -> bool {
        self.contains(Self::DUPLICATE)
    }

    pub const fn is_supplementary(self) -> bool {
        self.contains(Self::SUPPLEMENTARY)
    }

    /// Neither secondary nor supplementary.
    pub const fn is_primary(self) -> bool {
        !self.intersects(Self(Self::SECONDARY.0 | Self::SUPPLEMENTARY.0))
    }
}

impl BitOr for AlignmentFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AlignmentFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for AlignmentFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl From<u16> for AlignmentFlags {
    fn from(bits: u16) -> Self {
        Self(bits)
    }
}

impl fmt::Display for AlignmentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
