//! Hierarchical binning scheme.
//!
//! The reference is split into `depth + 1` levels. Level 0 is a single bin
//! covering `2^(min_shift + 3*depth)` bases; every deeper level splits each
//! bin into eight, down to bins of `2^min_shift` bases. Bins are numbered
//! breadth first, so level `l` starts at `(8^l - 1) / 7`.
//!
//! With `min_shift = 14` and `depth = 5` this is the classic BAI layout:
//! 37449 bins covering 512 Mbp, smallest bins 16 KiB.

/// Smallest bin width of BAI indexes, as a power of two.
pub const BAI_MIN_SHIFT: u32 = 14;

/// Number of levels below the root in BAI indexes.
pub const BAI_DEPTH: u32 = 5;

/// A concrete `(min_shift, depth)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinningScheme {
    pub min_shift: u32,
    pub depth: u32,
}

impl Default for BinningScheme {
    fn default() -> Self {
        Self::new(BAI_MIN_SHIFT, BAI_DEPTH)
    }
}

impl BinningScheme {
    pub const fn new(min_shift: u32, depth: u32) -> Self {
        Self { min_shift, depth }
    }

    /// First bin number of a level.
    #[inline]
    pub const fn level_start(level: u32) -> u32 {
        ((1u32 << (3 * level)) - 1) / 7
    }

    /// Number of real bins (excludes the metadata pseudo-bin).
    #[inline]
    pub const fn bin_count(&self) -> u32 {
        Self::level_start(self.depth + 1)
    }

    /// Id of the per-reference metadata pseudo-bin.
    #[inline]
    pub const fn metadata_bin(&self) -> u32 {
        self.bin_count() + 1
    }

    /// Coordinates at or beyond this cannot be indexed.
    #[inline]
    pub const fn max_position(&self) -> u64 {
        1u64 << (self.min_shift + 3 * self.depth)
    }

    /// Width of a linear-index window.
    #[inline]
    pub const fn window_size(&self) -> u64 {
        1u64 << self.min_shift
    }

    /// Smallest bin fully containing `[start, end)`.
    pub fn region_to_bin(&self, start: u64, end: u64) -> u32 {
        let end = end.max(start + 1) - 1;
        let mut shift = self.min_shift;
        for level in (1..=self.depth).rev() {
            if start >> shift == end >> shift {
                return Self::level_start(level) + (start >> shift) as u32;
            }
            shift += 3;
        }
        0
    }

    /// Every bin that may hold records overlapping `[start, end)`.
    ///
    /// One contiguous run per level, so the result is small and independent
    /// of file size.
    pub fn region_to_bins(&self, start: u64, end: u64) -> Vec<u32> {
        let mut bins = Vec::new();
        if start >= end {
            return bins;
        }
        let end = end.min(self.max_position()) - 1;
        if start > end {
            return bins;
        }
        let mut shift = self.min_shift + 3 * self.depth;
        for level in 0..=self.depth {
            let offset = Self::level_start(level);
            let first = offset + (start >> shift) as u32;
            let last = offset + (end >> shift) as u32;
            bins.extend(first..=last);
            shift = shift.saturating_sub(3);
        }
        bins
    }

    /// Level of a bin, 0 for the root.
    pub fn bin_level(&self, bin: u32) -> u32 {
        let mut level = 0;
        let mut b = bin;
        while b > 0 {
            b = (b - 1) >> 3;
            level += 1;
        }
        level
    }

    /// Parent of a non-root bin.
    #[inline]
    pub const fn parent(bin: u32) -> u32 {
        (bin - 1) >> 3
    }

    /// Index of the first linear window covered by `bin`.
    pub fn first_window(&self, bin: u32) -> u64 {
        let level = self.bin_level(bin);
        ((bin - Self::level_start(level)) as u64) << (3 * (self.depth - level))
    }

    /// Genomic interval `[start, end)` covered by `bin`.
    pub fn bin_span(&self, bin: u32) -> (u64, u64) {
        let level = self.bin_level(bin);
        let width = 1u64 << (self.min_shift + 3 * (self.depth - level));
        let start = self.first_window(bin) << self.min_shift;
        (start, start + width)
    }
}
