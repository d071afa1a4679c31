//! Virtual offsets into a BGZF stream.

use std::fmt;

/// Packed `(compressed block address, offset within block)` position.
///
/// The upper 48 bits hold the file offset of the block's first byte, the
/// lower 16 bits the offset into that block's decompressed payload. Integer
/// order matches stream order, so offsets can be compared directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Largest representable compressed address (48 bits).
    pub const MAX_COMPRESSED: u64 = (1 << 48) - 1;

    /// Construct from a block address and an in-block offset.
    #[inline]
    pub fn new(compressed: u64, uncompressed: u16) -> Self {
        Self((compressed << 16) | uncompressed as u64)
    }

    /// File offset of the block containing this position.
    #[inline]
    pub fn compressed(self) -> u64 {
        self.0 >> 16
    }

    /// Offset into the decompressed block payload.
    #[inline]
    pub fn uncompressed(self) -> u16 {
        self.0 as u16
    }
}

impl From<u64> for VirtualOffset {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<VirtualOffset> for u64 {
    fn from(offset: VirtualOffset) -> Self {
        offset.0
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.compressed(), self.uncompressed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let v = VirtualOffset::new(123_456, 789);
        assert_eq!(v.compressed(), 123_456);
        assert_eq!(v.uncompressed(), 789);
        assert_eq!(u64::from(v), (123_456 << 16) | 789);
    }

    #[test]
    fn test_ordering_matches_stream_order() {
        let a = VirtualOffset::new(100, 65_535);
        let b = VirtualOffset::new(101, 0);
        let c = VirtualOffset::new(101, 1);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(VirtualOffset::from(u64::from(b)), b);
    }

    #[test]
    fn test_display() {
        assert_eq!(VirtualOffset::new(28, 5).to_string(), "28:5");
    }
}
