//! Alignment records.
//!
//! The index, region queries and the sync reader only need a record's
//! placement, expressed by [`Locatable`]. Pileups additionally need the
//! CIGAR, sequence and qualities carried by [`AlignmentRecord`].

pub mod cigar;
pub mod flags;
pub mod sam;

pub use cigar::{CigarKind, CigarOp};
pub use flags::AlignmentFlags;
pub use sam::SamReader;

/// Placement of a record on the reference.
///
/// Coordinates are 0-based half-open. Records without a reference
/// (unplaced) return `None` from [`reference_id`](Self::reference_id) and
/// sort after every placed record.
pub trait Locatable {
    fn reference_id(&self) -> Option<usize>;
    fn start(&self) -> u64;
    /// Exclusive end; always greater than `start` for placed records.
    fn end(&self) -> u64;

    /// Placed but flagged unmapped (mate-positioned reads).
    fn is_unmapped(&self) -> bool {
        false
    }

    /// Sort key: reference id (unplaced last), then start.
    fn sort_key(&self) -> (usize, u64) {
        (self.reference_id().unwrap_or(usize::MAX), self.start())
    }
}

/// One alignment line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlignmentRecord {
    /// Template (read) name.
    pub name: String,
    pub flags: AlignmentFlags,
    pub reference_id: Option<usize>,
    /// 0-based leftmost aligned position.
    pub start: u64,
    pub mapq: u8,
    pub cigar: Vec<CigarOp>,
    pub mate_reference_id: Option<usize>,
    pub mate_start: Option<u64>,
    pub template_len: i64,
    /// Bases as ASCII, empty when absent.
    pub sequence: Vec<u8>,
    /// Phred base qualities (no +33 offset), empty when absent.
    pub qualities: Vec<u8>,
    /// Optional fields, kept verbatim.
    pub tags: String,
}

impl AlignmentRecord {
    /// Reference bases covered by the alignment; 0 when unmapped.
    pub fn aligned_len(&self) -> u64 {
        if self.flags.is_unmapped() {
            0
        } else {
            cigar::reference_len(&self.cigar)
        }
    }

    /// Whether the record covers at least one reference base.
    pub fn has_aligned_bases(&self) -> bool {
        self.reference_id.is_some() && self.aligned_len() > 0
    }
}

impl Locatable for AlignmentRecord {
    fn reference_id(&self) -> Option<usize> {
        self.reference_id
    }

    fn start(&self) -> u64 {
        self.start
    }

    /// Unmapped and zero-length records occupy one base so that they can
    /// still be binned.
    fn end(&self) -> u64 {
        self.start.saturating_add(self.aligned_len().max(1))
    }

    fn is_unmapped(&self) -> bool {
        self.flags.is_unmapped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cigar: &str, flags: u16) -> AlignmentRecord {
        AlignmentRecord {
            name: "r1".to_string(),
            flags: AlignmentFlags::from_bits(flags),
            reference_id: Some(0),
            start: 100,
            cigar: cigar::parse_cigar(cigar.as_bytes()).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_end_from_cigar() {
        let rec = record("10S50M5D20M", 0);
        assert_eq!(rec.aligned_len(), 75);
        assert_eq!(rec.end(), 175);
        assert!(rec.has_aligned_bases());
    }

    #[test]
    fn test_degenerate_records_span_one_base() {
        let clipped = record("30S", 0);
        assert_eq!(clipped.aligned_len(), 0);
        assert_eq!(clipped.end(), 101);
        assert!(!clipped.has_aligned_bases());

        let unmapped = record("50M", 0x4);
        assert_eq!(unmapped.aligned_len(), 0);
        assert_eq!(unmapped.end(), 101);
    }

    #[test]
    fn test_end_saturates() {
        let mut rec = record("100M", 0);
        rec.start = u64::MAX - 10;
        assert_eq!(rec.end(), u64::MAX);
    }

    #[test]
    fn test_sort_key_puts_unplaced_last() {
        let placed = record("10M", 0);
        let mut unplaced = record("*", 0x4);
        unplaced.reference_id = None;
        unplaced.start = 0;
        assert!(placed.sort_key() < unplaced.sort_key());
    }
}
