//! CIGAR operations.

use std::fmt;

use crate::streaming::parsing::parse_u64_fast;

/// Kind of a single CIGAR operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CigarKind {
    /// `M`: alignment match (sequence match or mismatch)
    Match,
    /// `I`
    Insertion,
    /// `D`
    Deletion,
    /// `N`: skipped reference region, e.g. an intron
    Skip,
    /// `S`
    SoftClip,
    /// `H`
    HardClip,
    /// `P`
    Padding,
    /// `=`
    SequenceMatch,
    /// `X`
    SequenceMismatch,
}

impl CigarKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            b'M' => CigarKind::Match,
            b'I' => CigarKind::Insertion,
            b'D' => CigarKind::Deletion,
            b'N' => CigarKind::Skip,
            b'S' => CigarKind::SoftClip,
            b'H' => CigarKind::HardClip,
            b'P' => CigarKind::Padding,
            b'=' => CigarKind::SequenceMatch,
            b'X' => CigarKind::SequenceMismatch,
            _ => return None,
        })
    }

    pub fn as_byte(self) -> u8 {
        match self {
            CigarKind::Match => b'M',
            CigarKind::Insertion => b'I',
            CigarKind::Deletion => b'D',
            CigarKind::Skip => b'N',
            CigarKind::SoftClip => b'S',
            CigarKind::HardClip => b'H',
            CigarKind::Padding => b'P',
            CigarKind::SequenceMatch => b'=',
            CigarKind::SequenceMismatch => b'X',
        }
    }

    #[inline]
    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            CigarKind::Match
                | CigarKind::Insertion
                | CigarKind::SoftClip
                | CigarKind::SequenceMatch
                | CigarKind::SequenceMismatch
        )
    }

    #[inline]
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            CigarKind::Match
                | CigarKind::Deletion
                | CigarKind::Skip
                | CigarKind::SequenceMatch
                | CigarKind::SequenceMismatch
        )
    }

    /// Aligned base: consumes both query and reference.
    #[inline]
    pub fn is_aligned(self) -> bool {
        self.consumes_query() && self.consumes_reference()
    }
}

/// One CIGAR element: an operation and its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CigarOp {
    pub kind: CigarKind,
    pub len: u32,
}

impl CigarOp {
    pub fn new(kind: CigarKind, len: u32) -> Self {
        Self { kind, len }
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len, self.kind.as_byte() as char)
    }
}

/// Parse a CIGAR string; `*` is the empty list.
///
/// Returns None on malformed input.
pub fn parse_cigar(text: &[u8]) -> Option<Vec<CigarOp>> {
    if text == b"*" {
        return Some(Vec::new());
    }
    let mut ops = Vec::with_capacity(text.len() / 2);
    let mut start = 0;
    for (i, &b) in text.iter().enumerate() {
        if b.is_ascii_digit() {
            continue;
        }
        let kind = CigarKind::from_byte(b)?;
        let len = parse_u64_fast(&text[start..i])?;
        if len == 0 || len > u32::MAX as u64 {
            return None;
        }
        ops.push(CigarOp::new(kind, len as u32));
        start = i + 1;
    }
    if start != text.len() {
        return None;
    }
    Some(ops)
}

/// Format a CIGAR list, `*` when empty.
pub fn format_cigar(ops: &[CigarOp]) -> String {
    if ops.is_empty() {
        return "*".to_string();
    }
    ops.iter().map(|op| op.to_string()).collect()
}

/// Number of reference bases covered.
pub fn reference_len(ops: &[CigarOp]) -> u64 {
    ops.iter()
        .filter(|op| op.kind.consumes_reference())
        .map(|op| op.len as u64)
        .sum()
}

/// Number of query bases, i.e. the expected sequence length.
pub fn query_len(ops: &[CigarOp]) -> usize {
    ops.iter()
        .filter(|op| op.kind.consumes_query())
        .map(|op| op.len as usize)
        .sum()
}
