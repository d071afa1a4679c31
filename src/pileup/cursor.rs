//! Incremental CIGAR walking.
//!
//! A pileup visits every reference position of a record in increasing
//! order. The cursor keeps the index of the current operation together with
//! the reference and query coordinates at which it starts, so each position
//! costs amortized O(1) instead of a rescan from the first operation.

use crate::record::{CigarKind, CigarOp};

/// What a record shows at one reference position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Site {
    pub kind: CigarKind,
    /// Query offset of the aligned base; for deletions and skips, the
    /// offset of the next query base.
    pub qpos: usize,
    /// Length of an insertion (positive) or deletion (negative) that
    /// directly follows this base.
    pub indel: i32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CigarCursor {
    /// Current operation.
    k: usize,
    /// Reference position where operation `k` starts.
    x: u64,
    /// Query offset where operation `k` starts.
    y: usize,
}

impl CigarCursor {
    pub fn new(start: u64) -> Self {
        Self { k: 0, x: start, y: 0 }
    }

    /// Site at `pos`. Calls must use non-decreasing positions; `None` once
    /// `pos` is past the last reference-consuming operation.
    pub fn advance(&mut self, cigar: &[CigarOp], pos: u64) -> Option<Site> {
        while let Some(op) = cigar.get(self.k) {
            if op.kind.consumes_reference() {
                if pos < self.x + op.len as u64 {
                    break;
                }
                self.x += op.len as u64;
            }
            if op.kind.consumes_query() {
                self.y += op.len as usize;
            }
            self.k += 1;
        }

        let op = cigar.get(self.k)?;
        let offset = pos.checked_sub(self.x)?;
        let site = match op.kind {
            CigarKind::Deletion | CigarKind::Skip => Site {
                kind: op.kind,
                qpos: self.y,
                indel: 0,
            },
            kind => {
                let last_base = offset + 1 == op.len as u64;
                Site {
                    kind,
                    qpos: self.y + offset as usize,
                    indel: if last_base {
                        following_indel(&cigar[self.k + 1..])
                    } else {
                        0
                    },
                }
            }
        };
        Some(site)
    }
}

/// Indel right after an aligned block, looking through padding.
fn following_indel(rest: &[CigarOp]) -> i32 {
    let mut inserted: i64 = 0;
    for op in rest {
        match op.kind {
            CigarKind::Padding => continue,
            CigarKind::Insertion => inserted += op.len as i64,
            CigarKind::Deletion if inserted == 0 => return -(op.len as i32),
            _ => break,
        }
    }
    inserted.min(i32::MAX as i64) as i32
}
