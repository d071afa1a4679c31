//! Pileup assembly.
//!
//! [`PileupAssembler`] turns a coordinate-sorted record stream into one
//! [`PileupColumn`] per covered reference position. Records enter the active
//! set when the walk reaches their start and leave after their last
//! reference base; each active record's CIGAR is walked incrementally as the
//! position advances.
//!
//! Memory is bounded by the depth cap: once a position holds `max_depth`
//! active records, further records starting there are read (to keep the
//! stream moving) but counted and dropped.

mod cursor;
pub mod multi;

pub use multi::{MultiPileup, MultiPileupColumn};

use std::fmt;
use std::sync::Arc;

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::PileupConfig;
use crate::error::Result;
use crate::record::{AlignmentFlags, AlignmentRecord, CigarKind, Locatable};
use crate::region::Region;
use crate::streaming::{ActiveSet, SortValidator};

use cursor::CigarCursor;

/// One record's contribution to a column.
#[derive(Debug, Clone)]
pub struct PileupEntry {
    pub record: Arc<AlignmentRecord>,
    /// Offset into the record's sequence; for deletions and skips, the
    /// offset of the next query base.
    pub qpos: usize,
    /// Insertion (positive) or deletion (negative) length right after this
    /// base, 0 otherwise.
    pub indel: i32,
    /// Display row, stable for the lifetime of the record.
    pub level: u32,
    pub is_del: bool,
    pub is_refskip: bool,
    /// Position is the record's first reference base.
    pub is_head: bool,
    /// Position is the record's last reference base.
    pub is_tail: bool,
    /// Phred quality of the base, 0 for deletions, skips and missing data.
    pub qual: u8,
    /// Second mate of an overlapping pair: present in the column but not
    /// counted by [`PileupColumn::effective_depth`].
    pub overlap_suppressed: bool,
}

impl PileupEntry {
    /// Base at this position, `None` for deletions, skips or missing
    /// sequence.
    pub fn base(&self) -> Option<u8> {
        if self.is_del || self.is_refskip {
            return None;
        }
        self.record.sequence.get(self.qpos).copied()
    }

    pub fn mapq(&self) -> u8 {
        self.record.mapq
    }

    pub fn is_reverse(&self) -> bool {
        self.record.flags.is_reverse()
    }

    /// Display character: the base (lower case on the reverse strand), `*`
    /// for a deletion, `>`/`<` for a reference skip.
    pub fn base_char(&self) -> u8 {
        let reverse = self.is_reverse();
        if self.is_del {
            b'*'
        } else if self.is_refskip {
            if reverse {
                b'<'
            } else {
                b'>'
            }
        } else {
            let base = self.base().unwrap_or(b'N');
            if reverse {
                base.to_ascii_lowercase()
            } else {
                base.to_ascii_uppercase()
            }
        }
    }
}

/// Every entry overlapping one reference position.
#[derive(Debug, Clone)]
pub struct PileupColumn {
    pub reference_id: usize,
    /// 0-based reference position.
    pub position: u64,
    entries: Vec<PileupEntry>,
}

impl PileupColumn {
    pub fn entries(&self) -> &[PileupEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<PileupEntry> {
        self.entries
    }

    /// Number of entries.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Entries not suppressed as overlapping mates.
    pub fn effective_depth(&self) -> usize {
        self.entries.iter().filter(|e| !e.overlap_suppressed).count()
    }
}

/// Counters collected while piling up.
#[derive(Debug, Default, Clone, Copy)]
pub struct PileupStats {
    /// Records pulled from the source.
    pub records: u64,
    /// Records filtered out (flags, MAPQ, no aligned bases).
    pub skipped: u64,
    /// Records over the depth cap.
    pub dropped: u64,
    /// Columns emitted.
    pub columns: u64,
    /// Largest active set seen.
    pub max_active: usize,
}

impl fmt::Display for PileupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "records={} skipped={} dropped={} columns={} max_active={}",
            self.records, self.skipped, self.dropped, self.columns, self.max_active
        )
    }
}

/// A record currently overlapping the walk position.
#[derive(Debug)]
struct ActiveRead {
    id: u64,
    record: Arc<AlignmentRecord>,
    end: u64,
    cursor: CigarCursor,
    level: u32,
    /// Id of the overlapping mate, when pairing is enabled.
    mate: Option<u64>,
}

/// Streaming column builder over a sorted record iterator.
pub struct PileupAssembler<I> {
    records: I,
    config: PileupConfig,
    validator: SortValidator,
    pending: Option<AlignmentRecord>,
    source_done: bool,
    active: ActiveSet<ActiveRead>,
    /// Walk position while reads are active.
    position: Option<(usize, u64)>,
    bounds: Option<(usize, u64, u64)>,
    /// Reads waiting for a mate that starts inside them, by name.
    mates: FxHashMap<String, u64>,
    covered: FxHashSet<u64>,
    next_id: u64,
    finished: bool,
    stats: PileupStats,
}

impl<I> PileupAssembler<I>
where
    I: Iterator<Item = Result<AlignmentRecord>>,
{
    pub fn new(records: I, config: &PileupConfig) -> Self {
        Self {
            records,
            config: *config,
            validator: SortValidator::new(0),
            pending: None,
            source_done: false,
            active: ActiveSet::new(),
            position: None,
            bounds: None,
            mates: FxHashMap::default(),
            covered: FxHashSet::default(),
            next_id: 0,
            finished: false,
            stats: PileupStats::default(),
        }
    }

    /// Input number reported in sort-order errors.
    pub fn with_stream_id(mut self, stream: usize) -> Self {
        self.validator = SortValidator::new(stream);
        self
    }

    /// Emit only columns inside `region`; the walk stops past its end.
    pub fn with_region(mut self, region: &Region) -> Self {
        self.bounds = Some((region.reference_id, region.start, region.end));
        self
    }

    pub fn stats(&self) -> PileupStats {
        let mut stats = self.stats;
        stats.max_active = self.active.max_active();
        stats
    }

    fn keeps(&self, record: &AlignmentRecord) -> bool {
        !record.flags.intersects(self.config.skip_flags)
            && record.mapq >= self.config.min_mapq
            && record.has_aligned_bases()
    }

    fn fill_pending(&mut self) -> Result<()> {
        while self.pending.is_none() && !self.source_done {
            let Some(next) = self.records.next() else {
                self.source_done = true;
                break;
            };
            let record = next?;
            self.stats.records += 1;
            self.validator.validate_record(&record)?;
            if self.keeps(&record) {
                self.pending = Some(record);
            } else {
                self.stats.skipped += 1;
            }
        }
        Ok(())
    }

    fn next_position(&mut self) -> Result<Option<(usize, u64)>> {
        if let Some(position) = self.position {
            return Ok(Some(position));
        }
        self.fill_pending()?;
        Ok(self
            .pending
            .as_ref()
            .and_then(|r| r.reference_id.map(|id| (id, r.start))))
    }

    fn admit(&mut self, reference_id: usize, pos: u64) -> Result<()> {
        loop {
            self.fill_pending()?;
            let starts_here = matches!(
                &self.pending,
                Some(r) if r.reference_id == Some(reference_id) && r.start == pos
            );
            if !starts_here {
                return Ok(());
            }
            let Some(record) = self.pending.take() else {
                return Ok(());
            };
            if self.active.len() >= self.config.max_depth {
                self.stats.dropped += 1;
                continue;
            }
            self.activate(record);
        }
    }

    fn activate(&mut self, record: AlignmentRecord) {
        let id = self.next_id;
        self.next_id += 1;
        let end = record.end();
        let level = self.free_level();
        let mate = if self.config.detect_overlaps {
            self.pair_mate(&record, id, end)
        } else {
            None
        };
        let cursor = CigarCursor::new(record.start);
        self.active.push(ActiveRead {
            id,
            record: Arc::new(record),
            end,
            cursor,
            level,
            mate,
        });
    }

    /// Smallest display level no active read occupies.
    fn free_level(&self) -> u32 {
        let mut used = vec![false; self.active.len() + 1];
        for read in self.active.iter() {
            if let Some(slot) = used.get_mut(read.level as usize) {
                *slot = true;
            }
        }
        used.iter().position(|&u| !u).unwrap_or(0) as u32
    }

    /// Link `record` to an active mate, or register it so its mate can find
    /// it later. Returns the partner's id when linked.
    fn pair_mate(&mut self, record: &AlignmentRecord, id: u64, end: u64) -> Option<u64> {
        let flags = record.flags;
        if !flags.is_paired()
            || flags.is_mate_unmapped()
            || record.mate_reference_id != record.reference_id
        {
            return None;
        }

        if let Some(&other) = self.mates.get(record.name.as_str()) {
            let partner = self.active.iter_mut().find(|r| r.id == other)?;
            if !complementary(partner.record.flags, flags) {
                return None;
            }
            partner.mate = Some(id);
            self.mates.remove(record.name.as_str());
            return Some(other);
        }

        let mate_start = record.mate_start?;
        if mate_start >= record.start && mate_start < end {
            self.mates.insert(record.name.clone(), id);
        }
        None
    }

    fn build_column(&mut self, reference_id: usize, pos: u64) -> PileupColumn {
        let mut entries = Vec::with_capacity(self.active.len());
        let mut links = Vec::with_capacity(self.active.len());
        self.covered.clear();

        for read in self.active.iter_mut() {
            let Some(site) = read.cursor.advance(&read.record.cigar, pos) else {
                continue;
            };
            let is_del = site.kind == CigarKind::Deletion;
            let is_refskip = site.kind == CigarKind::Skip;
            let qual = if is_del || is_refskip {
                0
            } else {
                read.record.qualities.get(site.qpos).copied().unwrap_or(0)
            };
            entries.push(PileupEntry {
                record: Arc::clone(&read.record),
                qpos: site.qpos,
                indel: site.indel,
                level: read.level,
                is_del,
                is_refskip,
                is_head: pos == read.record.start,
                is_tail: pos + 1 == read.end,
                qual,
                overlap_suppressed: false,
            });
            links.push((read.id, read.mate));
            self.covered.insert(read.id);
        }

        if self.config.detect_overlaps {
            for (entry, &(id, mate)) in entries.iter_mut().zip(&links) {
                if let Some(mate) = mate {
                    if mate < id && self.covered.contains(&mate) {
                        entry.overlap_suppressed = true;
                    }
                }
            }
        }

        PileupColumn {
            reference_id,
            position: pos,
            entries,
        }
    }

    /// Drop reads whose last base is `pos`.
    fn retire(&mut self, pos: u64) {
        let mates = &mut self.mates;
        self.active.retain(|read| {
            if read.end > pos + 1 {
                return true;
            }
            if mates.get(read.record.name.as_str()) == Some(&read.id) {
                mates.remove(read.record.name.as_str());
            }
            false
        });
    }

    fn step(&mut self) -> Result<Option<PileupColumn>> {
        while !self.finished {
            let Some((reference_id, pos)) = self.next_position()? else {
                break;
            };
            if let Some((bound_ref, _, bound_end)) = self.bounds {
                if reference_id > bound_ref || (reference_id == bound_ref && pos >= bound_end) {
                    break;
                }
            }

            self.admit(reference_id, pos)?;
            let column = self.build_column(reference_id, pos);
            self.retire(pos);
            self.position = if self.active.is_empty() {
                None
            } else {
                Some((reference_id, pos + 1))
            };

            let inside = match self.bounds {
                Some((bound_ref, start, end)) => {
                    reference_id == bound_ref && pos >= start && pos < end
                }
                None => true,
            };
            if inside && !column.entries.is_empty() {
                self.stats.columns += 1;
                return Ok(Some(column));
            }
        }
        self.finish();
        Ok(None)
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            debug!("pileup finished: {}", self.stats());
        }
    }
}

impl<I> Iterator for PileupAssembler<I>
where
    I: Iterator<Item = Result<AlignmentRecord>>,
{
    type Item = Result<PileupColumn>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(Some(column)) => Some(Ok(column)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// One mate is read 1 and the other read 2, or neither says.
fn complementary(a: AlignmentFlags, b: AlignmentFlags) -> bool {
    let unlabeled = |f: AlignmentFlags| !f.is_read1() && !f.is_read2();
    (a.is_read1() && b.is_read2()) || (a.is_read2() && b.is_read1()) || (unlabeled(a) && unlabeled(b))
}
