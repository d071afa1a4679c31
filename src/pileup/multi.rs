//! Pileups across several samples in lockstep.

use crate::config::PileupConfig;
use crate::error::Result;
use crate::record::AlignmentRecord;
use crate::region::Region;

use super::{PileupAssembler, PileupColumn, PileupEntry, PileupStats};

/// Entries of every sample at one position.
#[derive(Debug, Clone)]
pub struct MultiPileupColumn {
    pub reference_id: usize,
    pub position: u64,
    /// One entry list per sample, empty where a sample has no coverage.
    pub samples: Vec<Vec<PileupEntry>>,
}

impl MultiPileupColumn {
    pub fn depth(&self, sample: usize) -> usize {
        self.samples.get(sample).map_or(0, Vec::len)
    }

    pub fn effective_depth(&self, sample: usize) -> usize {
        self.samples.get(sample).map_or(0, |entries| {
            entries.iter().filter(|e| !e.overlap_suppressed).count()
        })
    }

    pub fn total_depth(&self) -> usize {
        self.samples.iter().map(Vec::len).sum()
    }
}

/// Drives one [`PileupAssembler`] per sample and merges their columns.
///
/// All samples must share one reference dictionary; a column is produced
/// wherever at least one sample has coverage.
pub struct MultiPileup<I> {
    assemblers: Vec<PileupAssembler<I>>,
    peeked: Vec<Option<PileupColumn>>,
    exhausted: Vec<bool>,
}

impl<I> MultiPileup<I>
where
    I: Iterator<Item = Result<AlignmentRecord>>,
{
    pub fn new(sources: Vec<I>, config: &PileupConfig) -> Self {
        let assemblers: Vec<_> = sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| PileupAssembler::new(source, config).with_stream_id(i))
            .collect();
        let n = assemblers.len();
        Self {
            assemblers,
            peeked: vec![None; n],
            exhausted: vec![false; n],
        }
    }

    /// Restrict every sample to `region`.
    pub fn with_region(mut self, region: &Region) -> Self {
        self.assemblers = self
            .assemblers
            .into_iter()
            .map(|a| a.with_region(region))
            .collect();
        self
    }

    pub fn samples(&self) -> usize {
        self.assemblers.len()
    }

    /// Per-sample statistics.
    pub fn stats(&self) -> Vec<PileupStats> {
        self.assemblers.iter().map(|a| a.stats()).collect()
    }

    fn fill(&mut self) -> Result<()> {
        for (i, assembler) in self.assemblers.iter_mut().enumerate() {
            if self.peeked[i].is_some() || self.exhausted[i] {
                continue;
            }
            match assembler.next() {
                Some(column) => self.peeked[i] = Some(column?),
                None => self.exhausted[i] = true,
            }
        }
        Ok(())
    }
}

impl<I> Iterator for MultiPileup<I>
where
    I: Iterator<Item = Result<AlignmentRecord>>,
{
    type Item = Result<MultiPileupColumn>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.fill() {
            self.exhausted.iter_mut().for_each(|done| *done = true);
            self.peeked.iter_mut().for_each(|p| *p = None);
            return Some(Err(e));
        }

        let (reference_id, position) = self
            .peeked
            .iter()
            .flatten()
            .map(|c| (c.reference_id, c.position))
            .min()?;

        let samples = self
            .peeked
            .iter_mut()
            .map(|slot| {
                let here = matches!(
                    slot,
                    Some(c) if c.reference_id == reference_id && c.position == position
                );
                if here {
                    slot.take().map(PileupColumn::into_entries).unwrap_or_default()
                } else {
                    Vec::new()
                }
            })
            .collect();

        Some(Ok(MultiPileupColumn {
            reference_id,
            position,
            samples,
        }))
    }
}
