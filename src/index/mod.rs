//! Binning index over a coordinate-sorted BGZF file.
//!
//! For every reference the index keeps a set of bins (see [`binning`]),
//! each listing the virtual-offset [`Chunk`]s that hold its records, plus a
//! linear index of the first record offset per window. A query collects the
//! chunks of every bin that could overlap the region, drops those that end
//! before the first possible hit and merges the rest into a short list of
//! spans to scan.
//!
//! Queries over-approximate: records from the returned chunks may still fall
//! outside the region and have to be filtered by their own coordinates.

pub mod binning;
pub mod builder;
pub mod io;

pub use binning::BinningScheme;
pub use builder::IndexBuilder;
pub use io::{index_path_for, locate_index};

use log::debug;
use rustc_hash::FxHashMap;

use crate::bgzf::VirtualOffset;
use crate::config::IndexKind;
use crate::error::{BrixError, Result};

/// Contiguous virtual-offset span `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chunk {
    pub start: VirtualOffset,
    pub end: VirtualOffset,
}

impl Chunk {
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Self { start, end }
    }
}

/// One bin and its chunks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bin {
    /// Smallest record offset in or after the bin's first window (CSI only).
    pub loffset: VirtualOffset,
    pub chunks: Vec<Chunk>,
}

/// Summary stored in the metadata pseudo-bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReferenceMetadata {
    /// Offset of the first record on the reference.
    pub start: VirtualOffset,
    /// Offset just past the last record on the reference.
    pub end: VirtualOffset,
    pub mapped: u64,
    pub unmapped: u64,
}

/// Index data for one reference sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferenceIndex {
    pub bins: FxHashMap<u32, Bin>,
    /// First record offset per window of `2^min_shift` bases.
    pub linear: Vec<VirtualOffset>,
    pub metadata: Option<ReferenceMetadata>,
}

impl ReferenceIndex {
    /// Bin ids in ascending order.
    pub fn sorted_bin_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.bins.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// A complete index: one [`ReferenceIndex`] per reference in header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinningIndex {
    kind: IndexKind,
    scheme: BinningScheme,
    references: Vec<ReferenceIndex>,
    unplaced: Option<u64>,
    aux: Vec<u8>,
}

impl BinningIndex {
    pub fn new(
        kind: IndexKind,
        scheme: BinningScheme,
        references: Vec<ReferenceIndex>,
        unplaced: Option<u64>,
    ) -> Self {
        Self {
            kind,
            scheme,
            references,
            unplaced,
            aux: Vec::new(),
        }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn scheme(&self) -> BinningScheme {
        self.scheme
    }

    pub fn references(&self) -> &[ReferenceIndex] {
        &self.references
    }

    pub fn reference(&self, id: usize) -> Option<&ReferenceIndex> {
        self.references.get(id)
    }

    /// Number of records without a reference, if recorded.
    pub fn unplaced_count(&self) -> Option<u64> {
        self.unplaced
    }

    /// CSI auxiliary data, kept verbatim.
    pub fn aux(&self) -> &[u8] {
        &self.aux
    }

    pub fn set_aux(&mut self, aux: Vec<u8>) {
        self.aux = aux;
    }

    /// Offset where unplaced records begin: just past the last placed one.
    ///
    /// `None` when no reference carries metadata.
    pub fn unplaced_start(&self) -> Option<VirtualOffset> {
        self.references
            .iter()
            .filter_map(|r| r.metadata.map(|m| m.end))
            .max()
    }

    /// Merged chunk list covering every record that may overlap
    /// `[start, end)` on reference `reference_id`.
    ///
    /// An id the index does not know is an error; a known reference without
    /// records, or an empty interval, yields an empty list.
    pub fn query(&self, reference_id: usize, start: u64, end: u64) -> Result<Vec<Chunk>> {
        let reference = self
            .references
            .get(reference_id)
            .ok_or_else(|| BrixError::UnknownReference(format!("#{}", reference_id)))?;

        let bins = self.scheme.region_to_bins(start, end);
        if bins.is_empty() {
            return Ok(Vec::new());
        }

        let min_offset = match self.kind {
            IndexKind::Bai => self.linear_min_offset(reference, start),
            IndexKind::Csi => self.bin_min_offset(reference, start),
        };

        let mut chunks: Vec<Chunk> = bins
            .iter()
            .filter_map(|id| reference.bins.get(id))
            .flat_map(|bin| bin.chunks.iter().copied())
            .filter(|chunk| chunk.end > min_offset)
            .collect();
        let candidates = chunks.len();

        let merged = merge_chunks(&mut chunks);
        debug!(
            "query #{}:{}-{}: {} bins, {} chunks, {} after merging",
            reference_id,
            start,
            end,
            bins.len(),
            candidates,
            merged.len()
        );
        Ok(merged)
    }

    /// Lower bound from the linear index.
    fn linear_min_offset(&self, reference: &ReferenceIndex, start: u64) -> VirtualOffset {
        let window = (start >> self.scheme.min_shift) as usize;
        match reference.linear.get(window) {
            Some(&offset) => offset,
            None => reference.linear.last().copied().unwrap_or_default(),
        }
    }

    /// Lower bound from per-bin offsets: the `loffset` of the finest
    /// existing bin at or before the query start.
    fn bin_min_offset(&self, reference: &ReferenceIndex, start: u64) -> VirtualOffset {
        let scheme = self.scheme;
        let mut bin = BinningScheme::level_start(scheme.depth) + (start >> scheme.min_shift) as u32;
        loop {
            if let Some(found) = reference.bins.get(&bin) {
                return found.loffset;
            }
            if bin == 0 {
                return VirtualOffset::default();
            }
            let first_sibling = (BinningScheme::parent(bin) << 3) + 1;
            if bin > first_sibling {
                bin -= 1;
            } else {
                bin = BinningScheme::parent(bin);
            }
        }
    }
}

/// Sort chunks and merge those that overlap or share a BGZF block.
pub(crate) fn merge_chunks(chunks: &mut [Chunk]) -> Vec<Chunk> {
    chunks.sort_unstable();
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for &chunk in chunks.iter() {
        match merged.last_mut() {
            Some(last)
                if chunk.start <= last.end
                    || chunk.start.compressed() == last.end.compressed() =>
            {
                if chunk.end > last.end {
                    last.end = chunk.end;
                }
            }
            _ => merged.push(chunk),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vo(c: u64, u: u16) -> VirtualOffset {
        VirtualOffset::new(c, u)
    }

    #[test]
    fn test_merge_chunks() {
        let mut chunks = vec![
            Chunk::new(vo(500, 0), vo(600, 0)),
            Chunk::new(vo(100, 0), vo(200, 10)),
            Chunk::new(vo(150, 0), vo(180, 0)),
            Chunk::new(vo(200, 40), vo(300, 0)),
            Chunk::new(vo(900, 0), vo(950, 0)),
        ];
        let merged = merge_chunks(&mut chunks);
        assert_eq!(
            merged,
            vec![
                Chunk::new(vo(100, 0), vo(300, 0)),
                Chunk::new(vo(500, 0), vo(600, 0)),
                Chunk::new(vo(900, 0), vo(950, 0)),
            ]
        );
    }

    #[test]
    fn test_query_unknown_reference() {
        let index = BinningIndex::new(
            IndexKind::Bai,
            BinningScheme::default(),
            vec![ReferenceIndex::default()],
            Some(0),
        );
        assert!(index.query(0, 0, 100).unwrap().is_empty());
        assert!(matches!(
            index.query(3, 0, 100),
            Err(BrixError::UnknownReference(_))
        ));
    }

    #[test]
    fn test_csi_min_offset_walks_left_and_up() {
        let scheme = BinningScheme::new(14, 5);
        let mut reference = ReferenceIndex::default();
        // Only the level-4 bin 585 exists.
        reference.bins.insert(
            585,
            Bin {
                loffset: vo(42, 0),
                chunks: vec![Chunk::new(vo(42, 0), vo(90, 0))],
            },
        );
        let index = BinningIndex::new(IndexKind::Csi, scheme, vec![reference], None);
        // Finest bin for 40_000 is 4683; siblings 4682, 4681 are absent,
        // then the parent 585 is found.
        let chunks = index.query(0, 40_000, 40_100).unwrap();
        assert_eq!(chunks, vec![Chunk::new(vo(42, 0), vo(90, 0))]);
        assert_eq!(
            index.bin_min_offset(index.reference(0).unwrap(), 40_000),
            vo(42, 0)
        );
    }
}
