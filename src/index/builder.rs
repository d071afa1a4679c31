//! Single-pass index construction.
//!
//! Records are pushed in file order together with the virtual offsets at
//! which they start and end. Consecutive records falling into the same bin
//! are coalesced into one chunk; the chunk is closed whenever the bin or the
//! reference changes. The linear index remembers, for every window a record
//! touches, the offset of the first such record.

use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::bgzf::VirtualOffset;
use crate::config::{IndexConfig, IndexKind};
use crate::error::{BrixError, Result};
use crate::parallel::PARALLEL_THRESHOLD;
use crate::query::RecordSource;
use crate::record::Locatable;

use super::{Bin, BinningIndex, BinningScheme, Chunk, ReferenceIndex, ReferenceMetadata};

/// Per-reference state while records are still arriving.
#[derive(Debug, Default)]
struct ReferenceState {
    bins: FxHashMap<u32, Vec<Chunk>>,
    linear: Vec<Option<VirtualOffset>>,
    metadata: Option<ReferenceMetadata>,
}

/// The chunk currently being extended.
#[derive(Debug, Clone, Copy)]
struct OpenChunk {
    reference_id: usize,
    bin: u32,
    start: VirtualOffset,
    end: VirtualOffset,
}

/// Incremental builder for a [`BinningIndex`].
#[derive(Debug)]
pub struct IndexBuilder {
    kind: IndexKind,
    scheme: BinningScheme,
    references: Vec<ReferenceState>,
    open: Option<OpenChunk>,
    last_key: Option<(usize, u64)>,
    seen_unplaced: bool,
    unplaced: u64,
    records: u64,
}

impl IndexBuilder {
    /// Start an index for a file with `reference_count` header references.
    pub fn new(config: &IndexConfig, reference_count: usize) -> Result<Self> {
        config.validate()?;
        let mut references = Vec::with_capacity(reference_count);
        references.resize_with(reference_count, ReferenceState::default);
        Ok(Self {
            kind: config.kind,
            scheme: BinningScheme::new(config.min_shift, config.depth),
            references,
            open: None,
            last_key: None,
            seen_unplaced: false,
            unplaced: 0,
            records: 0,
        })
    }

    /// Records pushed so far, placed or not.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Add one record occupying `[start, end)` in the compressed stream.
    ///
    /// Placed records must arrive sorted by reference id then start, and all
    /// unplaced records must come after the placed ones.
    pub fn push<L: Locatable>(
        &mut self,
        record: &L,
        start: VirtualOffset,
        end: VirtualOffset,
    ) -> Result<()> {
        self.records += 1;

        let Some(reference_id) = record.reference_id() else {
            self.close_chunk();
            self.seen_unplaced = true;
            self.unplaced += 1;
            return Ok(());
        };

        let position = record.start();
        if self.seen_unplaced {
            return Err(unsorted(format!(
                "placed record on reference #{} after unplaced records",
                reference_id
            )));
        }
        if let Some(last) = self.last_key {
            if (reference_id, position) < last {
                return Err(unsorted(format!(
                    "record at #{}:{} follows #{}:{}",
                    reference_id, position, last.0, last.1
                )));
            }
        }
        self.last_key = Some((reference_id, position));

        // Empty or inverted spans still occupy their first base.
        let record_end = record.end().max(position.saturating_add(1));
        if record_end > self.scheme.max_position() {
            return Err(BrixError::InvalidArgument(format!(
                "record end {} on reference #{} exceeds the indexable maximum {}",
                record_end,
                reference_id,
                self.scheme.max_position()
            )));
        }

        if reference_id >= self.references.len() {
            self.references
                .resize_with(reference_id + 1, ReferenceState::default);
        }

        let bin = self.scheme.region_to_bin(position, record_end);
        let extends = matches!(
            self.open,
            Some(open) if open.reference_id == reference_id && open.bin == bin
        );
        if extends {
            if let Some(open) = self.open.as_mut() {
                open.end = end;
            }
        } else {
            self.close_chunk();
            self.open = Some(OpenChunk {
                reference_id,
                bin,
                start,
                end,
            });
        }

        let shift = self.scheme.min_shift;
        let state = &mut self.references[reference_id];
        let first_window = (position >> shift) as usize;
        let last_window = ((record_end - 1) >> shift) as usize;
        if state.linear.len() <= last_window {
            state.linear.resize(last_window + 1, None);
        }
        for slot in &mut state.linear[first_window..=last_window] {
            slot.get_or_insert(start);
        }

        let metadata = state.metadata.get_or_insert(ReferenceMetadata {
            start,
            ..Default::default()
        });
        metadata.end = end;
        if record.is_unmapped() {
            metadata.unmapped += 1;
        } else {
            metadata.mapped += 1;
        }
        Ok(())
    }

    fn close_chunk(&mut self) {
        if let Some(open) = self.open.take() {
            self.references[open.reference_id]
                .bins
                .entry(open.bin)
                .or_default()
                .push(Chunk::new(open.start, open.end));
        }
    }

    /// Close the last chunk and produce the finished index.
    pub fn finish(mut self) -> BinningIndex {
        self.close_chunk();
        let scheme = self.scheme;
        let kind = self.kind;

        let references: Vec<ReferenceIndex> = if self.references.len() >= PARALLEL_THRESHOLD {
            self.references
                .into_par_iter()
                .map(|state| finalize_reference(state, scheme, kind))
                .collect()
        } else {
            self.references
                .into_iter()
                .map(|state| finalize_reference(state, scheme, kind))
                .collect()
        };

        let bins: usize = references.iter().map(|r| r.bins.len()).sum();
        info!(
            "indexed {} records over {} references ({} bins, {} unplaced)",
            self.records,
            references.len(),
            bins,
            self.unplaced
        );
        BinningIndex::new(kind, scheme, references, Some(self.unplaced))
    }
}

fn unsorted(message: String) -> BrixError {
    BrixError::UnsortedInput { stream: 0, message }
}

fn finalize_reference(
    state: ReferenceState,
    scheme: BinningScheme,
    kind: IndexKind,
) -> ReferenceIndex {
    let ReferenceState {
        bins,
        linear,
        metadata,
    } = state;

    // Windows no record touched inherit the previous window's offset;
    // leading holes take the first record on the reference.
    let mut filled: Vec<VirtualOffset> = Vec::with_capacity(linear.len());
    let mut previous = metadata.map(|m| m.start).unwrap_or_default();
    for slot in linear {
        let offset = slot.unwrap_or(previous);
        filled.push(offset);
        previous = offset;
    }

    let bins = bins
        .into_iter()
        .map(|(id, chunks)| {
            let loffset = match kind {
                IndexKind::Csi => filled
                    .get(scheme.first_window(id) as usize)
                    .copied()
                    .unwrap_or_default(),
                IndexKind::Bai => VirtualOffset::default(),
            };
            let chunks = merge_adjacent(chunks);
            (id, Bin { loffset, chunks })
        })
        .collect::<FxHashMap<_, _>>();

    debug!("finalized reference: {} bins, {} windows", bins.len(), filled.len());
    // CSI keeps the window offsets inside its bins only.
    if kind == IndexKind::Csi {
        filled.clear();
    }
    ReferenceIndex {
        bins,
        linear: filled,
        metadata,
    }
}

/// Merge chunks of one bin that end and start in the same BGZF block.
fn merge_adjacent(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort_unstable();
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(last) if last.end.compressed() == chunk.start.compressed() => {
                last.end = last.end.max(chunk.end);
            }
            _ => merged.push(chunk),
        }
    }
    merged
}

/// Read every record from `source` and index it.
pub fn build_index<S: RecordSource>(
    source: &mut S,
    config: &IndexConfig,
    reference_count: usize,
) -> Result<BinningIndex> {
    let mut builder = IndexBuilder::new(config, reference_count)?;
    loop {
        let start = source.virtual_position();
        let Some(record) = source.next_record()? else {
            break;
        };
        let end = source.virtual_position();
        builder.push(&record, start, end)?;
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Span {
        reference_id: Option<usize>,
        start: u64,
        end: u64,
    }

    impl Locatable for Span {
        fn reference_id(&self) -> Option<usize> {
            self.reference_id
        }
        fn start(&self) -> u64 {
            self.start
        }
        fn end(&self) -> u64 {
            self.end
        }
    }

    fn span(reference_id: usize, start: u64, end: u64) -> Span {
        Span {
            reference_id: Some(reference_id),
            start,
            end,
        }
    }

    fn vo(c: u64, u: u16) -> VirtualOffset {
        VirtualOffset::new(c, u)
    }

    #[test]
    fn test_same_bin_records_share_a_chunk() {
        let mut builder = IndexBuilder::new(&IndexConfig::bai(), 1).unwrap();
        builder.push(&span(0, 10, 60), vo(0, 0), vo(0, 100)).unwrap();
        builder.push(&span(0, 20, 70), vo(0, 100), vo(0, 200)).unwrap();
        builder.push(&span(0, 500_000, 500_050), vo(0, 200), vo(0, 300)).unwrap();
        let index = builder.finish();

        let reference = index.reference(0).unwrap();
        assert_eq!(reference.bins.len(), 2);
        assert_eq!(
            reference.bins[&4681].chunks,
            vec![Chunk::new(vo(0, 0), vo(0, 200))]
        );
        let metadata = reference.metadata.unwrap();
        assert_eq!(metadata.start, vo(0, 0));
        assert_eq!(metadata.end, vo(0, 300));
        assert_eq!(metadata.mapped, 3);
        assert_eq!(index.unplaced_count(), Some(0));
    }

    #[test]
    fn test_linear_holes_are_filled() {
        let mut builder = IndexBuilder::new(&IndexConfig::bai(), 1).unwrap();
        builder.push(&span(0, 20_000, 20_100), vo(10, 0), vo(10, 50)).unwrap();
        builder.push(&span(0, 70_000, 70_100), vo(20, 0), vo(20, 50)).unwrap();
        let index = builder.finish();
        let linear = &index.reference(0).unwrap().linear;
        // windows: 0 (leading hole), 1 (first record), 2..=3 (holes), 4
        assert_eq!(linear.len(), 5);
        assert_eq!(linear[0], vo(10, 0));
        assert_eq!(linear[1], vo(10, 0));
        assert_eq!(linear[3], vo(10, 0));
        assert_eq!(linear[4], vo(20, 0));
    }

    #[test]
    fn test_unsorted_input_rejected() {
        let mut builder = IndexBuilder::new(&IndexConfig::bai(), 2).unwrap();
        builder.push(&span(1, 100, 200), vo(0, 0), vo(0, 10)).unwrap();
        let err = builder
            .push(&span(0, 100, 200), vo(0, 10), vo(0, 20))
            .unwrap_err();
        assert!(matches!(err, BrixError::UnsortedInput { stream: 0, .. }));

        let mut builder = IndexBuilder::new(&IndexConfig::bai(), 1).unwrap();
        builder.push(&span(0, 500, 600), vo(0, 0), vo(0, 10)).unwrap();
        assert!(builder.push(&span(0, 499, 600), vo(0, 10), vo(0, 20)).is_err());
    }

    #[test]
    fn test_unplaced_records_counted_and_must_trail() {
        let mut builder = IndexBuilder::new(&IndexConfig::bai(), 1).unwrap();
        builder.push(&span(0, 5, 10), vo(0, 0), vo(0, 10)).unwrap();
        let unplaced = Span {
            reference_id: None,
            start: 0,
            end: 1,
        };
        builder.push(&unplaced, vo(0, 10), vo(0, 20)).unwrap();
        builder.push(&unplaced, vo(0, 20), vo(0, 30)).unwrap();
        assert!(builder.push(&span(0, 50, 60), vo(0, 30), vo(0, 40)).is_err());

        let mut builder = IndexBuilder::new(&IndexConfig::bai(), 1).unwrap();
        builder.push(&span(0, 5, 10), vo(0, 0), vo(0, 10)).unwrap();
        builder.push(&unplaced, vo(0, 10), vo(0, 20)).unwrap();
        let index = builder.finish();
        assert_eq!(index.unplaced_count(), Some(1));
        assert_eq!(index.unplaced_start(), Some(vo(0, 10)));
    }

    #[test]
    fn test_position_beyond_scheme_rejected() {
        let mut builder = IndexBuilder::new(&IndexConfig::bai(), 1).unwrap();
        let err = builder
            .push(&span(0, 1 << 29, (1 << 29) + 5), vo(0, 0), vo(0, 1))
            .unwrap_err();
        assert!(matches!(err, BrixError::InvalidArgument(_)));

        let mut builder = IndexBuilder::new(&IndexConfig::csi(14).with_depth(6), 1).unwrap();
        assert!(builder
            .push(&span(0, 1 << 29, (1 << 29) + 5), vo(0, 0), vo(0, 1))
            .is_ok());
    }

    #[test]
    fn test_empty_and_inverted_spans_occupy_one_base() {
        let mut builder = IndexBuilder::new(&IndexConfig::bai(), 1).unwrap();
        builder.push(&span(0, 300, 300), vo(0, 0), vo(0, 10)).unwrap();
        builder.push(&span(0, 20_000, 100), vo(0, 10), vo(0, 20)).unwrap();
        let index = builder.finish();

        let reference = index.reference(0).unwrap();
        assert_eq!(reference.linear.len(), 2);
        assert_eq!(reference.linear[1], vo(0, 10));
        assert_eq!(
            index.query(0, 300, 301).unwrap(),
            vec![Chunk::new(vo(0, 0), vo(0, 10))]
        );
        assert_eq!(
            index.query(0, 20_000, 20_001).unwrap(),
            vec![Chunk::new(vo(0, 10), vo(0, 20))]
        );
    }

    #[test]
    fn test_csi_bins_carry_loffset() {
        let mut builder = IndexBuilder::new(&IndexConfig::csi(14), 1).unwrap();
        builder.push(&span(0, 100, 200), vo(0, 0), vo(0, 50)).unwrap();
        builder.push(&span(0, 40_000, 40_100), vo(300, 0), vo(300, 50)).unwrap();
        let index = builder.finish();
        let bins = &index.reference(0).unwrap().bins;
        assert_eq!(bins[&4681].loffset, vo(0, 0));
        assert_eq!(bins[&4683].loffset, vo(300, 0));
    }

    #[test]
    fn test_chunks_in_same_block_merge() {
        let chunks = vec![
            Chunk::new(vo(100, 0), vo(100, 500)),
            Chunk::new(vo(100, 700), vo(200, 10)),
            Chunk::new(vo(400, 0), vo(400, 20)),
        ];
        assert_eq!(
            merge_adjacent(chunks),
            vec![
                Chunk::new(vo(100, 0), vo(200, 10)),
                Chunk::new(vo(400, 0), vo(400, 20)),
            ]
        );
    }
}
