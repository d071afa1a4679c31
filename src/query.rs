//! Region queries over an indexed BGZF file.
//!
//! [`RegionQueryIterator`] turns the chunk list of a
//! [`BinningIndex::query`] into the records that truly overlap the region:
//!
//! ```text
//!   Seeking ──seek(chunk.start)──▶ Scanning ──tell >= chunk.end──▶ Seeking
//!      │                              │
//!      └── no chunks left ──▶ Exhausted ◀── record past the region / EOF
//! ```
//!
//! Records inside a chunk that do not overlap the region are read and
//! dropped. Because chunks are merged and disjoint, no record is yielded
//! twice.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::bgzf::{self, BgzfReader, VirtualOffset};
use crate::config::ReaderConfig;
use crate::error::{BrixError, Result};
use crate::genome::Genome;
use crate::index::{io as index_io, BinningIndex, Chunk};
use crate::record::{AlignmentRecord, Locatable, SamReader};
use crate::region::Region;

/// A stream of located records that reports virtual offsets.
pub trait RecordSource {
    type Record: Locatable;

    /// Decode the next record, `None` at end of stream.
    fn next_record(&mut self) -> Result<Option<Self::Record>>;

    /// Offset of the next unread record.
    fn virtual_position(&self) -> VirtualOffset;
}

/// A [`RecordSource`] that can jump to a previously reported offset.
pub trait SeekableSource: RecordSource {
    fn seek(&mut self, offset: VirtualOffset) -> Result<()>;
}

impl<S: RecordSource + ?Sized> RecordSource for &mut S {
    type Record = S::Record;

    fn next_record(&mut self) -> Result<Option<Self::Record>> {
        (**self).next_record()
    }

    fn virtual_position(&self) -> VirtualOffset {
        (**self).virtual_position()
    }
}

impl<S: SeekableSource + ?Sized> SeekableSource for &mut S {
    fn seek(&mut self, offset: VirtualOffset) -> Result<()> {
        (**self).seek(offset)
    }
}

impl<R: Read> RecordSource for SamReader<BgzfReader<R>> {
    type Record = AlignmentRecord;

    fn next_record(&mut self) -> Result<Option<AlignmentRecord>> {
        let mut record = AlignmentRecord::default();
        Ok(self.read_record(&mut record)?.then_some(record))
    }

    fn virtual_position(&self) -> VirtualOffset {
        SamReader::virtual_position(self)
    }
}

impl<R: Read + Seek> SeekableSource for SamReader<BgzfReader<R>> {
    fn seek(&mut self, offset: VirtualOffset) -> Result<()> {
        SamReader::seek(self, offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryState {
    Seeking,
    Scanning { chunk_end: VirtualOffset },
    Exhausted,
}

/// Iterator over the records overlapping one region.
pub struct RegionQueryIterator<S> {
    source: S,
    reference_id: usize,
    start: u64,
    end: u64,
    chunks: std::vec::IntoIter<Chunk>,
    state: QueryState,
    scanned: u64,
}

impl<S: SeekableSource> RegionQueryIterator<S> {
    /// Resolve `[start, end)` on `reference_id` through `index` and prepare
    /// to scan `source`.
    pub fn new(
        source: S,
        index: &BinningIndex,
        reference_id: usize,
        start: u64,
        end: u64,
    ) -> Result<Self> {
        let chunks = index.query(reference_id, start, end)?;
        Ok(Self {
            source,
            reference_id,
            start,
            end,
            chunks: chunks.into_iter(),
            state: QueryState::Seeking,
            scanned: 0,
        })
    }

    /// Records decoded so far, including those filtered out.
    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    fn fail(&mut self, err: BrixError) -> Option<Result<S::Record>> {
        self.state = QueryState::Exhausted;
        Some(Err(err))
    }
}

impl<S: SeekableSource> Iterator for RegionQueryIterator<S> {
    type Item = Result<S::Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                QueryState::Exhausted => return None,
                QueryState::Seeking => {
                    let Some(chunk) = self.chunks.next() else {
                        self.state = QueryState::Exhausted;
                        return None;
                    };
                    if let Err(e) = self.source.seek(chunk.start) {
                        return self.fail(e);
                    }
                    self.state = QueryState::Scanning {
                        chunk_end: chunk.end,
                    };
                }
                QueryState::Scanning { chunk_end } => {
                    if self.source.virtual_position() >= chunk_end {
                        self.state = QueryState::Seeking;
                        continue;
                    }
                    let record = match self.source.next_record() {
                        Ok(Some(record)) => record,
                        Ok(None) => {
                            self.state = QueryState::Exhausted;
                            return None;
                        }
                        Err(e) => return self.fail(e),
                    };
                    self.scanned += 1;

                    match record.reference_id() {
                        Some(id) if id == self.reference_id => {
                            if record.start() >= self.end {
                                self.state = QueryState::Exhausted;
                                return None;
                            }
                            if record.end() > self.start {
                                return Some(Ok(record));
                            }
                        }
                        Some(id) if id < self.reference_id => {}
                        _ => {
                            self.state = QueryState::Exhausted;
                            return None;
                        }
                    }
                }
            }
        }
    }
}

/// Records with no reference, stored after every placed record.
pub struct UnplacedRecords<S> {
    source: S,
    done: bool,
}

impl<S: RecordSource> Iterator for UnplacedRecords<S> {
    type Item = Result<S::Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.source.next_record() {
                Ok(Some(record)) if record.reference_id().is_none() => return Some(Ok(record)),
                Ok(Some(_)) => {}
                Ok(None) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// SAM records from a BGZF file with an optional index.
pub struct IndexedReader<R> {
    reader: SamReader<BgzfReader<R>>,
    index: Option<BinningIndex>,
    data_start: VirtualOffset,
    path: PathBuf,
}

impl IndexedReader<File> {
    /// Open `path`, loading `<path>.csi` or `<path>.bai` when present.
    pub fn open<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<Self> {
        let path = path.as_ref();
        let index = match index_io::locate_index(path) {
            Ok(index_path) => {
                debug!("using index {}", index_path.display());
                Some(index_io::load(&index_path)?)
            }
            Err(BrixError::MissingIndex(_)) => None,
            Err(e) => return Err(e),
        };
        let mut reader = Self::new(bgzf::open_bgzf(path, config)?, index)?;
        reader.path = path.to_path_buf();
        Ok(reader)
    }

    /// Open `path` with an explicitly named index file.
    pub fn open_with_index<P: AsRef<Path>, Q: AsRef<Path>>(
        path: P,
        index_path: Q,
        config: &ReaderConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let index = index_io::load(index_path)?;
        let mut reader = Self::new(bgzf::open_bgzf(path, config)?, Some(index))?;
        reader.path = path.to_path_buf();
        Ok(reader)
    }
}

impl<R: Read + Seek> IndexedReader<R> {
    /// Wrap a BGZF stream, consuming its header.
    pub fn new(inner: BgzfReader<R>, index: Option<BinningIndex>) -> Result<Self> {
        let reader = SamReader::new(inner)?;
        if let Some(index) = &index {
            if index.references().len() != reader.genome().len() {
                warn!(
                    "index lists {} references but the header has {}",
                    index.references().len(),
                    reader.genome().len()
                );
            }
        }
        let data_start = reader.virtual_position();
        Ok(Self {
            reader,
            index,
            data_start,
            path: PathBuf::from("-"),
        })
    }

    pub fn genome(&self) -> &Genome {
        self.reader.genome()
    }

    pub fn header(&self) -> &str {
        self.reader.header()
    }

    pub fn index(&self) -> Option<&BinningIndex> {
        self.index.as_ref()
    }

    fn require_index(&self) -> Result<&BinningIndex> {
        self.index
            .as_ref()
            .ok_or_else(|| BrixError::MissingIndex(self.path.clone()))
    }

    /// Records overlapping `region`.
    pub fn query(
        &mut self,
        region: &Region,
    ) -> Result<RegionQueryIterator<&mut SamReader<BgzfReader<R>>>> {
        let index = self.index.as_ref().ok_or_else(|| BrixError::MissingIndex(self.path.clone()))?;
        RegionQueryIterator::new(
            &mut self.reader,
            index,
            region.reference_id,
            region.start,
            region.end,
        )
    }

    /// Parse `text` as a region and query it.
    pub fn query_str(
        &mut self,
        text: &str,
    ) -> Result<RegionQueryIterator<&mut SamReader<BgzfReader<R>>>> {
        let region = Region::parse(text, self.genome())?;
        self.query(&region)
    }

    /// Consume the reader into an owning query over `region`.
    pub fn into_query(self, region: &Region) -> Result<RegionQueryIterator<SamReader<BgzfReader<R>>>> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| BrixError::MissingIndex(self.path.clone()))?;
        RegionQueryIterator::new(
            self.reader,
            index,
            region.reference_id,
            region.start,
            region.end,
        )
    }

    /// Every record from the start of the data, index or not.
    pub fn records(&mut self) -> Result<crate::record::sam::Records<'_, BgzfReader<R>>> {
        self.reader.seek(self.data_start)?;
        Ok(self.reader.records())
    }

    /// Records without a reference, found through the index.
    pub fn unplaced(&mut self) -> Result<UnplacedRecords<&mut SamReader<BgzfReader<R>>>> {
        let start = self.require_index()?.unplaced_start().unwrap_or(self.data_start);
        self.reader.seek(start)?;
        Ok(UnplacedRecords {
            source: &mut self.reader,
            done: false,
        })
    }

    pub fn into_inner(self) -> SamReader<BgzfReader<R>> {
        self.reader
    }
}
