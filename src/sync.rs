//! Lockstep reading of several sorted record streams.
//!
//! Each call to [`MultiFileSyncReader::advance`] moves to the smallest
//! `(reference, position)` among the streams' buffered records and hands out
//! one record from every stream sitting at that position. Streams are
//! validated as they are read; a regression in any of them surfaces as
//! [`BrixError::UnsortedInput`](crate::error::BrixError::UnsortedInput)
//! carrying the stream number.

use log::debug;

use crate::error::{BrixError, Result};
use crate::index::BinningIndex;
use crate::query::{RegionQueryIterator, SeekableSource};
use crate::record::Locatable;
use crate::region::Region;
use crate::streaming::SortValidator;

type RecordStream<R> = Box<dyn Iterator<Item = Result<R>>>;

struct StreamSlot<R> {
    source: RecordStream<R>,
    /// Next record not yet handed out.
    current: Option<R>,
    /// Record handed out by the last `advance`.
    line: Option<R>,
    validator: SortValidator,
}

impl<R: Locatable> StreamSlot<R> {
    fn pull(&mut self) -> Result<()> {
        self.current = match self.source.next() {
            Some(record) => {
                let record = record?;
                self.validator.validate_record(&record)?;
                Some(record)
            }
            None => None,
        };
        Ok(())
    }
}

/// Ordering and parse failures end the walk for good: the offending record
/// is already consumed, so resuming would skip it.
fn latch_copy(err: &BrixError) -> Option<BrixError> {
    match err {
        BrixError::UnsortedInput { stream, message } => Some(BrixError::UnsortedInput {
            stream: *stream,
            message: message.clone(),
        }),
        BrixError::Parse { line, message } => Some(BrixError::Parse {
            line: *line,
            message: message.clone(),
        }),
        _ => None,
    }
}

/// Walks N coordinate-sorted streams in lockstep.
pub struct MultiFileSyncReader<R> {
    streams: Vec<StreamSlot<R>>,
    position: Option<(Option<usize>, u64)>,
    steps: u64,
    failed: Option<BrixError>,
}

impl<R: Locatable> Default for MultiFileSyncReader<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Locatable> MultiFileSyncReader<R> {
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            position: None,
            steps: 0,
            failed: None,
        }
    }

    /// Add a stream and buffer its first record. Returns the stream number.
    pub fn add_stream<I>(&mut self, source: I) -> Result<usize>
    where
        I: Iterator<Item = Result<R>> + 'static,
    {
        let id = self.streams.len();
        let mut slot = StreamSlot {
            source: Box::new(source),
            current: None,
            line: None,
            validator: SortValidator::new(id),
        };
        slot.pull()?;
        self.streams.push(slot);
        Ok(id)
    }

    /// Add a stream restricted to `region` through its index.
    pub fn add_region_stream<S>(
        &mut self,
        source: S,
        index: &BinningIndex,
        region: &Region,
    ) -> Result<usize>
    where
        S: SeekableSource<Record = R> + 'static,
        R: 'static,
    {
        let query =
            RegionQueryIterator::new(source, index, region.reference_id, region.start, region.end)?;
        self.add_stream(query)
    }

    /// Step to the next position. Returns how many streams have a line
    /// there; 0 once every stream is exhausted.
    pub fn advance(&mut self) -> Result<usize> {
        if let Some(copy) = self.failed.as_ref().and_then(latch_copy) {
            return Err(copy);
        }
        for slot in &mut self.streams {
            slot.line = None;
        }

        let Some(min) = self
            .streams
            .iter()
            .filter_map(|s| s.current.as_ref().map(Locatable::sort_key))
            .min()
        else {
            self.position = None;
            return Ok(0);
        };

        let mut active = 0;
        for slot in &mut self.streams {
            let at_min = slot
                .current
                .as_ref()
                .is_some_and(|r| r.sort_key() == min);
            if at_min {
                slot.line = slot.current.take();
                if let Err(err) = slot.pull() {
                    self.failed = latch_copy(&err);
                    self.position = None;
                    return Err(err);
                }
                active += 1;
            }
        }

        let reference_id = (min.0 != usize::MAX).then_some(min.0);
        self.position = Some((reference_id, min.1));
        self.steps += 1;
        if self.steps % 1_000_000 == 0 {
            debug!("sync: {} steps, at {:?}", self.steps, self.position);
        }
        Ok(active)
    }

    /// Number of streams.
    pub fn streams(&self) -> usize {
        self.streams.len()
    }

    /// Whether stream `i` produced a line at the current position.
    pub fn has_line(&self, i: usize) -> bool {
        self.streams.get(i).is_some_and(|s| s.line.is_some())
    }

    /// Line of stream `i` at the current position.
    pub fn line(&self, i: usize) -> Option<&R> {
        self.streams.get(i).and_then(|s| s.line.as_ref())
    }

    /// Take ownership of the line of stream `i`.
    pub fn take_line(&mut self, i: usize) -> Option<R> {
        self.streams.get_mut(i).and_then(|s| s.line.take())
    }

    /// Current `(reference id, position)`; the id is `None` for unplaced
    /// records. `None` before the first step and after the last.
    pub fn position(&self) -> Option<(Option<usize>, u64)> {
        self.position
    }
}
