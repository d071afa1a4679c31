//! Block-decompressing reader with virtual-offset seeking.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::{self, BufRead, Read, Seek, SeekFrom};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{trace, warn};

use super::block::{read_raw_block, RawBlock};
use super::VirtualOffset;
use crate::config::ReaderConfig;
use crate::error::{BrixError, Result};
use crate::parallel::WorkerPool;

/// Outcome of [`BgzfReader::decompress_next`].
#[derive(Debug, PartialEq, Eq)]
pub enum BlockRead {
    /// A block's decompressed payload and its size on disk.
    Data { data: Vec<u8>, block_len: usize },
    /// End of stream, preceded by the empty terminal block.
    Eof,
    /// End of stream without the terminal block; the file may be truncated.
    Truncated,
}

/// A decoded block on its way back from a worker.
struct Inflated {
    seq: u64,
    offset: u64,
    block_len: usize,
    result: Result<Vec<u8>>,
}

impl Ord for Inflated {
    fn cmp(&self, other: &Self) -> Ordering {
        // Smallest sequence number first.
        other.seq.cmp(&self.seq)
    }
}

impl PartialOrd for Inflated {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Inflated {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Inflated {}

/// Speculative decompression state when a worker pool is attached.
struct ReadAhead {
    pool: Arc<WorkerPool>,
    depth: usize,
    sender: Sender<Inflated>,
    receiver: Receiver<Inflated>,
    /// Blocks that finished out of order.
    ready: BinaryHeap<Inflated>,
    next_submit: u64,
    next_deliver: u64,
    /// Submitted (or failed) blocks not yet handed to the consumer.
    pending: usize,
    input_done: bool,
}

impl ReadAhead {
    fn new(pool: Arc<WorkerPool>, depth: usize) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            pool,
            depth: depth.max(1),
            sender,
            receiver,
            ready: BinaryHeap::new(),
            next_submit: 0,
            next_deliver: 0,
            pending: 0,
            input_done: false,
        }
    }

    fn submit(&mut self, raw: RawBlock) -> Result<()> {
        let seq = self.next_submit;
        let sender = self.sender.clone();
        self.pool.execute(move || {
            let offset = raw.offset;
            let block_len = raw.size;
            let result = raw.inflate();
            let _ = sender.send(Inflated {
                seq,
                offset,
                block_len,
                result,
            });
        })?;
        self.next_submit += 1;
        self.pending += 1;
        Ok(())
    }

    /// Record a read failure in sequence so it surfaces on the block that
    /// hit it, not earlier.
    fn push_error(&mut self, offset: u64, err: BrixError) {
        self.ready.push(Inflated {
            seq: self.next_submit,
            offset,
            block_len: 0,
            result: Err(err),
        });
        self.next_submit += 1;
        self.pending += 1;
        self.input_done = true;
    }

    /// Wait for the next block in stream order.
    fn deliver(&mut self) -> Result<Inflated> {
        loop {
            if self.ready.peek().map(|b| b.seq) == Some(self.next_deliver) {
                if let Some(block) = self.ready.pop() {
                    self.next_deliver += 1;
                    self.pending -= 1;
                    return Ok(block);
                }
            }
            let block = self
                .receiver
                .recv()
                .map_err(|_| BrixError::Compression("decompression worker vanished".to_string()))?;
            self.ready.push(block);
        }
    }

    /// Discard everything in flight, e.g. before a seek.
    fn reset(&mut self) {
        let outstanding = self.pending - self.ready.len();
        for _ in 0..outstanding {
            if self.receiver.recv().is_err() {
                break;
            }
        }
        self.ready.clear();
        self.pending = 0;
        self.next_submit = 0;
        self.next_deliver = 0;
        self.input_done = false;
    }
}

/// Reader over a BGZF stream exposing the decompressed bytes.
///
/// Implements [`Read`] and [`BufRead`]; when the underlying reader is
/// [`Seek`], any position previously returned by
/// [`virtual_position`](Self::virtual_position) can be revisited with
/// [`seek`](Self::seek).
pub struct BgzfReader<R> {
    inner: R,
    /// File offset of the block held in `data`.
    block_offset: u64,
    /// Size on disk of the block held in `data`.
    block_len: usize,
    /// File offset where the next raw block will be read from `inner`.
    next_offset: u64,
    data: Vec<u8>,
    pos: usize,
    block_loaded: bool,
    blocks_read: u64,
    last_block_empty: bool,
    at_eof: bool,
    truncated: bool,
    /// First block-level failure. Block boundaries past it cannot be
    /// trusted, so every later read repeats it until a seek.
    failed: Option<BrixError>,
    read_ahead: Option<ReadAhead>,
}

/// Copy of a block-level error, kept by the reader after a failure.
fn latch_copy(err: &BrixError) -> Option<BrixError> {
    match err {
        BrixError::CorruptBlock { offset, reason } => Some(BrixError::CorruptBlock {
            offset: *offset,
            reason: reason.clone(),
        }),
        BrixError::UnexpectedEof { offset } => Some(BrixError::UnexpectedEof { offset: *offset }),
        _ => None,
    }
}

impl<R: Read> BgzfReader<R> {
    /// Create a reader positioned at the start of `inner`.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, &ReaderConfig::default())
    }

    /// Create a reader, attaching the configured worker pool if any.
    pub fn with_config(inner: R, config: &ReaderConfig) -> Self {
        let read_ahead = config
            .pool
            .as_ref()
            .map(|pool| ReadAhead::new(Arc::clone(pool), config.read_ahead));
        Self {
            inner,
            block_offset: 0,
            block_len: 0,
            next_offset: 0,
            data: Vec::new(),
            pos: 0,
            block_loaded: false,
            blocks_read: 0,
            last_block_empty: false,
            at_eof: false,
            truncated: false,
            failed: None,
            read_ahead,
        }
    }

    /// Virtual offset of the next byte to be read.
    pub fn virtual_position(&self) -> VirtualOffset {
        if self.pos < self.data.len() {
            VirtualOffset::new(self.block_offset, self.pos as u16)
        } else {
            VirtualOffset::new(self.block_offset + self.block_len as u64, 0)
        }
    }

    /// True once the stream ended without the terminal block.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// True once the end of the stream has been reached.
    pub fn is_eof(&self) -> bool {
        self.at_eof
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read and decompress the next block, handing its payload to the caller.
    ///
    /// Any unread bytes of the current block are discarded. Corrupt blocks
    /// abort with [`BrixError::CorruptBlock`]; a block cut short by the end
    /// of the file aborts with [`BrixError::UnexpectedEof`].
    pub fn decompress_next(&mut self) -> Result<BlockRead> {
        match self.next_block()? {
            Some((offset, block_len, data)) => {
                self.block_offset = offset;
                self.block_len = block_len;
                self.data.clear();
                self.pos = 0;
                self.block_loaded = false;
                Ok(BlockRead::Data { data, block_len })
            }
            None if self.truncated => Ok(BlockRead::Truncated),
            None => Ok(BlockRead::Eof),
        }
    }

    /// Load the next block into the internal buffer. Returns false at EOF.
    fn load_block(&mut self) -> Result<bool> {
        match self.next_block()? {
            Some((offset, block_len, data)) => {
                self.block_offset = offset;
                self.block_len = block_len;
                self.data = data;
                self.pos = 0;
                self.block_loaded = true;
                Ok(true)
            }
            None => {
                // Park the cursor at the end of the last block.
                self.block_offset += self.block_len as u64;
                self.block_len = 0;
                self.data.clear();
                self.pos = 0;
                self.block_loaded = false;
                Ok(false)
            }
        }
    }

    fn next_block(&mut self) -> Result<Option<(u64, usize, Vec<u8>)>> {
        if let Some(copy) = self.failed.as_ref().and_then(latch_copy) {
            return Err(copy);
        }
        let result = if self.read_ahead.is_some() {
            self.next_block_pooled()
        } else {
            self.next_block_inline()
        };
        if let Err(err) = &result {
            self.failed = latch_copy(err);
        }
        result
    }

    fn next_block_inline(&mut self) -> Result<Option<(u64, usize, Vec<u8>)>> {
        if self.at_eof {
            return Ok(None);
        }
        let offset = self.next_offset;
        match read_raw_block(&mut self.inner, offset)? {
            None => {
                self.mark_eof();
                Ok(None)
            }
            Some(raw) => {
                trace!("block at {} ({} bytes)", offset, raw.size);
                self.next_offset += raw.size as u64;
                self.blocks_read += 1;
                self.last_block_empty = raw.is_empty();
                let size = raw.size;
                let data = raw.inflate()?;
                Ok(Some((offset, size, data)))
            }
        }
    }

    fn next_block_pooled(&mut self) -> Result<Option<(u64, usize, Vec<u8>)>> {
        let Some(ahead) = self.read_ahead.as_mut() else {
            return Ok(None);
        };

        while ahead.pending < ahead.depth && !ahead.input_done {
            let offset = self.next_offset;
            match read_raw_block(&mut self.inner, offset) {
                Ok(None) => ahead.input_done = true,
                Ok(Some(raw)) => {
                    self.next_offset += raw.size as u64;
                    self.blocks_read += 1;
                    self.last_block_empty = raw.is_empty();
                    ahead.submit(raw)?;
                }
                Err(e) => ahead.push_error(offset, e),
            }
        }

        if ahead.pending == 0 {
            self.mark_eof();
            return Ok(None);
        }

        let block = ahead.deliver()?;
        let data = block.result?;
        Ok(Some((block.offset, block.block_len, data)))
    }

    fn mark_eof(&mut self) {
        if self.at_eof {
            return;
        }
        self.at_eof = true;
        self.truncated = self.blocks_read > 0 && !self.last_block_empty;
        if self.truncated {
            warn!(
                "BGZF stream ended at offset {} without an end-of-file marker; the file may be truncated",
                self.next_offset
            );
        }
    }
}

impl<R: Read + Seek> BgzfReader<R> {
    /// Reposition to a virtual offset.
    ///
    /// Seeking to the block already in memory only moves the cursor, so
    /// repeated seeks to the same offset do no I/O.
    pub fn seek(&mut self, offset: VirtualOffset) -> Result<()> {
        let address = offset.compressed();
        let within = offset.uncompressed() as usize;
        self.failed = None;

        if !(self.block_loaded && self.block_offset == address) {
            if let Some(ahead) = self.read_ahead.as_mut() {
                ahead.reset();
            }
            self.inner.seek(SeekFrom::Start(address))?;
            self.next_offset = address;
            self.at_eof = false;
            self.truncated = false;
            self.block_offset = address;
            self.block_len = 0;
            self.data.clear();
            self.pos = 0;
            self.block_loaded = false;
            // At the very end of the stream no block loads and the cursor
            // stays parked at `address`.
            self.load_block()?;
        }

        if within > self.data.len() {
            return Err(BrixError::InvalidArgument(format!(
                "virtual offset {} points past the end of its block ({} bytes)",
                offset,
                self.data.len()
            )));
        }
        self.pos = within;
        Ok(())
    }
}

impl<R: Read> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for BgzfReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        // Empty blocks are legal mid-stream; skip past them.
        while self.pos >= self.data.len() {
            if !self.load_block()? {
                return Ok(&[]);
            }
        }
        Ok(&self.data[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.data.len());
    }
}
