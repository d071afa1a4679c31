//! Block-compressing writer.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::{self, Write};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::trace;

use super::block::{compress, CompressedBlock, EOF_MARKER};
use super::VirtualOffset;
use crate::config::WriterConfig;
use crate::error::{BrixError, Result};
use crate::parallel::WorkerPool;

/// A compressed block waiting for its turn to be written.
struct Deflated {
    seq: u64,
    result: Result<CompressedBlock>,
}

impl Ord for Deflated {
    fn cmp(&self, other: &Self) -> Ordering {
        other.seq.cmp(&self.seq)
    }
}

impl PartialOrd for Deflated {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Deflated {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Deflated {}

struct Compressor {
    pool: Arc<WorkerPool>,
    limit: usize,
    sender: Sender<Deflated>,
    receiver: Receiver<Deflated>,
    /// Blocks that came back ahead of an earlier one.
    ready: BinaryHeap<Deflated>,
    next_submit: u64,
    next_write: u64,
}

/// Writer producing a BGZF stream.
///
/// Bytes are collected into blocks of `block_size` and compressed either
/// inline or on a worker pool. Pool results are reordered before they reach
/// the underlying writer, so the output is byte-identical either way.
/// [`finish`](Self::finish) appends the terminal block; dropping the writer
/// does the same on a best-effort basis.
pub struct BgzfWriter<W: Write> {
    inner: Option<W>,
    buf: Vec<u8>,
    block_size: usize,
    level: u32,
    /// Compressed bytes handed to `inner` so far.
    written: u64,
    compressor: Option<Compressor>,
    blocks_written: u64,
    finished: bool,
}

impl<W: Write> BgzfWriter<W> {
    /// Create a writer with default settings.
    pub fn new(inner: W) -> Self {
        let config = WriterConfig::default();
        Self::build(inner, &config)
    }

    /// Create a writer after validating `config`.
    pub fn with_config(inner: W, config: &WriterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(inner, config))
    }

    fn build(inner: W, config: &WriterConfig) -> Self {
        let compressor = config.pool.as_ref().map(|pool| {
            let (sender, receiver) = unbounded();
            Compressor {
                pool: Arc::clone(pool),
                limit: config.in_flight.max(1),
                sender,
                receiver,
                ready: BinaryHeap::new(),
                next_submit: 0,
                next_write: 0,
            }
        });
        Self {
            inner: Some(inner),
            buf: Vec::with_capacity(config.block_size),
            block_size: config.block_size,
            level: config.level,
            written: 0,
            compressor,
            blocks_written: 0,
            finished: false,
        }
    }

    /// Virtual offset at which the next written byte will land.
    ///
    /// With a worker pool this waits for outstanding blocks, since their
    /// compressed sizes determine the address.
    pub fn virtual_position(&mut self) -> Result<VirtualOffset> {
        self.drain(0)?;
        Ok(VirtualOffset::new(self.written, self.buf.len() as u16))
    }

    /// Append bytes, closing blocks as they fill.
    pub fn write_bytes(&mut self, mut data: &[u8]) -> Result<()> {
        if self.finished {
            return Err(BrixError::InvalidArgument(
                "write after BGZF stream was finished".to_string(),
            ));
        }
        while !data.is_empty() {
            let room = self.block_size - self.buf.len();
            let n = room.min(data.len());
            self.buf.extend_from_slice(&data[..n]);
            data = &data[n..];
            if self.buf.len() == self.block_size {
                self.close_block()?;
            }
        }
        Ok(())
    }

    /// Close the current block even if it is not full.
    ///
    /// Useful to make the next record start on a block boundary.
    pub fn flush_block(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.close_block()?;
        }
        self.drain(0)
    }

    /// Flush everything, append the terminal block and return the writer.
    pub fn finish(mut self) -> Result<W> {
        self.try_finish()?;
        self.inner
            .take()
            .ok_or_else(|| BrixError::InvalidArgument("BGZF writer already closed".to_string()))
    }

    /// Number of data blocks written, excluding the terminal block.
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    fn try_finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush_block()?;
        let inner = self.inner_mut()?;
        inner.write_all(&EOF_MARKER)?;
        inner.flush()?;
        self.written += EOF_MARKER.len() as u64;
        self.finished = true;
        Ok(())
    }

    fn inner_mut(&mut self) -> Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or_else(|| BrixError::InvalidArgument("BGZF writer already closed".to_string()))
    }

    fn close_block(&mut self) -> Result<()> {
        let data = std::mem::replace(&mut self.buf, Vec::with_capacity(self.block_size));
        let (block_size, level) = (self.block_size, self.level);

        if let Some(c) = self.compressor.as_mut() {
            let seq = c.next_submit;
            let sender = c.sender.clone();
            c.pool.execute(move || {
                let result = compress(&data, block_size, level);
                let _ = sender.send(Deflated { seq, result });
            })?;
            c.next_submit += 1;
            let limit = c.limit;
            return self.drain(limit.saturating_sub(1));
        }

        let block = compress(&data, block_size, level)?;
        self.emit(&block)
    }

    /// Write finished blocks in order until at most `keep` remain in flight.
    fn drain(&mut self, keep: usize) -> Result<()> {
        loop {
            let Some(c) = self.compressor.as_mut() else {
                return Ok(());
            };
            let in_flight = (c.next_submit - c.next_write) as usize;
            if in_flight <= keep {
                return Ok(());
            }
            let next = loop {
                if c.ready.peek().map(|d| d.seq) == Some(c.next_write) {
                    if let Some(d) = c.ready.pop() {
                        break d;
                    }
                }
                let d = c.receiver.recv().map_err(|_| {
                    BrixError::Compression("compression worker vanished".to_string())
                })?;
                c.ready.push(d);
            };
            c.next_write += 1;
            let block = next.result?;
            self.emit(&block)?;
        }
    }

    fn emit(&mut self, block: &CompressedBlock) -> Result<()> {
        trace!(
            "block at {}: {} -> {} bytes",
            self.written,
            block.data_len(),
            block.len()
        );
        self.inner_mut()?.write_all(block.as_bytes())?;
        self.written += block.len() as u64;
        self.blocks_written += 1;
        Ok(())
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()?;
        self.inner_mut()?.flush()
    }
}

impl<W: Write> Drop for BgzfWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            let _ = self.try_finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgzf::BgzfReader;
    use std::io::{Cursor, Read};

    fn read_all(bytes: Vec<u8>) -> (Vec<u8>, bool) {
        let mut reader = BgzfReader::new(Cursor::new(bytes));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        (out, reader.is_truncated())
    }

    #[test]
    fn test_roundtrip_with_small_blocks() {
        let data: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect();
        let config = WriterConfig::new().with_block_size(1000);
        let mut writer = BgzfWriter::with_config(Vec::new(), &config).unwrap();
        writer.write_all(&data).unwrap();
        assert_eq!(writer.blocks_written(), 40);
        let bytes = writer.finish().unwrap();
        assert!(bytes.ends_with(&EOF_MARKER));

        let (out, truncated) = read_all(bytes);
        assert_eq!(out, data);
        assert!(!truncated);
    }

    #[test]
    fn test_empty_stream_is_just_the_marker() {
        let bytes = BgzfWriter::new(Vec::new()).finish().unwrap();
        assert_eq!(bytes, EOF_MARKER.to_vec());
    }

    #[test]
    fn test_virtual_position_tracks_blocks() {
        let config = WriterConfig::new().with_block_size(8);
        let mut writer = BgzfWriter::with_config(Vec::new(), &config).unwrap();
        assert_eq!(writer.virtual_position().unwrap(), VirtualOffset::new(0, 0));
        writer.write_all(b"abc").unwrap();
        assert_eq!(writer.virtual_position().unwrap(), VirtualOffset::new(0, 3));
        writer.write_all(b"defghij").unwrap();
        let pos = writer.virtual_position().unwrap();
        assert!(pos.compressed() > 0);
        assert_eq!(pos.uncompressed(), 2);
    }

    #[test]
    fn test_pooled_output_is_identical() {
        let data: Vec<u8> = (0..200_000u32)
            .map(|i| (i % 251) as u8 ^ (i / 7) as u8)
            .collect();

        let config = WriterConfig::new().with_block_size(4096);
        let mut plain = BgzfWriter::with_config(Vec::new(), &config).unwrap();
        plain.write_all(&data).unwrap();
        let plain = plain.finish().unwrap();

        let pool = Arc::new(WorkerPool::new(4, 2).unwrap());
        let config = config.with_pool(pool).with_in_flight(6);
        let mut pooled = BgzfWriter::with_config(Vec::new(), &config).unwrap();
        pooled.write_all(&data).unwrap();
        let pooled = pooled.finish().unwrap();

        assert_eq!(plain, pooled);
        assert_eq!(read_all(pooled).0, data);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = WriterConfig::new().with_level(12);
        assert!(matches!(
            BgzfWriter::with_config(Vec::new(), &config),
            Err(BrixError::Compression(_))
        ));
    }
}
