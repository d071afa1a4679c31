//! BGZF compression of arbitrary input.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use log::info;

use crate::bgzf::BgzfWriter;
use crate::config::WriterConfig;
use crate::error::Result;
use crate::parallel::WorkerPool;

/// Compress a byte stream into BGZF blocks.
#[derive(Debug, Clone, Default)]
pub struct CompressCommand {
    pub config: WriterConfig,
}

impl CompressCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.config = self.config.with_level(level);
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.config = self.config.with_block_size(block_size);
        self
    }

    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.config = self.config.with_pool(pool);
        self
    }

    /// Copy `input` into `output` as BGZF, ending with the terminal block.
    pub fn run<R: Read, W: Write>(&self, input: &mut R, output: W) -> Result<CompressStats> {
        let mut writer = BgzfWriter::with_config(output, &self.config)?;
        let bytes_in = io::copy(input, &mut writer)?;
        writer.flush_block()?;
        let stats = CompressStats {
            bytes_in,
            blocks: writer.blocks_written(),
        };
        writer.finish()?.flush()?;
        info!("compressed {}", stats);
        Ok(stats)
    }
}

/// Statistics from a compression run.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompressStats {
    /// Uncompressed bytes consumed.
    pub bytes_in: u64,
    /// Data blocks written, excluding the terminal block.
    pub blocks: u64,
}

impl fmt::Display for CompressStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes into {} blocks", self.bytes_in, self.blocks)
    }
}
