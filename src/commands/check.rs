//! Block-by-block integrity check of a BGZF file.
//!
//! Every block is inflated and its CRC32 and length verified. The file is
//! reported clean when it ends with the terminal block and truncated when
//! it ends on a block boundary without one. A corrupt or cut-off block
//! aborts the walk with the corresponding error.

use std::fmt;
use std::io::Read;

use log::debug;

use crate::bgzf::{BgzfReader, BlockRead};
use crate::config::ReaderConfig;
use crate::error::Result;

/// How a BGZF stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Clean,
    Truncated,
}

/// Walk the blocks of a BGZF stream.
#[derive(Debug, Clone, Default)]
pub struct CheckCommand {
    pub config: ReaderConfig,
}

impl CheckCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn run<R: Read>(&self, input: R) -> Result<CheckReport> {
        let mut reader = BgzfReader::with_config(input, &self.config);
        let mut report = CheckReport::default();

        loop {
            match reader.decompress_next()? {
                BlockRead::Data { data, block_len } => {
                    report.blocks += 1;
                    report.compressed_bytes += block_len as u64;
                    report.uncompressed_bytes += data.len() as u64;
                }
                BlockRead::Eof => {
                    report.status = CheckStatus::Clean;
                    break;
                }
                BlockRead::Truncated => {
                    report.status = CheckStatus::Truncated;
                    break;
                }
            }
        }
        debug!("check: {}", report);
        Ok(report)
    }
}

/// Result of a successful block walk.
#[derive(Debug, Clone, Copy)]
pub struct CheckReport {
    /// Blocks read, terminal block included.
    pub blocks: u64,
    pub compressed_bytes: u64,
    pub uncompressed_bytes: u64,
    pub status: CheckStatus,
}

impl Default for CheckReport {
    fn default() -> Self {
        Self {
            blocks: 0,
            compressed_bytes: 0,
            uncompressed_bytes: 0,
            status: CheckStatus::Clean,
        }
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            CheckStatus::Clean => "ok",
            CheckStatus::Truncated => "truncated (no end-of-file block)",
        };
        write!(
            f,
            "{}: {} blocks, {} compressed bytes, {} uncompressed bytes",
            status, self.blocks, self.compressed_bytes, self.uncompressed_bytes
        )
    }
}
