//! Runtime configuration objects.
//!
//! Nothing here is global: every reader, writer, index builder and pileup
//! engine takes its settings explicitly, so independent streams (and tests)
//! can run side by side with different configurations.

use std::sync::Arc;

use crate::bgzf::block::MAX_DATA_SIZE;
use crate::error::{BrixError, Result};
use crate::index::binning::{BAI_DEPTH, BAI_MIN_SHIFT};
use crate::parallel::WorkerPool;
use crate::record::AlignmentFlags;

/// Default deflate level for new blocks.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Default number of blocks decompressed ahead of the reader.
pub const DEFAULT_READ_AHEAD: usize = 8;

/// Default per-column read cap for pileups.
pub const DEFAULT_MAX_DEPTH: usize = 8000;

/// Settings for [`BgzfReader`](crate::bgzf::BgzfReader).
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Pool used to inflate blocks ahead of the consumer.
    pub pool: Option<Arc<WorkerPool>>,
    /// Maximum number of blocks in flight when a pool is attached.
    pub read_ahead: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderConfig {
    pub fn new() -> Self {
        Self {
            pool: None,
            read_ahead: DEFAULT_READ_AHEAD,
        }
    }

    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_read_ahead(mut self, blocks: usize) -> Self {
        self.read_ahead = blocks.max(1);
        self
    }
}

/// Settings for [`BgzfWriter`](crate::bgzf::BgzfWriter).
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Deflate level, 0 (store) to 9 (best).
    pub level: u32,
    /// Uncompressed bytes collected before a block is closed.
    pub block_size: usize,
    /// Pool used to compress closed blocks.
    pub pool: Option<Arc<WorkerPool>>,
    /// Maximum number of blocks being compressed at once.
    pub in_flight: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterConfig {
    pub fn new() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
            block_size: MAX_DATA_SIZE,
            pool: None,
            in_flight: DEFAULT_READ_AHEAD,
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_in_flight(mut self, blocks: usize) -> Self {
        self.in_flight = blocks.max(1);
        self
    }

    /// Reject settings the block codec cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.level > 9 {
            return Err(BrixError::Compression(format!(
                "compression level {} outside 0..=9",
                self.level
            )));
        }
        if self.block_size == 0 || self.block_size > MAX_DATA_SIZE {
            return Err(BrixError::Compression(format!(
                "block size {} outside 1..={}",
                self.block_size, MAX_DATA_SIZE
            )));
        }
        Ok(())
    }
}

/// On-disk index flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Fixed 16 KiB / 5-level scheme with a linear index (`.bai`).
    Bai,
    /// Configurable minimum shift and depth, per-bin linear offsets (`.csi`).
    Csi,
}

impl IndexKind {
    /// File extension appended to the data file name.
    pub fn extension(self) -> &'static str {
        match self {
            IndexKind::Bai => "bai",
            IndexKind::Csi => "csi",
        }
    }
}

/// Settings for building a binning index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    pub kind: IndexKind,
    /// log2 of the smallest bin (and linear window) width.
    pub min_shift: u32,
    /// Number of levels below the root bin.
    pub depth: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::bai()
    }
}

impl IndexConfig {
    pub fn bai() -> Self {
        Self {
            kind: IndexKind::Bai,
            min_shift: BAI_MIN_SHIFT,
            depth: BAI_DEPTH,
        }
    }

    pub fn csi(min_shift: u32) -> Self {
        Self {
            kind: IndexKind::Csi,
            min_shift,
            depth: BAI_DEPTH,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Ensure the scheme covers a sane coordinate range.
    pub fn validate(&self) -> Result<()> {
        if self.kind == IndexKind::Bai
            && (self.min_shift != BAI_MIN_SHIFT || self.depth != BAI_DEPTH)
        {
            return Err(BrixError::InvalidArgument(format!(
                "BAI indexes use min_shift {} and depth {}",
                BAI_MIN_SHIFT, BAI_DEPTH
            )));
        }
        if self.depth == 0 || self.min_shift == 0 {
            return Err(BrixError::InvalidArgument(
                "min_shift and depth must be positive".to_string(),
            ));
        }
        if self.min_shift + 3 * self.depth > 62 || self.depth > 9 {
            return Err(BrixError::InvalidArgument(format!(
                "min_shift {} with depth {} exceeds the coordinate range",
                self.min_shift, self.depth
            )));
        }
        Ok(())
    }
}

/// Settings for [`PileupAssembler`](crate::pileup::PileupAssembler).
#[derive(Debug, Clone, Copy)]
pub struct PileupConfig {
    /// Most records piled up at one position; extras are counted and dropped.
    pub max_depth: usize,
    /// Mark the second read of an overlapping mate pair in shared columns.
    pub detect_overlaps: bool,
    /// Records with any of these flags are skipped.
    pub skip_flags: AlignmentFlags,
    /// Records below this mapping quality are skipped.
    pub min_mapq: u8,
}

impl Default for PileupConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PileupConfig {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            detect_overlaps: false,
            skip_flags: AlignmentFlags::UNMAPPED,
            min_mapq: 0,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_overlap_detection(mut self, enabled: bool) -> Self {
        self.detect_overlaps = enabled;
        self
    }

    pub fn with_skip_flags(mut self, flags: AlignmentFlags) -> Self {
        // Unmapped records never pile up.
        self.skip_flags = flags | AlignmentFlags::UNMAPPED;
        self
    }

    pub fn with_min_mapq(mut self, min_mapq: u8) -> Self {
        self.min_mapq = min_mapq;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_config_validation() {
        assert!(WriterConfig::new().validate().is_ok());
        assert!(WriterConfig::new().with_level(10).validate().is_err());
        assert!(WriterConfig::new().with_block_size(0).validate().is_err());
        assert!(WriterConfig::new()
            .with_block_size(MAX_DATA_SIZE + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_index_config_validation() {
        assert!(IndexConfig::bai().validate().is_ok());
        assert!(IndexConfig::csi(12).validate().is_ok());
        assert!(IndexConfig::csi(14).with_depth(6).validate().is_ok());
        assert!(IndexConfig::csi(40).with_depth(9).validate().is_err());

        let mut bad_bai = IndexConfig::bai();
        bad_bai.min_shift = 12;
        assert!(bad_bai.validate().is_err());
    }

    #[test]
    fn test_pileup_skip_flags_keep_unmapped() {
        let config = PileupConfig::new().with_skip_flags(AlignmentFlags::DUPLICATE);
        assert!(config.skip_flags.is_unmapped());
        assert!(config.skip_flags.is_duplicate());
    }
}
