//! Decompression of BGZF or plain gzip input to raw bytes.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use flate2::bufread::MultiGzDecoder;
use log::{info, warn};

use crate::bgzf::{detect_format, BgzfReader, StreamFormat};
use crate::config::ReaderConfig;
use crate::error::Result;
use crate::parallel::WorkerPool;

/// Decompress a stream, whatever its gzip flavour.
#[derive(Debug, Clone, Default)]
pub struct DecompressCommand {
    pub config: ReaderConfig,
}

impl DecompressCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.config = self.config.with_pool(pool);
        self
    }

    /// Write the decompressed content of `input` to `output`.
    ///
    /// Uncompressed input is copied through unchanged.
    pub fn run<R: BufRead, W: Write>(&self, mut input: R, mut output: W) -> Result<DecompressStats> {
        let format = detect_format(&mut input)?;
        let mut stats = DecompressStats {
            format: Some(format),
            ..Default::default()
        };

        match format {
            StreamFormat::Bgzf => {
                let mut reader = BgzfReader::with_config(input, &self.config);
                stats.bytes_out = io::copy(&mut reader, &mut output)?;
                stats.truncated = reader.is_truncated();
            }
            StreamFormat::Gzip => {
                warn!("input is plain gzip, not BGZF; it cannot be indexed");
                stats.bytes_out = io::copy(&mut MultiGzDecoder::new(input), &mut output)?;
            }
            StreamFormat::Plain => {
                stats.bytes_out = io::copy(&mut input, &mut output)?;
            }
        }
        output.flush()?;
        info!("decompressed {}", stats);
        Ok(stats)
    }
}

/// Statistics from a decompression run.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecompressStats {
    pub format: Option<StreamFormat>,
    pub bytes_out: u64,
    /// BGZF input ended without its terminal block.
    pub truncated: bool,
}

impl fmt::Display for DecompressStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format {
            Some(format) => write!(f, "{:?}, {} bytes", format, self.bytes_out)?,
            None => write!(f, "{} bytes", self.bytes_out)?,
        }
        if self.truncated {
            write!(f, " (truncated)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgzf::{BgzfWriter, EOF_MARKER};
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn bgzf(data: &[u8]) -> Vec<u8> {
        let mut writer = BgzfWriter::new(Vec::new());
        writer.write_all(data).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_bgzf_input() {
        let compressed = bgzf(b"hello\nworld\n");
        let mut out = Vec::new();
        let stats = DecompressCommand::new().run(&compressed[..], &mut out).unwrap();
        assert_eq!(out, b"hello\nworld\n");
        assert_eq!(stats.format, Some(StreamFormat::Bgzf));
        assert!(!stats.truncated);
    }

    #[test]
    fn test_truncated_bgzf_still_decodes() {
        let compressed = bgzf(b"partial");
        let cut = &compressed[..compressed.len() - EOF_MARKER.len()];
        let mut out = Vec::new();
        let stats = DecompressCommand::new().run(cut, &mut out).unwrap();
        assert_eq!(out, b"partial");
        assert!(stats.truncated);
    }

    #[test]
    fn test_plain_gzip_and_text() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"gzip body").unwrap();
        let gz = enc.finish().unwrap();

        let mut out = Vec::new();
        let stats = DecompressCommand::new().run(&gz[..], &mut out).unwrap();
        assert_eq!(out, b"gzip body");
        assert_eq!(stats.format, Some(StreamFormat::Gzip));

        let mut out = Vec::new();
        DecompressCommand::new().run(&b"text"[..], &mut out).unwrap();
        assert_eq!(out, b"text");
    }
}
