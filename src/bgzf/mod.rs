//! BGZF block compression.
//!
//! A BGZF file is a series of independent gzip members of at most 64 KiB,
//! each recording its own compressed size. Because every block decompresses
//! on its own, any byte of the logical stream can be addressed with a
//! [`VirtualOffset`] and reached with a single seek.
//!
//! - [`block`]: one-block compression and parsing
//! - [`BgzfReader`]: sequential and random-access decompression
//! - [`BgzfWriter`]: buffered compression with ordered parallel output

pub mod block;
pub mod reader;
pub mod virtual_offset;
pub mod writer;

pub use block::{compress, CompressedBlock, EOF_MARKER, MAX_BLOCK_SIZE, MAX_DATA_SIZE};
pub use reader::{BgzfReader, BlockRead};
pub use virtual_offset::VirtualOffset;
pub use writer::BgzfWriter;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use log::debug;

use crate::config::ReaderConfig;
use crate::error::{BrixError, Result};
use crate::streaming::buffers::DEFAULT_INPUT_BUFFER;

/// Compression format of a byte stream, judged from its first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// Blocked gzip with `BC` size subfields; supports random access.
    Bgzf,
    /// Ordinary gzip; sequential access only.
    Gzip,
    /// Not compressed.
    Plain,
}

/// Classify a stream without consuming it.
pub fn detect_format<R: BufRead>(reader: &mut R) -> io::Result<StreamFormat> {
    let head = reader.fill_buf()?;
    Ok(classify(head))
}

fn classify(head: &[u8]) -> StreamFormat {
    if head.len() < 2 || head[0] != 0x1f || head[1] != 0x8b {
        return StreamFormat::Plain;
    }
    let is_bgzf = head.len() >= 16
        && head[3] & 0x04 != 0
        && u16::from_le_bytes([head[10], head[11]]) >= 6
        && head[12] == b'B'
        && head[13] == b'C';
    if is_bgzf {
        StreamFormat::Bgzf
    } else {
        StreamFormat::Gzip
    }
}

/// Open a file for sequential reading whatever its compression.
///
/// BGZF goes through [`BgzfReader`] (with the configured worker pool),
/// plain gzip through a multi-member decoder, anything else is read as is.
pub fn open_sequential<P: AsRef<Path>>(
    path: P,
    config: &ReaderConfig,
) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let mut reader = BufReader::with_capacity(DEFAULT_INPUT_BUFFER, File::open(path)?);
    let format = detect_format(&mut reader)?;
    debug!("{}: detected {:?}", path.display(), format);
    Ok(match format {
        StreamFormat::Bgzf => Box::new(BgzfReader::with_config(reader, config)),
        StreamFormat::Gzip => Box::new(BufReader::with_capacity(
            DEFAULT_INPUT_BUFFER,
            MultiGzDecoder::new(reader),
        )),
        StreamFormat::Plain => Box::new(reader),
    })
}

/// Open a BGZF file for random access.
pub fn open_bgzf<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<BgzfReader<File>> {
    let path = path.as_ref();
    let mut head = BufReader::new(File::open(path)?);
    match detect_format(&mut head)? {
        StreamFormat::Bgzf => Ok(BgzfReader::with_config(File::open(path)?, config)),
        other => Err(BrixError::InvalidArgument(format!(
            "{} is {:?}, not BGZF; random access needs a BGZF file",
            path.display(),
            other
        ))),
    }
}

/// Drain `reader` into `out`, returning the number of decompressed bytes.
pub fn copy_decompressed<R: Read, W: io::Write>(reader: &mut R, out: &mut W) -> Result<u64> {
    Ok(io::copy(reader, out)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_classify() {
        assert_eq!(classify(&EOF_MARKER), StreamFormat::Bgzf);
        assert_eq!(classify(b"@HD\tVN:1.6\n"), StreamFormat::Plain);
        assert_eq!(classify(b""), StreamFormat::Plain);

        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(b"plain gzip").unwrap();
        let gz = gz.finish().unwrap();
        assert_eq!(classify(&gz), StreamFormat::Gzip);
    }

    #[test]
    fn test_open_sequential_reads_all_formats() {
        let text = b"line one\nline two\n";

        let mut plain = NamedTempFile::new().unwrap();
        plain.write_all(text).unwrap();
        plain.flush().unwrap();

        let mut gz = NamedTempFile::new().unwrap();
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(text).unwrap();
        gz.write_all(&enc.finish().unwrap()).unwrap();
        gz.flush().unwrap();

        let mut bgzf = NamedTempFile::new().unwrap();
        let mut writer = BgzfWriter::new(Vec::new());
        writer.write_all(text).unwrap();
        bgzf.write_all(&writer.finish().unwrap()).unwrap();
        bgzf.flush().unwrap();

        for file in [&plain, &gz, &bgzf] {
            let mut reader = open_sequential(file.path(), &ReaderConfig::default()).unwrap();
            let mut out = Vec::new();
            copy_decompressed(&mut reader, &mut out).unwrap();
            assert_eq!(out, text);
        }

        assert!(open_bgzf(gz.path(), &ReaderConfig::default()).is_err());
        assert!(open_bgzf(bgzf.path(), &ReaderConfig::default()).is_ok());
    }
}
