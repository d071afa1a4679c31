//! Lockstep walk over several sorted alignment files.
//!
//! Prints one line per visited position:
//! `reference  position(1-based)  present_0 .. present_n`, where each
//! presence column is 1 when that file has a record starting there.

use std::fmt;
use std::io::Write;
use std::path::Path;

use log::info;

use crate::config::ReaderConfig;
use crate::error::Result;
use crate::streaming::TextWriter;
use crate::sync::MultiFileSyncReader;

use super::open_all;

/// Walk sorted files in lockstep.
#[derive(Debug, Clone, Default)]
pub struct SyncCommand {
    pub reader_config: ReaderConfig,
    /// Region text; requires an index for every input.
    pub region: Option<String>,
}

impl SyncCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reader_config(mut self, config: ReaderConfig) -> Self {
        self.reader_config = config;
        self
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn run<P: AsRef<Path>, W: Write>(&self, paths: &[P], output: W) -> Result<SyncStats> {
        let (genome, sources, _) = open_all(paths, self.region.as_deref(), &self.reader_config)?;
        let mut sync = MultiFileSyncReader::new();
        for source in sources {
            sync.add_stream(source)?;
        }

        let mut out = TextWriter::new(output);
        let mut stats = SyncStats {
            positions: 0,
            lines: vec![0; sync.streams()],
        };

        while sync.advance()? > 0 {
            let Some((reference_id, position)) = sync.position() else {
                break;
            };
            match reference_id.and_then(|id| genome.name(id)) {
                Some(name) => {
                    out.write_bytes(name.as_bytes())?;
                    out.write_tab()?;
                    out.write_int(position + 1)?;
                }
                None => out.write_bytes(b"*\t0")?,
            }
            for (i, count) in stats.lines.iter_mut().enumerate() {
                let present = sync.has_line(i);
                *count += u64::from(present);
                out.write_tab()?;
                out.write_bytes(if present { b"1" } else { b"0" })?;
            }
            out.write_newline()?;
            stats.positions += 1;
        }

        out.flush()?;
        info!("sync: {}", stats);
        Ok(stats)
    }
}

/// Statistics from a sync walk.
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    /// Steps taken.
    pub positions: u64,
    /// Records consumed per input.
    pub lines: Vec<u64>,
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} positions, records per input {:?}", self.positions, self.lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgzf::BgzfWriter;
    use crate::error::BrixError;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    fn write_sam(dir: &TempDir, name: &str, starts: &[u64]) -> PathBuf {
        let path = dir.path().join(name);
        let mut writer = BgzfWriter::new(std::fs::File::create(&path).unwrap());
        writer
            .write_all(b"@SQ\tSN:chr1\tLN:1000\n@SQ\tSN:chr2\tLN:1000\n")
            .unwrap();
        for &start in starts {
            let (chrom, pos) = if start >= 1000 {
                ("chr2", start - 1000)
            } else {
                ("chr1", start)
            };
            writeln!(writer, "r\t0\t{}\t{}\t60\t4M\t*\t0\t0\t*\t*", chrom, pos).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_sync_lines() {
        let dir = tempdir().unwrap();
        let a = write_sam(&dir, "a.sam.gz", &[5, 20, 1003]);
        let b = write_sam(&dir, "b.sam.gz", &[20, 30]);

        let mut out = Vec::new();
        let stats = SyncCommand::new().run(&[&a, &b], &mut out).unwrap();
        assert_eq!(stats.positions, 4);
        assert_eq!(stats.lines, vec![3, 2]);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "chr1\t5\t1\t0\nchr1\t20\t1\t1\nchr1\t30\t0\t1\nchr2\t3\t1\t0\n"
        );
    }

    #[test]
    fn test_unsorted_file_reported() {
        let dir = tempdir().unwrap();
        let a = write_sam(&dir, "a.sam.gz", &[5, 6]);
        let b = write_sam(&dir, "b.sam.gz", &[50, 40]);

        let mut out = Vec::new();
        let err = SyncCommand::new().run(&[&a, &b], &mut out).unwrap_err();
        assert!(matches!(err, BrixError::UnsortedInput { stream: 1, .. }));
    }
}
