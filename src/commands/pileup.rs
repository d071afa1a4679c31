//! Per-position pileup output for one or several samples.
//!
//! One input prints
//! `reference  position  depth  effective_depth  bases  quals`; several
//! inputs print the position followed by `depth  bases  quals` per sample.

use std::fmt;
use std::io::Write;
use std::path::Path;

use log::info;

use crate::config::{PileupConfig, ReaderConfig};
use crate::error::Result;
use crate::pileup::{MultiPileup, PileupAssembler, PileupStats};
use crate::streaming::TextWriter;

use super::open_all;

/// Pile up sorted alignment files.
#[derive(Debug, Clone, Default)]
pub struct PileupCommand {
    pub config: PileupConfig,
    pub reader_config: ReaderConfig,
    /// Region text; requires an index for every input.
    pub region: Option<String>,
}

impl PileupCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: PileupConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reader_config(mut self, config: ReaderConfig) -> Self {
        self.reader_config = config;
        self
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn run<P: AsRef<Path>, W: Write>(&self, paths: &[P], output: W) -> Result<PileupRunStats> {
        let (genome, mut sources, region) =
            open_all(paths, self.region.as_deref(), &self.reader_config)?;
        let mut out = TextWriter::new(output);
        let mut stats = PileupRunStats::default();

        if sources.len() == 1 {
            let mut assembler = PileupAssembler::new(sources.swap_remove(0), &self.config);
            if let Some(region) = &region {
                assembler = assembler.with_region(region);
            }
            for column in assembler.by_ref() {
                out.write_pileup_column(&genome, &column?)?;
                stats.columns += 1;
            }
            stats.samples.push(assembler.stats());
        } else {
            let mut multi = MultiPileup::new(sources, &self.config);
            if let Some(region) = &region {
                multi = multi.with_region(region);
            }
            for column in multi.by_ref() {
                out.write_multi_pileup_column(&genome, &column?)?;
                stats.columns += 1;
            }
            stats.samples = multi.stats();
        }

        out.flush()?;
        info!("pileup: {}", stats);
        Ok(stats)
    }
}

/// Statistics from a pileup run.
#[derive(Debug, Default, Clone)]
pub struct PileupRunStats {
    /// Lines written.
    pub columns: u64,
    /// Per-input counters.
    pub samples: Vec<PileupStats>,
}

impl fmt::Display for PileupRunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} columns", self.columns)?;
        for (i, sample) in self.samples.iter().enumerate() {
            write!(f, "; input {}: {}", i, sample)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgzf::BgzfWriter;
    use crate::commands::IndexCommand;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    fn write_sam(dir: &TempDir, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut writer = BgzfWriter::new(std::fs::File::create(&path).unwrap());
        writer.write_all(b"@SQ\tSN:chr1\tLN:1000\n").unwrap();
        for line in lines {
            writeln!(writer, "{}", line).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_single_input_lines() {
        let dir = tempdir().unwrap();
        let data = write_sam(
            &dir,
            "a.sam.gz",
            &[
                "a\t0\tchr1\t2\t60\t3M\t*\t0\t0\tACG\tIII",
                "b\t16\tchr1\t3\t60\t1M1D1M\t*\t0\t0\tTT\t##",
            ],
        );

        let mut out = Vec::new();
        let stats = PileupCommand::new().run(&[&data], &mut out).unwrap();
        assert_eq!(stats.columns, 4);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "chr1\t2\t1\t1\tA\tI\n\
             chr1\t3\t2\t2\tCt\tI#\n\
             chr1\t4\t2\t2\tG*\tI!\n\
             chr1\t5\t1\t1\tt\t#\n"
        );
    }

    #[test]
    fn test_region_and_samples() {
        let dir = tempdir().unwrap();
        let a = write_sam(&dir, "a.sam.gz", &["a\t0\tchr1\t1\t60\t10M\t*\t0\t0\t*\t*"]);
        let b = write_sam(&dir, "b.sam.gz", &["b\t0\tchr1\t6\t60\t10M\t*\t0\t0\t*\t*"]);
        IndexCommand::new().run(&a).unwrap();
        IndexCommand::new().run(&b).unwrap();

        let mut out = Vec::new();
        let stats = PileupCommand::new()
            .with_region(Some("chr1:9-12".to_string()))
            .run(&[&a, &b], &mut out)
            .unwrap();
        assert_eq!(stats.columns, 4);
        assert_eq!(stats.samples.len(), 2);
        let text = String::from_utf8(out).unwrap();
        let first: Vec<&str> = text.lines().next().unwrap().split('\t').collect();
        assert_eq!(first[..3], ["chr1", "9", "1"]);
        assert_eq!(first[5], "1");
        let last: Vec<&str> = text.lines().last().unwrap().split('\t').collect();
        assert_eq!(last[..3], ["chr1", "12", "0"]);
        assert_eq!(last[3..5], ["*", "*"]);
    }
}
