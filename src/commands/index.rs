//! Index building for BGZF-compressed, coordinate-sorted SAM files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::info;

use crate::bgzf;
use crate::config::{IndexConfig, ReaderConfig};
use crate::error::Result;
use crate::index::{builder::build_index, index_path_for, io as index_io};
use crate::record::SamReader;

/// Build a `.bai` or `.csi` next to a data file.
#[derive(Debug, Clone, Default)]
pub struct IndexCommand {
    pub config: IndexConfig,
    pub reader_config: ReaderConfig,
    /// Explicit index path; defaults to `<data>.<bai|csi>`.
    pub output: Option<PathBuf>,
}

impl IndexCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reader_config(mut self, config: ReaderConfig) -> Self {
        self.reader_config = config;
        self
    }

    pub fn with_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Index `path`, replacing any existing index atomically.
    pub fn run<P: AsRef<Path>>(&self, path: P) -> Result<IndexStats> {
        let path = path.as_ref();
        let started = Instant::now();

        let mut reader = SamReader::new(bgzf::open_bgzf(path, &self.reader_config)?)?;
        let references = reader.genome().len();
        let index = build_index(&mut reader, &self.config, references)?;

        let output = self
            .output
            .clone()
            .unwrap_or_else(|| index_path_for(path, self.config.kind));
        index_io::save(&index, &output)?;

        let placed: u64 = index
            .references()
            .iter()
            .filter_map(|r| r.metadata)
            .map(|m| m.mapped + m.unmapped)
            .sum();
        let unplaced = index.unplaced_count().unwrap_or(0);
        let stats = IndexStats {
            records: placed + unplaced,
            references,
            bins: index.references().iter().map(|r| r.bins.len()).sum(),
            unplaced,
            path: output,
        };
        info!("{} in {:.2?}", stats, started.elapsed());
        Ok(stats)
    }
}

/// Statistics from an index build.
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub records: u64,
    pub references: usize,
    pub bins: usize,
    pub unplaced: u64,
    pub path: PathBuf,
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wrote {}: {} records, {} references, {} bins, {} unplaced",
            self.path.display(),
            self.records,
            self.references,
            self.bins,
            self.unplaced
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgzf::BgzfWriter;
    use crate::config::IndexKind;
    use crate::query::IndexedReader;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_sam(path: &Path) {
        let mut writer = BgzfWriter::new(std::fs::File::create(path).unwrap());
        writer
            .write_all(b"@SQ\tSN:chr1\tLN:100000\n@SQ\tSN:chr2\tLN:5000\n")
            .unwrap();
        for i in 0..50u64 {
            writeln!(writer, "r{}\t0\tchr1\t{}\t60\t10M\t*\t0\t0\t*\t*", i, i * 1000 + 1).unwrap();
        }
        writeln!(writer, "u1\t4\t*\t0\t0\t*\t*\t0\t0\t*\t*").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_index_and_query() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("reads.sam.gz");
        write_sam(&data);

        let stats = IndexCommand::new().run(&data).unwrap();
        assert_eq!(stats.references, 2);
        assert_eq!(stats.records, 51);
        assert_eq!(stats.unplaced, 1);
        assert_eq!(stats.path, dir.path().join("reads.sam.gz.bai"));

        let mut reader = IndexedReader::open(&data, &ReaderConfig::default()).unwrap();
        let names: Vec<String> = reader
            .query_str("chr1:10001-12000")
            .unwrap()
            .map(|r| r.unwrap().name)
            .collect();
        assert_eq!(names, vec!["r10", "r11"]);
    }

    #[test]
    fn test_csi_output() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("reads.sam.gz");
        write_sam(&data);

        let config = IndexConfig::csi(12);
        let stats = IndexCommand::new().with_config(config).run(&data).unwrap();
        assert_eq!(stats.path, dir.path().join("reads.sam.gz.csi"));
        let index = index_io::load(&stats.path).unwrap();
        assert_eq!(index.kind(), IndexKind::Csi);
        assert_eq!(index.scheme().min_shift, 12);
    }
}
