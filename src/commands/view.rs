//! Record printing, optionally restricted to regions through the index.

use std::fmt;
use std::io::Write;
use std::path::Path;

use log::debug;

use crate::bgzf;
use crate::config::ReaderConfig;
use crate::error::Result;
use crate::genome::Genome;
use crate::query::IndexedReader;
use crate::record::{AlignmentRecord, SamReader};
use crate::region::Region;
use crate::streaming::TextWriter;

/// Region text selecting the records without a reference.
pub const UNPLACED_REGION: &str = "*";

/// Print SAM records.
#[derive(Debug, Clone, Default)]
pub struct ViewCommand {
    pub regions: Vec<String>,
    /// Print only the number of records.
    pub count: bool,
    pub include_header: bool,
    pub config: ReaderConfig,
}

impl ViewCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_count(mut self, count: bool) -> Self {
        self.count = count;
        self
    }

    pub fn with_header(mut self, include_header: bool) -> Self {
        self.include_header = include_header;
        self
    }

    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn run<P: AsRef<Path>, W: Write>(&self, path: P, output: W) -> Result<ViewStats> {
        let mut out = TextWriter::new(output);
        let mut stats = ViewStats::default();

        if self.regions.is_empty() {
            self.view_all(path.as_ref(), &mut out, &mut stats)?;
        } else {
            self.view_regions(path.as_ref(), &mut out, &mut stats)?;
        }

        if self.count {
            out.write_int(stats.records)?;
            out.write_newline()?;
        }
        out.flush()?;
        debug!("view: {}", stats);
        Ok(stats)
    }

    fn view_all<W: Write>(
        &self,
        path: &Path,
        out: &mut TextWriter<W>,
        stats: &mut ViewStats,
    ) -> Result<()> {
        let mut reader = SamReader::new(bgzf::open_sequential(path, &self.config)?)?;
        let genome = reader.genome().clone();
        self.emit_header(out, reader.header())?;

        let mut record = AlignmentRecord::default();
        while reader.read_record(&mut record)? {
            self.emit(out, &genome, &record, stats)?;
        }
        Ok(())
    }

    fn view_regions<W: Write>(
        &self,
        path: &Path,
        out: &mut TextWriter<W>,
        stats: &mut ViewStats,
    ) -> Result<()> {
        let mut reader = IndexedReader::open(path, &self.config)?;
        let genome = reader.genome().clone();
        self.emit_header(out, reader.header())?;

        for text in &self.regions {
            if text == UNPLACED_REGION {
                for record in reader.unplaced()? {
                    self.emit(out, &genome, &record?, stats)?;
                }
                continue;
            }
            let region = Region::parse(text, &genome)?;
            let mut query = reader.query(&region)?;
            for record in query.by_ref() {
                self.emit(out, &genome, &record?, stats)?;
            }
            stats.scanned += query.scanned();
        }
        Ok(())
    }

    fn emit_header<W: Write>(&self, out: &mut TextWriter<W>, header: &str) -> Result<()> {
        if self.include_header && !self.count {
            out.write_header(header)?;
        }
        Ok(())
    }

    fn emit<W: Write>(
        &self,
        out: &mut TextWriter<W>,
        genome: &Genome,
        record: &AlignmentRecord,
        stats: &mut ViewStats,
    ) -> Result<()> {
        stats.records += 1;
        if !self.count {
            out.write_record(genome, record)?;
        }
        Ok(())
    }
}

/// Statistics from a view run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ViewStats {
    /// Records printed (or counted).
    pub records: u64,
    /// Records decoded by region queries, including those filtered out.
    pub scanned: u64,
}

impl fmt::Display for ViewStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} records", self.records)?;
        if self.scanned > 0 {
            write!(f, " ({} scanned)", self.scanned)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgzf::BgzfWriter;
    use crate::commands::IndexCommand;
    use crate::error::BrixError;
    use tempfile::tempdir;

    const HEADER: &str = "@SQ\tSN:chr1\tLN:10000\n";

    fn write_sam(path: &Path) {
        let mut writer = BgzfWriter::new(std::fs::File::create(path).unwrap());
        writer.write_all(HEADER.as_bytes()).unwrap();
        for i in 0..20u64 {
            writeln!(writer, "r{}\t0\tchr1\t{}\t60\t5M\t*\t0\t0\tACGTA\tIIIII", i, i * 100 + 1)
                .unwrap();
        }
        writeln!(writer, "u1\t4\t*\t0\t0\t*\t*\t0\t0\tAC\tII").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_view_all_with_header() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("a.sam.gz");
        write_sam(&data);

        let mut out = Vec::new();
        let stats = ViewCommand::new().with_header(true).run(&data, &mut out).unwrap();
        assert_eq!(stats.records, 21);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(HEADER));
        assert!(text.contains("r3\t0\tchr1\t301\t60\t5M\t*\t0\t0\tACGTA\tIIIII\n"));
    }

    #[test]
    fn test_view_regions_and_count() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("a.sam.gz");
        write_sam(&data);

        let mut out = Vec::new();
        let err = ViewCommand::new()
            .with_regions(vec!["chr1:1-10".to_string()])
            .run(&data, &mut out)
            .unwrap_err();
        assert!(matches!(err, BrixError::MissingIndex(_)));

        IndexCommand::new().run(&data).unwrap();

        let mut out = Vec::new();
        ViewCommand::new()
            .with_regions(vec!["chr1:203-402".to_string(), "*".to_string()])
            .run(&data, &mut out)
            .unwrap();
        let names: Vec<&str> = std::str::from_utf8(&out)
            .unwrap()
            .lines()
            .map(|l| l.split('\t').next().unwrap())
            .collect();
        assert_eq!(names, vec!["r2", "r3", "r4", "u1"]);

        let mut out = Vec::new();
        ViewCommand::new()
            .with_regions(vec!["chr1".to_string()])
            .with_count(true)
            .run(&data, &mut out)
            .unwrap();
        assert_eq!(out, b"20\n");
    }
}
