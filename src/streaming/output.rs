//! Efficient output formatting for streaming operations.
//!
//! Uses itoa for integer formatting to avoid allocation in the hot path.

use std::io::{BufWriter, Write};

use crate::error::Result;
use crate::genome::Genome;
use crate::pileup::{MultiPileupColumn, PileupColumn, PileupEntry};
use crate::record::cigar::format_cigar;
use crate::record::AlignmentRecord;

use super::buffers::DEFAULT_OUTPUT_BUFFER;

/// Highest printable quality character.
const MAX_QUAL_CHAR: u8 = b'~';

/// Buffered text writer for records, pileup columns and report lines.
pub struct TextWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
}

impl<W: Write> TextWriter<W> {
    /// Create a new writer with the default buffer.
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_OUTPUT_BUFFER, output)
    }

    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
        }
    }

    /// Write raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    #[inline]
    pub fn write_tab(&mut self) -> Result<()> {
        self.write_bytes(b"\t")
    }

    #[inline]
    pub fn write_newline(&mut self) -> Result<()> {
        self.write_bytes(b"\n")
    }

    /// Write an integer using itoa.
    #[inline]
    pub fn write_int<I: itoa::Integer>(&mut self, n: I) -> Result<()> {
        self.writer.write_all(self.itoa_buf.format(n).as_bytes())?;
        Ok(())
    }

    /// Write a header block verbatim.
    pub fn write_header(&mut self, header: &str) -> Result<()> {
        self.write_bytes(header.as_bytes())
    }

    /// Write one record as a SAM line.
    pub fn write_record(&mut self, genome: &Genome, rec: &AlignmentRecord) -> Result<()> {
        self.write_bytes(rec.name.as_bytes())?;
        self.write_tab()?;
        self.write_int(rec.flags.bits())?;
        self.write_tab()?;
        self.write_reference_name(genome, rec.reference_id)?;
        self.write_tab()?;
        self.write_int(rec.reference_id.map_or(0, |_| rec.start + 1))?;
        self.write_tab()?;
        self.write_int(rec.mapq)?;
        self.write_tab()?;
        if rec.cigar.is_empty() {
            self.write_bytes(b"*")?;
        } else {
            self.write_bytes(format_cigar(&rec.cigar).as_bytes())?;
        }
        self.write_tab()?;
        match rec.mate_reference_id {
            Some(id) if rec.reference_id == Some(id) => self.write_bytes(b"=")?,
            other => self.write_reference_name(genome, other)?,
        }
        self.write_tab()?;
        self.write_int(rec.mate_start.map_or(0, |p| p + 1))?;
        self.write_tab()?;
        self.write_int(rec.template_len)?;
        self.write_tab()?;
        if rec.sequence.is_empty() {
            self.write_bytes(b"*")?;
        } else {
            self.writer.write_all(&rec.sequence)?;
        }
        self.write_tab()?;
        if rec.qualities.is_empty() {
            self.write_bytes(b"*")?;
        } else {
            for &q in &rec.qualities {
                self.writer.write_all(&[qual_char(q)])?;
            }
        }
        if !rec.tags.is_empty() {
            self.write_tab()?;
            self.write_bytes(rec.tags.as_bytes())?;
        }
        self.write_newline()
    }

    fn write_reference_name(&mut self, genome: &Genome, id: Option<usize>) -> Result<()> {
        match id.and_then(|id| genome.name(id)) {
            Some(name) => self.writer.write_all(name.as_bytes())?,
            None => self.writer.write_all(b"*")?,
        }
        Ok(())
    }

    /// Write one pileup column:
    /// `reference  position(1-based)  depth  effective_depth  bases  quals`.
    pub fn write_pileup_column(&mut self, genome: &Genome, column: &PileupColumn) -> Result<()> {
        self.write_reference_name(genome, Some(column.reference_id))?;
        self.write_tab()?;
        self.write_int(column.position + 1)?;
        self.write_tab()?;
        self.write_int(column.depth())?;
        self.write_tab()?;
        self.write_int(column.effective_depth())?;
        self.write_tab()?;
        self.write_entries(column.entries())?;
        self.write_newline()
    }

    /// Write one multi-sample column: position followed by
    /// `depth  bases  quals` for each sample.
    pub fn write_multi_pileup_column(
        &mut self,
        genome: &Genome,
        column: &MultiPileupColumn,
    ) -> Result<()> {
        self.write_reference_name(genome, Some(column.reference_id))?;
        self.write_tab()?;
        self.write_int(column.position + 1)?;
        for entries in &column.samples {
            self.write_tab()?;
            self.write_int(entries.len())?;
            self.write_tab()?;
            self.write_entries(entries)?;
        }
        self.write_newline()
    }

    /// Bases then qualities; `*` for an empty column.
    fn write_entries(&mut self, entries: &[PileupEntry]) -> Result<()> {
        if entries.is_empty() {
            return self.write_bytes(b"*\t*");
        }
        for entry in entries {
            self.writer.write_all(&[entry.base_char()])?;
        }
        self.write_tab()?;
        for entry in entries {
            self.writer.write_all(&[qual_char(entry.qual)])?;
        }
        Ok(())
    }

    /// Flush the output buffer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Get mutable reference to the underlying writer.
    pub fn inner_mut(&mut self) -> &mut BufWriter<W> {
        &mut self.writer
    }
}

#[inline]
fn qual_char(q: u8) -> u8 {
    q.saturating_add(33).min(MAX_QUAL_CHAR)
}
