//! SAM text decoding.
//!
//! Header lines (`@...`) are consumed up front and their `@SQ` entries
//! become the [`Genome`]. Each following line is one alignment. The reader
//! works over any [`BufRead`]; over a [`BgzfReader`] it also reports the
//! virtual offset of every record, which is what indexing and region
//! queries need.

use std::io::{BufRead, Read, Seek};

use crate::bgzf::{BgzfReader, VirtualOffset};
use crate::error::{BrixError, Result};
use crate::genome::Genome;
use crate::streaming::buffers::DEFAULT_LINE_BUFFER;
use crate::streaming::parsing::{
    is_header_line, parse_i64_fast, parse_u64_fast, should_skip_line, split_sam_line, SamFields,
};

use super::cigar::{parse_cigar, query_len};
use super::{AlignmentFlags, AlignmentRecord};

/// Streaming SAM reader.
pub struct SamReader<R> {
    inner: R,
    genome: Genome,
    header: String,
    line: Vec<u8>,
    line_num: usize,
}

impl<R: BufRead> SamReader<R> {
    /// Create a reader and consume the header.
    pub fn new(inner: R) -> Result<Self> {
        let mut reader = Self {
            inner,
            genome: Genome::new(),
            header: String::new(),
            line: Vec::with_capacity(DEFAULT_LINE_BUFFER),
            line_num: 0,
        };
        reader.read_header()?;
        Ok(reader)
    }

    fn read_header(&mut self) -> Result<()> {
        loop {
            let starts_header = {
                let buf = self.inner.fill_buf()?;
                is_header_line(buf)
            };
            if !starts_header {
                return Ok(());
            }
            self.line.clear();
            self.inner.read_until(b'\n', &mut self.line)?;
            self.line_num += 1;
            let text = String::from_utf8_lossy(&self.line);
            self.genome.add_header_line(&text, self.line_num)?;
            self.header.push_str(&text);
            if !self.header.ends_with('\n') {
                self.header.push('\n');
            }
        }
    }

    /// Reference dictionary from the `@SQ` lines.
    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    /// Raw header text, one line per header record.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Read the next record into `record`. Returns false at end of input.
    pub fn read_record(&mut self, record: &mut AlignmentRecord) -> Result<bool> {
        loop {
            self.line.clear();
            if self.inner.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(false);
            }
            self.line_num += 1;
            if should_skip_line(&self.line) {
                continue;
            }
            if is_header_line(&self.line) {
                return Err(self.error("header line after alignment records"));
            }
            let fields = split_sam_line(&self.line)
                .ok_or_else(|| self.error("expected at least 11 tab-separated columns"))?;
            return decode_fields(&fields, &self.genome, record)
                .map(|_| true)
                .map_err(|message| self.error(&message));
        }
    }

    /// Iterator over the remaining records.
    pub fn records(&mut self) -> Records<'_, R> {
        Records { reader: self }
    }

    /// Owning iterator over the remaining records.
    pub fn into_records(self) -> IntoRecords<R> {
        IntoRecords { reader: self }
    }

    /// Line number of the last line read.
    pub fn line_number(&self) -> usize {
        self.line_num
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn error(&self, message: &str) -> BrixError {
        BrixError::Parse {
            line: self.line_num,
            message: message.to_string(),
        }
    }
}

impl<R: Read> SamReader<BgzfReader<R>> {
    /// Virtual offset of the next unread record.
    pub fn virtual_position(&self) -> VirtualOffset {
        self.inner.virtual_position()
    }
}

impl<R: Read + Seek> SamReader<BgzfReader<R>> {
    /// Jump to a record boundary previously reported by
    /// [`virtual_position`](Self::virtual_position).
    pub fn seek(&mut self, offset: VirtualOffset) -> Result<()> {
        self.inner.seek(offset)
    }
}

/// Iterator returned by [`SamReader::records`].
pub struct Records<'a, R> {
    reader: &'a mut SamReader<R>,
}

impl<R: BufRead> Iterator for Records<'_, R> {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = AlignmentRecord::default();
        match self.reader.read_record(&mut record) {
            Ok(true) => Some(Ok(record)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Iterator returned by [`SamReader::into_records`].
pub struct IntoRecords<R> {
    reader: SamReader<R>,
}

impl<R> IntoRecords<R> {
    pub fn get_ref(&self) -> &SamReader<R> {
        &self.reader
    }
}

impl<R: BufRead> Iterator for IntoRecords<R> {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.records().next()
    }
}

fn utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn lookup(genome: &Genome, name: &[u8]) -> std::result::Result<usize, String> {
    let name = std::str::from_utf8(name).map_err(|_| "reference name is not UTF-8".to_string())?;
    genome
        .id(name)
        .ok_or_else(|| format!("reference '{}' is not in the header", name))
}

fn decode_fields(
    f: &SamFields<'_>,
    genome: &Genome,
    rec: &mut AlignmentRecord,
) -> std::result::Result<(), String> {
    let flag = parse_u64_fast(f.flag)
        .filter(|&v| v <= u16::MAX as u64)
        .ok_or_else(|| format!("invalid FLAG '{}'", utf8(f.flag)))?;
    let pos = parse_u64_fast(f.pos).ok_or_else(|| format!("invalid POS '{}'", utf8(f.pos)))?;
    let mapq = parse_u64_fast(f.mapq)
        .filter(|&v| v <= 255)
        .ok_or_else(|| format!("invalid MAPQ '{}'", utf8(f.mapq)))?;
    let cigar = parse_cigar(f.cigar).ok_or_else(|| format!("invalid CIGAR '{}'", utf8(f.cigar)))?;
    let pnext = parse_u64_fast(f.pnext).ok_or_else(|| format!("invalid PNEXT '{}'", utf8(f.pnext)))?;
    let tlen = parse_i64_fast(f.tlen).ok_or_else(|| format!("invalid TLEN '{}'", utf8(f.tlen)))?;

    let reference_id = match f.rname {
        b"*" => None,
        name => Some(lookup(genome, name)?),
    };
    let mate_reference_id = match f.rnext {
        b"*" => None,
        b"=" => reference_id,
        name => Some(lookup(genome, name)?),
    };

    rec.name = utf8(f.qname);
    rec.flags = AlignmentFlags::from_bits(flag as u16);
    rec.reference_id = if pos == 0 { None } else { reference_id };
    rec.start = pos.saturating_sub(1);
    rec.mapq = mapq as u8;
    rec.cigar = cigar;
    rec.mate_reference_id = mate_reference_id;
    rec.mate_start = pnext.checked_sub(1);
    rec.template_len = tlen;

    rec.sequence.clear();
    if f.seq != b"*" {
        rec.sequence.extend_from_slice(f.seq);
    }
    rec.qualities.clear();
    if f.qual != b"*" {
        if f.qual.iter().any(|&q| q < 33) {
            return Err("QUAL contains characters below '!'".to_string());
        }
        rec.qualities.extend(f.qual.iter().map(|&q| q - 33));
    }
    if !rec.qualities.is_empty() && rec.qualities.len() != rec.sequence.len() {
        return Err(format!(
            "QUAL length {} does not match SEQ length {}",
            rec.qualities.len(),
            rec.sequence.len()
        ));
    }
    if !rec.sequence.is_empty() && !rec.cigar.is_empty() && query_len(&rec.cigar) != rec.sequence.len()
    {
        return Err(format!(
            "CIGAR covers {} query bases but SEQ has {}",
            query_len(&rec.cigar),
            rec.sequence.len()
        ));
    }
    rec.tags = utf8(f.rest);
    Ok(())
}
