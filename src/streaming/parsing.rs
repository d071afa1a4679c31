//! Zero-allocation line parsing utilities.
//!
//! These functions split and parse alignment lines without any heap
//! allocation in the hot path; building owned records is left to the
//! caller.

use memchr::memchr;

/// Number of mandatory SAM columns.
pub const SAM_COLUMNS: usize = 11;

/// Fast u64 parsing - no allocation, no error formatting.
///
/// Returns None if the input is empty or contains non-digit characters.
#[inline(always)]
pub fn parse_u64_fast(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 19 {
        return None;
    }
    let mut n: u64 = 0;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        n = n * 10 + d as u64;
    }
    Some(n)
}

/// Signed variant of [`parse_u64_fast`], accepting a leading `-` or `+`.
#[inline(always)]
pub fn parse_i64_fast(bytes: &[u8]) -> Option<i64> {
    match bytes.first() {
        Some(b'-') => parse_u64_fast(&bytes[1..]).map(|n| -(n as i64)),
        Some(b'+') => parse_u64_fast(&bytes[1..]).map(|n| n as i64),
        _ => parse_u64_fast(bytes).map(|n| n as i64),
    }
}

/// Borrowed view of the columns of one SAM line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamFields<'a> {
    pub qname: &'a [u8],
    pub flag: &'a [u8],
    pub rname: &'a [u8],
    pub pos: &'a [u8],
    pub mapq: &'a [u8],
    pub cigar: &'a [u8],
    pub rnext: &'a [u8],
    pub pnext: &'a [u8],
    pub tlen: &'a [u8],
    pub seq: &'a [u8],
    pub qual: &'a [u8],
    /// Everything after the eleventh column, without the leading tab.
    pub rest: &'a [u8],
}

/// Split a SAM line into its columns using memchr.
///
/// Returns None when fewer than eleven columns are present.
#[inline]
pub fn split_sam_line(line: &[u8]) -> Option<SamFields<'_>> {
    let line = trim_newline(line);
    let mut cols: [&[u8]; SAM_COLUMNS] = [&[]; SAM_COLUMNS];
    let mut rest = line;
    for (i, col) in cols.iter_mut().enumerate() {
        match memchr(b'\t', rest) {
            Some(tab) => {
                *col = &rest[..tab];
                rest = &rest[tab + 1..];
            }
            None if i == SAM_COLUMNS - 1 => {
                *col = rest;
                rest = &[];
            }
            None => return None,
        }
    }
    Some(SamFields {
        qname: cols[0],
        flag: cols[1],
        rname: cols[2],
        pos: cols[3],
        mapq: cols[4],
        cigar: cols[5],
        rnext: cols[6],
        pnext: cols[7],
        tlen: cols[8],
        seq: cols[9],
        qual: cols[10],
        rest,
    })
}

/// Strip a trailing `\n` or `\r\n`.
#[inline]
pub fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Check if a line should be skipped (blank).
#[inline]
pub fn should_skip_line(line: &[u8]) -> bool {
    trim_newline(line).iter().all(|b| b.is_ascii_whitespace())
}

/// Header lines start with `@`.
#[inline]
pub fn is_header_line(line: &[u8]) -> bool {
    line.first() == Some(&b'@')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u64_fast() {
        assert_eq!(parse_u64_fast(b"0"), Some(0));
        assert_eq!(parse_u64_fast(b"12345"), Some(12345));
        assert_eq!(parse_u64_fast(b""), None);
        assert_eq!(parse_u64_fast(b"12a"), None);
        assert_eq!(parse_u64_fast(b"-1"), None);
        assert_eq!(parse_u64_fast(b"99999999999999999999"), None);
    }

    #[test]
    fn test_parse_i64_fast() {
        assert_eq!(parse_i64_fast(b"-250"), Some(-250));
        assert_eq!(parse_i64_fast(b"+7"), Some(7));
        assert_eq!(parse_i64_fast(b"0"), Some(0));
        assert_eq!(parse_i64_fast(b"-"), None);
    }

    #[test]
    fn test_split_sam_line() {
        let line = b"r1\t99\tchr1\t100\t60\t10M\t=\t200\t110\tACGTACGTAC\tIIIIIIIIII\tNM:i:0\tMD:Z:10\n";
        let f = split_sam_line(line).unwrap();
        assert_eq!(f.qname, b"r1");
        assert_eq!(f.flag, b"99");
        assert_eq!(f.rname, b"chr1");
        assert_eq!(f.cigar, b"10M");
        assert_eq!(f.qual, b"IIIIIIIIII");
        assert_eq!(f.rest, b"NM:i:0\tMD:Z:10");
    }

    #[test]
    fn test_split_sam_line_without_tags() {
        let line = b"r1\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t*\r\n";
        let f = split_sam_line(line).unwrap();
        assert_eq!(f.qual, b"*");
        assert!(f.rest.is_empty());
        assert!(split_sam_line(b"r1\t4\t*\t0").is_none());
    }

    #[test]
    fn test_should_skip_line() {
        assert!(should_skip_line(b""));
        assert!(should_skip_line(b"  \n"));
        assert!(!should_skip_line(b"r1\t0"));
        assert!(is_header_line(b"@SQ\tSN:chr1"));
    }
}
