//! Single-block encoding and decoding.
//!
//! A BGZF block is a complete gzip member whose header carries a `BC`
//! extra subfield holding the total block size minus one:
//!
//! ```text
//! 1f 8b 08 04 | MTIME(4) | XFL | OS | XLEN=6 | 'B' 'C' SLEN=2 BSIZE(2) | CDATA | CRC32(4) | ISIZE(4)
//! ```

use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

use crate::error::{BrixError, Result};

/// Fixed part of a BGZF header before the extra field.
const GZIP_FIXED_HEADER: usize = 12;

/// Size of a BGZF header including the `BC` subfield.
pub const HEADER_SIZE: usize = 18;

/// CRC32 + ISIZE.
pub const TRAILER_SIZE: usize = 8;

/// Largest compressed block, header and trailer included.
pub const MAX_BLOCK_SIZE: usize = 65536;

/// Largest decompressed payload a single block may carry.
///
/// Chosen so that even a stored (level 0) deflate stream plus header and
/// trailer stays within [`MAX_BLOCK_SIZE`].
pub const MAX_DATA_SIZE: usize = 0xff00;

/// The 28-byte empty block written at the end of every BGZF file.
pub const EOF_MARKER: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

const HEADER_TEMPLATE: [u8; HEADER_SIZE] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, b'B', b'C', 0x02,
    0x00, 0x00, 0x00,
];

/// One encoded block, ready to be written out.
#[derive(Debug, Clone)]
pub struct CompressedBlock {
    bytes: Vec<u8>,
    data_len: usize,
}

impl CompressedBlock {
    /// Encoded bytes: header, deflate payload and trailer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total compressed size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Size of the payload once decompressed.
    pub fn data_len(&self) -> usize {
        self.data_len
    }
}

/// Compress `data` into one block at the given deflate level.
///
/// Fails with [`BrixError::Compression`] when the payload is larger than
/// `max_block_size`, when `max_block_size` itself cannot be represented in a
/// block, or when the level is outside `0..=9`.
pub fn compress(data: &[u8], max_block_size: usize, level: u32) -> Result<CompressedBlock> {
    if max_block_size == 0 || max_block_size > MAX_DATA_SIZE {
        return Err(BrixError::Compression(format!(
            "block size {} outside 1..={}",
            max_block_size, MAX_DATA_SIZE
        )));
    }
    if level > 9 {
        return Err(BrixError::Compression(format!(
            "compression level {} outside 0..=9",
            level
        )));
    }
    if data.len() > max_block_size {
        return Err(BrixError::Compression(format!(
            "payload of {} bytes exceeds block size {}",
            data.len(),
            max_block_size
        )));
    }

    let mut cdata = deflate(data, Compression::new(level))?;
    if cdata.len() + HEADER_SIZE + TRAILER_SIZE > MAX_BLOCK_SIZE {
        // Incompressible payload; a stored stream is guaranteed to fit.
        cdata = deflate(data, Compression::none())?;
    }
    let total = cdata.len() + HEADER_SIZE + TRAILER_SIZE;
    if total > MAX_BLOCK_SIZE {
        return Err(BrixError::Compression(format!(
            "compressed block of {} bytes does not fit in {}",
            total, MAX_BLOCK_SIZE
        )));
    }

    let mut crc = Crc::new();
    crc.update(data);

    let mut header = HEADER_TEMPLATE;
    LittleEndian::write_u16(&mut header[16..18], (total - 1) as u16);
    let mut trailer = [0u8; TRAILER_SIZE];
    LittleEndian::write_u32(&mut trailer[0..4], crc.sum());
    LittleEndian::write_u32(&mut trailer[4..8], data.len() as u32);

    let mut bytes = Vec::with_capacity(total);
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&cdata);
    bytes.extend_from_slice(&trailer);

    Ok(CompressedBlock {
        bytes,
        data_len: data.len(),
    })
}

fn deflate(data: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2 + 64), level);
    encoder
        .write_all(data)
        .map_err(|e| BrixError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| BrixError::Compression(e.to_string()))
}

/// A block read from disk but not yet inflated.
#[derive(Debug)]
pub(crate) struct RawBlock {
    /// File offset of the block's first byte.
    pub offset: u64,
    /// Total size on disk.
    pub size: usize,
    cdata: Vec<u8>,
    crc: u32,
    isize: u32,
}

impl RawBlock {
    /// Whether the trailer announces an empty payload.
    pub fn is_empty(&self) -> bool {
        self.isize == 0
    }

    /// Inflate the payload and verify its length and checksum.
    pub fn inflate(self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.isize as usize);
        DeflateDecoder::new(&self.cdata[..])
            .read_to_end(&mut data)
            .map_err(|e| BrixError::corrupt(self.offset, format!("inflate failed: {}", e)))?;

        if data.len() != self.isize as usize {
            return Err(BrixError::corrupt(
                self.offset,
                format!(
                    "decompressed {} bytes, trailer says {}",
                    data.len(),
                    self.isize
                ),
            ));
        }

        let mut crc = Crc::new();
        crc.update(&data);
        if crc.sum() != self.crc {
            return Err(BrixError::corrupt(
                self.offset,
                format!("CRC32 mismatch: {:08x} != {:08x}", crc.sum(), self.crc),
            ));
        }

        Ok(data)
    }
}

/// Read as many bytes as possible into `buf`, stopping only at EOF.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_exact_at<R: Read>(reader: &mut R, buf: &mut [u8], offset: u64) -> Result<()> {
    let n = read_up_to(reader, buf)?;
    if n < buf.len() {
        return Err(BrixError::UnexpectedEof {
            offset: offset + n as u64,
        });
    }
    Ok(())
}

/// Read the next raw block starting at file offset `offset`.
///
/// Returns `Ok(None)` when the stream ends exactly on a block boundary.
pub(crate) fn read_raw_block<R: Read>(reader: &mut R, offset: u64) -> Result<Option<RawBlock>> {
    let mut fixed = [0u8; GZIP_FIXED_HEADER];
    let n = read_up_to(reader, &mut fixed)?;
    if n == 0 {
        return Ok(None);
    }
    if n < GZIP_FIXED_HEADER {
        return Err(BrixError::UnexpectedEof {
            offset: offset + n as u64,
        });
    }

    if fixed[0] != 0x1f || fixed[1] != 0x8b {
        return Err(BrixError::corrupt(offset, "bad gzip magic"));
    }
    if fixed[2] != 8 {
        return Err(BrixError::corrupt(
            offset,
            format!("unsupported compression method {}", fixed[2]),
        ));
    }
    if fixed[3] & 0x04 == 0 {
        return Err(BrixError::corrupt(offset, "gzip member without extra field"));
    }

    let xlen = LittleEndian::read_u16(&fixed[10..12]) as usize;
    let mut extra = vec![0u8; xlen];
    read_exact_at(reader, &mut extra, offset + GZIP_FIXED_HEADER as u64)?;

    let bsize = find_bsize(&extra)
        .ok_or_else(|| BrixError::corrupt(offset, "missing BC subfield"))?;
    let size = bsize as usize + 1;

    let overhead = GZIP_FIXED_HEADER + xlen + TRAILER_SIZE;
    if size < overhead {
        return Err(BrixError::corrupt(
            offset,
            format!("block size {} smaller than its header", size),
        ));
    }

    let mut cdata = vec![0u8; size - overhead];
    read_exact_at(reader, &mut cdata, offset + (GZIP_FIXED_HEADER + xlen) as u64)?;

    let mut trailer = [0u8; TRAILER_SIZE];
    read_exact_at(reader, &mut trailer, offset + (size - TRAILER_SIZE) as u64)?;
    let crc = LittleEndian::read_u32(&trailer[0..4]);
    let isize = LittleEndian::read_u32(&trailer[4..8]);
    if isize as usize > MAX_BLOCK_SIZE {
        return Err(BrixError::corrupt(
            offset,
            format!("uncompressed size {} exceeds {}", isize, MAX_BLOCK_SIZE),
        ));
    }

    Ok(Some(RawBlock {
        offset,
        size,
        cdata,
        crc,
        isize,
    }))
}

/// Locate the `BC` subfield among the gzip extra subfields.
fn find_bsize(extra: &[u8]) -> Option<u16> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let slen = LittleEndian::read_u16(&extra[pos + 2..pos + 4]) as usize;
        if extra[pos] == b'B' && extra[pos + 1] == b'C' && slen == 2 && pos + 6 <= extra.len() {
            return Some(LittleEndian::read_u16(&extra[pos + 4..pos + 6]));
        }
        pos += 4 + slen;
    }
    None
}
