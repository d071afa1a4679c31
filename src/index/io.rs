//! On-disk index formats.
//!
//! Two layouts are supported, both little-endian:
//!
//! - BAI: `BAI\1`, reference count, then per reference its bins (id, chunk
//!   count, chunk offsets) and linear index, followed by the optional count
//!   of unplaced records. Stored uncompressed.
//! - CSI: `CSI\1`, min shift, depth and auxiliary data, then per reference
//!   its bins (id, `loffset`, chunk count, chunks), followed by the same
//!   optional trailer. Stored BGZF-compressed.
//!
//! In both, per-reference metadata travels as a pseudo-bin with two chunks
//! holding the first/last record offsets and the mapped/unmapped counts.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};
use memmap2::Mmap;
use rustc_hash::FxHashMap;
use tempfile::NamedTempFile;

use crate::bgzf::{BgzfReader, BgzfWriter, VirtualOffset};
use crate::config::IndexKind;
use crate::error::{BrixError, Result};
use crate::streaming::buffers::DEFAULT_OUTPUT_BUFFER;

use super::{Bin, BinningIndex, BinningScheme, Chunk, ReferenceIndex, ReferenceMetadata};

const BAI_MAGIC: &[u8; 4] = b"BAI\x01";
const CSI_MAGIC: &[u8; 4] = b"CSI\x01";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Path of the index of `data` for a given flavour: the extension is
/// appended to the full file name (`reads.sam.gz` → `reads.sam.gz.csi`).
pub fn index_path_for<P: AsRef<Path>>(data: P, kind: IndexKind) -> PathBuf {
    let mut name = data.as_ref().as_os_str().to_owned();
    name.push(".");
    name.push(kind.extension());
    PathBuf::from(name)
}

/// Find an existing index for `data`, preferring CSI over BAI.
pub fn locate_index<P: AsRef<Path>>(data: P) -> Result<PathBuf> {
    let data = data.as_ref();
    for kind in [IndexKind::Csi, IndexKind::Bai] {
        let appended = index_path_for(data, kind);
        if appended.is_file() {
            return Ok(appended);
        }
        let replaced = data.with_extension(kind.extension());
        if replaced != data && replaced.is_file() {
            return Ok(replaced);
        }
    }
    Err(BrixError::MissingIndex(data.to_path_buf()))
}

/// Serialize `index` in its own layout, uncompressed.
pub fn write_index<W: Write>(index: &BinningIndex, out: &mut W) -> Result<()> {
    match index.kind() {
        IndexKind::Bai => out.write_all(BAI_MAGIC)?,
        IndexKind::Csi => {
            let scheme = index.scheme();
            out.write_all(CSI_MAGIC)?;
            out.write_i32::<LittleEndian>(scheme.min_shift as i32)?;
            out.write_i32::<LittleEndian>(scheme.depth as i32)?;
            out.write_i32::<LittleEndian>(len_i32(index.aux().len())?)?;
            out.write_all(index.aux())?;
        }
    }

    out.write_i32::<LittleEndian>(len_i32(index.references().len())?)?;
    for reference in index.references() {
        write_reference(index.kind(), index.scheme(), reference, out)?;
    }
    if let Some(unplaced) = index.unplaced_count() {
        out.write_u64::<LittleEndian>(unplaced)?;
    }
    Ok(())
}

fn write_reference<W: Write>(
    kind: IndexKind,
    scheme: BinningScheme,
    reference: &ReferenceIndex,
    out: &mut W,
) -> Result<()> {
    let n_bin = reference.bins.len() + usize::from(reference.metadata.is_some());
    out.write_i32::<LittleEndian>(len_i32(n_bin)?)?;

    for id in reference.sorted_bin_ids() {
        let bin = &reference.bins[&id];
        out.write_u32::<LittleEndian>(id)?;
        if kind == IndexKind::Csi {
            out.write_u64::<LittleEndian>(bin.loffset.into())?;
        }
        out.write_i32::<LittleEndian>(len_i32(bin.chunks.len())?)?;
        for chunk in &bin.chunks {
            out.write_u64::<LittleEndian>(chunk.start.into())?;
            out.write_u64::<LittleEndian>(chunk.end.into())?;
        }
    }

    if let Some(metadata) = reference.metadata {
        out.write_u32::<LittleEndian>(scheme.metadata_bin())?;
        if kind == IndexKind::Csi {
            out.write_u64::<LittleEndian>(0)?;
        }
        out.write_i32::<LittleEndian>(2)?;
        out.write_u64::<LittleEndian>(metadata.start.into())?;
        out.write_u64::<LittleEndian>(metadata.end.into())?;
        out.write_u64::<LittleEndian>(metadata.mapped)?;
        out.write_u64::<LittleEndian>(metadata.unmapped)?;
    }

    if kind == IndexKind::Bai {
        out.write_i32::<LittleEndian>(len_i32(reference.linear.len())?)?;
        for &offset in &reference.linear {
            out.write_u64::<LittleEndian>(offset.into())?;
        }
    }
    Ok(())
}

fn len_i32(n: usize) -> Result<i32> {
    i32::try_from(n).map_err(|_| BrixError::InvalidIndex(format!("count {} overflows", n)))
}

/// Write `index` to `path` atomically.
///
/// The bytes go to a temporary file in the same directory which is renamed
/// over `path` only once complete, so readers never observe a partial
/// index. CSI indexes are BGZF-compressed.
pub fn save<P: AsRef<Path>>(index: &BinningIndex, path: P) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::with_capacity(DEFAULT_OUTPUT_BUFFER, tmp.as_file());
        match index.kind() {
            IndexKind::Bai => write_index(index, &mut out)?,
            IndexKind::Csi => {
                let mut bgzf = BgzfWriter::new(&mut out);
                write_index(index, &mut bgzf)?;
                bgzf.finish()?;
            }
        }
        out.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| BrixError::Io(e.error))?;
    info!("wrote {:?} index to {}", index.kind(), path.display());
    Ok(())
}

/// Load an index from disk, accepting either layout, compressed or not.
pub fn load<P: AsRef<Path>>(path: P) -> Result<BinningIndex> {
    let path = path.as_ref();
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(BrixError::InvalidIndex(format!("{} is empty", path.display())));
    }
    let mmap = unsafe { Mmap::map(&file)? };
    debug!("mapped {} ({} bytes)", path.display(), mmap.len());
    read_index(&mmap)
}

/// Parse an index from raw bytes, decompressing first when gzip-framed.
pub fn read_index(bytes: &[u8]) -> Result<BinningIndex> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut plain = Vec::new();
        BgzfReader::new(Cursor::new(bytes)).read_to_end(&mut plain)?;
        return parse(&plain);
    }
    parse(bytes)
}

fn parse(bytes: &[u8]) -> Result<BinningIndex> {
    let mut cursor = Cursor::new(bytes);
    let mut magic = [0u8; 4];
    cursor
        .read_exact(&mut magic)
        .map_err(|_| BrixError::InvalidIndex("missing magic".to_string()))?;

    let (kind, scheme, aux) = match &magic {
        m if m == BAI_MAGIC => (IndexKind::Bai, BinningScheme::default(), Vec::new()),
        m if m == CSI_MAGIC => {
            let min_shift = read_count(&mut cursor, "min_shift")? as u32;
            let depth = read_count(&mut cursor, "depth")? as u32;
            if min_shift == 0 || depth == 0 || depth > 9 || min_shift + 3 * depth > 62 {
                return Err(BrixError::InvalidIndex(format!(
                    "unsupported min_shift {} / depth {}",
                    min_shift, depth
                )));
            }
            let l_aux = read_count(&mut cursor, "l_aux")?;
            let mut aux = vec![0u8; l_aux];
            cursor.read_exact(&mut aux).map_err(truncated)?;
            (IndexKind::Csi, BinningScheme::new(min_shift, depth), aux)
        }
        other => {
            return Err(BrixError::InvalidIndex(format!(
                "unknown magic {:02x?}",
                other
            )))
        }
    };

    let n_ref = read_count(&mut cursor, "n_ref")?;
    let mut references = Vec::with_capacity(n_ref.min(1 << 16));
    for _ in 0..n_ref {
        references.push(parse_reference(&mut cursor, kind, scheme)?);
    }

    let unplaced = match cursor.read_u64::<LittleEndian>() {
        Ok(n) => Some(n),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => None,
        Err(e) => return Err(e.into()),
    };

    let mut index = BinningIndex::new(kind, scheme, references, unplaced);
    index.set_aux(aux);
    debug!(
        "loaded {:?} index: {} references, min_shift {}, depth {}",
        kind,
        index.references().len(),
        scheme.min_shift,
        scheme.depth
    );
    Ok(index)
}

fn parse_reference(
    cursor: &mut Cursor<&[u8]>,
    kind: IndexKind,
    scheme: BinningScheme,
) -> Result<ReferenceIndex> {
    let n_bin = read_count(cursor, "n_bin")?;
    let mut bins = FxHashMap::default();
    let mut metadata = None;

    for _ in 0..n_bin {
        let id = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let loffset = match kind {
            IndexKind::Csi => read_offset(cursor)?,
            IndexKind::Bai => VirtualOffset::default(),
        };
        let n_chunk = read_count(cursor, "n_chunk")?;

        if id == scheme.metadata_bin() {
            if n_chunk != 2 {
                return Err(BrixError::InvalidIndex(format!(
                    "metadata bin has {} chunks, expected 2",
                    n_chunk
                )));
            }
            metadata = Some(ReferenceMetadata {
                start: read_offset(cursor)?,
                end: read_offset(cursor)?,
                mapped: cursor.read_u64::<LittleEndian>().map_err(truncated)?,
                unmapped: cursor.read_u64::<LittleEndian>().map_err(truncated)?,
            });
            continue;
        }
        if id > scheme.metadata_bin() {
            return Err(BrixError::InvalidIndex(format!("bin id {} out of range", id)));
        }

        let mut chunks = Vec::with_capacity(n_chunk.min(1 << 16));
        for _ in 0..n_chunk {
            let start = read_offset(cursor)?;
            let end = read_offset(cursor)?;
            chunks.push(Chunk::new(start, end));
        }
        if bins.insert(id, Bin { loffset, chunks }).is_some() {
            return Err(BrixError::InvalidIndex(format!("bin {} listed twice", id)));
        }
    }

    let mut linear = Vec::new();
    if kind == IndexKind::Bai {
        let n_intv = read_count(cursor, "n_intv")?;
        linear.reserve(n_intv.min(1 << 20));
        for _ in 0..n_intv {
            linear.push(read_offset(cursor)?);
        }
    }

    Ok(ReferenceIndex {
        bins,
        linear,
        metadata,
    })
}

fn read_offset(cursor: &mut Cursor<&[u8]>) -> Result<VirtualOffset> {
    cursor
        .read_u64::<LittleEndian>()
        .map(VirtualOffset::from)
        .map_err(truncated)
}

fn read_count(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<usize> {
    let n = cursor.read_i32::<LittleEndian>().map_err(truncated)?;
    usize::try_from(n).map_err(|_| BrixError::InvalidIndex(format!("negative {} ({})", what, n)))
}

fn truncated(e: std::io::Error) -> BrixError {
    BrixError::InvalidIndex(format!("truncated index: {}", e))
}
