//! Integration tests for binning indexes and region queries.
//!
//! Tests verify:
//! 1. Records in disjoint bins are never scanned for a distant region
//! 2. Query results equal a full scan filtered by exact overlap (BAI and CSI)
//! 3. Indexes survive a save/load cycle through the file system

use std::collections::BTreeSet;
use std::io::{Cursor, Write};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use brix::bgzf::{BgzfReader, BgzfWriter};
use brix::config::{IndexConfig, WriterConfig};
use brix::index::builder::build_index;
use brix::index::io as index_io;
use brix::index::BinningIndex;
use brix::query::IndexedReader;
use brix::record::{AlignmentRecord, Locatable, SamReader};
use brix::region::Region;

fn bgzf(text: &str, block_size: usize) -> Vec<u8> {
    let config = WriterConfig::new().with_block_size(block_size);
    let mut writer = BgzfWriter::with_config(Vec::new(), &config).unwrap();
    writer.write_all(text.as_bytes()).unwrap();
    writer.finish().unwrap()
}

fn index_bytes(bytes: &[u8], config: &IndexConfig) -> BinningIndex {
    let mut sam = SamReader::new(BgzfReader::new(Cursor::new(bytes.to_vec()))).unwrap();
    let references = sam.genome().len();
    build_index(&mut sam, config, references).unwrap()
}

#[test]
fn test_distant_region_skips_other_bins() {
    // Each record gets its own block so chunks map one-to-one onto records.
    let mut writer = BgzfWriter::new(Vec::new());
    writer.write_all(b"@SQ\tSN:chr1\tLN:1000000\n").unwrap();
    writer.flush_block().unwrap();
    for (name, pos, cigar) in [("a", 11, "5M"), ("b", 500_001, "5M"), ("c", 1_000_000, "1M")] {
        writeln!(writer, "{}\t0\tchr1\t{}\t60\t{}\t*\t0\t0\t*\t*", name, pos, cigar).unwrap();
        writer.flush_block().unwrap();
    }
    let bytes = writer.finish().unwrap();

    let index = index_bytes(&bytes, &IndexConfig::bai());
    assert!(index.reference(0).unwrap().bins.len() >= 2);

    let mut reader = IndexedReader::new(BgzfReader::new(Cursor::new(bytes)), Some(index)).unwrap();
    let mut query = reader.query_str("chr1:999990-1000000").unwrap();
    let names: Vec<String> = query.by_ref().map(|r| r.unwrap().name).collect();
    assert_eq!(names, vec!["c"]);
    assert_eq!(query.scanned(), 1);
}

struct Synthetic {
    text: String,
    records: Vec<(String, usize, u64, u64)>,
}

/// Sorted records on three references with short reads and a few long
/// spans that cross several bin levels.
fn synthetic(seed: u64) -> Synthetic {
    let mut rng = SmallRng::seed_from_u64(seed);
    let lengths = [3_000_000u64, 400_000, 50_000];
    let mut text = String::new();
    for (i, len) in lengths.iter().enumerate() {
        text.push_str(&format!("@SQ\tSN:ref{}\tLN:{}\n", i, len));
    }

    let mut records = Vec::new();
    let mut n = 0;
    for (rid, &len) in lengths.iter().enumerate() {
        let mut pos = 0u64;
        loop {
            pos += rng.gen_range(0..6_000);
            let span = if rng.gen_bool(0.02) {
                rng.gen_range(10_000..300_000)
            } else {
                rng.gen_range(20..300)
            };
            if pos + span > len {
                break;
            }
            let name = format!("q{}", n);
            n += 1;
            text.push_str(&format!(
                "{}\t0\tref{}\t{}\t60\t{}M\t*\t0\t0\t*\t*\n",
                name,
                rid,
                pos + 1,
                span
            ));
            records.push((name, rid, pos, pos + span));
        }
    }
    Synthetic { text, records }
}

fn check_completeness(config: IndexConfig, seed: u64) {
    let data = synthetic(seed);
    let bytes = bgzf(&data.text, 8192);
    let index = index_bytes(&bytes, &config);
    let mut reader = IndexedReader::new(BgzfReader::new(Cursor::new(bytes)), Some(index)).unwrap();

    let mut rng = SmallRng::seed_from_u64(seed + 1);
    let lengths: Vec<u64> = reader.genome().references().iter().map(|r| r.length).collect();
    for _ in 0..150 {
        let rid = rng.gen_range(0..lengths.len());
        let start = rng.gen_range(0..lengths[rid]);
        let end = (start + rng.gen_range(0..200_000)).min(lengths[rid]);

        let expected: BTreeSet<&str> = data
            .records
            .iter()
            .filter(|(_, r, s, e)| *r == rid && *s < end && *e > start && start < end)
            .map(|(name, ..)| name.as_str())
            .collect();

        let name = format!("ref{}", rid);
        let region = Region::new(reader.genome(), &name, start, end).unwrap();
        let found: Vec<AlignmentRecord> = reader
            .query(&region)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert!(found.iter().all(|r| r.reference_id() == Some(rid)));
        let found_names: BTreeSet<&str> = found.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(found.len(), found_names.len(), "duplicate records returned");
        assert_eq!(found_names, expected, "ref{}:[{}, {})", rid, start, end);
    }
}

#[test]
fn test_bai_query_completeness() {
    check_completeness(IndexConfig::bai(), 42);
}

#[test]
fn test_csi_query_completeness() {
    check_completeness(IndexConfig::csi(12).with_depth(6), 43);
}

#[test]
fn test_saved_index_answers_the_same() {
    let data = synthetic(5);
    let bytes = bgzf(&data.text, 16_384);
    let dir = tempdir().unwrap();

    for config in [IndexConfig::bai(), IndexConfig::csi(14)] {
        let index = index_bytes(&bytes, &config);
        let path = dir.path().join(format!("data.{}", config.kind.extension()));
        index_io::save(&index, &path).unwrap();
        let loaded = index_io::load(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.query(0, 100_000, 200_000).unwrap(), index.query(0, 100_000, 200_000).unwrap());
    }
}
