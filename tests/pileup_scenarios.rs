//! Integration tests for pileup assembly.
//!
//! Tests verify:
//! 1. A single 100-base read yields 100 columns with head and tail marks
//! 2. Disjoint reads conserve depth: column count equals summed aligned length
//! 3. Overlapping mates count twice by depth and once by effective depth
//! 4. Pileups driven by a region query stay inside the region

use std::io::{Cursor, Write};

use brix::bgzf::{BgzfReader, BgzfWriter};
use brix::config::{IndexConfig, PileupConfig};
use brix::index::builder::build_index;
use brix::pileup::{PileupAssembler, PileupColumn};
use brix::query::IndexedReader;
use brix::record::SamReader;
use brix::region::Region;
use brix::Result;

fn pileup(sam: &str, config: &PileupConfig) -> Vec<PileupColumn> {
    let reader = SamReader::new(Cursor::new(sam.as_bytes().to_vec())).unwrap();
    PileupAssembler::new(reader.into_records(), config)
        .collect::<Result<_>>()
        .unwrap()
}

#[test]
fn test_single_read_columns() {
    let sam = "@SQ\tSN:chr1\tLN:1000\nr1\t0\tchr1\t2\t60\t100M\t*\t0\t0\t*\t*\n";
    let columns = pileup(sam, &PileupConfig::default());

    assert_eq!(columns.len(), 100);
    for (i, column) in columns.iter().enumerate() {
        assert_eq!(column.reference_id, 0);
        assert_eq!(column.position, 1 + i as u64);
        assert_eq!(column.depth(), 1);
    }
    assert!(columns[0].entries()[0].is_head);
    assert!(!columns[0].entries()[0].is_tail);
    assert!(columns[99].entries()[0].is_tail);
    assert!(!columns[99].entries()[0].is_head);
}

#[test]
fn test_disjoint_reads_conserve_depth() {
    let mut sam = String::from("@SQ\tSN:chr1\tLN:100000\n");
    let mut expected = 0u64;
    let mut pos = 1u64;
    for i in 0..50u64 {
        let len = 10 + i * 3;
        sam.push_str(&format!(
            "r{}\t0\tchr1\t{}\t60\t{}M2S\t*\t0\t0\t*\t*\n",
            i, pos, len
        ));
        expected += len;
        pos += len + (i % 4);
    }

    let columns = pileup(&sam, &PileupConfig::default());
    assert_eq!(columns.len() as u64, expected);
    assert!(columns.iter().all(|c| c.depth() == 1));
    assert!(columns.windows(2).all(|w| w[0].position < w[1].position));
}

#[test]
fn test_overlapping_mates() {
    let sam = "@SQ\tSN:chr1\tLN:1000\n\
pair\t99\tchr1\t101\t60\t50M\t=\t131\t80\t*\t*\n\
pair\t147\tchr1\t131\t60\t50M\t=\t101\t-80\t*\t*\n";

    let plain = pileup(sam, &PileupConfig::default());
    let shared = plain.iter().find(|c| c.position == 140).unwrap();
    assert_eq!(shared.depth(), 2);
    assert_eq!(shared.effective_depth(), 2);

    let config = PileupConfig::default().with_overlap_detection(true);
    let detected = pileup(sam, &config);
    assert_eq!(detected.len(), 80);
    for column in &detected {
        let inside = (130..150).contains(&column.position);
        assert_eq!(column.depth(), if inside { 2 } else { 1 });
        assert_eq!(column.effective_depth(), 1, "position {}", column.position);
    }
}

#[test]
fn test_region_pileup_from_index() {
    let mut text = String::from("@SQ\tSN:chr1\tLN:200000\n");
    for i in 0..2000u64 {
        text.push_str(&format!(
            "r{}\t0\tchr1\t{}\t60\t150M\t*\t0\t0\t*\t*\n",
            i,
            1 + i * 90
        ));
    }
    let mut writer = BgzfWriter::new(Vec::new());
    writer.write_all(text.as_bytes()).unwrap();
    let bytes = writer.finish().unwrap();

    let mut sam = SamReader::new(BgzfReader::new(Cursor::new(bytes.clone()))).unwrap();
    let index = build_index(&mut sam, &IndexConfig::bai(), 1).unwrap();
    let reader = IndexedReader::new(BgzfReader::new(Cursor::new(bytes)), Some(index)).unwrap();

    let region = Region::parse("chr1:50001-50100", reader.genome()).unwrap();
    let records = reader.into_query(&region).unwrap();
    let columns: Vec<PileupColumn> = PileupAssembler::new(records, &PileupConfig::default())
        .with_region(&region)
        .collect::<Result<_>>()
        .unwrap();

    assert_eq!(columns.len(), 100);
    assert_eq!(columns[0].position, 50_000);
    assert_eq!(columns[99].position, 50_099);
    // Reads start every 90 bases and span 150, so depth alternates 1 and 2.
    assert!(columns.iter().all(|c| (1..=2).contains(&c.depth())));
}
