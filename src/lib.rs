// Clippy allows for the whole crate
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

//! BRIX: Blocked Region Index eXplorer
//!
//! Random access into large coordinate-sorted alignment files and columnar
//! pileups over them.
//!
//! # Features
//!
//! - **BGZF**: blocked gzip with virtual offsets, optional worker-pool
//!   compression and read-ahead
//! - **Binning indexes**: BAI and CSI building, loading and querying
//! - **Region queries**: iterators that seek only the chunks a region needs
//! - **Pileups**: streaming per-position columns, single or multi-sample
//! - **Lockstep reading**: several sorted files walked position by position
//!
//! # Example
//!
//! ```rust,no_run
//! use brix::config::ReaderConfig;
//! use brix::query::IndexedReader;
//!
//! let mut reader = IndexedReader::open("reads.sam.gz", &ReaderConfig::default()).unwrap();
//! for record in reader.query_str("chr1:10000-20000").unwrap() {
//!     let record = record.unwrap();
//!     println!("{} {}", record.name, record.start);
//! }
//! ```

pub mod bgzf;
pub mod commands;
pub mod config;
pub mod error;
pub mod genome;
pub mod index;
pub mod parallel;
pub mod pileup;
pub mod query;
pub mod record;
pub mod region;
pub mod streaming;
pub mod sync;

// Re-export commonly used types
pub use bgzf::{BgzfReader, BgzfWriter, VirtualOffset};
pub use error::{BrixError, Result};
pub use genome::Genome;
pub use index::{BinningIndex, BinningScheme, Chunk};
pub use pileup::{PileupAssembler, PileupColumn, PileupEntry};
pub use query::{IndexedReader, RegionQueryIterator};
pub use record::{AlignmentRecord, Locatable};
pub use region::Region;
pub use sync::MultiFileSyncReader;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bgzf::{BgzfReader, BgzfWriter, VirtualOffset};
    pub use crate::config::{IndexConfig, PileupConfig, ReaderConfig, WriterConfig};
    pub use crate::error::{BrixError, Result};
    pub use crate::index::{BinningIndex, IndexBuilder};
    pub use crate::pileup::{MultiPileup, PileupAssembler, PileupColumn};
    pub use crate::query::{IndexedReader, RegionQueryIterator};
    pub use crate::record::{AlignmentRecord, Locatable, SamReader};
    pub use crate::region::Region;
    pub use crate::sync::MultiFileSyncReader;
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_basic_workflow() {
        let mut writer = BgzfWriter::new(Vec::new());
        writer
            .write_all(b"@SQ\tSN:chr1\tLN:1000\nr1\t0\tchr1\t11\t60\t5M\t*\t0\t0\tACGTA\tIIIII\n")
            .unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = SamReader::new(BgzfReader::new(Cursor::new(bytes))).unwrap();
        let records: Vec<AlignmentRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].start, 10);
        assert_eq!(records[0].end(), 15);

        let columns: Vec<PileupColumn> =
            PileupAssembler::new(records.into_iter().map(Ok), &PileupConfig::default())
                .collect::<Result<_>>()
                .unwrap();
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[0].position, 10);
    }
}
