//! Command implementations behind the `brix` binary.

pub mod check;
pub mod compress;
pub mod decompress;
pub mod index;
pub mod pileup;
pub mod sync;
pub mod view;

pub use check::{CheckCommand, CheckReport, CheckStatus};
pub use compress::{CompressCommand, CompressStats};
pub use decompress::{DecompressCommand, DecompressStats};
pub use index::{IndexCommand, IndexStats};
pub use pileup::{PileupCommand, PileupRunStats};
pub use sync::{SyncCommand, SyncStats};
pub use view::{ViewCommand, ViewStats};

use std::path::Path;

use crate::bgzf;
use crate::config::ReaderConfig;
use crate::error::{BrixError, Result};
use crate::genome::Genome;
use crate::query::IndexedReader;
use crate::record::{AlignmentRecord, SamReader};
use crate::region::Region;

/// Type-erased record stream, so indexed and sequential inputs mix.
pub(crate) type RecordIter = Box<dyn Iterator<Item = Result<AlignmentRecord>>>;

/// An opened input: its dictionary, its records and the parsed region.
pub(crate) struct OpenedInput {
    pub genome: Genome,
    pub records: RecordIter,
    pub region: Option<Region>,
}

/// Open `path` as a record stream, through its index when `region` is set.
pub(crate) fn open_records(
    path: &Path,
    region: Option<&str>,
    config: &ReaderConfig,
) -> Result<OpenedInput> {
    match region {
        None => {
            let reader = SamReader::new(bgzf::open_sequential(path, config)?)?;
            let genome = reader.genome().clone();
            Ok(OpenedInput {
                genome,
                records: Box::new(reader.into_records()),
                region: None,
            })
        }
        Some(text) => {
            let reader = IndexedReader::open(path, config)?;
            let genome = reader.genome().clone();
            let region = Region::parse(text, &genome)?;
            let records = reader.into_query(&region)?;
            Ok(OpenedInput {
                genome,
                records: Box::new(records),
                region: Some(region),
            })
        }
    }
}

/// Open every path, requiring one shared reference dictionary.
pub(crate) fn open_all<P: AsRef<Path>>(
    paths: &[P],
    region: Option<&str>,
    config: &ReaderConfig,
) -> Result<(Genome, Vec<RecordIter>, Option<Region>)> {
    let mut genome: Option<Genome> = None;
    let mut streams = Vec::with_capacity(paths.len());
    let mut parsed = None;

    for path in paths {
        let path = path.as_ref();
        let input = open_records(path, region, config)?;
        match &genome {
            Some(first) if *first != input.genome => {
                return Err(BrixError::InvalidArgument(format!(
                    "{} has a different reference dictionary than the first input",
                    path.display()
                )));
            }
            Some(_) => {}
            None => genome = Some(input.genome),
        }
        streams.push(input.records);
        parsed = parsed.or(input.region);
    }

    let genome = genome
        .ok_or_else(|| BrixError::InvalidArgument("no input files given".to_string()))?;
    Ok((genome, streams, parsed))
}
