//! BRIX: Blocked Region Index eXplorer
//!
//! Usage: brix <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use log::{warn, LevelFilter};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use brix::commands::{
    CheckCommand, CheckStatus, CompressCommand, DecompressCommand, IndexCommand, PileupCommand,
    SyncCommand, ViewCommand,
};
use brix::config::{IndexConfig, PileupConfig, ReaderConfig, WriterConfig};
use brix::error::{BrixError, Result};
use brix::parallel::WorkerPool;
use brix::record::AlignmentFlags;
use brix::streaming::buffers::{DEFAULT_INPUT_BUFFER, DEFAULT_OUTPUT_BUFFER};

#[derive(Parser)]
#[command(name = "brix")]
#[command(author = "Manish Kumar Bobbili")]
#[command(version)]
#[command(about = "BRIX: Blocked Region Index eXplorer - BGZF storage, binning indexes and pileups", long_about = None)]
struct Cli {
    /// Number of threads for block compression and index building
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    /// More log output (repeat for more)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file (or stdin) into BGZF
    Compress {
        /// Input file (use - for stdin)
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compression level, 0-9
        #[arg(short, long, default_value_t = brix::config::DEFAULT_COMPRESSION_LEVEL)]
        level: u32,

        /// Uncompressed bytes per block
        #[arg(short, long, default_value_t = brix::bgzf::MAX_DATA_SIZE)]
        block_size: usize,

        /// Print statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Decompress a BGZF or gzip file (or stdin)
    Decompress {
        /// Input file (use - for stdin)
        input: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Verify every block of a BGZF file
    Check {
        /// Input BGZF file (use - for stdin)
        input: Option<PathBuf>,
    },

    /// Build an index for a sorted, BGZF-compressed SAM file
    Index {
        /// Input file
        input: PathBuf,

        /// Write a CSI index instead of BAI
        #[arg(short = 'c', long)]
        csi: bool,

        /// log2 of the smallest bin for CSI (implies --csi)
        #[arg(short = 'm', long)]
        min_shift: Option<u32>,

        /// Levels below the root bin for CSI
        #[arg(long)]
        depth: Option<u32>,

        /// Index file (default: <input>.bai or <input>.csi)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Print records, optionally limited to regions
    View {
        /// Input SAM file (BGZF and indexed when regions are given)
        input: PathBuf,

        /// Regions such as chr1, chr1:1000-2000 or * for unplaced records
        regions: Vec<String>,

        /// Print only the number of records
        #[arg(short = 'c', long)]
        count: bool,

        /// Include the header
        #[arg(short = 'H', long)]
        header: bool,

        /// Print statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Per-position pileup of one or more sorted files
    Pileup {
        /// Input SAM files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Restrict to a region (needs an index per input)
        #[arg(short, long)]
        region: Option<String>,

        /// Maximum reads per position
        #[arg(short = 'd', long, default_value_t = brix::config::DEFAULT_MAX_DEPTH)]
        max_depth: usize,

        /// Mark the second read of overlapping mate pairs
        #[arg(long)]
        overlaps: bool,

        /// Skip reads below this mapping quality
        #[arg(short = 'm', long, default_value_t = 0)]
        min_mapq: u8,

        /// Skip reads with any of these flag bits (unmapped is always skipped)
        #[arg(long, default_value_t = 0)]
        skip_flags: u16,

        /// Print statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Walk several sorted files in lockstep
    Sync {
        /// Input SAM files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Restrict to a region (needs an index per input)
        #[arg(short, long)]
        region: Option<String>,

        /// Print statistics to stderr
        #[arg(long)]
        stats: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let pool = match setup_threads(cli.threads) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    };

    let result = match cli.command {
        Commands::Compress {
            input,
            output,
            level,
            block_size,
            stats,
        } => run_compress(input, output, level, block_size, stats, pool),

        Commands::Decompress {
            input,
            output,
            stats,
        } => run_decompress(input, output, stats, pool),

        Commands::Check { input } => run_check(input, pool),

        Commands::Index {
            input,
            csi,
            min_shift,
            depth,
            output,
            stats,
        } => run_index(input, csi, min_shift, depth, output, stats, pool),

        Commands::View {
            input,
            regions,
            count,
            header,
            stats,
        } => run_view(input, regions, count, header, stats, pool),

        Commands::Pileup {
            inputs,
            region,
            max_depth,
            overlaps,
            min_mapq,
            skip_flags,
            stats,
        } => {
            let config = PileupConfig::new()
                .with_max_depth(max_depth)
                .with_overlap_detection(overlaps)
                .with_min_mapq(min_mapq)
                .with_skip_flags(AlignmentFlags::from_bits(skip_flags));
            run_pileup(inputs, region, config, stats, pool)
        }

        Commands::Sync {
            inputs,
            region,
            stats,
        } => run_sync(inputs, region, stats, pool),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

/// `-q` keeps errors only; each `-v` raises the level. `RUST_LOG` wins.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

/// Size rayon and create the codec worker pool. One thread means inline
/// compression without a pool.
fn setup_threads(threads: Option<usize>) -> Result<Option<Arc<WorkerPool>>> {
    let Some(n) = threads else {
        return Ok(None);
    };
    if n == 0 {
        return Err(BrixError::InvalidArgument(
            "--threads must be at least 1".to_string(),
        ));
    }
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(n).build_global() {
        warn!("could not size the rayon pool: {}", e);
    }
    if n == 1 {
        return Ok(None);
    }
    Ok(Some(Arc::new(WorkerPool::new(n, n * 2)?)))
}

fn reader_config(pool: Option<Arc<WorkerPool>>) -> ReaderConfig {
    match pool {
        Some(pool) => ReaderConfig::new().with_pool(pool),
        None => ReaderConfig::new(),
    }
}

/// `None` or `-` selects stdin.
fn open_input(path: Option<PathBuf>) -> Result<Box<dyn Read>> {
    match path.filter(|p| p.as_os_str() != "-") {
        Some(p) => Ok(Box::new(File::open(p)?)),
        None => Ok(Box::new(io::stdin().lock())),
    }
}

/// `None` or `-` selects stdout.
fn open_output(path: Option<PathBuf>) -> Result<Box<dyn Write>> {
    match path.filter(|p| p.as_os_str() != "-") {
        Some(p) => Ok(Box::new(File::create(p)?)),
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn run_compress(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    level: u32,
    block_size: usize,
    stats: bool,
    pool: Option<Arc<WorkerPool>>,
) -> Result<()> {
    let mut config = WriterConfig::new()
        .with_level(level)
        .with_block_size(block_size);
    if let Some(pool) = pool {
        config = config.with_pool(pool);
    }
    let cmd = CompressCommand { config };

    let mut reader = BufReader::with_capacity(DEFAULT_INPUT_BUFFER, open_input(input)?);
    let result = cmd.run(&mut reader, open_output(output)?)?;
    if stats {
        eprintln!("Compress stats: {}", result);
    }
    Ok(())
}

fn run_decompress(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    stats: bool,
    pool: Option<Arc<WorkerPool>>,
) -> Result<()> {
    let cmd = DecompressCommand {
        config: reader_config(pool),
    };
    let reader = BufReader::with_capacity(DEFAULT_INPUT_BUFFER, open_input(input)?);
    let writer = io::BufWriter::with_capacity(DEFAULT_OUTPUT_BUFFER, open_output(output)?);
    let result = cmd.run(reader, writer)?;
    if stats {
        eprintln!("Decompress stats: {}", result);
    }
    Ok(())
}

fn run_check(input: Option<PathBuf>, pool: Option<Arc<WorkerPool>>) -> Result<()> {
    let reader = BufReader::with_capacity(DEFAULT_INPUT_BUFFER, open_input(input)?);
    let report = CheckCommand::new()
        .with_config(reader_config(pool))
        .run(reader)?;
    println!("{}", report);
    match report.status {
        CheckStatus::Clean => Ok(()),
        CheckStatus::Truncated => Err(BrixError::UnexpectedEof {
            offset: report.compressed_bytes,
        }),
    }
}

fn run_index(
    input: PathBuf,
    csi: bool,
    min_shift: Option<u32>,
    depth: Option<u32>,
    output: Option<PathBuf>,
    stats: bool,
    pool: Option<Arc<WorkerPool>>,
) -> Result<()> {
    let mut config = if csi || min_shift.is_some() || depth.is_some() {
        IndexConfig::csi(min_shift.unwrap_or(brix::index::binning::BAI_MIN_SHIFT))
    } else {
        IndexConfig::bai()
    };
    if let Some(depth) = depth {
        config = config.with_depth(depth);
    }

    let mut cmd = IndexCommand::new()
        .with_config(config)
        .with_reader_config(reader_config(pool));
    if let Some(output) = output {
        cmd = cmd.with_output(output);
    }
    let result = cmd.run(&input)?;
    if stats {
        eprintln!("Index stats: {}", result);
    }
    Ok(())
}

fn run_view(
    input: PathBuf,
    regions: Vec<String>,
    count: bool,
    header: bool,
    stats: bool,
    pool: Option<Arc<WorkerPool>>,
) -> Result<()> {
    let cmd = ViewCommand::new()
        .with_regions(regions)
        .with_count(count)
        .with_header(header)
        .with_config(reader_config(pool));

    let stdout = io::stdout();
    let result = cmd.run(&input, stdout.lock())?;
    if stats {
        eprintln!("View stats: {}", result);
    }
    Ok(())
}

fn run_pileup(
    inputs: Vec<PathBuf>,
    region: Option<String>,
    config: PileupConfig,
    stats: bool,
    pool: Option<Arc<WorkerPool>>,
) -> Result<()> {
    let cmd = PileupCommand::new()
        .with_config(config)
        .with_region(region)
        .with_reader_config(reader_config(pool));

    let stdout = io::stdout();
    let result = cmd.run(&inputs, stdout.lock())?;
    if stats {
        eprintln!("Pileup stats: {}", result);
    }
    Ok(())
}

fn run_sync(
    inputs: Vec<PathBuf>,
    region: Option<String>,
    stats: bool,
    pool: Option<Arc<WorkerPool>>,
) -> Result<()> {
    let cmd = SyncCommand::new()
        .with_region(region)
        .with_reader_config(reader_config(pool));

    let stdout = io::stdout();
    let result = cmd.run(&inputs, stdout.lock())?;
    if stats {
        eprintln!("Sync stats: {}", result);
    }
    Ok(())
}

