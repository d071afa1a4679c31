//! Buffer size constants for streaming operations.
//!
//! These constants control memory usage vs I/O throughput tradeoffs.

/// Default output buffer size (2 MB).
pub const DEFAULT_OUTPUT_BUFFER: usize = 2 * 1024 * 1024;

/// Default input buffer size (256 KB).
/// Large enough to hold several BGZF blocks.
pub const DEFAULT_INPUT_BUFFER: usize = 256 * 1024;

/// Default line buffer capacity (1 KB).
/// Sufficient for most short-read alignment lines.
pub const DEFAULT_LINE_BUFFER: usize = 1024;
