//! Shared streaming utilities.
//!
//! This module provides the components every streaming pass uses:
//! - Zero-allocation SAM line splitting
//! - Inline sort validation
//! - Buffered text output
//! - Active set management for pileups
//!
//! Streaming passes keep O(k) memory where k = max records overlapping one
//! position.

pub mod active_set;
pub mod buffers;
pub mod output;
pub mod parsing;
pub mod validation;

pub use active_set::ActiveSet;
pub use output::TextWriter;
pub use parsing::{parse_u64_fast, should_skip_line, split_sam_line};
pub use validation::SortValidator;
