//! Sort validation for streaming operations.
//!
//! Streaming algorithms require coordinate-sorted input: reference ids in
//! header order, non-decreasing positions within a reference, and unplaced
//! records last. Validation happens inline as records are consumed so that
//! inputs are never read twice.

use crate::error::{BrixError, Result};
use crate::record::Locatable;

/// Inline sort validator for use within streaming loops.
#[derive(Debug, Default)]
pub struct SortValidator {
    stream: usize,
    prev: Option<(usize, u64)>,
    record_count: usize,
}

impl SortValidator {
    /// Create a validator for the input numbered `stream` (used in errors).
    pub fn new(stream: usize) -> Self {
        Self {
            stream,
            ..Default::default()
        }
    }

    /// Validate the next sort key `(reference_id, start)`.
    #[inline]
    pub fn validate(&mut self, reference_id: usize, start: u64) -> Result<()> {
        self.record_count += 1;

        if let Some((prev_ref, prev_start)) = self.prev {
            if reference_id < prev_ref {
                return Err(BrixError::UnsortedInput {
                    stream: self.stream,
                    message: format!(
                        "reference #{} at record {} comes after reference #{}",
                        reference_id, self.record_count, prev_ref
                    ),
                });
            }
            if reference_id == prev_ref && start < prev_start {
                return Err(BrixError::UnsortedInput {
                    stream: self.stream,
                    message: format!(
                        "position {} at record {} comes after {} on reference #{}",
                        start, self.record_count, prev_start, reference_id
                    ),
                });
            }
        }

        self.prev = Some((reference_id, start));
        Ok(())
    }

    /// Validate a record. Unplaced records only need to come last; their
    /// positions are not compared.
    #[inline]
    pub fn validate_record<L: Locatable>(&mut self, record: &L) -> Result<()> {
        match record.reference_id() {
            Some(id) => self.validate(id, record.start()),
            None => self.validate(usize::MAX, 0),
        }
    }

    /// Reset validator state (for a new input).
    pub fn reset(&mut self) {
        self.prev = None;
        self.record_count = 0;
    }

    /// Get the number of records validated.
    pub fn record_count(&self) -> usize {
        self.record_count
    }
}
