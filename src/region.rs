//! Query regions.
//!
//! Text regions use the familiar 1-based inclusive notation
//! (`chr1:1,000-2,000`) and are converted to 0-based half-open coordinates
//! resolved against a [`Genome`].

use std::fmt;

use crate::error::{BrixError, Result};
use crate::genome::Genome;
use crate::record::Locatable;

/// A resolved genomic interval `[start, end)` on one reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    pub name: String,
    pub reference_id: usize,
    pub start: u64,
    pub end: u64,
}

impl Region {
    /// Build a region from 0-based half-open coordinates.
    pub fn new(genome: &Genome, name: &str, start: u64, end: u64) -> Result<Self> {
        let reference_id = genome.require_id(name)?;
        Ok(Self {
            name: name.to_string(),
            reference_id,
            start,
            end,
        })
    }

    /// Region covering a whole reference.
    pub fn whole(genome: &Genome, name: &str) -> Result<Self> {
        let reference_id = genome.require_id(name)?;
        Ok(Self {
            name: name.to_string(),
            reference_id,
            start: 0,
            end: reference_end(genome, reference_id),
        })
    }

    /// Parse `name`, `name:start` or `name:start-end`.
    ///
    /// A string that is itself a reference name always wins, so names
    /// containing `:` still work.
    pub fn parse(text: &str, genome: &Genome) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(parse_error(text, "empty region"));
        }
        if genome.id(text).is_some() {
            return Self::whole(genome, text);
        }

        let Some((name, range)) = text.rsplit_once(':') else {
            return Err(BrixError::UnknownReference(text.to_string()));
        };
        let reference_id = genome
            .id(name)
            .ok_or_else(|| BrixError::UnknownReference(name.to_string()))?;
        let reference_end = reference_end(genome, reference_id);

        let (first, last) = match range.split_once('-') {
            Some((first, last)) => (first, Some(last)),
            None => (range, None),
        };

        let start = if first.is_empty() {
            1
        } else {
            parse_position(first).ok_or_else(|| parse_error(text, "invalid start"))?
        };
        if start == 0 {
            return Err(parse_error(text, "positions are 1-based"));
        }
        let end = match last {
            Some(last) if !last.is_empty() => {
                parse_position(last).ok_or_else(|| parse_error(text, "invalid end"))?
            }
            _ => reference_end,
        };
        if end < start {
            return Err(parse_error(text, "end precedes start"));
        }

        Ok(Self {
            name: name.to_string(),
            reference_id,
            start: start - 1,
            end,
        })
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Whether a placed record intersects this region. An empty region
    /// intersects nothing.
    #[inline]
    pub fn overlaps<L: Locatable>(&self, record: &L) -> bool {
        !self.is_empty()
            && record.reference_id() == Some(self.reference_id)
            && record.start() < self.end
            && self.start < record.end()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.name, self.start + 1, self.end)
    }
}

/// End of a reference, or unbounded when its length is unknown.
fn reference_end(genome: &Genome, id: usize) -> u64 {
    genome
        .length(id)
        .filter(|&len| len > 0)
        .unwrap_or(u64::MAX)
}

fn parse_position(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(|&c| c != ',').collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn parse_error(region: &str, reason: &str) -> BrixError {
    BrixError::RegionParse {
        region: region.to_string(),
        reason: reason.to_string(),
    }
}
