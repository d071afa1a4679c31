//! Error types shared by every layer of the crate.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading, writing, indexing or piling up data.
#[derive(Error, Debug)]
pub enum BrixError {
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// Checksum or size mismatch in a compressed block.
    #[error("Corrupt block at offset {offset}: {reason}")]
    CorruptBlock { offset: u64, reason: String },

    /// Physical end of file in the middle of a block.
    #[error("Unexpected end of file at offset {offset}")]
    UnexpectedEof { offset: u64 },

    #[error("Unknown reference sequence: {0}")]
    UnknownReference(String),

    #[error("Invalid region '{region}': {reason}")]
    RegionParse { region: String, reason: String },

    #[error("Input {stream} is not sorted: {message}")]
    UnsortedInput { stream: usize, message: String },

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    #[error("No index found for {}", .0.display())]
    MissingIndex(PathBuf),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl BrixError {
    /// Process exit code reported by the command-line tool.
    ///
    /// Code 2 is left to clap for usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            BrixError::Io(_) => 1,
            BrixError::CorruptBlock { .. } => 3,
            BrixError::UnexpectedEof { .. } => 4,
            BrixError::MissingIndex(_) => 5,
            BrixError::UnsortedInput { .. } => 6,
            _ => 7,
        }
    }

    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        BrixError::CorruptBlock {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BrixError>;

/// Unwraps errors that crossed a `Read`/`BufRead` boundary so that block
/// corruption keeps its own variant.
impl From<io::Error> for BrixError {
    fn from(err: io::Error) -> Self {
        let wraps_ours = err
            .get_ref()
            .is_some_and(|inner| inner.is::<BrixError>());
        if !wraps_ours {
            return BrixError::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<BrixError>()) {
            Some(Ok(inner)) => *inner,
            _ => BrixError::Io(io::Error::other("unrecoverable wrapped error")),
        }
    }
}

impl From<BrixError> for io::Error {
    fn from(err: BrixError) -> Self {
        match err {
            BrixError::Io(e) => e,
            BrixError::UnexpectedEof { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            BrixError::Io(io::Error::new(io::ErrorKind::NotFound, "x")).exit_code(),
            BrixError::corrupt(0, "bad crc").exit_code(),
            BrixError::UnexpectedEof { offset: 10 }.exit_code(),
            BrixError::MissingIndex(PathBuf::from("a.sam.gz")).exit_code(),
            BrixError::UnsortedInput {
                stream: 0,
                message: String::new(),
            }
            .exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            assert_ne!(*a, 2);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_io_roundtrip_keeps_variant() {
        let io_err: io::Error = BrixError::corrupt(42, "bad crc").into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        let back = BrixError::from(io_err);
        assert!(matches!(back, BrixError::CorruptBlock { offset: 42, .. }));

        let plain = BrixError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(plain, BrixError::Io(_)));
    }

    #[test]
    fn test_display() {
        let err = BrixError::RegionParse {
            region: "chr1:x".to_string(),
            reason: "invalid start".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid region 'chr1:x': invalid start");
    }
}
