//! Metadata Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A metadata extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file was read but is not an image container the reader understands,
    /// or its metadata segment is corrupt.
    #[display("unreadable image: {}", _0.display())]
    UnreadableImage(#[error(not(source))] PathBuf),
    /// The file could not be opened or read.
    #[display("I/O error reading {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A corrupt image stays corrupt, but the disk might come back.
        matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::UnreadableImage(PathBuf::from("a.jpg")).to_string(), "unreadable image: a.jpg");
        assert_eq!(ErrorKind::Io(PathBuf::from("b.jpg")).to_string(), "I/O error reading b.jpg");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(!ErrorKind::UnreadableImage(PathBuf::from("a.jpg")).is_retryable());
        assert!(ErrorKind::Io(PathBuf::from("a.jpg")).is_retryable());
    }
}
