//! Core Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Per-picture failures (extraction, upload) never surface here: they are
//! logged and reported through [`Event`](crate::Event)s and picture state.

use derive_more::{Display, Error};

/// A core error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No site with this key is configured. A [`Core`](crate::Core) can't
    /// exist without a session, so this is fatal at construction.
    #[display("invalid active site: {_0}")]
    InvalidActiveSite(#[error(not(source))] String),
    /// An upload batch or an ingestion currently owns the picture set.
    #[display("an upload batch or ingestion is in progress")]
    BatchInProgress,
    /// The description template failed to compile or render.
    #[display("issue with description template")]
    Template,
    /// The configuration could not be turned into a [`Core`](crate::Core).
    #[display("invalid configuration")]
    Config,
    /// An external metadata file could not be read or parsed.
    #[display("external metadata unreadable")]
    ExternalMetadata,
    /// The external metadata has no column with this name.
    #[display("no such external metadata column: {_0}")]
    UnknownColumn(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BatchInProgress)
    }
}
