//! Configuration Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist.
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The merged configuration could not be parsed into [`Config`](crate::Config).
    #[display("configuration could not be loaded")]
    Load,
    /// The worker pool needs at least one worker.
    #[display("invalid worker count: {_0}")]
    InvalidWorkers(#[error(not(source))] usize),
    /// No active site is configured, or it names a site that doesn't exist.
    #[display("invalid active site: {_0}")]
    InvalidActiveSite(#[error(not(source))] String),
    /// The template file referenced by the configuration could not be read.
    #[display("template file unreadable: {}", _0.display())]
    TemplateUnreadable(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
