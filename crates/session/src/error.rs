//! Session Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A session error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote site refused the operation because there is no
    /// authenticated session. Logging in again might help.
    #[display("not logged in: {_0}")]
    NotLoggedIn(#[error(not(source))] String),
    /// Credentials were rejected, or the login request itself failed.
    #[display("login failed")]
    FailedLogin,
    /// The remote site rejected the upload.
    #[display("upload failed")]
    FailedUpload,
    /// Closing the session failed; the remote side may still consider it open.
    #[display("logout failed")]
    FailedLogout,
    /// Reading the local file or talking to the remote site failed.
    #[display("I/O error")]
    Io,
    /// The transfer was cancelled before it finished.
    #[display("transfer cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotLoggedIn(_) | Self::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::NotLoggedIn("session expired".to_string()).to_string(), "not logged in: session expired");
        assert_eq!(ErrorKind::FailedUpload.to_string(), "upload failed");
        assert_eq!(ErrorKind::FailedLogout.to_string(), "logout failed");
        assert_eq!(ErrorKind::Cancelled.to_string(), "transfer cancelled");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::NotLoggedIn(String::new()).is_retryable());
        assert!(ErrorKind::Io.is_retryable());
        assert!(!ErrorKind::FailedLogin.is_retryable());
        assert!(!ErrorKind::FailedUpload.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }
}
