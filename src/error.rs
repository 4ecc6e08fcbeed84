//! Error types for repository acquisition.
//!
//! Errors are grouped by cause rather than by libgit2 error code, so callers
//! can tell retryable conditions (network, transient I/O) apart from the ones
//! that will fail the same way every time (bad URL, occupied destination).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("invalid source `{url}`: {reason}")]
    InvalidSource { url: String, reason: String },

    #[error("destination {path:?} is not available: {reason}")]
    DestinationConflict { path: PathBuf, reason: String },

    #[error("network failure while cloning `{url}`: {message}")]
    NetworkFailure {
        url: String,
        timed_out: bool,
        message: String,
    },

    #[error("`{url}` requires credentials that were not supplied or were rejected")]
    AuthenticationRequired { url: String },

    #[error("filesystem failure at {path:?}: {source}")]
    FilesystemFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("repository at {path:?} no longer exists or is not a valid repository")]
    HandleInvalidated { path: PathBuf },
}

impl AcquireError {
    pub(crate) fn invalid_source(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn conflict(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DestinationConflict {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FilesystemFailure {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same call could plausibly succeed.
    ///
    /// `NetworkFailure` always qualifies. `FilesystemFailure` only does for
    /// I/O kinds that describe a transient condition.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkFailure { .. } => true,
            Self::FilesystemFailure { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// True for a `NetworkFailure` caused by the clone timeout expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::NetworkFailure { timed_out: true, .. })
    }
}

pub type Result<T, E = AcquireError> = std::result::Result<T, E>;
