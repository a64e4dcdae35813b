//! Error types shared by the prober, the file store and the filepool.
//!
//! Everything here is recoverable: a failed probe leaves the site capability
//! unknown, a failed download only fails the resolution that was waiting on
//! it. Download and resolve errors are `Clone` because a single failure is
//! handed to every caller joined on the same in-flight future.

use crate::retry::ErrorKind;

/// Transport failure while checking whether the token-path endpoint works.
#[derive(Debug, Clone, thiserror::Error)]
#[error("capability probe failed for {url}: {message}")]
pub struct ProbeError {
    pub url: String,
    pub message: String,
}

/// Failure while fetching a remote asset into the local store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DownloadError {
    /// Network-level failure (DNS, connect, timeout, reset).
    #[error("transport error for {url}: {message}")]
    Transport {
        url: String,
        kind: ErrorKind,
        message: String,
    },
    /// Server answered with a non-2xx status.
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u32 },
    /// Writing the local copy failed (disk full, permissions, rename).
    #[error("storage error for {url}: {message}")]
    Storage { url: String, message: String },
}

impl DownloadError {
    pub fn storage(url: &str, err: impl std::fmt::Display) -> Self {
        DownloadError::Storage {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    /// URL the failed download was for.
    pub fn url(&self) -> &str {
        match self {
            DownloadError::Transport { url, .. }
            | DownloadError::Http { url, .. }
            | DownloadError::Storage { url, .. } => url,
        }
    }
}

/// Error returned by the filepool to the caller of a resolution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("site not found: {0}")]
    SiteNotFound(String),
    #[error(transparent)]
    Download(#[from] DownloadError),
    /// The spawned resolution or download task did not run to completion.
    #[error("resolution task failed: {0}")]
    TaskFailed(String),
}
