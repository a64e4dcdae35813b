//! Error type for a single blocking fetch attempt.

use std::fmt;

use crate::error::DownloadError;

use super::classify::classify;

/// Error returned by one fetch attempt (curl failure, HTTP error, or storage failure).
/// Kept separate from [`DownloadError`] so the retry loop can classify the raw
/// curl error before it is flattened into a cloneable message.
#[derive(Debug)]
pub enum FetchError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// Writing the local file failed. Not retried.
    Storage(std::io::Error),
}

impl FetchError {
    /// Convert into the cloneable error handed to filepool callers.
    pub fn into_download_error(self, url: &str) -> DownloadError {
        let kind = classify(&self);
        match self {
            FetchError::Curl(e) => DownloadError::Transport {
                url: url.to_string(),
                kind,
                message: e.to_string(),
            },
            FetchError::Http(status) => DownloadError::Http {
                url: url.to_string(),
                status,
            },
            FetchError::Storage(e) => DownloadError::storage(url, e),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Curl(e) => write!(f, "{}", e),
            FetchError::Http(code) => write!(f, "HTTP {}", code),
            FetchError::Storage(e) => write!(f, "storage: {}", e),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Curl(e) => Some(e),
            FetchError::Storage(e) => Some(e),
            FetchError::Http(_) => None,
        }
    }
}
