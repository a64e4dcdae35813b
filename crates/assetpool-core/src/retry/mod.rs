//! Retry and backoff policy for asset downloads.
//!
//! Classifies curl errors and HTTP statuses into coarse kinds and decides
//! whether a failed fetch is worth another attempt, so the blocking download
//! path and the filepool agree on what counts as transient.

mod classify;
mod error;
mod policy;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::FetchError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
