//! HTTP transport on libcurl: reachability checks and file downloads.
//!
//! Curl calls block, so the async entry points run them on the blocking pool.

mod get;
mod head;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::AssetPoolConfig;
use crate::error::ProbeError;
use crate::probe::Reachability;
use crate::retry::RetryPolicy;

pub use get::{download_to_path, download_with_retry, temp_path};
pub use head::url_works;

/// Timeouts and retry policy for curl transfers.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    pub transfer_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&AssetPoolConfig::default())
    }
}

impl FetchOptions {
    pub fn from_config(cfg: &AssetPoolConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs.max(1)),
            transfer_timeout: Duration::from_secs(cfg.transfer_timeout_secs.max(1)),
            retry: RetryPolicy::from_config(&cfg.retry_or_default()),
        }
    }
}

/// [`Reachability`] backed by a curl HEAD (or ranged GET) request.
#[derive(Debug, Clone, Default)]
pub struct CurlReachability {
    opts: FetchOptions,
}

impl CurlReachability {
    pub fn new(opts: FetchOptions) -> Self {
        Self { opts }
    }
}

#[async_trait]
impl Reachability for CurlReachability {
    async fn url_is_reachable(&self, url: &str) -> Result<bool, ProbeError> {
        let owned = url.to_string();
        let timeout = self.opts.connect_timeout;
        let outcome = tokio::task::spawn_blocking(move || url_works(&owned, timeout))
            .await
            .map_err(|e| ProbeError {
                url: url.to_string(),
                message: format!("probe task join: {e}"),
            })?;
        outcome.map_err(|e| ProbeError {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
