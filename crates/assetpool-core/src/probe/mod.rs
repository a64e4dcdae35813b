//! Token-path capability probing.
//!
//! Whether a site serves `tokenpluginfile.php` is checked with one network
//! request per site per session. Results are stored on the [`Site`]; a probe
//! that is still running is shared with every caller that arrives meanwhile.

mod connectivity;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;

use crate::error::ProbeError;
use crate::site::{Site, TokenPathSupport};
use crate::url_rewrite::{can_use_token_path, rewrite_with_dialect, UrlDialect};

pub use connectivity::{AlwaysOnline, Connectivity, SharedConnectivity};

/// Network reachability check for a fully rewritten URL.
///
/// `Ok(false)` means the server answered but the URL does not work;
/// `Err` means the question could not be answered (transport failure).
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn url_is_reachable(&self, url: &str) -> Result<bool, ProbeError>;
}

/// Decides, once per site, whether the token-path URL form works.
#[derive(Clone)]
pub struct CapabilityProber {
    reachability: Arc<dyn Reachability>,
    connectivity: Arc<dyn Connectivity>,
}

impl CapabilityProber {
    pub fn new(reachability: Arc<dyn Reachability>, connectivity: Arc<dyn Connectivity>) -> Self {
        Self {
            reachability,
            connectivity,
        }
    }

    pub fn connectivity(&self) -> &Arc<dyn Connectivity> {
        &self.connectivity
    }

    /// True if the token-path form can be used for `url` on `site`.
    ///
    /// URLs the token-path form cannot express answer `false` without any
    /// network traffic. While offline the answer is an optimistic `true`
    /// that is not remembered. A transport failure answers `false` for this
    /// call only and leaves the flag unknown.
    pub async fn probe(&self, url: &str, site: &Arc<Site>) -> bool {
        if !can_use_token_path(url, site.url(), site.access_key()) {
            return false;
        }

        let pending = {
            let mut state = site.capability_state();
            match state.support {
                TokenPathSupport::Supported => return true,
                TokenPathSupport::Unsupported => return false,
                TokenPathSupport::Unknown => {}
            }
            if let Some(pending) = &state.in_flight {
                tracing::debug!(site = %site.id(), "joining in-flight token-path probe");
                pending.clone()
            } else if !self.connectivity.is_online() {
                tracing::debug!(site = %site.id(), "offline; assuming token-path works without caching");
                return true;
            } else {
                let probe_url = rewrite_with_dialect(
                    url,
                    site.token(),
                    site.url(),
                    site.access_key(),
                    UrlDialect::TokenPath,
                );
                let pending = self.spawn_probe(Arc::clone(site), probe_url);
                state.in_flight = Some(pending.clone());
                pending
            }
        };

        pending.await
    }

    fn spawn_probe(&self, site: Arc<Site>, probe_url: String) -> crate::site::ProbeFuture {
        let reachability = Arc::clone(&self.reachability);
        let owner = Arc::clone(&site);
        tracing::debug!(site = %site.id(), url = %probe_url, "probing token-path support");
        let handle = tokio::spawn(async move {
            let outcome = reachability.url_is_reachable(&probe_url).await;
            let mut state = site.capability_state();
            state.in_flight = None;
            match outcome {
                Ok(works) => {
                    state.support = if works {
                        TokenPathSupport::Supported
                    } else {
                        TokenPathSupport::Unsupported
                    };
                    tracing::info!(site = %site.id(), supported = works, "token-path support settled");
                    works
                }
                Err(e) => {
                    tracing::warn!(site = %site.id(), "token-path probe failed, will retry: {}", e);
                    false
                }
            }
        });
        async move {
            match handle.await {
                Ok(works) => works,
                Err(e) => {
                    tracing::warn!(site = %owner.id(), "token-path probe task failed: {}", e);
                    owner.capability_state().in_flight = None;
                    false
                }
            }
        }
        .boxed()
        .shared()
    }
}
