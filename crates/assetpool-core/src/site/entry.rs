//! A logged-in site and its token-path capability flag.

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};

use crate::probe::CapabilityProber;
use crate::url_rewrite::{self, UrlDialect};

/// Observed support for the token-path (`tokenpluginfile.php`) endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TokenPathSupport {
    /// Not probed yet (or the last probe failed in transit).
    #[default]
    Unknown,
    Supported,
    Unsupported,
}

impl TokenPathSupport {
    /// Dialect to rewrite with. Unknown keeps the token-path form.
    pub fn dialect(self) -> UrlDialect {
        match self {
            TokenPathSupport::Unsupported => UrlDialect::Legacy,
            TokenPathSupport::Unknown | TokenPathSupport::Supported => UrlDialect::TokenPath,
        }
    }
}

/// Login data needed to build a [`Site`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub id: String,
    pub url: String,
    pub token: String,
    /// Per-user private access key enabling the token-path form.
    #[serde(default)]
    pub access_key: Option<String>,
}

pub(crate) type ProbeFuture = Shared<BoxFuture<'static, bool>>;

/// Capability flag plus the probe currently running for it, if any.
#[derive(Default)]
pub(crate) struct CapabilityState {
    pub(crate) support: TokenPathSupport,
    pub(crate) in_flight: Option<ProbeFuture>,
}

/// A site the user is logged into. Lives from login to logout.
///
/// The capability flag is written only by [`CapabilityProber`]; everything
/// else reads it through [`Site::token_path_support`].
pub struct Site {
    info: SiteInfo,
    capability: Mutex<CapabilityState>,
}

impl std::fmt::Debug for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site")
            .field("id", &self.info.id)
            .field("url", &self.info.url)
            .field("token_path", &self.token_path_support())
            .finish()
    }
}

impl Site {
    pub fn new(info: SiteInfo) -> Self {
        Self {
            info,
            capability: Mutex::new(CapabilityState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn url(&self) -> &str {
        &self.info.url
    }

    pub fn token(&self) -> &str {
        &self.info.token
    }

    pub fn access_key(&self) -> Option<&str> {
        self.info.access_key.as_deref()
    }

    pub fn info(&self) -> &SiteInfo {
        &self.info
    }

    pub fn token_path_support(&self) -> TokenPathSupport {
        self.capability_state().support
    }

    pub(crate) fn capability_state(&self) -> MutexGuard<'_, CapabilityState> {
        // A poisoned lock only means a panic elsewhere; the flag itself is always valid.
        self.capability.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True if `url` is one of this site's `pluginfile.php` URLs.
    pub fn is_site_plugin_file_url(&self, url: &str) -> bool {
        url_rewrite::is_site_plugin_file_url(url, self.url())
    }

    /// Rewrite `url` with the dialect the current capability flag allows.
    pub fn fix_url(&self, url: &str) -> String {
        self.fix_url_with(url, self.token_path_support().dialect())
    }

    pub fn fix_url_with(&self, url: &str, dialect: UrlDialect) -> String {
        url_rewrite::rewrite_with_dialect(url, self.token(), self.url(), self.access_key(), dialect)
    }

    /// Probe token-path support for `url` (at most once per session), then
    /// rewrite it with the dialect the probe allows.
    pub async fn check_and_fix_url(self: &Arc<Self>, url: &str, prober: &CapabilityProber) -> String {
        let works = prober.probe(url, self).await;
        let dialect = if works {
            UrlDialect::TokenPath
        } else {
            UrlDialect::Legacy
        };
        self.fix_url_with(url, dialect)
    }
}
