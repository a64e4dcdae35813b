//! Cache entry and download state.

use serde::{Deserialize, Serialize};

use crate::store::LocalHandle;

/// Download state of one stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DownloadState {
    #[default]
    NotDownloaded,
    Downloading,
    Downloaded,
    Failed,
}

/// Owner of a cached file (component plus its instance id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentLink {
    pub component: String,
    pub component_id: String,
}

/// What the filepool knows about one stored file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Canonical remote URL.
    pub remote_url: String,
    pub local: Option<LocalHandle>,
    pub state: DownloadState,
    /// Wall-clock seconds of the last completed download.
    #[serde(default)]
    pub downloaded_at: Option<u64>,
    /// Remote revision the local copy was fetched at.
    #[serde(default)]
    pub time_modified: u64,
    /// Set by invalidation; cleared by the next completed download.
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub links: Vec<ComponentLink>,
}

impl CacheEntry {
    pub fn new(remote_url: &str) -> Self {
        Self {
            remote_url: remote_url.to_string(),
            ..Self::default()
        }
    }

    /// Record an owner; no-op if already linked. Empty components are not links.
    pub fn add_link(&mut self, component: &str, component_id: &str) {
        if component.is_empty() {
            return;
        }
        let link = ComponentLink {
            component: component.to_string(),
            component_id: component_id.to_string(),
        };
        if let Err(pos) = self.links.binary_search(&link) {
            self.links.insert(pos, link);
        }
    }

    /// True if the local copy should be fetched again.
    ///
    /// `remote_time_modified` is the caller's revision hint (0 = unknown).
    pub fn is_outdated(&self, remote_time_modified: u64, now: u64, max_age_secs: Option<u64>) -> bool {
        if self.stale || remote_time_modified > self.time_modified {
            return true;
        }
        match (max_age_secs, self.downloaded_at) {
            (Some(max_age), Some(at)) => now.saturating_sub(at) > max_age,
            _ => false,
        }
    }
}
