//! Resolution coordinator.
//!
//! Turns a remote asset URL plus its owner into a URL the renderer can use:
//! the local copy when there is one, otherwise the rewritten remote URL.
//! Downloads are started per policy (eager, cheap by size, or background).
//!
//! Concurrent resolutions of one [`ResourceKey`] share a single pending task,
//! and concurrent downloads of one stored file share a single download, no
//! matter which resolution started it. Both maps drop an entry as soon as its
//! task settles, so a failure is never cached.

mod entry;
mod inflight;
mod key;
mod policy;
mod table;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use tokio::sync::broadcast;

use crate::config::AssetPoolConfig;
use crate::error::ResolveError;
use crate::probe::CapabilityProber;
use crate::site::{Site, SiteRegistry};
use crate::store::{FileKey, FileStore, LocalHandle};

use inflight::InFlight;
use policy::{plan, Demand, Plan};

pub use entry::{CacheEntry, ComponentLink, DownloadState};
pub use key::ResourceKey;
pub use table::CacheTable;

const EVENT_CAPACITY: usize = 64;

/// Download state change of one stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub key: FileKey,
    pub state: DownloadState,
    pub error: Option<String>,
}

/// One resolution: the asset, its owner and what the caller knows about it.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub site_id: String,
    pub url: String,
    pub component: String,
    pub component_id: String,
    /// Download before answering even when the size is unknown or large.
    pub eager: bool,
    /// Size hint; at or below the download threshold the file is fetched eagerly.
    pub file_size: Option<u64>,
    /// Remote revision hint; newer than the cached copy makes it outdated.
    pub time_modified: u64,
}

impl ResolveRequest {
    pub fn new(site_id: &str, url: &str) -> Self {
        Self {
            site_id: site_id.to_string(),
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn owner(mut self, component: &str, component_id: &str) -> Self {
        self.component = component.to_string();
        self.component_id = component_id.to_string();
        self
    }

    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    pub fn file_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }

    pub fn time_modified(mut self, time_modified: u64) -> Self {
        self.time_modified = time_modified;
        self
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.site_id, &self.url, &self.component, &self.component_id)
    }
}

/// Tunables taken from [`AssetPoolConfig`].
#[derive(Debug, Clone)]
struct PoolSettings {
    download_threshold_bytes: u64,
    max_age_secs: Option<u64>,
}

struct Inner {
    registry: Arc<SiteRegistry>,
    prober: CapabilityProber,
    store: Arc<dyn FileStore>,
    settings: PoolSettings,
    table: Mutex<CacheTable>,
    resolutions: InFlight<ResourceKey, String>,
    downloads: InFlight<FileKey, LocalHandle>,
    events: broadcast::Sender<FileEvent>,
}

/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Filepool {
    inner: Arc<Inner>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Filepool {
    pub fn new(
        registry: Arc<SiteRegistry>,
        prober: CapabilityProber,
        store: Arc<dyn FileStore>,
        config: &AssetPoolConfig,
    ) -> Self {
        Self::with_table(registry, prober, store, config, CacheTable::new())
    }

    /// Like [`new`](Self::new), starting from a previously saved table.
    pub fn with_table(
        registry: Arc<SiteRegistry>,
        prober: CapabilityProber,
        store: Arc<dyn FileStore>,
        config: &AssetPoolConfig,
        mut table: CacheTable,
    ) -> Self {
        table.settle_interrupted();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                registry,
                prober,
                store,
                settings: PoolSettings {
                    download_threshold_bytes: config.download_threshold_bytes,
                    max_age_secs: config.max_age_secs,
                },
                table: Mutex::new(table),
                resolutions: InFlight::new(),
                downloads: InFlight::new(),
                events,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<SiteRegistry> {
        &self.inner.registry
    }

    pub fn prober(&self) -> &CapabilityProber {
        &self.inner.prober
    }

    fn table(&self) -> MutexGuard<'_, CacheTable> {
        self.inner.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn site(&self, site_id: &str) -> Result<Arc<Site>, ResolveError> {
        self.inner
            .registry
            .get_site(site_id)
            .ok_or_else(|| ResolveError::SiteNotFound(site_id.to_string()))
    }

    /// Resolve `url` for the given owner. See [`resolve_request`](Self::resolve_request).
    pub async fn resolve(
        &self,
        site_id: &str,
        url: &str,
        component: &str,
        component_id: &str,
        eager: bool,
    ) -> Result<String, ResolveError> {
        let req = ResolveRequest::new(site_id, url)
            .owner(component, component_id)
            .eager(eager);
        self.resolve_request(req).await
    }

    /// URL to render for the requested asset.
    ///
    /// Callers arriving while a resolution of the same key is pending get
    /// that resolution's answer.
    pub async fn resolve_request(&self, req: ResolveRequest) -> Result<String, ResolveError> {
        let key = req.key();
        let this = self.clone();
        let task_key = key.clone();
        let (pending, started) = self
            .inner
            .resolutions
            .join_or_start(key.clone(), move || async move {
                this.run_resolution(task_key, req).await
            });
        if !started {
            tracing::debug!(url = %key.url, "joining pending resolution");
        }
        pending.await
    }

    async fn run_resolution(&self, key: ResourceKey, req: ResolveRequest) -> Result<String, ResolveError> {
        let site = self.site(&req.site_id)?;
        let file_key = key.file_key();
        self.link(&key, &file_key);
        let local = self.local_copy(&key, &file_key);
        let outdated = local.is_some() && self.is_outdated(&file_key, req.time_modified);
        let demand = Demand {
            has_local: local.is_some(),
            outdated,
            online: self.inner.prober.connectivity().is_online(),
            eager: req.eager,
            cheap: req
                .file_size
                .is_some_and(|size| size <= self.inner.settings.download_threshold_bytes),
        };
        let chosen = plan(demand);
        tracing::debug!(url = %key.url, ?demand, plan = ?chosen, "resolving asset");

        match (chosen, local) {
            (Plan::Local, Some(local)) => Ok(local),
            (Plan::LocalThenRefresh, Some(local)) => {
                self.start_download(&site, &key, req.time_modified);
                Ok(local)
            }
            (Plan::Remote, _) => Ok(site.check_and_fix_url(&req.url, &self.inner.prober).await),
            (Plan::RemoteThenDownload, _) => {
                let remote = site.check_and_fix_url(&req.url, &self.inner.prober).await;
                self.start_download(&site, &key, req.time_modified);
                Ok(remote)
            }
            _ => {
                let handle = self.download(&site, &key, req.time_modified).await?;
                Ok(handle.url)
            }
        }
    }

    /// Always end with a local copy: a fresh one is reused, otherwise the file
    /// is downloaded and awaited. Used for subtitle tracks.
    pub async fn download_url(
        &self,
        site_id: &str,
        url: &str,
        component: &str,
        component_id: &str,
    ) -> Result<String, ResolveError> {
        let site = self.site(site_id)?;
        let key = ResourceKey::new(site_id, url, component, component_id);
        let file_key = key.file_key();
        self.link(&key, &file_key);
        if let Some(local) = self.local_copy(&key, &file_key) {
            if !self.is_outdated(&file_key, 0) {
                return Ok(local);
            }
        }
        Ok(self.download(&site, &key, 0).await?.url)
    }

    /// Start a background download unless the file is already stored or being
    /// fetched. Returns true if a download was started.
    pub fn prefetch(&self, req: &ResolveRequest) -> Result<bool, ResolveError> {
        let site = self.site(&req.site_id)?;
        let key = req.key();
        self.link(&key, &key.file_key());
        match self.file_state(&key) {
            DownloadState::Downloaded | DownloadState::Downloading => Ok(false),
            DownloadState::NotDownloaded | DownloadState::Failed => {
                if self.local_copy(&key, &key.file_key()).is_some() {
                    return Ok(false);
                }
                self.start_download(&site, &key, req.time_modified);
                Ok(true)
            }
        }
    }

    /// Receive download state changes for every file.
    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent> {
        self.inner.events.subscribe()
    }

    /// Current download state of the file behind `key`.
    pub fn file_state(&self, key: &ResourceKey) -> DownloadState {
        let file_key = key.file_key();
        if self.inner.downloads.contains(&file_key) {
            return DownloadState::Downloading;
        }
        self.table()
            .get(&file_key)
            .map(|e| e.state)
            .unwrap_or_default()
    }

    /// Cache entry of the file behind `key`, if any.
    pub fn entry(&self, key: &ResourceKey) -> Option<CacheEntry> {
        self.table().get(&key.file_key()).cloned()
    }

    /// Mark the file outdated so the next resolution fetches it again.
    /// Returns false if nothing is cached for `key`.
    pub fn invalidate(&self, key: &ResourceKey) -> bool {
        match self.table().get_mut(&key.file_key()) {
            Some(entry) => {
                entry.stale = true;
                tracing::debug!(url = %key.url, "cache entry invalidated");
                true
            }
            None => false,
        }
    }

    /// Forget every cache entry of a site (logout). Files on disk are kept.
    pub fn forget_site(&self, site_id: &str) -> usize {
        let removed = self.table().remove_site(site_id);
        tracing::info!(site = %site_id, removed, "cache entries dropped");
        removed
    }

    /// Copy of the cache table, e.g. for persistence.
    pub fn snapshot(&self) -> CacheTable {
        self.table().clone()
    }

    pub fn save_table(&self, path: &Path) -> Result<()> {
        self.snapshot().save_to_path(path)
    }

    /// Local URL for the file if it is stored. A copy found in the store with
    /// no entry (an earlier session) is adopted as downloaded.
    fn local_copy(&self, key: &ResourceKey, file_key: &FileKey) -> Option<String> {
        let local = self.inner.store.local_url_of(file_key)?;
        let mut table = self.table();
        let entry = table.entry(file_key, &key.url);
        if entry.local.is_none() && entry.state == DownloadState::NotDownloaded {
            tracing::debug!(url = %key.url, "adopting stored copy");
            entry.state = DownloadState::Downloaded;
        }
        Some(local)
    }

    /// Record the owner of `key` on its file's entry.
    fn link(&self, key: &ResourceKey, file_key: &FileKey) {
        self.table()
            .entry(file_key, &key.url)
            .add_link(&key.component, &key.component_id);
    }

    fn is_outdated(&self, file_key: &FileKey, time_modified: u64) -> bool {
        self.table().get(file_key).is_some_and(|e| {
            e.is_outdated(time_modified, now_secs(), self.inner.settings.max_age_secs)
        })
    }

    fn emit(&self, key: &FileKey, state: DownloadState, error: Option<String>) {
        // No receivers is fine.
        let _ = self.inner.events.send(FileEvent {
            key: key.clone(),
            state,
            error,
        });
    }

    fn start_download(&self, site: &Arc<Site>, key: &ResourceKey, time_modified: u64) {
        // Dropping the pending handle does not stop the spawned download.
        let _ = self.join_download(site, key, time_modified);
    }

    async fn download(
        &self,
        site: &Arc<Site>,
        key: &ResourceKey,
        time_modified: u64,
    ) -> Result<LocalHandle, ResolveError> {
        self.join_download(site, key, time_modified).await
    }

    fn join_download(
        &self,
        site: &Arc<Site>,
        key: &ResourceKey,
        time_modified: u64,
    ) -> inflight::Pending<LocalHandle> {
        let file_key = key.file_key();
        let this = self.clone();
        let (site, task_key, task_file) = (Arc::clone(site), key.clone(), file_key.clone());
        let (pending, started) = self.inner.downloads.join_or_start(file_key, move || async move {
            this.run_download(site, task_key, task_file, time_modified).await
        });
        if !started {
            tracing::debug!(url = %key.url, "joining in-flight download");
        }
        pending
    }

    async fn run_download(
        &self,
        site: Arc<Site>,
        key: ResourceKey,
        file_key: FileKey,
        time_modified: u64,
    ) -> Result<LocalHandle, ResolveError> {
        {
            let mut table = self.table();
            table.entry(&file_key, &key.url).state = DownloadState::Downloading;
        }
        self.emit(&file_key, DownloadState::Downloading, None);

        let fetch_url = site.check_and_fix_url(&key.url, &self.inner.prober).await;
        match self.inner.store.download(&file_key, &fetch_url).await {
            Ok(handle) => {
                {
                    let mut table = self.table();
                    let entry = table.entry(&file_key, &key.url);
                    entry.state = DownloadState::Downloaded;
                    entry.local = Some(handle.clone());
                    entry.downloaded_at = Some(now_secs());
                    entry.time_modified = entry.time_modified.max(time_modified);
                    entry.stale = false;
                    entry.last_error = None;
                }
                tracing::info!(url = %key.url, bytes = handle.size, "asset downloaded");
                self.emit(&file_key, DownloadState::Downloaded, None);
                Ok(handle)
            }
            Err(e) => {
                tracing::warn!(url = %key.url, "asset download failed: {}", e);
                {
                    let mut table = self.table();
                    let entry = table.entry(&file_key, &key.url);
                    entry.state = DownloadState::Failed;
                    entry.last_error = Some(e.to_string());
                }
                self.emit(&file_key, DownloadState::Failed, Some(e.to_string()));
                Err(e.into())
            }
        }
    }
}
