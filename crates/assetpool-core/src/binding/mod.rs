//! Content binding: keeps one rendered element pointed at the best URL for
//! the asset it references.
//!
//! A binding reads its declared inputs, asks the [`Filepool`] for a URL and
//! writes it to the element. Every resolution carries a generation number;
//! when inputs change while a resolution is still running, the older result
//! is dropped on arrival so the latest inputs always win.

pub mod format;
mod target;

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::DEFAULT_EMBEDDED_FRAGMENT;
use crate::error::ResolveError;
use crate::filepool::{DownloadState, Filepool, ResolveRequest, ResourceKey};
use crate::site::Site;
use crate::url_model::{is_http_url, is_local_file_url};

pub use target::{ElementTag, RenderTarget};

/// Lifecycle of a binding: `Idle → Resolving → Bound | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingState {
    #[default]
    Idle,
    Resolving,
    Bound,
    Failed,
}

/// Declared URLs of the element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentInputs {
    pub url: Option<String>,
    /// Poster frame; only used on `<video>`.
    pub poster_url: Option<String>,
}

impl ContentInputs {
    pub fn url(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            poster_url: None,
        }
    }

    pub fn with_poster(mut self, poster_url: &str) -> Self {
        self.poster_url = Some(poster_url.to_string());
        self
    }
}

/// Where a binding resolves its URLs and who owns the files.
#[derive(Clone)]
pub struct BindingContext {
    pub pool: Filepool,
    /// Site to resolve against; the registry's current site when unset.
    pub site_id: Option<String>,
    pub component: String,
    pub component_id: String,
    /// Added to remote URLs handed to inline elements.
    pub embedded_fragment: String,
}

impl BindingContext {
    pub fn new(pool: Filepool) -> Self {
        Self {
            pool,
            site_id: None,
            component: String::new(),
            component_id: String::new(),
            embedded_fragment: DEFAULT_EMBEDDED_FRAGMENT.to_string(),
        }
    }

    pub fn site(mut self, site_id: &str) -> Self {
        self.site_id = Some(site_id.to_string());
        self
    }

    pub fn owner(mut self, component: &str, component_id: &str) -> Self {
        self.component = component.to_string();
        self.component_id = component_id.to_string();
        self
    }

    pub fn embedded_fragment(mut self, fragment: &str) -> Self {
        self.embedded_fragment = fragment.to_string();
        self
    }
}

/// Result of resolving one attribute.
enum Resolved {
    Url(String),
    /// Not something the filepool handles; the declared value is used as is.
    Untouched,
    Failed(ResolveError),
}

#[derive(Default)]
struct Status {
    state: BindingState,
    inputs: ContentInputs,
    generation: u64,
    resolved: Option<String>,
    invalid: bool,
    attached: bool,
    detached: bool,
}

struct Inner {
    target: Arc<dyn RenderTarget>,
    ctx: BindingContext,
    status: Mutex<Status>,
    ready: watch::Sender<bool>,
    loaded: watch::Sender<bool>,
    /// Load waiters and file-event watchers; aborted on detach.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Binding between one [`RenderTarget`] and the filepool.
pub struct ExternalContent {
    inner: Arc<Inner>,
}

/// True if the filepool should handle `url` on this element.
fn is_downloadable(tag: ElementTag, url: &str, site: &Site) -> bool {
    is_http_url(url)
        && !is_local_file_url(url)
        && (tag != ElementTag::A || site.is_site_plugin_file_url(url))
}

impl ExternalContent {
    pub fn new(target: Arc<dyn RenderTarget>, ctx: BindingContext, inputs: ContentInputs) -> Self {
        let (ready, _) = watch::channel(false);
        let (loaded, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                target,
                ctx,
                status: Mutex::new(Status {
                    inputs,
                    ..Status::default()
                }),
                ready,
                loaded,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Resolve the declared inputs and apply them to the element.
    pub async fn attach(&self) {
        if let Some((generation, inputs)) = self.inner.begin(None, true) {
            self.inner.run(generation, inputs, false).await;
        }
    }

    /// Replace the inputs. After [`attach`](Self::attach) this resolves again;
    /// before it the inputs are only stored.
    pub async fn set_inputs(&self, inputs: ContentInputs) {
        if let Some((generation, inputs)) = self.inner.begin(Some(inputs), false) {
            self.inner.run(generation, inputs, false).await;
        }
    }

    /// Stop watching load and download events. Downloads already started in
    /// the filepool keep running; pending resolutions are not applied.
    ///
    /// [`ready`](Self::ready) completes afterwards even if nothing was ever
    /// resolved. Dropping the binding detaches it too.
    pub fn detach(&self) {
        self.inner.shutdown();
    }

    /// Completes once the first resolution has settled, bound or failed.
    pub async fn ready(&self) {
        let mut rx = self.inner.ready.subscribe();
        // The sender lives in `inner`, so the channel cannot close here.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Image load signal. Only `<img>` elements ever report `true`.
    pub fn loaded(&self) -> watch::Receiver<bool> {
        self.inner.loaded.subscribe()
    }

    pub fn is_loaded(&self) -> bool {
        *self.inner.loaded.borrow()
    }

    pub fn state(&self) -> BindingState {
        self.inner.status().state
    }

    /// URL applied to the element's main attribute by the last resolution.
    pub fn resolved_url(&self) -> Option<String> {
        self.inner.status().resolved.clone()
    }

    /// True when the element or its URL is not something the filepool handles.
    pub fn is_invalid(&self) -> bool {
        self.inner.status().invalid
    }

    pub fn inputs(&self) -> ContentInputs {
        self.inner.status().inputs.clone()
    }

    /// Start a background download for media and links the user interacted
    /// with. Returns true if a download was started.
    pub fn trigger_download(&self) -> Result<bool, ResolveError> {
        let tag = self.inner.target.tag();
        if !matches!(
            tag,
            ElementTag::A | ElementTag::Audio | ElementTag::Video | ElementTag::Source
        ) {
            return Ok(false);
        }
        let Some(url) = self.inner.status().inputs.url.clone() else {
            return Ok(false);
        };
        let Some(site) = self.inner.site() else {
            return Ok(false);
        };
        if !is_downloadable(tag, &url, &site) {
            return Ok(false);
        }
        let ctx = &self.inner.ctx;
        let req = ResolveRequest::new(site.id(), &url).owner(&ctx.component, &ctx.component_id);
        ctx.pool.prefetch(&req)
    }
}

impl Drop for ExternalContent {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl Inner {
    fn shutdown(&self) {
        {
            let mut st = self.status();
            if st.detached {
                return;
            }
            st.detached = true;
            st.generation += 1;
        }
        for task in self.tasks().drain(..) {
            task.abort();
        }
        self.ready.send_replace(true);
        tracing::debug!("binding detached");
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    fn site(&self) -> Option<Arc<Site>> {
        let registry = self.ctx.pool.registry();
        match &self.ctx.site_id {
            Some(id) => registry.get_site(id),
            None => registry.current_site(),
        }
    }

    /// Open a new generation. `None` when detached, or when only storing
    /// inputs on a binding that was never attached.
    fn begin(&self, inputs: Option<ContentInputs>, attach: bool) -> Option<(u64, ContentInputs)> {
        let mut st = self.status();
        if st.detached {
            return None;
        }
        if let Some(inputs) = inputs {
            st.inputs = inputs;
        }
        if attach {
            st.attached = true;
        }
        if !st.attached {
            return None;
        }
        st.generation += 1;
        st.state = BindingState::Resolving;
        Some((st.generation, st.inputs.clone()))
    }

    fn is_current(&self, generation: u64) -> bool {
        let st = self.status();
        !st.detached && st.generation == generation
    }

    /// Resolve the current inputs again after the file was downloaded.
    async fn rebind(self: &Arc<Self>) {
        if let Some((generation, inputs)) = self.begin(None, false) {
            self.run(generation, inputs, true).await;
        }
    }

    /// `rebound` is set when this run was triggered by a finished download.
    async fn run(self: &Arc<Self>, generation: u64, inputs: ContentInputs, rebound: bool) {
        let tag = self.target.tag();
        let Some(attr) = tag.url_attribute() else {
            tracing::debug!(?tag, "unsupported element, leaving it as is");
            self.commit_unsupported(generation);
            return;
        };
        let site = self.site();
        let url = inputs.url.clone().unwrap_or_default();
        let main = self.resolve_attr(tag, attr, &url, site.as_deref()).await;
        let poster = match (tag, inputs.poster_url.as_deref()) {
            (ElementTag::Video, Some(poster)) => Some((
                poster,
                self.resolve_attr(tag, "poster", poster, site.as_deref()).await,
            )),
            _ => None,
        };

        let watch_url = self.commit(generation, tag, attr, (url.as_str(), main), poster);
        if let (Some(site), Some(remote)) = (site, watch_url) {
            self.watch_download(generation, &site, &url, &remote, rebound);
        }
    }

    async fn resolve_attr(&self, tag: ElementTag, attr: &str, url: &str, site: Option<&Site>) -> Resolved {
        let Some(site) = site else {
            return Resolved::Untouched;
        };
        if !is_downloadable(tag, url, site) {
            tracing::debug!(url, "ignoring non-downloadable URL");
            return Resolved::Untouched;
        }

        let ctx = &self.ctx;
        let eager = matches!(tag, ElementTag::Img | ElementTag::Track) || attr == "poster";
        let req = ResolveRequest::new(site.id(), url)
            .owner(&ctx.component, &ctx.component_id)
            .eager(eager);
        let result = if attr == "src" && !tag.is_media() {
            ctx.pool.resolve_request(req).await
        } else if tag == ElementTag::Track {
            // Tracks are always local: remote subtitle URLs trip CORS checks.
            ctx.pool
                .download_url(site.id(), url, &ctx.component, &ctx.component_id)
                .await
                .map(|u| self.target.convert_file_src(&u))
        } else {
            ctx.pool
                .resolve_request(req)
                .await
                .map(|u| self.target.convert_file_src(&u))
        };

        match result {
            Ok(mut value) => {
                // Inline and background fetches of one URL must not share a platform cache slot.
                if !is_local_file_url(&value) && !value.contains('#') && tag != ElementTag::A {
                    value.push('#');
                    value.push_str(&ctx.embedded_fragment);
                }
                Resolved::Url(value)
            }
            Err(e) => Resolved::Failed(e),
        }
    }

    fn commit_unsupported(&self, generation: u64) {
        let mut st = self.status();
        if st.detached || st.generation != generation {
            return;
        }
        st.state = BindingState::Failed;
        st.invalid = true;
        st.resolved = None;
        drop(st);
        self.ready.send_replace(true);
    }

    /// Apply the results if `generation` is still current. Returns the
    /// remote URL that was applied when a later download should rebind it.
    fn commit(
        self: &Arc<Self>,
        generation: u64,
        tag: ElementTag,
        attr: &str,
        main: (&str, Resolved),
        poster: Option<(&str, Resolved)>,
    ) -> Option<String> {
        let mut st = self.status();
        if st.detached || st.generation != generation {
            tracing::debug!(generation, "dropping superseded resolution");
            return None;
        }

        let (original, outcome) = main;
        let (value, state, invalid) = match outcome {
            Resolved::Url(u) => (u, BindingState::Bound, false),
            Resolved::Untouched => (original.to_string(), BindingState::Bound, true),
            Resolved::Failed(e) => {
                tracing::warn!(url = original, "resolution failed, using original URL: {}", e);
                (original.to_string(), BindingState::Failed, false)
            }
        };
        self.apply(generation, tag, attr, &value, original);

        if let Some((original, outcome)) = poster {
            let poster_value = match outcome {
                Resolved::Url(u) => u,
                Resolved::Untouched => original.to_string(),
                Resolved::Failed(e) => {
                    tracing::warn!(url = original, "poster resolution failed: {}", e);
                    original.to_string()
                }
            };
            self.apply(generation, tag, "poster", &poster_value, original);
        }

        let watch = (state == BindingState::Bound && !invalid && !is_local_file_url(&value))
            .then(|| value.clone());
        st.state = state;
        st.invalid = invalid;
        st.resolved = (!value.is_empty()).then_some(value);
        drop(st);
        self.ready.send_replace(true);
        tracing::debug!(generation, ?state, "binding settled");
        watch
    }

    fn apply(self: &Arc<Self>, generation: u64, tag: ElementTag, attr: &str, value: &str, original: &str) {
        if value.is_empty() {
            if tag == ElementTag::Img {
                self.loaded.send_replace(true);
            }
            return;
        }

        if tag == ElementTag::Source {
            self.target.replace_source(value);
        } else {
            self.target.set_attribute(attr, value);
            if !original.is_empty() && original != value {
                self.target
                    .set_attribute(&format!("data-original-{attr}"), original);
            }
        }

        if tag != ElementTag::Img {
            return;
        }
        if value.starts_with("data:") {
            self.loaded.send_replace(true);
            return;
        }
        self.loaded.send_replace(false);
        let inner = Arc::clone(self);
        self.track(tokio::spawn(async move {
            inner.target.wait_for_decode().await;
            if inner.is_current(generation) {
                inner.loaded.send_replace(true);
            }
        }));
    }

    /// Rebind to the local copy once the filepool finishes downloading `url`.
    /// A rebind that still ends on a remote URL does not watch again.
    fn watch_download(
        self: &Arc<Self>,
        generation: u64,
        site: &Site,
        url: &str,
        applied: &str,
        rebound: bool,
    ) {
        let ctx = &self.ctx;
        let key = ResourceKey::new(site.id(), url, &ctx.component, &ctx.component_id);
        let file_key = key.file_key();
        let mut events = ctx.pool.subscribe();
        // Subscribed first, so a download settling from here on is seen.
        let state = ctx.pool.file_state(&key);
        let finished = state == DownloadState::Downloaded;
        if state == DownloadState::Failed || (finished && rebound) {
            return;
        }
        let inner = Arc::clone(self);
        tracing::debug!(url = applied, "watching for local copy");
        self.track(tokio::spawn(async move {
            if !finished {
                loop {
                    match events.recv().await {
                        Ok(ev) if ev.key == file_key && ev.state == DownloadState::Downloaded => break,
                        Ok(ev) if ev.key == file_key && ev.state == DownloadState::Failed => {
                            tracing::debug!(url = %key.url, "download failed, keeping remote URL");
                            return;
                        }
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
            if inner.is_current(generation) {
                tracing::debug!(url = %key.url, "local copy ready, rebinding");
                inner.rebind().await;
            }
        }));
    }
}

#[cfg(test)]
mod tests;
