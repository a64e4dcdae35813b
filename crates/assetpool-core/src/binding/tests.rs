//! Binding tests with an in-memory element and store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::*;
use crate::config::AssetPoolConfig;
use crate::error::{DownloadError, ProbeError};
use crate::filepool::FileEvent;
use crate::probe::{CapabilityProber, Reachability, SharedConnectivity};
use crate::site::{SiteInfo, SiteRegistry};
use crate::store::{FileKey, FileStore, LocalHandle};

const IMG_URL: &str = "http://site/pluginfile.php/1/mod_page/a.png";
const VIDEO_URL: &str = "http://site/pluginfile.php/1/mod_page/v.mp4";
const POSTER_URL: &str = "http://site/pluginfile.php/1/mod_page/p.jpg";

struct FakeTarget {
    tag: ElementTag,
    attrs: Mutex<HashMap<String, String>>,
    sources: Mutex<Vec<String>>,
}

impl FakeTarget {
    fn new(tag: ElementTag) -> Arc<Self> {
        Arc::new(Self {
            tag,
            attrs: Mutex::new(HashMap::new()),
            sources: Mutex::new(Vec::new()),
        })
    }

    fn with_attr(self: Arc<Self>, name: &str, value: &str) -> Arc<Self> {
        self.set_attribute(name, value);
        self
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.attribute(name)
    }
}

#[async_trait]
impl RenderTarget for FakeTarget {
    fn tag(&self) -> ElementTag {
        self.tag
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attrs.lock().unwrap().get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) {
        self.attrs
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    fn remove_attribute(&self, name: &str) {
        self.attrs.lock().unwrap().remove(name);
    }

    fn replace_source(&self, url: &str) {
        self.sources.lock().unwrap().push(url.to_string());
    }

    async fn wait_for_decode(&self) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Downloads of URLs containing "slow" take longer; "broken" ones fail.
#[derive(Default)]
struct FakeStore {
    files: Mutex<HashMap<FileKey, String>>,
    downloads: AtomicUsize,
}

#[async_trait]
impl FileStore for FakeStore {
    async fn download(&self, key: &FileKey, url: &str) -> Result<LocalHandle, DownloadError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let delay = if url.contains("slow") { 100 } else { 10 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        if url.contains("broken") {
            return Err(DownloadError::Http {
                url: url.to_string(),
                status: 404,
            });
        }
        let local = format!("file:///cache/{}/{}", key.site_id, key.file_id);
        self.files.lock().unwrap().insert(key.clone(), local.clone());
        Ok(LocalHandle {
            path: format!("/cache/{}/{}", key.site_id, key.file_id).into(),
            url: local,
            size: 1,
        })
    }

    fn has_local_copy(&self, key: &FileKey) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }

    fn local_url_of(&self, key: &FileKey) -> Option<String> {
        self.files.lock().unwrap().get(key).cloned()
    }
}

struct NoTokenPath;

#[async_trait]
impl Reachability for NoTokenPath {
    async fn url_is_reachable(&self, _url: &str) -> Result<bool, ProbeError> {
        Ok(false)
    }
}

struct Fixture {
    pool: Filepool,
    store: Arc<FakeStore>,
    online: Arc<SharedConnectivity>,
}

impl Fixture {
    fn new() -> Self {
        let registry = Arc::new(SiteRegistry::new());
        registry.add_site(SiteInfo {
            id: "s1".to_string(),
            url: "http://site".to_string(),
            token: "TOK".to_string(),
            access_key: None,
        });
        let online = Arc::new(SharedConnectivity::new(true));
        let prober = CapabilityProber::new(Arc::new(NoTokenPath), online.clone());
        let store = Arc::new(FakeStore::default());
        let pool = Filepool::new(registry, prober, store.clone(), &AssetPoolConfig::default());
        Self { pool, store, online }
    }

    fn ctx(&self) -> BindingContext {
        BindingContext::new(self.pool.clone()).site("s1")
    }

    fn bind(&self, target: &Arc<FakeTarget>, inputs: ContentInputs) -> ExternalContent {
        ExternalContent::new(target.clone(), self.ctx(), inputs)
    }

    fn downloads(&self) -> usize {
        self.store.downloads.load(Ordering::SeqCst)
    }
}

fn local_of(url: &str) -> String {
    let key = ResourceKey::new("s1", url, "", "").file_key();
    format!("file:///cache/s1/{}", key.file_id)
}

fn remote_of(url: &str) -> String {
    format!(
        "{}?token=TOK&offline=1",
        url.replace("/pluginfile.php", "/webservice/pluginfile.php")
    )
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn wait_downloaded(rx: &mut broadcast::Receiver<FileEvent>) {
    loop {
        let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        if ev.state == DownloadState::Downloaded {
            return;
        }
    }
}

#[tokio::test]
async fn image_is_bound_to_local_copy() {
    let f = Fixture::new();
    let img = FakeTarget::new(ElementTag::Img);
    let binding = f.bind(&img, ContentInputs::url(IMG_URL));
    assert_eq!(binding.state(), BindingState::Idle);

    binding.attach().await;
    binding.ready().await;

    assert_eq!(binding.state(), BindingState::Bound);
    assert_eq!(img.attr("src").unwrap(), local_of(IMG_URL));
    assert_eq!(img.attr("data-original-src").unwrap(), IMG_URL);
    assert_eq!(binding.resolved_url().unwrap(), local_of(IMG_URL));

    let mut loaded = binding.loaded();
    tokio::time::timeout(Duration::from_secs(1), loaded.wait_for(|l| *l))
        .await
        .unwrap()
        .unwrap();
    assert!(binding.is_loaded());
}

#[tokio::test]
async fn later_inputs_win_over_slower_earlier_resolution() {
    let f = Fixture::new();
    let img = FakeTarget::new(ElementTag::Img);
    let binding = f.bind(&img, ContentInputs::default());
    binding.attach().await;

    let slow = "http://site/pluginfile.php/1/mod_page/slow.png";
    let fast = "http://site/pluginfile.php/1/mod_page/fast.png";
    tokio::join!(binding.set_inputs(ContentInputs::url(slow)), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        binding.set_inputs(ContentInputs::url(fast)).await;
    });

    assert_eq!(img.attr("src").unwrap(), local_of(fast));
    assert_eq!(img.attr("data-original-src").unwrap(), fast);
    assert_eq!(binding.resolved_url().unwrap(), local_of(fast));
    assert_eq!(binding.inputs(), ContentInputs::url(fast));
    assert_eq!(f.downloads(), 2);
}

#[tokio::test]
async fn video_streams_remote_and_fetches_poster() {
    let f = Fixture::new();
    let video = FakeTarget::new(ElementTag::Video);
    let binding = f.bind(&video, ContentInputs::url(VIDEO_URL).with_poster(POSTER_URL));
    binding.attach().await;

    assert_eq!(
        video.attr("src").unwrap(),
        format!("{}#assetpool-embedded", remote_of(VIDEO_URL))
    );
    assert_eq!(video.attr("poster").unwrap(), local_of(POSTER_URL));
    assert_eq!(video.attr("data-original-poster").unwrap(), POSTER_URL);

    // The background download finishes and the element is rebound.
    eventually(|| video.attr("src") == Some(local_of(VIDEO_URL))).await;
    assert!(!binding.is_loaded());
}

#[tokio::test]
async fn links_to_site_files_get_no_fragment() {
    let f = Fixture::new();
    let link = FakeTarget::new(ElementTag::A);
    let binding = f.bind(&link, ContentInputs::url(VIDEO_URL));
    binding.attach().await;
    assert_eq!(link.attr("href").unwrap(), remote_of(VIDEO_URL));
    assert!(!binding.is_invalid());
}

#[tokio::test]
async fn foreign_links_and_local_urls_are_left_alone() {
    let f = Fixture::new();
    let link = FakeTarget::new(ElementTag::A);
    let binding = f.bind(&link, ContentInputs::url("https://example.com/page"));
    binding.attach().await;
    assert_eq!(link.attr("href").unwrap(), "https://example.com/page");
    assert!(link.attr("data-original-href").is_none());
    assert!(binding.is_invalid());
    assert_eq!(binding.state(), BindingState::Bound);

    let img = FakeTarget::new(ElementTag::Img);
    let local = f.bind(&img, ContentInputs::url("file:///sdcard/a.png"));
    local.attach().await;
    assert_eq!(img.attr("src").unwrap(), "file:///sdcard/a.png");
    assert_eq!(f.downloads(), 0);
}

#[tokio::test]
async fn tracks_are_always_downloaded() {
    let f = Fixture::new();
    let track = FakeTarget::new(ElementTag::Track);
    let url = "http://site/pluginfile.php/1/mod_page/subs.vtt";
    let binding = f.bind(&track, ContentInputs::url(url));
    binding.attach().await;
    assert_eq!(track.attr("src").unwrap(), local_of(url));
    assert_eq!(f.downloads(), 1);
}

#[tokio::test]
async fn source_elements_get_a_new_source() {
    let f = Fixture::new();
    let source = FakeTarget::new(ElementTag::Source);
    let binding = f.bind(&source, ContentInputs::url(VIDEO_URL));
    binding.attach().await;
    assert!(source.attr("src").is_none());
    assert_eq!(
        source.sources.lock().unwrap()[0],
        format!("{}#assetpool-embedded", remote_of(VIDEO_URL))
    );
}

#[tokio::test]
async fn failed_resolution_applies_original_url() {
    let f = Fixture::new();
    let img = FakeTarget::new(ElementTag::Img);
    let url = "http://site/pluginfile.php/1/mod_page/broken.png";
    let binding = f.bind(&img, ContentInputs::url(url));
    binding.attach().await;
    binding.ready().await;
    assert_eq!(binding.state(), BindingState::Failed);
    assert_eq!(img.attr("src").unwrap(), url);
    assert!(img.attr("data-original-src").is_none());
}

#[tokio::test]
async fn unsupported_elements_are_invalid() {
    let f = Fixture::new();
    let div = FakeTarget::new(ElementTag::Other);
    let binding = f.bind(&div, ContentInputs::url(IMG_URL));
    binding.attach().await;
    binding.ready().await;
    assert_eq!(binding.state(), BindingState::Failed);
    assert!(binding.is_invalid());
    assert!(div.attrs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn data_and_empty_images_count_as_loaded() {
    let f = Fixture::new();
    let img = FakeTarget::new(ElementTag::Img);
    let binding = f.bind(&img, ContentInputs::url("data:image/png;base64,AAAA"));
    binding.attach().await;
    assert!(binding.is_loaded());
    assert_eq!(img.attr("src").unwrap(), "data:image/png;base64,AAAA");

    let empty = FakeTarget::new(ElementTag::Img);
    let binding = f.bind(&empty, ContentInputs::default());
    binding.attach().await;
    assert!(binding.is_loaded());
    assert!(empty.attr("src").is_none());
    assert!(binding.resolved_url().is_none());
}

#[tokio::test]
async fn inputs_before_attach_are_only_stored() {
    let f = Fixture::new();
    let img = FakeTarget::new(ElementTag::Img);
    let binding = f.bind(&img, ContentInputs::default());
    binding.set_inputs(ContentInputs::url(IMG_URL)).await;
    assert_eq!(binding.state(), BindingState::Idle);
    assert!(img.attr("src").is_none());

    binding.attach().await;
    assert_eq!(img.attr("src").unwrap(), local_of(IMG_URL));
}

#[tokio::test]
async fn detach_stops_watching_but_not_downloading() {
    let f = Fixture::new();
    let mut events = f.pool.subscribe();
    let video = FakeTarget::new(ElementTag::Video);
    let binding = f.bind(&video, ContentInputs::url(VIDEO_URL));
    binding.attach().await;
    let remote = video.attr("src").unwrap();

    binding.detach();
    wait_downloaded(&mut events).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(f.downloads(), 1);
    assert_eq!(video.attr("src").unwrap(), remote);

    binding.set_inputs(ContentInputs::url(IMG_URL)).await;
    assert_eq!(video.attr("src").unwrap(), remote);
}

#[tokio::test]
async fn detach_before_attach_still_completes_ready() {
    let f = Fixture::new();
    let img = FakeTarget::new(ElementTag::Img);
    let binding = f.bind(&img, ContentInputs::url(IMG_URL));
    binding.detach();
    tokio::time::timeout(Duration::from_secs(1), binding.ready())
        .await
        .expect("ready never completed");
    assert_eq!(binding.state(), BindingState::Idle);
    assert!(img.attr("src").is_none());
}

#[tokio::test]
async fn dropped_binding_leaves_element_alone() {
    let f = Fixture::new();
    let mut events = f.pool.subscribe();
    let video = FakeTarget::new(ElementTag::Video);
    let binding = f.bind(&video, ContentInputs::url(VIDEO_URL));
    binding.attach().await;
    let remote = video.attr("src").unwrap();
    assert_eq!(remote, format!("{}#assetpool-embedded", remote_of(VIDEO_URL)));

    drop(binding);
    wait_downloaded(&mut events).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(f.downloads(), 1);
    assert_eq!(video.attr("src").unwrap(), remote);
}

#[tokio::test]
async fn watcher_stops_after_failed_download() {
    let f = Fixture::new();
    let url = "http://site/pluginfile.php/1/mod_page/broken.mp4";
    let video = FakeTarget::new(ElementTag::Video);
    let binding = f.bind(&video, ContentInputs::url(url));
    binding.attach().await;
    assert_eq!(binding.state(), BindingState::Bound);

    eventually(|| binding.inner.tasks().iter().all(|t| t.is_finished())).await;
    assert_eq!(f.downloads(), 1);
    assert!(video.attr("src").unwrap().starts_with(&remote_of(url)));
}

#[tokio::test]
async fn trigger_download_starts_one_background_fetch() {
    let f = Fixture::new();
    f.online.set_online(false);
    let video = FakeTarget::new(ElementTag::Video);
    let binding = f.bind(&video, ContentInputs::url(VIDEO_URL));
    binding.attach().await;
    assert_eq!(f.downloads(), 0);

    f.online.set_online(true);
    assert!(binding.trigger_download().unwrap());
    assert!(!binding.trigger_download().unwrap());

    let img = FakeTarget::new(ElementTag::Img);
    let image = f.bind(&img, ContentInputs::url(IMG_URL));
    assert!(!image.trigger_download().unwrap());

    eventually(|| f.downloads() == 1).await;
}

#[tokio::test]
async fn formatted_elements_hand_their_urls_to_the_binding() {
    let f = Fixture::new();
    let video: Arc<FakeTarget> = FakeTarget::new(ElementTag::Video)
        .with_attr("src", VIDEO_URL)
        .with_attr("poster", POSTER_URL);
    let img = FakeTarget::new(ElementTag::Img).with_attr("src", IMG_URL);

    let targets: Vec<Arc<dyn RenderTarget>> = vec![video.clone(), img.clone()];
    let bindings = format::attach_all(targets, &f.ctx()).await;
    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings[0].inputs(), ContentInputs::url(VIDEO_URL).with_poster(POSTER_URL));
    assert_eq!(video.attr("poster").unwrap(), local_of(POSTER_URL));
    assert_eq!(img.attr("src").unwrap(), local_of(IMG_URL));

    let no_site = BindingContext::new(f.pool.clone());
    let untouched = FakeTarget::new(ElementTag::Img).with_attr("src", IMG_URL);
    assert!(format::attach_external_content(untouched.clone(), no_site)
        .await
        .is_none());
    assert_eq!(untouched.attr("src").unwrap(), IMG_URL);
}
