use crate::store::FileKey;
use crate::url_model::{canonical_url, file_id_for_url};

/// Identity of one asset requested by one owner.
///
/// The URL is canonical (see [`canonical_url`]), so the token-query and
/// token-path forms of the same file share a key. The on-disk file is shared
/// by every owner of the same URL: see [`ResourceKey::file_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ResourceKey {
    pub site_id: String,
    pub url: String,
    pub component: String,
    pub component_id: String,
}

impl ResourceKey {
    pub fn new(site_id: &str, url: &str, component: &str, component_id: &str) -> Self {
        Self {
            site_id: site_id.to_string(),
            url: canonical_url(url),
            component: component.to_string(),
            component_id: component_id.to_string(),
        }
    }

    /// Key of the stored file backing this resource.
    pub fn file_key(&self) -> FileKey {
        FileKey::new(&self.site_id, file_id_for_url(&self.url))
    }

}
