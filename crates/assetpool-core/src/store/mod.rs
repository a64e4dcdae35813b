//! Local copies of remote assets.
//!
//! The filepool only talks to the [`FileStore`] trait; [`DiskFileStore`] is the
//! curl-backed implementation used by the CLI and integration tests.

mod disk;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DownloadError;

pub use disk::DiskFileStore;

/// Identifies one stored file: the owning site and the URL-derived file id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileKey {
    pub site_id: String,
    pub file_id: String,
}

impl FileKey {
    pub fn new(site_id: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            file_id: file_id.into(),
        }
    }
}

/// A completed local copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalHandle {
    pub path: PathBuf,
    /// URL the renderer can load the copy from (`file://...`).
    pub url: String,
    pub size: u64,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Fetch `url` and store it under `key`, replacing any previous copy.
    async fn download(&self, key: &FileKey, url: &str) -> Result<LocalHandle, DownloadError>;

    fn has_local_copy(&self, key: &FileKey) -> bool;

    /// Local URL of the stored copy, if there is one.
    fn local_url_of(&self, key: &FileKey) -> Option<String>;
}
