//! Disk-backed file store: `<root>/<site>/<file_id>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::DownloadError;
use crate::fetch::{download_with_retry, FetchOptions};

use super::{FileKey, FileStore, LocalHandle};

/// Stores downloads under a root directory, one subdirectory per site.
#[derive(Debug, Clone)]
pub struct DiskFileStore {
    root: PathBuf,
    opts: FetchOptions,
}

/// Site ids come from user data; keep them to one safe path component.
fn site_dir_name(site_id: &str) -> String {
    let name: String = site_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    match name.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => name,
    }
}

fn file_url(path: &Path) -> Option<String> {
    url::Url::from_file_path(path).ok().map(String::from)
}

impl DiskFileStore {
    pub fn new(root: impl Into<PathBuf>, opts: FetchOptions) -> Self {
        Self {
            root: root.into(),
            opts,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path for `key` (the file may not exist yet).
    pub fn path_of(&self, key: &FileKey) -> PathBuf {
        self.root
            .join(site_dir_name(&key.site_id))
            .join(site_dir_name(&key.file_id))
    }
}

#[async_trait]
impl FileStore for DiskFileStore {
    async fn download(&self, key: &FileKey, url: &str) -> Result<LocalHandle, DownloadError> {
        let path = self.path_of(key);
        let opts = self.opts;
        let (owned_url, dest) = (url.to_string(), path.clone());
        tracing::debug!(url, path = %path.display(), "downloading asset");

        let size = tokio::task::spawn_blocking(move || {
            download_with_retry(&owned_url, &dest, &opts).map_err(|e| e.into_download_error(&owned_url))
        })
        .await
        .map_err(|e| DownloadError::storage(url, format!("download task: {e}")))??;

        let local = file_url(&path)
            .ok_or_else(|| DownloadError::storage(url, format!("not an absolute path: {}", path.display())))?;
        tracing::info!(url, bytes = size, path = %path.display(), "asset stored");
        Ok(LocalHandle {
            path,
            url: local,
            size,
        })
    }

    fn has_local_copy(&self, key: &FileKey) -> bool {
        self.path_of(key).is_file()
    }

    fn local_url_of(&self, key: &FileKey) -> Option<String> {
        let path = self.path_of(key);
        if path.is_file() {
            file_url(&path)
        } else {
            None
        }
    }
}
