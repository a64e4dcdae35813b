//! In-memory cache table with JSON persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::FileKey;

use super::entry::{CacheEntry, DownloadState};

const SNAPSHOT_VERSION: u8 = 1;

/// Cache entries by stored file. Mutated only by the filepool.
#[derive(Debug, Clone, Default)]
pub struct CacheTable {
    entries: HashMap<FileKey, CacheEntry>,
}

/// Snapshot for JSON serialization. Keys are "site\tfile_id" strings.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedTable {
    #[serde(default = "default_version")]
    version: u8,
    entries: HashMap<String, CacheEntry>,
}

fn default_version() -> u8 {
    SNAPSHOT_VERSION
}

fn to_string_key(key: &FileKey) -> String {
    format!("{}\t{}", key.site_id, key.file_id)
}

fn from_string_key(s: &str) -> Option<FileKey> {
    let (site, file) = s.split_once('\t')?;
    if site.is_empty() || file.is_empty() {
        return None;
    }
    Some(FileKey::new(site, file))
}

impl CacheTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &FileKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &FileKey) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key)
    }

    /// Entry for `key`, created for `remote_url` if missing.
    pub fn entry(&mut self, key: &FileKey, remote_url: &str) -> &mut CacheEntry {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(remote_url))
    }

    pub fn remove(&mut self, key: &FileKey) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Mark downloads that were running when the table was saved as not
    /// downloaded. No download survives the process that started it.
    pub fn settle_interrupted(&mut self) -> usize {
        let mut settled = 0;
        for entry in self.entries.values_mut() {
            if entry.state == DownloadState::Downloading {
                entry.state = DownloadState::NotDownloaded;
                settled += 1;
            }
        }
        settled
    }

    /// Drop every entry of a site (logout).
    pub fn remove_site(&mut self, site_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| k.site_id != site_id);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FileKey, &CacheEntry)> {
        self.entries.iter()
    }

    /// Default path for the table: `~/.local/state/assetpool/filepool.json`.
    pub fn default_path() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("assetpool")?;
        xdg_dirs
            .place_state_file("filepool.json")
            .context("create state directory")
    }

    /// Save the table to `path` (creates parent dir if needed).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let snapshot = PersistedTable {
            version: SNAPSHOT_VERSION,
            entries: self
                .entries
                .iter()
                .map(|(k, e)| (to_string_key(k), e.clone()))
                .collect(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&snapshot).context("serialize cache table")?;
        std::fs::write(path, json)
            .with_context(|| format!("write cache table: {}", path.display()))?;
        Ok(())
    }

    /// Load a table saved by [`save_to_path`](Self::save_to_path). A missing
    /// file gives `None`; entries from a newer snapshot version are rejected.
    pub fn load_from_path(path: &Path) -> Result<Option<CacheTable>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read cache table: {}", path.display()))
            }
        };
        let snapshot: PersistedTable = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse cache table: {}", path.display()))?;
        if snapshot.version > SNAPSHOT_VERSION {
            anyhow::bail!(
                "cache table {} has unsupported version {}",
                path.display(),
                snapshot.version
            );
        }
        let entries = snapshot
            .entries
            .into_iter()
            .filter_map(|(k, e)| Some((from_string_key(&k)?, e)))
            .collect();
        let mut table = CacheTable { entries };
        let settled = table.settle_interrupted();
        if settled > 0 {
            tracing::debug!(settled, "reset downloads interrupted by the last shutdown");
        }
        Ok(Some(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalHandle;

    fn downloaded(url: &str) -> CacheEntry {
        let mut e = CacheEntry::new(url);
        e.state = DownloadState::Downloaded;
        e.local = Some(LocalHandle {
            path: PathBuf::from("/tmp/s1/abc.png"),
            url: "file:///tmp/s1/abc.png".to_string(),
            size: 3,
        });
        e.downloaded_at = Some(1_700_000_000);
        e.time_modified = 42;
        e.add_link("mod_page", "3");
        e
    }

    #[test]
    fn save_and_load_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("filepool.json");

        let mut table = CacheTable::new();
        let key = FileKey::new("s1", "abc.png");
        *table.entry(&key, "http://site/pluginfile.php/1/a.png") =
            downloaded("http://site/pluginfile.php/1/a.png");
        table.entry(&FileKey::new("s2", "def"), "http://other/pluginfile.php/2/b");
        table.save_to_path(&path).unwrap();

        let loaded = CacheTable::load_from_path(&path).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(&key), table.get(&key));
    }

    #[test]
    fn interrupted_download_loads_as_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filepool.json");
        let mut table = CacheTable::new();
        let key = FileKey::new("s1", "big.mp4");
        table.entry(&key, "http://site/pluginfile.php/1/big.mp4").state = DownloadState::Downloading;
        table.save_to_path(&path).unwrap();

        let loaded = CacheTable::load_from_path(&path).unwrap().unwrap();
        assert_eq!(loaded.get(&key).unwrap().state, DownloadState::NotDownloaded);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CacheTable::load_from_path(&dir.path().join("nope.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filepool.json");
        std::fs::write(&path, r#"{"version": 9, "entries": {}}"#).unwrap();
        assert!(CacheTable::load_from_path(&path).is_err());
    }

    #[test]
    fn bad_keys_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filepool.json");
        std::fs::write(
            &path,
            r#"{"entries": {"no-tab": {"remote_url": "u", "local": null, "state": "Failed"}}}"#,
        )
        .unwrap();
        let loaded = CacheTable::load_from_path(&path).unwrap().unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn remove_site_drops_only_that_site() {
        let mut table = CacheTable::new();
        table.entry(&FileKey::new("s1", "a"), "u1");
        table.entry(&FileKey::new("s1", "b"), "u2");
        table.entry(&FileKey::new("s2", "a"), "u3");
        assert_eq!(table.remove_site("s1"), 2);
        assert_eq!(table.len(), 1);
    }
}
