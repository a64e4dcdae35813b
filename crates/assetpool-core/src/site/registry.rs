//! Registry of logged-in sites, created at session start and torn down at the end.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::entry::{Site, SiteInfo};

/// Sites by id plus the one currently in use.
///
/// Shared by `Arc` between the filepool and the bindings; there is no global
/// instance.
#[derive(Debug, Default)]
pub struct SiteRegistry {
    sites: RwLock<HashMap<String, Arc<Site>>>,
    current: RwLock<Option<String>>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a site at login. Replaces any previous session for the same id,
    /// which also resets its capability flag. The first site becomes current.
    pub fn add_site(&self, info: SiteInfo) -> Arc<Site> {
        let id = info.id.clone();
        let site = Arc::new(Site::new(info));
        self.sites
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), Arc::clone(&site));
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        if current.is_none() {
            *current = Some(id.clone());
        }
        tracing::info!(site = %id, url = %site.url(), "site added");
        site
    }

    /// Drop a site at logout. Clears the current site if it was this one.
    pub fn remove_site(&self, id: &str) -> Option<Arc<Site>> {
        let removed = self
            .sites
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        if current.as_deref() == Some(id) {
            *current = None;
        }
        if removed.is_some() {
            tracing::info!(site = %id, "site removed");
        }
        removed
    }

    pub fn get_site(&self, id: &str) -> Option<Arc<Site>> {
        self.sites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Make `id` the current site. Returns false if no such site is registered.
    pub fn set_current(&self, id: &str) -> bool {
        if self.get_site(id).is_none() {
            return false;
        }
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(id.to_string());
        true
    }

    pub fn current_site(&self) -> Option<Arc<Site>> {
        let id = self
            .current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;
        self.get_site(&id)
    }

    pub fn site_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
