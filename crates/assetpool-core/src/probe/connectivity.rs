//! Connectivity oracles.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the device currently has a network connection.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Oracle for hosts without connectivity information (CLI, servers).
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Connectivity flag flipped by the embedding app's network listener.
#[derive(Debug)]
pub struct SharedConnectivity {
    online: AtomicBool,
}

impl SharedConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }
}

impl Default for SharedConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for SharedConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}
