//! Map of pending operations shared by every caller of the same key.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;

use crate::error::ResolveError;

pub(crate) type Pending<T> = Shared<BoxFuture<'static, Result<T, ResolveError>>>;

type PendingMap<K, T> = Arc<Mutex<HashMap<K, Pending<T>>>>;

fn lock<K, T>(map: &PendingMap<K, T>) -> MutexGuard<'_, HashMap<K, Pending<T>>> {
    map.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes the key when the spawned task finishes, on success, error or panic.
struct SettleGuard<K: Eq + Hash, T> {
    map: PendingMap<K, T>,
    key: K,
}

impl<K: Eq + Hash, T> Drop for SettleGuard<K, T> {
    fn drop(&mut self) {
        lock(&self.map).remove(&self.key);
    }
}

/// Pending operations keyed by `K`. Each operation runs as a spawned task so
/// it completes even if every caller stops waiting.
pub(crate) struct InFlight<K, T> {
    map: PendingMap<K, T>,
}

impl<K, T> InFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            map: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the operation pending for `key`, or start `start()` and register it.
    /// The flag is true when this call started the operation.
    pub(crate) fn join_or_start<F, Fut>(&self, key: K, start: F) -> (Pending<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResolveError>> + Send + 'static,
    {
        let mut map = lock(&self.map);
        if let Some(pending) = map.get(&key) {
            return (pending.clone(), false);
        }
        // The task's guard blocks on this lock, so removal always follows insertion.
        let guard = SettleGuard {
            map: Arc::clone(&self.map),
            key: key.clone(),
        };
        let work = start();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            work.await
        });
        let pending = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(ResolveError::TaskFailed(e.to_string())),
            }
        }
        .boxed()
        .shared();
        map.insert(key, pending.clone());
        (pending, true)
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        lock(&self.map).contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.map).len()
    }
}
