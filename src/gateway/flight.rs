//! Per-key in-flight deduplication
//!
//! Concurrent cache misses for one key would otherwise each issue their own
//! remote call. The first caller acquires the key's guard and fetches;
//! followers block on the same guard, then find the cache already filled
//! when they re-check it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

pub(crate) struct FlightGroup {
    inflight: StdMutex<HashMap<String, Slot>>,
}

impl FlightGroup {
    pub(crate) fn new() -> Self {
        Self {
            inflight: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive flight rights on `key`.
    ///
    /// Callers must re-check their cache after this resolves; a predecessor
    /// may have completed the fetch while we waited.
    pub(crate) async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.lock_map();
            map.entry(key.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Drop the key's slot once nobody is waiting on it.
    ///
    /// Call after releasing the guard from [`acquire`].
    pub(crate) fn forget(&self, key: &str) {
        let mut map = self.lock_map();
        if let Some(slot) = map.get(key)
            && Arc::strong_count(slot) == 1
        {
            map.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.lock_map().len()
    }
}
