use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-path async mutexes serializing read-modify-write sequences (append, registry upsert).
#[derive(Default)]
pub struct PathLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self { Self::default() }

    /// Wait for exclusive access to `path`. The guard releases it on drop.
    pub async fn lock(&self, path: &str) -> OwnedMutexGuard<()> {
        let m = {
            let mut map = self.inner.lock();
            // drop entries nobody holds or waits on
            if map.len() > 64 {
                map.retain(|k, v| k == path || Arc::strong_count(v) > 1);
            }
            map.entry(path.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        m.lock_owned().await
    }

    pub fn len(&self) -> usize { self.inner.lock().len() }
}
