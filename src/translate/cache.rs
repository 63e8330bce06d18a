//! Read-through cache for lazily loaded models.
//!
//! The lock is held across check-and-load so two requests for the same
//! uncached key never load it twice. Callers get an `Arc` back and run
//! inference after the lock is released.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct ModelCache<V: ?Sized> {
    entries: Mutex<HashMap<String, Arc<V>>>,
}

impl<V: ?Sized + Send + Sync> ModelCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached handle for `key`, loading it with `load` on a miss.
    /// Failed loads are not cached; the next request retries.
    pub async fn get_or_load<F, Fut>(&self, key: &str, load: F) -> anyhow::Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Arc<V>>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(handle) = entries.get(key) {
            debug!("Model cache hit: {}", key);
            return Ok(Arc::clone(handle));
        }

        info!("Loading model {}", key);
        let handle = load().await?;
        entries.insert(key.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl<V: ?Sized + Send + Sync> Default for ModelCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
