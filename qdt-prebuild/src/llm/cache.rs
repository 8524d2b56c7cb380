//! Persistent prompt/response cache
//!
//! Responses are stored in `<cache_dir>/<domain>/<name>.json`. The file is
//! rewritten every `FLUSH_EVERY` new entries and on `flush()`, always through a
//! temporary file so an interrupted run leaves the previous cache intact.

use super::LlmService;
use async_trait::async_trait;
use qdt_common::Result;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// New entries between automatic flushes
pub const FLUSH_EVERY: usize = 20;

pub struct StringCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
    pending: Mutex<usize>,
    /// Held across write and rename; concurrent flushes share the temp file
    flush_lock: Mutex<()>,
}

impl StringCache {
    /// Open the cache file, starting empty if it does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries: HashMap<String, String> = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };
        info!(records = entries.len(), "Cache loaded from {}", path.display());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            pending: Mutex::new(0),
            flush_lock: Mutex::new(()),
        })
    }

    /// Cache file for `name` within a domain
    pub fn path_for(cache_dir: &Path, domain: &str, name: &str) -> PathBuf {
        cache_dir.join(domain).join(format!("{}.json", name))
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// An empty key maps to an empty value without calling `retrieve`.
    /// Empty cached values are treated as misses.
    pub async fn get_or_retrieve<F, Fut>(&self, key: &str, retrieve: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if key.is_empty() {
            return Ok(String::new());
        }
        if let Some(value) = self.get(key).await {
            if !value.is_empty() {
                return Ok(value);
            }
        }

        let value = retrieve().await?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());

        let flush_now = {
            let mut pending = self.pending.lock().await;
            *pending += 1;
            if *pending >= FLUSH_EVERY {
                *pending = 0;
                true
            } else {
                false
            }
        };
        if flush_now {
            self.flush().await?;
        }
        Ok(value)
    }

    /// Write all entries to disk
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.flush_lock.lock().await;
        let content = {
            let entries = self.entries.read().await;
            serde_json::to_string_pretty(&*entries)?
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = PathBuf::from(format!("{}.tmp", self.path.display()));
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        *self.pending.lock().await = 0;

        debug!("Cache flushed to {}", self.path.display());
        Ok(())
    }
}

/// `LlmService` answering from a `StringCache` before asking `inner`
pub struct CachedLlm<S> {
    inner: S,
    cache: StringCache,
}

impl<S: LlmService> CachedLlm<S> {
    pub fn new(inner: S, cache: StringCache) -> Self {
        Self { inner, cache }
    }

    /// Cache key: the prompt, plus the image path when one is attached
    pub fn cache_key(prompt: &str, image: Option<&Path>) -> String {
        match image {
            Some(image) => format!("{} image:{}", prompt, image.display()),
            None => prompt.to_string(),
        }
    }

    pub fn cache(&self) -> &StringCache {
        &self.cache
    }

    pub async fn flush(&self) -> Result<()> {
        self.cache.flush().await
    }
}

#[async_trait]
impl<S: LlmService> LlmService for CachedLlm<S> {
    async fn send_prompt(&self, prompt: &str, image: Option<&Path>) -> Result<String> {
        let key = Self::cache_key(prompt, image);
        self.cache
            .get_or_retrieve(&key, || self.inner.send_prompt(prompt, image))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmService for CountingLlm {
        async fn send_prompt(&self, prompt: &str, _image: Option<&Path>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("reply to {}", prompt))
        }
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let temp_dir = TempDir::new().unwrap();
        let path = StringCache::path_for(temp_dir.path(), "uk", "gpt");
        let llm = CachedLlm::new(
            CountingLlm {
                calls: AtomicUsize::new(0),
            },
            StringCache::open(&path).unwrap(),
        );

        let first = llm.send_prompt("hello", None).await.unwrap();
        let second = llm.send_prompt("hello", None).await.unwrap();
        let with_image = llm.send_prompt("hello", Some(Path::new("a.png"))).await.unwrap();

        assert_eq!(first, "reply to hello");
        assert_eq!(second, first);
        assert_eq!(with_image, first);
        assert_eq!(llm.inner.calls.load(Ordering::SeqCst), 2);

        llm.flush().await.unwrap();
        let reopened = StringCache::open(&path).unwrap();
        assert_eq!(reopened.len().await, 2);
        assert_eq!(
            reopened.get("hello image:a.png").await.as_deref(),
            Some("reply to hello")
        );
    }

    #[tokio::test]
    async fn test_auto_flush_after_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auto.json");
        let cache = StringCache::open(&path).unwrap();

        for i in 0..FLUSH_EVERY {
            cache
                .get_or_retrieve(&format!("k{}", i), || async { Ok("v".to_string()) })
                .await
                .unwrap();
        }

        assert!(path.exists());
        assert_eq!(StringCache::open(&path).unwrap().len().await, FLUSH_EVERY);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_and_flushes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("concurrent.json");
        let cache = StringCache::open(&path).unwrap();
        let total = FLUSH_EVERY * 5;

        let inserts = futures::future::join_all((0..total).map(|i| {
            let cache = &cache;
            async move {
                cache
                    .get_or_retrieve(&format!("k{}", i), || async move {
                        tokio::task::yield_now().await;
                        Ok(format!("v{}", i))
                    })
                    .await
            }
        }));
        let flushes = futures::future::join_all((0..10).map(|_| cache.flush()));
        let (inserted, flushed) = tokio::join!(inserts, flushes);

        assert!(inserted.iter().all(|r| r.is_ok()));
        assert!(flushed.iter().all(|r| r.is_ok()));
        cache.flush().await.unwrap();
        let reopened = StringCache::open(&path).unwrap();
        assert_eq!(reopened.len().await, total);
        assert_eq!(reopened.get("k7").await.as_deref(), Some("v7"));
    }

    #[tokio::test]
    async fn test_empty_key_short_circuits() {
        let temp_dir = TempDir::new().unwrap();
        let cache = StringCache::open(temp_dir.path().join("c.json")).unwrap();
        let value = cache
            .get_or_retrieve("", || async {
                Err(qdt_common::Error::External("must not be called".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(value, "");
        assert!(cache.is_empty().await);
    }
}
