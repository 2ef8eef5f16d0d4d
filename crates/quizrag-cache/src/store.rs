//! Backing stores for the cache gateway

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::RwLock, time::Instant};

use crate::{CacheError, Result};

/// Key/value store with per-key expiry.
///
/// Implementations report failures as errors; the gateway is the layer that
/// absorbs them.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Cheap connectivity check
    async fn ping(&self) -> Result<()>;

    /// Raw value for `key`, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Write many entries in one round trip, reporting success per entry.
    ///
    /// The default issues one `set_ex` per entry; stores with native
    /// pipelining should override it.
    async fn set_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<Vec<bool>> {
        let mut outcomes = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            outcomes.push(self.set_ex(key, value, ttl).await.is_ok());
        }
        Ok(outcomes)
    }

    /// Remove `keys`, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<usize>;

    /// Live keys matching a glob `pattern`
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

fn compile_pattern(pattern: &str) -> Result<glob::Pattern> {
    glob::Pattern::new(pattern).map_err(|_| CacheError::InvalidPattern {
        pattern: pattern.to_string(),
    })
}

/// In-process store.
///
/// `set_online(false)` makes every call fail with a backend error, which is
/// how outages are simulated without a network.
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, (String, Instant)>>>,
    online: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Number of unexpired entries, regardless of online state
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let data = self.data.read().await;
        data.values().filter(|(_, expires)| *expires > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn purge_expired(data: &mut HashMap<String, (String, Instant)>, now: Instant) {
        data.retain(|_, (_, expires)| *expires > now);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(CacheError::backend("memory store is offline"))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.ensure_online()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_online()?;
        let now = Instant::now();
        let mut data = self.data.write().await;
        match data.get(key) {
            Some((_, expires)) if *expires <= now => {
                data.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.ensure_online()?;
        let now = Instant::now();
        let expires = expiry_instant(now, ttl)?;
        let mut data = self.data.write().await;
        Self::purge_expired(&mut data, now);
        data.insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn set_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<Vec<bool>> {
        self.ensure_online()?;
        let now = Instant::now();
        let expires = expiry_instant(now, ttl)?;
        let mut data = self.data.write().await;
        Self::purge_expired(&mut data, now);
        for (key, value) in entries {
            data.insert(key.clone(), (value.clone(), expires));
        }
        Ok(vec![true; entries.len()])
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        self.ensure_online()?;
        let mut data = self.data.write().await;
        Ok(keys.iter().filter(|key| data.remove(*key).is_some()).count())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.ensure_online()?;
        let matcher = compile_pattern(pattern)?;
        let mut data = self.data.write().await;
        Self::purge_expired(&mut data, Instant::now());
        Ok(data
            .keys()
            .filter(|key| matcher.matches(key))
            .cloned()
            .collect())
    }
}

fn expiry_instant(now: Instant, ttl: Duration) -> Result<Instant> {
    now.checked_add(ttl).ok_or(CacheError::TtlOutOfRange {
        seconds: ttl.as_secs(),
    })
}

/// On-disk record; the original key is kept because file names are sanitized.
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    key: String,
    value: String,
    expires_at: DateTime<Utc>,
}

impl DiskRecord {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// One JSON file per key under a base directory
pub struct DiskStore {
    base_path: PathBuf,
}

impl DiskStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// File holding `key`; named by digest so distinct keys never share a file
    pub fn key_path(&self, key: &str) -> PathBuf {
        self.base_path
            .join(format!("{:x}.cache", md5::compute(key.as_bytes())))
    }

    async fn ensure_base_dir(&self) -> Result<()> {
        if !self.base_path.exists() {
            fs::create_dir_all(&self.base_path).await?;
        }
        Ok(())
    }

    async fn read_record(&self, path: &Path) -> Result<Option<DiskRecord>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path).await?;
        let record: DiskRecord = serde_json::from_str(&raw).map_err(|e| CacheError::Malformed {
            key: path.display().to_string(),
            message: e.to_string(),
        })?;
        if record.is_expired() {
            fs::remove_file(path).await?;
            return Ok(None);
        }
        Ok(Some(record))
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn ping(&self) -> Result<()> {
        self.ensure_base_dir().await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let record = self.read_record(&self.key_path(key)).await?;
        Ok(record
            .filter(|record| record.key == key)
            .map(|record| record.value))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.ensure_base_dir().await?;
        let out_of_range = || CacheError::TtlOutOfRange {
            seconds: ttl.as_secs(),
        };
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(out_of_range)?;
        let record = DiskRecord {
            key: key.to_string(),
            value: value.to_string(),
            expires_at,
        };
        let json = serde_json::to_string(&record)?;
        fs::write(self.key_path(key), json).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        let mut removed = 0;
        for key in keys {
            let path = self.key_path(key);
            if path.exists() {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = compile_pattern(pattern)?;
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "cache") {
                continue;
            }
            // Unreadable files are skipped rather than failing the scan
            if let Ok(Some(record)) = self.read_record(&path).await {
                if matcher.matches(&record.key) {
                    keys.push(record.key);
                }
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_memory_store_basic_operations() {
        let store = MemoryStore::new();

        store.set_ex("ns:quiz:a", "1", HOUR).await.unwrap();
        store.set_ex("ns:chunk:b", "2", HOUR).await.unwrap();
        assert_eq!(store.get("ns:quiz:a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("missing").await.unwrap(), None);

        let mut quiz_keys = store.keys("ns:quiz:*").await.unwrap();
        quiz_keys.sort();
        assert_eq!(quiz_keys, vec!["ns:quiz:a".to_string()]);

        let removed = store
            .delete(&["ns:quiz:a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_expiry() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.keys("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_offline_fails_every_call() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", HOUR).await.unwrap();
        store.set_online(false);

        assert!(store.ping().await.is_err());
        assert!(store.get("k").await.is_err());
        assert!(store.set_ex("k", "v2", HOUR).await.is_err());
        assert!(store.keys("*").await.is_err());

        store.set_online(true);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_memory_store_purges_expired_entries_on_write() {
        let store = MemoryStore::new();
        store
            .set_ex("old", "v", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.set_ex("new", "v", HOUR).await.unwrap();
        assert_eq!(store.data.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_an_error() {
        let huge = Duration::from_secs(u64::MAX);
        let memory = MemoryStore::new();
        assert!(matches!(
            memory.set_ex("k", "v", huge).await,
            Err(CacheError::TtlOutOfRange { .. })
        ));
        assert!(memory
            .set_many(&[("k".to_string(), "v".to_string())], huge)
            .await
            .is_err());

        let temp_dir = TempDir::new().unwrap();
        let disk = DiskStore::new(temp_dir.path());
        assert!(matches!(
            disk.set_ex("k", "v", huge).await,
            Err(CacheError::TtlOutOfRange { .. })
        ));
        assert_eq!(disk.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_rejects_bad_pattern() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.keys("ns:[").await,
            Err(CacheError::InvalidPattern { .. })
        ));
    }

    #[tokio::test]
    async fn test_disk_store_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::new(temp_dir.path().join("cache"));

        store.ping().await.unwrap();
        store.set_ex("ns:quiz:a", "payload", HOUR).await.unwrap();
        assert_eq!(
            store.get("ns:quiz:a").await.unwrap().as_deref(),
            Some("payload")
        );
        assert_eq!(store.keys("ns:*").await.unwrap(), vec!["ns:quiz:a"]);

        assert_eq!(store.delete(&["ns:quiz:a".to_string()]).await.unwrap(), 1);
        assert_eq!(store.get("ns:quiz:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disk_store_batch_and_expiry() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::new(temp_dir.path());

        let entries = vec![
            ("ns:chunk:1".to_string(), "a".to_string()),
            ("ns:chunk:2".to_string(), "b".to_string()),
        ];
        let outcomes = store.set_many(&entries, HOUR).await.unwrap();
        assert_eq!(outcomes, vec![true, true]);

        store
            .set_ex("ns:chunk:3", "c", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("ns:chunk:3").await.unwrap(), None);

        let mut keys = store.keys("ns:chunk:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["ns:chunk:1", "ns:chunk:2"]);
    }

    #[tokio::test]
    async fn test_disk_store_keeps_similar_keys_apart() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::new(temp_dir.path());

        store.set_ex("ns:search_results:atp_hybrid_5", "other", HOUR).await.unwrap();
        assert_eq!(store.get("ns:search_results:atp:hybrid:5").await.unwrap(), None);

        store.set_ex("ns:search_results:atp:hybrid:5", "mine", HOUR).await.unwrap();
        assert_eq!(
            store.get("ns:search_results:atp:hybrid:5").await.unwrap().as_deref(),
            Some("mine")
        );
        assert_eq!(
            store.get("ns:search_results:atp_hybrid_5").await.unwrap().as_deref(),
            Some("other")
        );
    }

    #[tokio::test]
    async fn test_disk_store_ignores_record_for_another_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::new(temp_dir.path());
        store.set_ex("ns:quiz:a", "payload", HOUR).await.unwrap();
        std::fs::copy(store.key_path("ns:quiz:a"), store.key_path("ns:quiz:b")).unwrap();

        assert_eq!(store.get("ns:quiz:b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disk_store_reports_corrupted_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::new(temp_dir.path());
        std::fs::write(store.key_path("ns:quiz:x"), "not json").unwrap();

        assert!(matches!(
            store.get("ns:quiz:x").await,
            Err(CacheError::Malformed { .. })
        ));
        assert!(store.keys("*").await.unwrap().is_empty());
    }
}
