use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use proptest::prelude::*;
use quizrag_cache::{
    BatchEntry, CacheClass, CacheError, CacheGateway, CacheStore, DiskStore, KeyDeriver,
    MemoryStore, Result, MAX_IDENTIFIER_LEN,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::TempDir;

/// Store whose batch writes fail for keys containing "reject"
struct PartialStore {
    inner: MemoryStore,
}

#[async_trait]
impl CacheStore for PartialStore {
    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        if key.contains("reject") {
            return Err(CacheError::backend("write refused"));
        }
        self.inner.set_ex(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        self.inner.delete(keys).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.inner.keys(pattern).await
    }
}

/// Store that never answers in time
struct StallingStore;

#[async_trait]
impl CacheStore for StallingStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    async fn delete(&self, _keys: &[String]) -> Result<usize> {
        Ok(0)
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Quiz {
    title: String,
    questions: Vec<String>,
}

#[tokio::test]
async fn test_partial_batch_success_is_counted() {
    let store = Arc::new(PartialStore {
        inner: MemoryStore::new(),
    });
    let gateway = CacheGateway::builder().store(store).build();

    let entries = vec![
        BatchEntry::new(CacheClass::Chunk, "ok-1", json!("a")),
        BatchEntry::new(CacheClass::Chunk, "reject-me", json!("b")),
        BatchEntry::new(CacheClass::Chunk, "ok-2", json!("c")),
    ];
    assert_eq!(gateway.set_batch(entries, None).await, 2);
    assert_eq!(
        gateway.get::<String>(CacheClass::Chunk, "ok-2").await,
        Some("c".to_string())
    );
    assert!(gateway.health().await.connected);
}

#[tokio::test]
async fn test_slow_store_times_out_into_miss() {
    let gateway = CacheGateway::builder()
        .store(Arc::new(StallingStore))
        .operation_timeout(Duration::from_millis(20))
        .health_check_interval(Duration::from_secs(3600))
        .build();

    assert_eq!(gateway.get::<String>(CacheClass::Quiz, "q").await, None);
    let stats = gateway.stats().await;
    assert_eq!(stats.errors, 1);
    assert!(!stats.is_connected);

    // Disconnected now: the next write does not even reach the store
    assert!(!gateway.set(CacheClass::Quiz, "q", &"x", None).await);
    assert_eq!(gateway.stats().await.errors, 1);
}

#[tokio::test]
async fn test_typed_payload_through_disk_store() {
    let temp_dir = TempDir::new().unwrap();
    let gateway = CacheGateway::builder()
        .store(Arc::new(DiskStore::new(temp_dir.path())))
        .namespace("quiz_gen")
        .build();

    let quiz = Quiz {
        title: "Cell biology".to_string(),
        questions: vec!["What produces ATP?".to_string()],
    };
    assert!(gateway.set(CacheClass::Quiz, "doc-7", &quiz, None).await);
    assert_eq!(gateway.get::<Quiz>(CacheClass::Quiz, "doc-7").await, Some(quiz));

    assert_eq!(gateway.invalidate(Some("quiz")).await, 1);
    assert_eq!(gateway.get::<Quiz>(CacheClass::Quiz, "doc-7").await, None);
}

#[tokio::test]
async fn test_class_ttl_override_from_builder() {
    let gateway = CacheGateway::builder()
        .store(Arc::new(MemoryStore::new()))
        .ttl(CacheClass::SearchResults, Duration::from_millis(20))
        .build();

    gateway
        .set(CacheClass::SearchResults, "atp:hybrid:5", &vec!["p"], None)
        .await;
    gateway.set(CacheClass::Chunk, "c", &"kept", None).await;
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert_eq!(
        gateway
            .get::<Vec<String>>(CacheClass::SearchResults, "atp:hybrid:5")
            .await,
        None
    );
    assert_eq!(
        gateway.get::<String>(CacheClass::Chunk, "c").await,
        Some("kept".to_string())
    );
}

proptest! {
    #[test]
    fn derived_keys_are_bounded_and_deterministic(identifier in ".{0,300}") {
        let keys = KeyDeriver::new("quiz_gen");
        let key = keys.derive(CacheClass::Chunk, &identifier);
        prop_assert_eq!(&key, &keys.derive(CacheClass::Chunk, &identifier));
        prop_assert!(key.starts_with("quiz_gen:chunk:"));

        let suffix = &key["quiz_gen:chunk:".len()..];
        if identifier.chars().count() > MAX_IDENTIFIER_LEN {
            prop_assert_eq!(suffix.len(), 32);
        } else {
            prop_assert_eq!(suffix, identifier.as_str());
        }
    }
}
