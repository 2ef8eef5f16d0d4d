//! Stored cache records

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CacheClass;

/// Envelope written to the backing store for every cached artifact.
///
/// Entries are never patched in place; writing the same key again replaces
/// the whole envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub class: CacheClass,
    pub payload: serde_json::Value,
    pub ttl_seconds: u64,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        key: impl Into<String>,
        class: CacheClass,
        payload: serde_json::Value,
        ttl: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            class,
            payload,
            ttl_seconds: ttl.as_secs(),
            cached_at: Utc::now(),
        }
    }

    /// `None` when the TTL reaches past the representable calendar
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = i64::try_from(self.ttl_seconds).ok()?;
        self.cached_at
            .checked_add_signed(chrono::Duration::try_seconds(ttl)?)
    }
}

/// One element of a [`CacheGateway::set_batch`](crate::CacheGateway::set_batch) call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub class: CacheClass,
    pub identifier: String,
    pub payload: serde_json::Value,
}

impl BatchEntry {
    pub fn new(class: CacheClass, identifier: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            class,
            identifier: identifier.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_follows_ttl() {
        let entry = CacheEntry::new(
            "quiz_gen:quiz:q1",
            CacheClass::Quiz,
            serde_json::json!({"questions": []}),
            Duration::from_secs(1800),
        );
        assert_eq!(entry.ttl_seconds, 1800);
        let expires = entry.expires_at().unwrap();
        assert_eq!((expires - entry.cached_at).num_seconds(), 1800);
    }

    #[test]
    fn huge_ttl_has_no_expiry_instant() {
        let entry = CacheEntry::new(
            "k",
            CacheClass::Chunk,
            serde_json::Value::Null,
            Duration::from_secs(u64::MAX),
        );
        assert_eq!(entry.expires_at(), None);
    }

    #[test]
    fn envelope_serializes_class_in_snake_case() {
        let entry = CacheEntry::new(
            "k",
            CacheClass::SearchResults,
            serde_json::Value::Null,
            Duration::from_secs(1),
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["class"], "search_results");
    }
}
