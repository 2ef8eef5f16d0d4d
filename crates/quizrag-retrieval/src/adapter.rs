//! Contracts shared by every retrieval strategy.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{AdapterResult, RetrievedPassage, SourceStrategy};

/// A first-pass retriever: dense, sparse or substring fallback.
#[async_trait]
pub trait RetrieverAdapter: Send + Sync {
    /// Human-readable adapter name used in logs and health reports
    fn name(&self) -> &str;

    /// Tag carried by every passage this adapter returns
    fn strategy(&self) -> SourceStrategy;

    /// Cheap, non-blocking availability probe
    fn is_available(&self) -> bool;

    /// Up to `k` passages, best first
    async fn retrieve(&self, query: &str, k: usize) -> AdapterResult<Vec<RetrievedPassage>>;

    fn health(&self) -> AdapterHealthStatus {
        AdapterHealthStatus::from_availability(self.is_available())
    }
}

/// Re-orders a candidate set; its output order replaces the input order.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievedPassage>,
    ) -> AdapterResult<Vec<RetrievedPassage>>;

    fn health(&self) -> AdapterHealthStatus {
        AdapterHealthStatus::from_availability(self.is_available())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or_default()
}

/// Last success / last failure bookkeeping for one adapter
#[derive(Debug, Default)]
pub struct AdapterHealth {
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    last_failure_message: Mutex<Option<String>>,
}

impl AdapterHealth {
    pub fn record_success(&self) {
        self.last_success_ms.store(now_millis(), Ordering::Relaxed);
    }

    pub fn record_failure(&self, message: impl Into<String>) {
        self.last_failure_ms.store(now_millis(), Ordering::Relaxed);
        *self.last_failure_message.lock() = Some(message.into());
    }

    /// Snapshot; `available` comes from the adapter, not from call history
    pub fn status(&self, available: bool) -> AdapterHealthStatus {
        let success = self.last_success_ms.load(Ordering::Relaxed);
        let failure = self.last_failure_ms.load(Ordering::Relaxed);
        AdapterHealthStatus {
            available,
            healthy: available && success >= failure,
            last_success_ms: (success != 0).then_some(success),
            last_failure_ms: (failure != 0).then_some(failure),
            last_failure_message: self.last_failure_message.lock().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterHealthStatus {
    pub available: bool,
    pub healthy: bool,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub last_failure_message: Option<String>,
}

impl AdapterHealthStatus {
    pub fn from_availability(available: bool) -> Self {
        Self {
            available,
            healthy: available,
            last_success_ms: None,
            last_failure_ms: None,
            last_failure_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_tracks_latest_outcome() {
        let health = AdapterHealth::default();
        assert!(health.status(true).healthy);

        health.record_failure("connection refused");
        let status = health.status(true);
        assert!(!status.healthy);
        assert_eq!(
            status.last_failure_message.as_deref(),
            Some("connection refused")
        );

        std::thread::sleep(std::time::Duration::from_millis(2));
        health.record_success();
        assert!(health.status(true).healthy);
        assert!(!health.status(false).healthy);
    }
}
