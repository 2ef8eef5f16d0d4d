//! # Quizrag Cache
//!
//! Resilient caching for retrieval, search and generation artifacts.
//!
//! ## Features
//!
//! - **Graceful degradation**: callers only ever see misses, `false` or zero
//!   counts when the backing store is down, never errors
//! - **Throttled health checks**: at most one connectivity probe per interval
//! - **Artifact classes**: `chunk`, `quiz`, `objectives` and `search_results`,
//!   each with its own default TTL
//! - **Deterministic keys**: `<namespace>:<class>:<identifier>`, long
//!   identifiers replaced by a content hash
//! - **Pluggable stores**: in-memory and on-disk backends behind [`CacheStore`]

pub mod config;
pub mod entry;
pub mod error;
pub mod gateway;
pub mod health;
pub mod key;
pub mod stats;
pub mod store;

pub use config::{CacheTtls, GatewayConfig};
pub use entry::{BatchEntry, CacheEntry};
pub use error::CacheError;
pub use gateway::{CacheDiagnostics, CacheGateway, CacheGatewayBuilder, CacheHealth, CacheStatus};
pub use health::HealthMonitor;
pub use key::{CacheClass, KeyDeriver, MAX_IDENTIFIER_LEN};
pub use stats::{CacheMetrics, CacheStats};
pub use store::{CacheStore, DiskStore, MemoryStore};

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, CacheError>;
