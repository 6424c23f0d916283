//! In-memory [`QueryCache`] backed by [`DashMap`].
//!
//! Suitable for development, tests, and single-node deployments where the
//! persisted-query registry fits in memory. Production deployments that need
//! cross-node persistence plug in their own [`QueryCache`] implementation.

use async_trait::async_trait;
use dashmap::DashMap;

use querygate_core::QueryCache;

/// Concurrent in-memory query cache. Reads are lock-free; writes use
/// `DashMap`'s internal sharding, so concurrent idempotent writes of the
/// same key are safe.
#[derive(Debug, Default)]
pub struct MemoryQueryCache {
    entries: DashMap<String, String>,
}

impl MemoryQueryCache {
    /// Creates a new, empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl QueryCache for MemoryQueryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
