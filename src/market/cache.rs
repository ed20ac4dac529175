//! Versioned snapshot cache.
//!
//! Lifecycle: empty → populated on first miss → replaced wholesale on expiry.
//! Readers always get a complete `Arc<MarketSnapshot>`; the entry is swapped
//! under a write lock, never patched field by field.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::MarketSnapshot;

struct CacheEntry {
    snapshot: Arc<MarketSnapshot>,
    refreshed_at: Instant,
    refreshed_at_utc: DateTime<Utc>,
}

/// Cache statistics for status output
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub version: u64,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub hits: u64,
    pub misses: u64,
}

pub struct SnapshotCache {
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
    version: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
            version: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached snapshot if still within TTL
    pub async fn get_fresh(&self) -> Option<Arc<MarketSnapshot>> {
        let guard = self.entry.read().await;
        match guard.as_ref() {
            Some(entry) if entry.refreshed_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.snapshot.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Last published snapshot regardless of age
    pub async fn peek(&self) -> Option<Arc<MarketSnapshot>> {
        self.entry.read().await.as_ref().map(|e| e.snapshot.clone())
    }

    /// Publish a new snapshot, stamping it with the next version
    pub async fn replace(&self, mut snapshot: MarketSnapshot) -> Arc<MarketSnapshot> {
        let mut guard = self.entry.write().await;
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        snapshot.version = version;
        let snapshot = Arc::new(snapshot);
        *guard = Some(CacheEntry {
            snapshot: snapshot.clone(),
            refreshed_at: Instant::now(),
            refreshed_at_utc: Utc::now(),
        });
        snapshot
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub async fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.entry.read().await.as_ref().map(|e| e.refreshed_at_utc)
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            version: self.version(),
            last_refreshed_at: self.last_refreshed_at().await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_cache_misses() {
        let cache = SnapshotCache::new(Duration::from_secs(10));
        assert!(cache.get_fresh().await.is_none());
        assert!(cache.peek().await.is_none());
        assert_eq!(cache.version(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = SnapshotCache::new(Duration::from_secs(10));
        let published = cache.replace(MarketSnapshot::new(Vec::new())).await;
        assert_eq!(published.version, 1);

        let hit = cache.get_fresh().await.unwrap();
        assert!(Arc::ptr_eq(&hit, &published));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get_fresh().await.is_none());
        // Stale entry is still visible to read-only callers
        assert!(cache.peek().await.is_some());
    }

    #[tokio::test]
    async fn test_replace_bumps_version() {
        let cache = SnapshotCache::new(Duration::from_secs(10));
        cache.replace(MarketSnapshot::new(Vec::new())).await;
        let second = cache.replace(MarketSnapshot::new(Vec::new())).await;
        assert_eq!(second.version, 2);
        assert_eq!(cache.stats().await.version, 2);
        assert_eq!(cache.version(), 2);
    }
}
