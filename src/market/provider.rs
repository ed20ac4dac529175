//! Shared market snapshot for a round.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::cache::{CacheStats, SnapshotCache};
use super::source::{PriceSource, Quote};
use super::synthetic::{complete_quote, synthetic_quote};
use crate::config::MarketConfig;
use crate::domain::{MarketData, MarketSnapshot, PriceSourceKind, StockInfo, STOCK_CATALOG};
use rust_decimal::Decimal;

/// Serves one `Arc<MarketSnapshot>` per TTL window.
///
/// A miss fetches the whole catalog once; symbols the source does not return
/// (or every symbol, when the source fails or times out) get synthetic quotes,
/// so a snapshot always covers the full catalog.
pub struct MarketSnapshotProvider {
    source: Option<Arc<dyn PriceSource>>,
    cache: SnapshotCache,
    refresh_lock: Mutex<()>,
    fetch_timeout: Duration,
    min_volume: Option<Decimal>,
    catalog: Vec<StockInfo>,
}

impl MarketSnapshotProvider {
    pub fn new(source: Option<Arc<dyn PriceSource>>, config: &MarketConfig) -> Self {
        Self {
            source,
            cache: SnapshotCache::new(Duration::from_secs(config.cache_ttl_secs)),
            refresh_lock: Mutex::new(()),
            fetch_timeout: Duration::from_millis(config.fetch_timeout_ms),
            min_volume: config.min_volume_usd,
            catalog: STOCK_CATALOG.to_vec(),
        }
    }

    /// Provider with no upstream; every quote is synthetic
    pub fn offline(config: &MarketConfig) -> Self {
        Self::new(None, config)
    }

    pub fn source(&self) -> Option<Arc<dyn PriceSource>> {
        self.source.clone()
    }

    pub async fn get_snapshot(&self) -> Arc<MarketSnapshot> {
        if let Some(snapshot) = self.cache.get_fresh().await {
            return snapshot;
        }

        let _refresh = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(snapshot) = self.cache.get_fresh().await {
            return snapshot;
        }

        let quotes = self.fetch_live().await;
        let snapshot = self.assemble(&quotes);
        let published = self.cache.replace(snapshot).await;
        info!(
            version = published.version,
            symbols = published.len(),
            synthetic = published.synthetic_count(),
            filtered = published.filtered_out.len(),
            "Market snapshot refreshed"
        );
        published
    }

    /// Last published snapshot without triggering a refresh
    pub async fn peek(&self) -> Option<Arc<MarketSnapshot>> {
        self.cache.peek().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    async fn fetch_live(&self) -> HashMap<String, Quote> {
        let Some(source) = self.source.as_ref() else {
            return HashMap::new();
        };

        match tokio::time::timeout(self.fetch_timeout, source.fetch_quotes(&self.catalog)).await {
            Ok(Ok(quotes)) => quotes,
            Ok(Err(e)) => {
                warn!(source = source.name(), error = %e, "Price fetch failed, using synthetic quotes");
                HashMap::new()
            }
            Err(_) => {
                warn!(
                    source = source.name(),
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "Price fetch timed out, using synthetic quotes"
                );
                HashMap::new()
            }
        }
    }

    fn assemble(&self, live: &HashMap<String, Quote>) -> MarketSnapshot {
        let mut items: Vec<MarketData> = self
            .catalog
            .iter()
            .map(|stock| match live.get(stock.mint) {
                Some(quote) => to_market_data(stock, complete_quote(stock, quote), PriceSourceKind::Live),
                None => {
                    debug!(symbol = stock.symbol, "No live quote, synthesizing");
                    to_market_data(stock, synthetic_quote(stock), PriceSourceKind::Synthetic)
                }
            })
            .collect();

        let mut filtered_out = Vec::new();
        if let Some(min_volume) = self.min_volume {
            let (kept, dropped): (Vec<_>, Vec<_>) = items
                .iter()
                .cloned()
                .partition(|m| m.volume_24h.unwrap_or(Decimal::ZERO) >= min_volume);

            if kept.is_empty() {
                warn!(
                    min_volume = %min_volume,
                    "Liquidity filter would remove every symbol, keeping full list"
                );
            } else {
                filtered_out = dropped.iter().map(|m| m.symbol.clone()).collect();
                if !filtered_out.is_empty() {
                    info!(symbols = ?filtered_out, min_volume = %min_volume, "Filtered illiquid symbols");
                }
                items = kept;
            }
        }

        let mut snapshot = MarketSnapshot::new(items);
        snapshot.filtered_out = filtered_out;
        snapshot
    }
}

fn to_market_data(stock: &StockInfo, quote: Quote, source: PriceSourceKind) -> MarketData {
    MarketData {
        symbol: stock.symbol.to_string(),
        name: stock.name.to_string(),
        mint: stock.mint.to_string(),
        price: quote.price,
        change_24h: quote.change_24h,
        volume_24h: quote.volume_24h,
        source,
        notes: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ArenaError, Result};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PriceSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch_quotes(&self, stocks: &[StockInfo]) -> Result<HashMap<String, Quote>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ArenaError::MarketDataUnavailable("down".into()));
            }
            // Only the first symbol is live
            let first = &stocks[0];
            Ok(HashMap::from([(
                first.mint.to_string(),
                Quote {
                    price: dec!(199.5),
                    change_24h: None,
                    volume_24h: Some(dec!(10)),
                },
            )]))
        }
    }

    fn config() -> MarketConfig {
        MarketConfig {
            cache_ttl_secs: 60,
            ..MarketConfig::default()
        }
    }

    #[tokio::test]
    async fn test_partial_live_rest_synthetic() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let provider = MarketSnapshotProvider::new(Some(source.clone()), &config());
        let snap = provider.get_snapshot().await;

        assert_eq!(snap.len(), STOCK_CATALOG.len());
        assert_eq!(snap.items[0].price, dec!(199.5));
        assert_eq!(snap.items[0].source, PriceSourceKind::Live);
        assert!(snap.items[0].change_24h.is_some());
        assert_eq!(snap.synthetic_count(), STOCK_CATALOG.len() - 1);
        for item in &snap.items {
            assert!(item.price > Decimal::ZERO);
            assert!(item.change_24h.is_some() && item.volume_24h.is_some());
        }
    }

    #[tokio::test]
    async fn test_failure_falls_back_for_every_symbol() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let provider = MarketSnapshotProvider::new(Some(source), &config());
        let snap = provider.get_snapshot().await;
        assert_eq!(snap.synthetic_count(), STOCK_CATALOG.len());
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_upstream() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let provider = MarketSnapshotProvider::new(Some(source.clone()), &config());

        let a = provider.get_snapshot().await;
        let b = provider.get_snapshot().await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let provider = Arc::new(MarketSnapshotProvider::new(Some(source.clone()), &config()));

        let (a, b) = tokio::join!(provider.get_snapshot(), provider.get_snapshot());
        assert_eq!(a.version, b.version);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_liquidity_filter_hides_but_keeps_when_empty() {
        let mut cfg = config();
        cfg.min_volume_usd = Some(dec!(1_000_000_000));
        // Nothing clears a billion, so the full list is kept
        let provider = MarketSnapshotProvider::offline(&cfg);
        let snap = provider.get_snapshot().await;
        assert_eq!(snap.len(), STOCK_CATALOG.len());
        assert!(snap.filtered_out.is_empty());

        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        cfg.min_volume_usd = Some(dec!(1_000));
        // The live symbol reports volume 10 and is filtered
        let provider = MarketSnapshotProvider::new(Some(source), &cfg);
        let snap = provider.get_snapshot().await;
        assert_eq!(snap.filtered_out, vec![STOCK_CATALOG[0].symbol.to_string()]);
        assert!(snap.get(STOCK_CATALOG[0].symbol).is_none());
    }
}
