//! Market data: live quotes, synthetic fallback, shared snapshot cache

pub mod cache;
pub mod enrich;
pub mod provider;
pub mod source;
pub mod synthetic;

pub use cache::{CacheStats, SnapshotCache};
pub use enrich::{ContextEnricher, GrokNewsEnricher};
pub use provider::MarketSnapshotProvider;
pub use source::{JupiterPriceSource, PriceSource, Quote};
pub use synthetic::synthetic_quote;
