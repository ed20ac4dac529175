//! Trade ledger and round persistence
//!
//! The ledger is the source of truth for portfolios. Round reports go to a
//! synchronous in-memory cache first and then fan out to durable sinks.

pub mod memory;
pub mod postgres;
pub mod publisher;
pub mod round_cache;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use publisher::RoundPublisher;
pub use round_cache::RoundCache;

use async_trait::async_trait;

use crate::domain::{RoundReport, TradeRecord};
use crate::error::Result;

/// Append-only record of executed trades
#[async_trait]
pub trait TradeLedger: Send + Sync {
    async fn record_trade(&self, trade: &TradeRecord) -> Result<()>;

    /// Every trade for an agent, oldest first
    async fn trades_for_agent(&self, agent_id: &str) -> Result<Vec<TradeRecord>>;

    /// Connectivity probe for the pre-round gate
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Durable destination for finished rounds
#[async_trait]
pub trait RoundSink: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, report: &RoundReport) -> Result<()>;
}
