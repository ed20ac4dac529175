//! AgentDecider: the one call the orchestrator makes into an agent
//!
//! An agent sees the round's shared snapshot and its own portfolio view and
//! returns one proposal. Everything after that (normalization, breaker,
//! execution) belongs to the orchestrator.

use async_trait::async_trait;

use crate::domain::{MarketSnapshot, PortfolioContext, TradingDecision};
use crate::error::Result;

#[async_trait]
pub trait AgentDecider: Send + Sync {
    /// Unique identifier for this agent instance
    fn id(&self) -> &str;

    /// Human-readable name used in round summaries
    fn name(&self) -> &str;

    /// Propose one trade for this round.
    ///
    /// Errors are isolated to this agent: the orchestrator records a hold
    /// with the error text and moves on.
    async fn decide(
        &self,
        market: &MarketSnapshot,
        portfolio: &PortfolioContext,
    ) -> Result<TradingDecision>;
}
