//! Agent account monitoring: funding checks and balance snapshots.
//!
//! Both calls are advisory. The orchestrator runs them through its
//! best-effort wrapper, so failures here are logged and never stop a round.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::persistence::TradeLedger;
use crate::portfolio::replay_trades;

/// When in the agent's turn a balance snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePhase {
    PreTrade,
    PostTrade,
}

#[derive(Debug, Clone, Serialize)]
pub struct FundingStatus {
    pub agent_id: String,
    pub available_usd: Decimal,
    pub required_usd: Decimal,
    pub funded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceSnapshot {
    pub agent_id: String,
    pub round_id: String,
    pub phase: BalancePhase,
    pub cash_usd: Decimal,
    pub taken_at: DateTime<Utc>,
}

#[async_trait]
pub trait AccountMonitor: Send + Sync {
    async fn check_funding(&self, agent_id: &str) -> Result<FundingStatus>;

    async fn snapshot_balance(
        &self,
        agent_id: &str,
        round_id: &str,
        phase: BalancePhase,
    ) -> Result<BalanceSnapshot>;
}

/// Account monitor backed by the trade ledger (paper accounts)
pub struct LedgerAccountMonitor {
    ledger: Arc<dyn TradeLedger>,
    initial_capital: Decimal,
    min_funding_usd: Decimal,
    history: DashMap<String, Vec<BalanceSnapshot>>,
    history_limit: usize,
}

impl LedgerAccountMonitor {
    pub fn new(ledger: Arc<dyn TradeLedger>, initial_capital: Decimal, min_funding_usd: Decimal) -> Self {
        Self {
            ledger,
            initial_capital,
            min_funding_usd,
            history: DashMap::new(),
            history_limit: 200,
        }
    }

    async fn cash_of(&self, agent_id: &str) -> Result<Decimal> {
        let trades = self.ledger.trades_for_agent(agent_id).await?;
        Ok(replay_trades(self.initial_capital, &trades).0)
    }

    /// Most recent balance snapshot for an agent
    pub fn latest(&self, agent_id: &str) -> Option<BalanceSnapshot> {
        self.history.get(agent_id).and_then(|h| h.last().cloned())
    }
}

#[async_trait]
impl AccountMonitor for LedgerAccountMonitor {
    async fn check_funding(&self, agent_id: &str) -> Result<FundingStatus> {
        let available = self.cash_of(agent_id).await?;
        let funded = available >= self.min_funding_usd;
        if !funded {
            warn!(
                agent_id,
                available = %available,
                required = %self.min_funding_usd,
                "Agent below minimum funding"
            );
        }
        Ok(FundingStatus {
            agent_id: agent_id.to_string(),
            available_usd: available,
            required_usd: self.min_funding_usd,
            funded,
        })
    }

    async fn snapshot_balance(
        &self,
        agent_id: &str,
        round_id: &str,
        phase: BalancePhase,
    ) -> Result<BalanceSnapshot> {
        let snapshot = BalanceSnapshot {
            agent_id: agent_id.to_string(),
            round_id: round_id.to_string(),
            phase,
            cash_usd: self.cash_of(agent_id).await?,
            taken_at: Utc::now(),
        };
        debug!(agent_id, ?phase, cash = %snapshot.cash_usd, "Balance snapshot");

        let mut history = self.history.entry(agent_id.to_string()).or_default();
        history.push(snapshot.clone());
        if history.len() > self.history_limit {
            let excess = history.len() - self.history_limit;
            history.drain(..excess);
        }
        Ok(snapshot)
    }
}
