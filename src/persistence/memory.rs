use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{RoundSink, TradeLedger};
use crate::domain::{RoundReport, TradeRecord};
use crate::error::Result;

/// Process-local ledger and round store
#[derive(Clone, Default)]
pub struct MemoryStore {
    trades: Arc<RwLock<Vec<TradeRecord>>>,
    rounds: Arc<RwLock<Vec<RoundReport>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all_trades(&self) -> Vec<TradeRecord> {
        self.trades.read().await.clone()
    }

    pub async fn rounds(&self) -> Vec<RoundReport> {
        self.rounds.read().await.clone()
    }
}

#[async_trait]
impl TradeLedger for MemoryStore {
    async fn record_trade(&self, trade: &TradeRecord) -> Result<()> {
        self.trades.write().await.push(trade.clone());
        Ok(())
    }

    async fn trades_for_agent(&self, agent_id: &str) -> Result<Vec<TradeRecord>> {
        let mut trades: Vec<TradeRecord> = self
            .trades
            .read()
            .await
            .iter()
            .filter(|t| t.agent_id == agent_id)
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.executed_at);
        Ok(trades)
    }
}

#[async_trait]
impl RoundSink for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(&self, report: &RoundReport) -> Result<()> {
        self.rounds.write().await.push(report.clone());
        Ok(())
    }
}
