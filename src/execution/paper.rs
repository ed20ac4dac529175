use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{ExecutionOutcome, ExecutionRequest, TradeExecutor};
use crate::domain::{ExecutionDetails, TradeAction, TradeRecord, TradeSide};
use crate::error::{ArenaError, Result};
use crate::persistence::TradeLedger;
use crate::portfolio::replay_trades;

/// Share precision for paper fills
const SHARE_DP: u32 = 8;

/// Simulated fills at the snapshot reference price, written to the ledger
pub struct PaperExecutor {
    ledger: Arc<dyn TradeLedger>,
}

impl PaperExecutor {
    pub fn new(ledger: Arc<dyn TradeLedger>) -> Self {
        Self { ledger }
    }

    async fn held_shares(&self, agent_id: &str, symbol: &str) -> Result<Decimal> {
        let trades = self.ledger.trades_for_agent(agent_id).await?;
        // Capital does not affect share counts
        let (_, lots) = replay_trades(Decimal::ZERO, &trades);
        Ok(lots.get(symbol).map(|(shares, _)| *shares).unwrap_or(Decimal::ZERO))
    }
}

#[async_trait]
impl TradeExecutor for PaperExecutor {
    fn is_paper(&self) -> bool {
        true
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        let decision = &request.decision;
        let price = match request.reference_price {
            Some(p) if p > Decimal::ZERO => p,
            _ => {
                return Ok(ExecutionOutcome::rejected(format!(
                    "no reference price for {}",
                    decision.symbol
                )))
            }
        };
        if decision.quantity <= Decimal::ZERO {
            return Ok(ExecutionOutcome::rejected("quantity must be positive"));
        }

        let (side, shares, usdc_amount) = match decision.action {
            TradeAction::Buy => {
                let shares = (decision.quantity / price).round_dp(SHARE_DP);
                (TradeSide::Buy, shares, decision.quantity)
            }
            TradeAction::Sell => {
                let held = self.held_shares(&request.agent_id, &decision.symbol).await?;
                if decision.quantity > held {
                    return Err(ArenaError::InsufficientHoldings {
                        symbol: decision.symbol.clone(),
                        requested: decision.quantity,
                        held,
                    });
                }
                (TradeSide::Sell, decision.quantity, (decision.quantity * price).round_dp(6))
            }
            TradeAction::Hold => {
                return Err(ArenaError::Execution("hold is never executed".to_string()))
            }
        };

        let record = TradeRecord {
            trade_id: Uuid::new_v4().to_string(),
            agent_id: request.agent_id.clone(),
            round_id: request.round_id.clone(),
            symbol: decision.symbol.clone(),
            side,
            shares,
            price,
            usdc_amount,
            paper: true,
            executed_at: Utc::now(),
        };
        self.ledger.record_trade(&record).await?;

        info!(
            agent_id = %record.agent_id,
            round_id = %record.round_id,
            symbol = %record.symbol,
            side = %record.side,
            shares = %record.shares,
            price = %record.price,
            "Paper trade filled"
        );

        Ok(ExecutionOutcome::filled(ExecutionDetails {
            trade_id: record.trade_id,
            fill_price: price,
            filled_shares: shares,
            usdc_amount,
            paper: true,
        }))
    }
}
