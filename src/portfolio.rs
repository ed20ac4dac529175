//! Per-agent portfolio view, derived from the trade ledger each round.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::domain::{MarketSnapshot, PortfolioContext, PositionView, TradeRecord, TradeSide};
use crate::error::Result;
use crate::persistence::TradeLedger;

#[derive(Debug, Clone, Default)]
struct Lot {
    shares: Decimal,
    average_cost: Decimal,
}

/// Replay trades (oldest first) into cash and average-cost positions
pub fn replay_trades(
    initial_capital: Decimal,
    trades: &[TradeRecord],
) -> (Decimal, BTreeMap<String, (Decimal, Decimal)>) {
    let mut cash = initial_capital;
    let mut lots: BTreeMap<String, Lot> = BTreeMap::new();

    for trade in trades {
        match trade.side {
            TradeSide::Buy => {
                cash -= trade.usdc_amount;
                let lot = lots.entry(trade.symbol.clone()).or_default();
                let total_cost = lot.shares * lot.average_cost + trade.usdc_amount;
                lot.shares += trade.shares;
                if lot.shares > Decimal::ZERO {
                    lot.average_cost = total_cost / lot.shares;
                }
            }
            TradeSide::Sell => {
                cash += trade.usdc_amount;
                if let Some(lot) = lots.get_mut(&trade.symbol) {
                    lot.shares -= trade.shares;
                    if lot.shares <= Decimal::ZERO {
                        lots.remove(&trade.symbol);
                    }
                }
            }
        }
    }

    let positions = lots
        .into_iter()
        .map(|(symbol, lot)| (symbol, (lot.shares, lot.average_cost)))
        .collect();
    (cash, positions)
}

pub struct PortfolioBuilder {
    ledger: Arc<dyn TradeLedger>,
    initial_capital: Decimal,
}

impl PortfolioBuilder {
    pub fn new(ledger: Arc<dyn TradeLedger>, initial_capital: Decimal) -> Self {
        Self {
            ledger,
            initial_capital,
        }
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    /// Portfolio for `agent_id` valued at `snapshot` prices.
    ///
    /// Never fails: a ledger error yields the starting portfolio.
    pub async fn build(&self, agent_id: &str, snapshot: &MarketSnapshot) -> PortfolioContext {
        match self.try_build(agent_id, snapshot).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(agent_id, error = %e, "Portfolio read failed, using starting portfolio");
                PortfolioContext::starting(agent_id, self.initial_capital)
            }
        }
    }

    pub async fn try_build(
        &self,
        agent_id: &str,
        snapshot: &MarketSnapshot,
    ) -> Result<PortfolioContext> {
        let trades = self.ledger.trades_for_agent(agent_id).await?;
        let (cash, lots) = replay_trades(self.initial_capital, &trades);

        let positions: Vec<PositionView> = lots
            .into_iter()
            .map(|(symbol, (quantity, average_cost))| {
                // Missing symbols are valued at cost
                let current_price = snapshot.price_of(&symbol).unwrap_or(average_cost);
                let cost = quantity * average_cost;
                let unrealized_pnl = quantity * current_price - cost;
                let unrealized_pnl_pct = if cost > Decimal::ZERO {
                    (unrealized_pnl / cost * Decimal::ONE_HUNDRED).round_dp(4)
                } else {
                    Decimal::ZERO
                };
                PositionView {
                    symbol,
                    quantity,
                    average_cost,
                    current_price,
                    unrealized_pnl,
                    unrealized_pnl_pct,
                }
            })
            .collect();

        let invested: Decimal = positions.iter().map(|p| p.market_value()).sum();
        let total_value = cash + invested;
        let total_pnl = total_value - self.initial_capital;
        let total_pnl_pct = if self.initial_capital > Decimal::ZERO {
            (total_pnl / self.initial_capital * Decimal::ONE_HUNDRED).round_dp(4)
        } else {
            Decimal::ZERO
        };

        Ok(PortfolioContext {
            agent_id: agent_id.to_string(),
            cash_balance: cash,
            positions,
            total_value,
            total_pnl,
            total_pnl_pct,
        })
    }
}
