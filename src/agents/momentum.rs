//! Deterministic momentum trader.
//!
//! Needs no network access, which makes it the default offline agent and a
//! stable baseline next to LLM agents.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::traits::AgentDecider;
use crate::config::{AgentSettings, RiskConfig};
use crate::domain::{MarketSnapshot, PortfolioContext, TradeAction, TradingDecision};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct MomentumConfig {
    /// Buy the top mover when its 24h change is at least this (percent)
    pub buy_threshold_pct: Decimal,
    /// Exit a held position whose 24h change is at or below -this (percent)
    pub exit_threshold_pct: Decimal,
    /// USDC notional per buy
    pub trade_usd: Decimal,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            buy_threshold_pct: dec!(1.0),
            exit_threshold_pct: dec!(2.0),
            trade_usd: dec!(10),
        }
    }
}

pub struct MomentumTrader {
    id: String,
    name: String,
    config: MomentumConfig,
}

impl MomentumTrader {
    pub fn new(id: &str, name: &str, config: MomentumConfig) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            config,
        }
    }

    pub fn from_settings(settings: &AgentSettings, risk: &RiskConfig) -> Self {
        let config = MomentumConfig {
            trade_usd: risk.max_trade_usd.min(MomentumConfig::default().trade_usd),
            ..MomentumConfig::default()
        };
        Self::new(&settings.id, &settings.name, config)
    }

    fn confidence_for(change: Decimal) -> f64 {
        let c = change.abs().to_f64().unwrap_or(0.0);
        (50.0 + c * 10.0).min(95.0)
    }
}

#[async_trait]
impl AgentDecider for MomentumTrader {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn decide(
        &self,
        market: &MarketSnapshot,
        portfolio: &PortfolioContext,
    ) -> Result<TradingDecision> {
        // Cut the worst held loser first
        let exit = portfolio
            .positions
            .iter()
            .filter(|p| p.quantity > Decimal::ZERO)
            .filter_map(|p| {
                let change = market.get(&p.symbol)?.change_24h?;
                (change <= -self.config.exit_threshold_pct).then_some((p, change))
            })
            .min_by(|a, b| a.1.cmp(&b.1));

        if let Some((position, change)) = exit {
            return Ok(TradingDecision::new(
                TradeAction::Sell,
                &position.symbol,
                position.quantity,
                &format!("{} down {}% over 24h, exiting", position.symbol, change.round_dp(2)),
            )
            .with_confidence(Self::confidence_for(change)));
        }

        let leader = market
            .items
            .iter()
            .filter_map(|m| m.change_24h.map(|c| (m, c)))
            .max_by(|a, b| a.1.cmp(&b.1));

        match leader {
            Some((item, change)) if change >= self.config.buy_threshold_pct => {
                let notional = self.config.trade_usd.min(portfolio.cash_balance);
                if notional <= Decimal::ZERO {
                    return Ok(TradingDecision::hold("No cash available for momentum entry")
                        .with_confidence(50.0));
                }
                Ok(TradingDecision::new(
                    TradeAction::Buy,
                    &item.symbol,
                    notional,
                    &format!("{} leads the market, up {}% over 24h", item.symbol, change.round_dp(2)),
                )
                .with_confidence(Self::confidence_for(change)))
            }
            _ => Ok(TradingDecision::hold("No symbol shows enough momentum").with_confidence(50.0)),
        }
    }
}
