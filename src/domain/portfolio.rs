use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One open position valued against the round snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_pct: Decimal,
}

impl PositionView {
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.current_price
    }

    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.average_cost
    }
}

/// Per-agent portfolio view for one round. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioContext {
    pub agent_id: String,
    pub cash_balance: Decimal,
    pub positions: Vec<PositionView>,
    pub total_value: Decimal,
    pub total_pnl: Decimal,
    pub total_pnl_pct: Decimal,
}

impl PortfolioContext {
    /// Safe default: all capital in cash, nothing held
    pub fn starting(agent_id: &str, initial_capital: Decimal) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            cash_balance: initial_capital,
            positions: Vec::new(),
            total_value: initial_capital,
            total_pnl: Decimal::ZERO,
            total_pnl_pct: Decimal::ZERO,
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&PositionView> {
        self.positions
            .iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Shares currently held for a symbol
    pub fn shares_of(&self, symbol: &str) -> Decimal {
        self.position(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn invested_value(&self) -> Decimal {
        self.positions.iter().map(|p| p.market_value()).sum()
    }
}
