use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::find_stock;

/// Action proposed by an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
            TradeAction::Hold => "hold",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(TradeAction::Buy),
            "sell" => Some(TradeAction::Sell),
            "hold" => Some(TradeAction::Hold),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A proposed trade.
///
/// `quantity` is the USDC notional for buys and the share count for sells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingDecision {
    pub action: TradeAction,
    pub symbol: String,
    pub quantity: Decimal,
    pub reasoning: String,
    /// Confidence in percent once normalized (0-100)
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TradingDecision {
    pub fn new(action: TradeAction, symbol: &str, quantity: Decimal, reasoning: &str) -> Self {
        Self {
            action,
            symbol: symbol.to_string(),
            quantity,
            reasoning: reasoning.to_string(),
            confidence: 0.0,
            predicted_outcome: None,
            sources: Vec::new(),
            intent: None,
            timestamp: Utc::now(),
        }
    }

    /// A zero-quantity hold carrying the given reasoning
    pub fn hold(reasoning: &str) -> Self {
        Self::new(TradeAction::Hold, "", Decimal::ZERO, reasoning)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn is_hold(&self) -> bool {
        self.action == TradeAction::Hold
    }

    /// Scale 0-1 confidences to percent, clamp to [0, 100] and canonicalize
    /// the symbol against the catalog.
    pub fn normalized(mut self) -> Self {
        let c = if self.confidence.is_finite() {
            self.confidence
        } else {
            0.0
        };
        let scaled = if c > 0.0 && c <= 1.0 { c * 100.0 } else { c };
        self.confidence = scaled.clamp(0.0, 100.0);

        let trimmed = self.symbol.trim();
        self.symbol = match find_stock(trimmed) {
            Some(stock) => stock.symbol.to_string(),
            None => trimmed.to_string(),
        };
        if self.quantity < Decimal::ZERO {
            self.quantity = Decimal::ZERO;
        }
        self
    }

    /// Replacement with a different action/quantity; everything else carried over
    pub fn replaced(&self, action: TradeAction, quantity: Decimal, note: &str) -> Self {
        let mut next = self.clone();
        next.action = action;
        next.quantity = if action == TradeAction::Hold {
            Decimal::ZERO
        } else {
            quantity
        };
        next.reasoning = format!("{} [circuit breaker: {}]", self.reasoning, note);
        next
    }
}
