use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::decision::{TradeAction, TradingDecision};
use super::state::RoundPhase;

/// Safety rules the per-decision circuit breaker can fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerRule {
    AgentCircuitOpen,
    UnknownSymbol,
    MinConfidence,
    Cooldown,
    MaxTradesPerWindow,
    DrawdownLimit,
    MaxPositionSize,
    InsufficientCash,
    MaxAllocation,
    Oversell,
    ZeroQuantity,
}

impl BreakerRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerRule::AgentCircuitOpen => "agent_circuit_open",
            BreakerRule::UnknownSymbol => "unknown_symbol",
            BreakerRule::MinConfidence => "min_confidence",
            BreakerRule::Cooldown => "cooldown",
            BreakerRule::MaxTradesPerWindow => "max_trades_per_window",
            BreakerRule::DrawdownLimit => "drawdown_limit",
            BreakerRule::MaxPositionSize => "max_position_size",
            BreakerRule::InsufficientCash => "insufficient_cash",
            BreakerRule::MaxAllocation => "max_allocation",
            BreakerRule::Oversell => "oversell",
            BreakerRule::ZeroQuantity => "zero_quantity",
        }
    }
}

impl std::fmt::Display for BreakerRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record that a breaker rule fired, with enough detail to see what changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerActivation {
    pub agent_id: String,
    pub rule: BreakerRule,
    pub symbol: String,
    pub reason: String,
    pub original_action: TradeAction,
    pub original_quantity: Decimal,
    pub new_action: TradeAction,
    pub new_quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Fill details returned by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDetails {
    pub trade_id: String,
    pub fill_price: Decimal,
    /// Shares bought or sold
    pub filled_shares: Decimal,
    pub usdc_amount: Decimal,
    pub paper: bool,
}

/// Outcome of one agent's turn in one round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingRoundResult {
    pub agent_id: String,
    pub agent_name: String,
    /// Final decision, after any circuit-breaker replacement
    pub decision: TradingDecision,
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
    /// The decision call itself failed; `decision` is a synthetic hold
    #[serde(default)]
    pub agent_failed: bool,
}

/// Agreement across agents' non-hold actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consensus {
    NoTrades,
    Unanimous,
    Majority,
    Split,
}

impl Consensus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Consensus::NoTrades => "no_trades",
            Consensus::Unanimous => "unanimous",
            Consensus::Majority => "majority",
            Consensus::Split => "split",
        }
    }
}

impl std::fmt::Display for Consensus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregated, immutable outcome of `run_trading_round`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReport {
    pub round_id: String,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<TradingRoundResult>,
    pub errors: Vec<String>,
    pub circuit_breaker_activations: Vec<CircuitBreakerActivation>,
    pub lock_skipped: bool,
    pub phase: RoundPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<Consensus>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_version: Option<u64>,
    pub duration_ms: u64,
}

impl RoundReport {
    pub fn executed_count(&self) -> usize {
        self.results.iter().filter(|r| r.executed).count()
    }

    pub fn failed_agents(&self) -> impl Iterator<Item = &TradingRoundResult> {
        self.results.iter().filter(|r| r.agent_failed)
    }

    pub fn is_blocked(&self) -> bool {
        self.phase == RoundPhase::Blocked
    }
}
