//! Per-decision circuit breaker
//!
//! `check` is a pure replacement transform: a decision goes in, a (possibly
//! replaced) decision comes out together with one activation per rule that
//! fired. The only state it reads is each agent's execution history, which is
//! fed back through `record_execution`.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::domain::{
    find_stock, BreakerRule, CircuitBreakerActivation, PortfolioContext, TradeAction,
    TradingDecision,
};

/// Execution-failure circuit state for one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Too many consecutive failed executions; every trade is held
    Open,
    /// Recovery probe: the next execution decides
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone)]
struct AgentCircuit {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    last_trip_reason: Option<String>,
    total_trips: u64,
    /// Successful executions, oldest first
    executions: VecDeque<DateTime<Utc>>,
}

impl AgentCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            last_trip_reason: None,
            total_trips: 0,
            executions: VecDeque::new(),
        }
    }
}

/// Statistics for status output
#[derive(Debug, Clone)]
pub struct AgentBreakerStats {
    pub agent_id: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_trip_reason: Option<String>,
    pub total_trips: u64,
    pub last_execution: Option<DateTime<Utc>>,
}

/// Result of running one decision through the breaker
#[derive(Debug, Clone)]
pub struct BreakerVerdict {
    /// False when the decision was forced to hold
    pub allowed: bool,
    pub decision: TradingDecision,
    pub activations: Vec<CircuitBreakerActivation>,
}

pub struct DecisionCircuitBreaker {
    config: RiskConfig,
    agents: DashMap<String, AgentCircuit>,
}

impl DecisionCircuitBreaker {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            agents: DashMap::new(),
        }
    }

    pub fn check(
        &self,
        agent_id: &str,
        decision: &TradingDecision,
        portfolio: &PortfolioContext,
    ) -> BreakerVerdict {
        self.check_at(agent_id, decision, portfolio, Utc::now())
    }

    pub fn check_at(
        &self,
        agent_id: &str,
        decision: &TradingDecision,
        portfolio: &PortfolioContext,
        now: DateTime<Utc>,
    ) -> BreakerVerdict {
        let mut verdict = Verdict::new(agent_id, decision);
        if decision.is_hold() {
            return verdict.finish();
        }

        if !self.agent_allows(agent_id, now) {
            verdict.force_hold(
                BreakerRule::AgentCircuitOpen,
                "agent circuit open after repeated execution failures".to_string(),
            );
            return verdict.finish();
        }

        if find_stock(&decision.symbol).is_none() {
            verdict.force_hold(
                BreakerRule::UnknownSymbol,
                format!("'{}' is not in the catalog", decision.symbol),
            );
            return verdict.finish();
        }

        if decision.confidence < self.config.min_confidence {
            verdict.force_hold(
                BreakerRule::MinConfidence,
                format!(
                    "confidence {:.1}% below minimum {:.1}%",
                    decision.confidence, self.config.min_confidence
                ),
            );
            return verdict.finish();
        }

        let (last_execution, in_window) = self.execution_history(agent_id, now);
        if let Some(last) = last_execution {
            let since = (now - last).num_seconds().max(0) as u64;
            if since < self.config.cooldown_secs {
                verdict.force_hold(
                    BreakerRule::Cooldown,
                    format!(
                        "last trade {}s ago, cooldown is {}s",
                        since, self.config.cooldown_secs
                    ),
                );
                return verdict.finish();
            }
        }

        if in_window >= self.config.max_trades_per_window as usize {
            verdict.force_hold(
                BreakerRule::MaxTradesPerWindow,
                format!(
                    "{} trades in the last {}s (max {})",
                    in_window, self.config.trade_window_secs, self.config.max_trades_per_window
                ),
            );
            return verdict.finish();
        }

        match decision.action {
            TradeAction::Buy => {
                if portfolio.total_pnl_pct < -self.config.max_drawdown_pct {
                    verdict.force_hold(
                        BreakerRule::DrawdownLimit,
                        format!(
                            "portfolio P&L {}% below -{}% drawdown limit",
                            portfolio.total_pnl_pct.round_dp(2),
                            self.config.max_drawdown_pct
                        ),
                    );
                    return verdict.finish();
                }
                self.size_buy(&mut verdict, portfolio);
            }
            TradeAction::Sell => {
                let held = portfolio.shares_of(&decision.symbol);
                if decision.quantity > held {
                    verdict.reduce(
                        BreakerRule::Oversell,
                        held,
                        format!("sell {} exceeds held {} shares", decision.quantity, held),
                    );
                }
            }
            TradeAction::Hold => {}
        }

        if verdict.current.quantity <= Decimal::ZERO {
            verdict.force_hold(
                BreakerRule::ZeroQuantity,
                "reduced to zero quantity".to_string(),
            );
        }

        verdict.finish()
    }

    fn size_buy(&self, verdict: &mut Verdict, portfolio: &PortfolioContext) {
        let requested = verdict.current.quantity;
        if requested > self.config.max_trade_usd {
            verdict.reduce(
                BreakerRule::MaxPositionSize,
                self.config.max_trade_usd,
                format!(
                    "buy ${} above max trade ${}",
                    requested, self.config.max_trade_usd
                ),
            );
        }

        let cash = portfolio.cash_balance.max(Decimal::ZERO);
        if verdict.current.quantity > cash {
            let requested = verdict.current.quantity;
            verdict.reduce(
                BreakerRule::InsufficientCash,
                cash,
                format!("buy ${} exceeds cash ${}", requested, cash.round_dp(2)),
            );
        }

        let symbol = verdict.current.symbol.clone();
        let existing = portfolio
            .position(&symbol)
            .map(|p| p.market_value())
            .unwrap_or(Decimal::ZERO);
        let limit = (portfolio.total_value * self.config.max_position_pct).max(Decimal::ZERO);
        if existing + verdict.current.quantity > limit {
            let headroom = (limit - existing).max(Decimal::ZERO).round_dp(6);
            verdict.reduce(
                BreakerRule::MaxAllocation,
                headroom,
                format!(
                    "{} allocation would exceed {}% of portfolio",
                    symbol,
                    self.config.max_position_pct * Decimal::ONE_HUNDRED
                ),
            );
        }
    }

    /// Closed/half-open allow trading; an open circuit past its recovery
    /// timeout moves to half-open.
    fn agent_allows(&self, agent_id: &str, now: DateTime<Utc>) -> bool {
        let Some(mut circuit) = self.agents.get_mut(agent_id) else {
            return true;
        };
        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let recovered = circuit.opened_at.is_some_and(|opened| {
                    (now - opened).num_seconds() >= self.config.recovery_timeout_secs as i64
                });
                if recovered {
                    circuit.state = CircuitState::HalfOpen;
                    info!(agent_id, "Agent circuit transitioning to HALF-OPEN");
                }
                recovered
            }
        }
    }

    fn execution_history(&self, agent_id: &str, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, usize) {
        let Some(circuit) = self.agents.get(agent_id) else {
            return (None, 0);
        };
        let window_start = now - Duration::seconds(self.config.trade_window_secs as i64);
        let in_window = circuit
            .executions
            .iter()
            .filter(|t| **t > window_start)
            .count();
        (circuit.executions.back().copied(), in_window)
    }

    /// Feed back the outcome of an executed (non-hold) decision
    pub fn record_execution(&self, agent_id: &str, ok: bool) {
        self.record_execution_at(agent_id, ok, Utc::now());
    }

    pub fn record_execution_at(&self, agent_id: &str, ok: bool, at: DateTime<Utc>) {
        let mut circuit = self
            .agents
            .entry(agent_id.to_string())
            .or_insert_with(AgentCircuit::new);

        if ok {
            circuit.consecutive_failures = 0;
            circuit.executions.push_back(at);
            let window_start = at - Duration::seconds(self.config.trade_window_secs as i64);
            while circuit.executions.front().is_some_and(|t| *t <= window_start) {
                circuit.executions.pop_front();
            }
            if circuit.state == CircuitState::HalfOpen {
                circuit.state = CircuitState::Closed;
                circuit.opened_at = None;
                info!(agent_id, "Agent circuit CLOSED - normal operation resumed");
            }
            debug!(agent_id, "Execution success recorded");
            return;
        }

        circuit.consecutive_failures += 1;
        let failures = circuit.consecutive_failures;
        warn!(agent_id, failures, "Execution failure recorded");

        let trip = circuit.state == CircuitState::HalfOpen
            || (circuit.state == CircuitState::Closed && failures >= self.config.failure_threshold);
        if trip {
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(at);
            circuit.total_trips += 1;
            circuit.last_trip_reason = Some(format!("{} consecutive failures", failures));
            warn!(agent_id, failures, "Agent circuit TRIPPED");
        }
    }

    /// Seed execution history (e.g. from the ledger at startup)
    pub fn seed_executions(&self, agent_id: &str, times: impl IntoIterator<Item = DateTime<Utc>>) {
        let mut circuit = self
            .agents
            .entry(agent_id.to_string())
            .or_insert_with(AgentCircuit::new);
        let mut times: Vec<_> = times.into_iter().collect();
        times.sort();
        circuit.executions.extend(times);
    }

    pub fn state(&self, agent_id: &str) -> CircuitState {
        self.agents
            .get(agent_id)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn stats(&self) -> Vec<AgentBreakerStats> {
        let mut stats: Vec<_> = self
            .agents
            .iter()
            .map(|entry| AgentBreakerStats {
                agent_id: entry.key().clone(),
                state: entry.state,
                consecutive_failures: entry.consecutive_failures,
                last_trip_reason: entry.last_trip_reason.clone(),
                total_trips: entry.total_trips,
                last_execution: entry.executions.back().copied(),
            })
            .collect();
        stats.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        stats
    }
}

/// In-progress verdict: tracks the current decision and fired rules
struct Verdict {
    agent_id: String,
    original_action: TradeAction,
    current: TradingDecision,
    activations: Vec<CircuitBreakerActivation>,
}

impl Verdict {
    fn new(agent_id: &str, decision: &TradingDecision) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            original_action: decision.action,
            current: decision.clone(),
            activations: Vec::new(),
        }
    }

    fn apply(&mut self, rule: BreakerRule, action: TradeAction, quantity: Decimal, reason: String) {
        let next = self.current.replaced(action, quantity, rule.as_str());
        debug!(
            agent_id = %self.agent_id,
            rule = rule.as_str(),
            symbol = %self.current.symbol,
            %reason,
            "Circuit breaker rule fired"
        );
        self.activations.push(CircuitBreakerActivation {
            agent_id: self.agent_id.clone(),
            rule,
            symbol: self.current.symbol.clone(),
            reason,
            original_action: self.current.action,
            original_quantity: self.current.quantity,
            new_action: next.action,
            new_quantity: next.quantity,
            timestamp: Utc::now(),
        });
        self.current = next;
    }

    fn force_hold(&mut self, rule: BreakerRule, reason: String) {
        self.apply(rule, TradeAction::Hold, Decimal::ZERO, reason);
    }

    fn reduce(&mut self, rule: BreakerRule, quantity: Decimal, reason: String) {
        let action = self.current.action;
        self.apply(rule, action, quantity, reason);
    }

    fn finish(self) -> BreakerVerdict {
        BreakerVerdict {
            allowed: self.current.action == self.original_action,
            decision: self.current,
            activations: self.activations,
        }
    }
}
