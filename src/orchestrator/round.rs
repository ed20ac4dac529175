//! Trading round orchestrator
//!
//! Gate → lock → snapshot → enrichment → agents in registration order →
//! aggregate → publish. Only a gate veto or lock contention short-circuits a
//! round; every other failure is recorded against the agent it came from.

use chrono::Utc;
use futures::FutureExt;
use rand::Rng;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::aggregate::{build_summary, compute_consensus};
use super::phase::PhaseTracker;
use crate::account::{AccountMonitor, BalancePhase};
use crate::agents::AgentDecider;
use crate::config::AppConfig;
use crate::coordination::{DecisionCircuitBreaker, LockStatus, RoundLock};
use crate::domain::{
    CircuitBreakerActivation, MarketSnapshot, PortfolioContext, RoundPhase, RoundReport,
    TradingDecision, TradingRoundResult,
};
use crate::error::{ArenaError, Result};
use crate::execution::{ExecutionOutcome, ExecutionRequest, TradeExecutor};
use crate::market::{ContextEnricher, MarketSnapshotProvider};
use crate::persistence::RoundPublisher;
use crate::portfolio::PortfolioBuilder;
use crate::safety::PreRoundGate;

/// Timing knobs for a round
#[derive(Debug, Clone)]
pub struct RoundSettings {
    pub min_jitter: Duration,
    pub max_jitter: Duration,
    pub decision_timeout: Duration,
    pub gate_timeout: Duration,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl RoundSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            min_jitter: Duration::from_millis(config.round.min_jitter_ms),
            max_jitter: Duration::from_millis(config.round.max_jitter_ms),
            decision_timeout: Duration::from_secs(config.round.decision_timeout_secs),
            gate_timeout: Duration::from_millis(config.round.gate_timeout_ms),
        }
    }

    /// No inter-agent delay
    pub fn without_jitter(mut self) -> Self {
        self.min_jitter = Duration::ZERO;
        self.max_jitter = Duration::ZERO;
        self
    }
}

/// `round_<unix_ms>_<8 hex chars>`
pub fn new_round_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("round_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Run a side effect whose failure must never affect the round
pub async fn best_effort<T, F>(label: &str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(step = label, error = %e, "Best-effort step failed");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Everything collected while the lock is held
struct LockedRun {
    results: Vec<TradingRoundResult>,
    errors: Vec<String>,
    activations: Vec<CircuitBreakerActivation>,
    snapshot_version: u64,
}

/// Advance along the phase graph. The tracker logs any rejected transition.
fn step(phase: &mut PhaseTracker, next: RoundPhase) {
    let moved = phase.advance(next);
    debug_assert!(moved.is_ok(), "invalid round phase transition to {}", next);
}

pub struct RoundOrchestrator {
    agents: Vec<Arc<dyn AgentDecider>>,
    market: Arc<MarketSnapshotProvider>,
    portfolios: Arc<PortfolioBuilder>,
    breaker: Arc<DecisionCircuitBreaker>,
    executor: Arc<dyn TradeExecutor>,
    publisher: Arc<RoundPublisher>,
    lock: RoundLock,
    gate: Option<Arc<dyn PreRoundGate>>,
    accounts: Option<Arc<dyn AccountMonitor>>,
    enricher: Option<Arc<dyn ContextEnricher>>,
    settings: RoundSettings,
}

impl RoundOrchestrator {
    /// The orchestrator starts with its own `RoundLock`, so rounds only
    /// exclude rounds of this instance until `with_lock` shares one.
    pub fn new(
        agents: Vec<Arc<dyn AgentDecider>>,
        market: Arc<MarketSnapshotProvider>,
        portfolios: Arc<PortfolioBuilder>,
        breaker: Arc<DecisionCircuitBreaker>,
        executor: Arc<dyn TradeExecutor>,
        publisher: Arc<RoundPublisher>,
    ) -> Self {
        Self {
            agents,
            market,
            portfolios,
            breaker,
            executor,
            publisher,
            lock: RoundLock::new(),
            gate: None,
            accounts: None,
            enricher: None,
            settings: RoundSettings::default(),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn PreRoundGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_accounts(mut self, accounts: Arc<dyn AccountMonitor>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn ContextEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Replace the instance lock with a clone of a lock held elsewhere, so
    /// rounds across every orchestrator sharing it are mutually exclusive
    pub fn with_lock(mut self, lock: RoundLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_settings(mut self, settings: RoundSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn lock_status(&self) -> LockStatus {
        self.lock.status()
    }

    pub fn publisher(&self) -> &Arc<RoundPublisher> {
        &self.publisher
    }

    pub fn breaker(&self) -> &Arc<DecisionCircuitBreaker> {
        &self.breaker
    }

    pub fn market(&self) -> &Arc<MarketSnapshotProvider> {
        &self.market
    }

    /// Run one trading round. Never returns an error: blocked and skipped
    /// rounds are reported through the returned `RoundReport`.
    pub async fn run_trading_round(&self) -> RoundReport {
        let started = Instant::now();
        let round_id = new_round_id();
        let timestamp = Utc::now();
        let mut phase = PhaseTracker::new(&round_id);

        info!(%round_id, agents = self.agents.len(), "Trading round starting");

        step(&mut phase, RoundPhase::GateCheck);
        if let Some(reason) = self.run_gate(&round_id).await {
            step(&mut phase, RoundPhase::Blocked);
            let error = format!("Pre-round gate blocked: {}", reason);
            warn!(%round_id, %reason, "Round blocked by pre-round gate");
            let report = RoundReport {
                round_id,
                timestamp,
                results: Vec::new(),
                errors: vec![error.clone()],
                circuit_breaker_activations: Vec::new(),
                lock_skipped: false,
                phase: phase.current(),
                consensus: None,
                summary: error,
                snapshot_version: None,
                duration_ms: started.elapsed().as_millis() as u64,
            };
            return self.finish(report);
        }

        step(&mut phase, RoundPhase::LockWait);
        let run = self
            .lock
            .try_run(&round_id, self.run_locked(&round_id, &mut phase))
            .await;

        let report = match run {
            None => {
                step(&mut phase, RoundPhase::Skipped);
                let holder = self.lock.status().round_id.unwrap_or_default();
                info!(%round_id, holder = %holder, "Round skipped: another round in progress");
                RoundReport {
                    round_id,
                    timestamp,
                    results: Vec::new(),
                    errors: Vec::new(),
                    circuit_breaker_activations: Vec::new(),
                    lock_skipped: true,
                    phase: phase.current(),
                    consensus: None,
                    summary: "Round skipped: another round is in progress".to_string(),
                    snapshot_version: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            Some(run) => {
                step(&mut phase, RoundPhase::Aggregated);
                let consensus = compute_consensus(run.results.iter().map(|r| r.decision.action));
                let summary = build_summary(&run.results, run.errors.len());
                info!(
                    %round_id,
                    consensus = %consensus,
                    executed = run.results.iter().filter(|r| r.executed).count(),
                    errors = run.errors.len(),
                    activations = run.activations.len(),
                    "Round aggregated: {}",
                    summary
                );
                RoundReport {
                    round_id,
                    timestamp,
                    results: run.results,
                    errors: run.errors,
                    circuit_breaker_activations: run.activations,
                    lock_skipped: false,
                    phase: phase.current(),
                    consensus: Some(consensus),
                    summary,
                    snapshot_version: Some(run.snapshot_version),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        self.finish(report)
    }

    fn finish(&self, report: RoundReport) -> RoundReport {
        let report = Arc::new(report);
        self.publisher.publish(report.clone());
        Arc::unwrap_or_clone(report)
    }

    /// `Some(reason)` when the gate vetoes; gate failures let the round proceed
    async fn run_gate(&self, round_id: &str) -> Option<String> {
        let gate = self.gate.as_ref()?;
        match tokio::time::timeout(self.settings.gate_timeout, gate.check()).await {
            Ok(Ok(result)) if !result.proceed => Some(
                result
                    .block_reason
                    .unwrap_or_else(|| "unspecified".to_string()),
            ),
            Ok(Ok(result)) => {
                debug!(
                    round_id,
                    mode = %result.mode,
                    passed = result.summary.passed,
                    total = result.summary.total,
                    "Pre-round gate passed"
                );
                None
            }
            Ok(Err(e)) => {
                warn!(round_id, error = %e, "Pre-round gate failed to run, proceeding");
                None
            }
            Err(_) => {
                warn!(
                    round_id,
                    timeout_ms = self.settings.gate_timeout.as_millis() as u64,
                    "Pre-round gate timed out, proceeding"
                );
                None
            }
        }
    }

    async fn run_locked(&self, round_id: &str, phase: &mut PhaseTracker) -> LockedRun {
        step(phase, RoundPhase::Running);

        let mut snapshot = self.market.get_snapshot().await;
        if let Some(enricher) = &self.enricher {
            let notes = best_effort(enricher.name(), enricher.enrich(&snapshot)).await;
            if let Some(notes) = notes.filter(|n| !n.is_empty()) {
                snapshot = Arc::new(snapshot.with_notes(&notes));
            }
        }

        let mut run = LockedRun {
            results: Vec::with_capacity(self.agents.len()),
            errors: Vec::new(),
            activations: Vec::new(),
            snapshot_version: snapshot.version,
        };

        for (i, agent) in self.agents.iter().enumerate() {
            let span = info_span!("agent_turn", round_id, agent_id = agent.id());
            let result = self
                .run_agent(round_id, agent.as_ref(), &snapshot, &mut run)
                .instrument(span)
                .await;
            run.results.push(result);

            if i + 1 < self.agents.len() {
                self.jitter().await;
            }
        }

        run
    }

    async fn run_agent(
        &self,
        round_id: &str,
        agent: &dyn AgentDecider,
        snapshot: &Arc<MarketSnapshot>,
        run: &mut LockedRun,
    ) -> TradingRoundResult {
        let agent_id = agent.id();

        if let Some(accounts) = &self.accounts {
            best_effort("funding_check", accounts.check_funding(agent_id)).await;
            best_effort(
                "pre_trade_balance",
                accounts.snapshot_balance(agent_id, round_id, BalancePhase::PreTrade),
            )
            .await;
        }

        let portfolio = self.portfolios.build(agent_id, snapshot).await;

        let decision = match self.decide(agent, snapshot, &portfolio).await {
            Ok(decision) => decision.normalized(),
            Err(e) => {
                error!(error = %e, "Agent decision failed");
                run.errors.push(format!("{}: {}", agent_id, e));
                return TradingRoundResult {
                    agent_id: agent_id.to_string(),
                    agent_name: agent.name().to_string(),
                    decision: TradingDecision::hold(&format!("Agent error: {}", e)),
                    executed: false,
                    execution: None,
                    execution_error: Some(e.to_string()),
                    agent_failed: true,
                };
            }
        };

        let verdict = self.breaker.check(agent_id, &decision, &portfolio);
        if !verdict.activations.is_empty() {
            let rules: Vec<&str> = verdict.activations.iter().map(|a| a.rule.as_str()).collect();
            info!(allowed = verdict.allowed, ?rules, "Circuit breaker adjusted decision");
        }
        run.activations.extend(verdict.activations);
        let decision = verdict.decision;

        let mut result = TradingRoundResult {
            agent_id: agent_id.to_string(),
            agent_name: agent.name().to_string(),
            decision,
            executed: true,
            execution: None,
            execution_error: None,
            agent_failed: false,
        };

        if !result.decision.is_hold() {
            let request = ExecutionRequest {
                agent_id: agent_id.to_string(),
                round_id: round_id.to_string(),
                reference_price: snapshot.price_of(&result.decision.symbol),
                decision: result.decision.clone(),
            };
            match self.execute(&request).await {
                Ok(outcome) if outcome.success => {
                    self.breaker.record_execution(agent_id, true);
                    result.execution = outcome.details;
                }
                Ok(outcome) => {
                    self.breaker.record_execution(agent_id, false);
                    let err = outcome
                        .error
                        .unwrap_or_else(|| "execution rejected".to_string());
                    warn!(error = %err, "Execution rejected");
                    run.errors.push(format!("{}: execution failed: {}", agent_id, err));
                    result.executed = false;
                    result.execution_error = Some(err);
                }
                Err(e) => {
                    self.breaker.record_execution(agent_id, false);
                    warn!(error = %e, "Execution failed");
                    run.errors.push(format!("{}: execution failed: {}", agent_id, e));
                    result.executed = false;
                    result.execution_error = Some(e.to_string());
                }
            }
        }

        if let Some(accounts) = &self.accounts {
            best_effort(
                "post_trade_balance",
                accounts.snapshot_balance(agent_id, round_id, BalancePhase::PostTrade),
            )
            .await;
        }

        result
    }

    /// Agent call bounded by the decision timeout, with panics contained
    async fn decide(
        &self,
        agent: &dyn AgentDecider,
        snapshot: &MarketSnapshot,
        portfolio: &PortfolioContext,
    ) -> Result<TradingDecision> {
        let call = AssertUnwindSafe(agent.decide(snapshot, portfolio)).catch_unwind();
        match tokio::time::timeout(self.settings.decision_timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ArenaError::agent(
                agent.id(),
                format!("panicked: {}", panic_message(panic.as_ref())),
            )),
            Err(_) => Err(ArenaError::DecisionTimeout {
                agent_id: agent.id().to_string(),
                timeout_secs: self.settings.decision_timeout.as_secs(),
            }),
        }
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        match AssertUnwindSafe(self.executor.execute(request))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(ArenaError::Execution(format!(
                "executor panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    async fn jitter(&self) {
        let (min, max) = (self.settings.min_jitter, self.settings.max_jitter);
        if max.is_zero() {
            return;
        }
        let delay = if max <= min {
            min
        } else {
            let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
            Duration::from_millis(ms)
        };
        debug!(delay_ms = delay.as_millis() as u64, "Inter-agent jitter");
        tokio::time::sleep(delay).await;
    }
}
