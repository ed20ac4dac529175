//! End-to-end round scenarios driven through hand-written fakes.

use arena::account::{AccountMonitor, BalancePhase, BalanceSnapshot, FundingStatus};
use arena::config::{MarketConfig, RiskConfig};
use arena::coordination::{DecisionCircuitBreaker, RoundLock};
use arena::domain::{
    BreakerRule, Consensus, MarketSnapshot, PortfolioContext, RoundPhase, StockInfo, TradeAction,
    TradeRecord, TradeSide, TradingDecision, STOCK_CATALOG,
};
use arena::error::{ArenaError, Result};
use arena::execution::{ExecutionOutcome, ExecutionRequest, PaperExecutor, TradeExecutor};
use arena::market::{ContextEnricher, MarketSnapshotProvider, PriceSource, Quote};
use arena::orchestrator::{RoundOrchestrator, RoundSettings};
use arena::persistence::{MemoryStore, RoundCache, RoundPublisher, TradeLedger};
use arena::portfolio::PortfolioBuilder;
use arena::safety::{GateResult, PreRoundGate};
use arena::AgentDecider;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

enum Behavior {
    Decide(TradingDecision),
    Fail(&'static str),
    Panic,
    Sleep(Duration, TradingDecision),
}

/// What an agent was handed on its last call
#[derive(Debug, Clone)]
struct Seen {
    snapshot_addr: usize,
    position_prices: Vec<(String, Decimal)>,
    notes: Vec<String>,
}

struct FakeAgent {
    id: String,
    behavior: Behavior,
    calls: AtomicUsize,
    seen_symbols: Mutex<Vec<usize>>,
    last_seen: Mutex<Option<Seen>>,
}

impl FakeAgent {
    fn new(id: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
            seen_symbols: Mutex::new(Vec::new()),
            last_seen: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_seen(&self) -> Seen {
        self.last_seen.lock().unwrap().clone().expect("agent was never called")
    }
}

#[async_trait]
impl AgentDecider for FakeAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    async fn decide(
        &self,
        market: &MarketSnapshot,
        portfolio: &PortfolioContext,
    ) -> Result<TradingDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_symbols.lock().unwrap().push(market.len());
        *self.last_seen.lock().unwrap() = Some(Seen {
            snapshot_addr: market as *const MarketSnapshot as usize,
            position_prices: portfolio
                .positions
                .iter()
                .map(|p| (p.symbol.clone(), p.current_price))
                .collect(),
            notes: market.items.iter().flat_map(|m| m.notes.clone()).collect(),
        });
        match &self.behavior {
            Behavior::Decide(d) => Ok(d.clone()),
            Behavior::Fail(reason) => Err(ArenaError::agent(&self.id, *reason)),
            Behavior::Panic => panic!("model returned garbage"),
            Behavior::Sleep(delay, d) => {
                tokio::time::sleep(*delay).await;
                Ok(d.clone())
            }
        }
    }
}

/// Wraps the paper executor and counts calls
struct CountingExecutor {
    inner: PaperExecutor,
    calls: AtomicUsize,
}

#[async_trait]
impl TradeExecutor for CountingExecutor {
    fn is_paper(&self) -> bool {
        true
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(request).await
    }
}

enum GateBehavior {
    Block(&'static str),
    Error,
}

struct FakeGate(GateBehavior);

#[async_trait]
impl PreRoundGate for FakeGate {
    async fn check(&self) -> Result<GateResult> {
        match self.0 {
            GateBehavior::Block(reason) => Ok(GateResult::block("paper", reason)),
            GateBehavior::Error => Err(ArenaError::Internal("health endpoint unreachable".into())),
        }
    }
}

/// Account backend that is unreachable for every call
struct BrokenAccounts {
    calls: AtomicUsize,
}

#[async_trait]
impl AccountMonitor for BrokenAccounts {
    async fn check_funding(&self, _agent_id: &str) -> Result<FundingStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ArenaError::Persistence("balance service down".into()))
    }

    async fn snapshot_balance(
        &self,
        _agent_id: &str,
        _round_id: &str,
        _phase: BalancePhase,
    ) -> Result<BalanceSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ArenaError::Persistence("balance service down".into()))
    }
}

enum EnricherBehavior {
    Notes(Vec<(String, String)>),
    Fail,
}

struct FakeEnricher(EnricherBehavior);

#[async_trait]
impl ContextEnricher for FakeEnricher {
    fn name(&self) -> &str {
        "fake_news"
    }

    async fn enrich(&self, _snapshot: &MarketSnapshot) -> Result<Vec<(String, String)>> {
        match &self.0 {
            EnricherBehavior::Notes(notes) => Ok(notes.clone()),
            EnricherBehavior::Fail => Err(ArenaError::Internal("search quota exhausted".into())),
        }
    }
}

struct DownSource;

#[async_trait]
impl PriceSource for DownSource {
    fn name(&self) -> &str {
        "down"
    }

    async fn fetch_quotes(&self, _stocks: &[StockInfo]) -> Result<HashMap<String, Quote>> {
        Err(ArenaError::MarketDataUnavailable("connection refused".into()))
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    executor: Arc<CountingExecutor>,
    orchestrator: RoundOrchestrator,
}

impl Harness {
    fn new(agents: Vec<Arc<FakeAgent>>) -> Self {
        Self::with_market(agents, MarketSnapshotProvider::offline(&MarketConfig::default()))
    }

    fn with_market(agents: Vec<Arc<FakeAgent>>, market: MarketSnapshotProvider) -> Self {
        let agents: Vec<Arc<dyn AgentDecider>> = agents
            .into_iter()
            .map(|a| a as Arc<dyn AgentDecider>)
            .collect();
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(CountingExecutor {
            inner: PaperExecutor::new(store.clone()),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = RoundOrchestrator::new(
            agents,
            Arc::new(market),
            Arc::new(PortfolioBuilder::new(store.clone(), dec!(100))),
            Arc::new(DecisionCircuitBreaker::new(RiskConfig::default())),
            executor.clone(),
            Arc::new(RoundPublisher::new(Arc::new(RoundCache::new(10))).with_sink(store.clone())),
        )
        .with_settings(RoundSettings::default().without_jitter());

        Self {
            store,
            executor,
            orchestrator,
        }
    }

    fn executor_calls(&self) -> usize {
        self.executor.calls.load(Ordering::SeqCst)
    }
}

fn seed_holding(agent_id: &str, symbol: &str) -> TradeRecord {
    TradeRecord {
        trade_id: format!("seed-{}", agent_id),
        agent_id: agent_id.into(),
        round_id: "round_0_seed".into(),
        symbol: symbol.into(),
        side: TradeSide::Buy,
        shares: dec!(0.05),
        price: dec!(200),
        usdc_amount: dec!(10),
        paper: true,
        executed_at: Utc::now() - chrono::Duration::days(2),
    }
}

fn buy(symbol: &str, usd: Decimal, confidence: f64) -> TradingDecision {
    TradingDecision::new(TradeAction::Buy, symbol, usd, "test").with_confidence(confidence)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_rounds_run_at_most_one() {
    let slow = FakeAgent::new(
        "slow",
        Behavior::Sleep(Duration::from_millis(200), TradingDecision::hold("thinking")),
    );
    let h = Harness::new(vec![slow.clone()]);

    let (a, b) = tokio::join!(
        h.orchestrator.run_trading_round(),
        h.orchestrator.run_trading_round()
    );

    let skipped: Vec<_> = [&a, &b].into_iter().filter(|r| r.lock_skipped).collect();
    let ran: Vec<_> = [&a, &b].into_iter().filter(|r| !r.lock_skipped).collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(ran.len(), 1);

    assert!(skipped[0].results.is_empty());
    assert_eq!(skipped[0].phase, RoundPhase::Skipped);
    assert_eq!(ran[0].results.len(), 1);
    assert_eq!(slow.calls(), 1);

    // Lock is free again afterwards
    assert!(!h.orchestrator.lock_status().held);
    let next = h.orchestrator.run_trading_round().await;
    assert!(!next.lock_skipped);
}

#[tokio::test(start_paused = true)]
async fn every_agent_is_reported_even_when_they_fail() {
    let ok = FakeAgent::new("ok", Behavior::Decide(TradingDecision::hold("flat")));
    let failing = FakeAgent::new("failing", Behavior::Fail("rate limited"));
    let panicking = FakeAgent::new("panicking", Behavior::Panic);
    let stuck = FakeAgent::new(
        "stuck",
        Behavior::Sleep(Duration::from_secs(3_600), buy("AAPLx", dec!(10), 90.0)),
    );

    let mut h = Harness::new(vec![ok.clone(), failing.clone(), panicking.clone(), stuck.clone()]);
    h.orchestrator = h.orchestrator.with_settings(RoundSettings {
        decision_timeout: Duration::from_secs(5),
        ..RoundSettings::default().without_jitter()
    });

    let report = h.orchestrator.run_trading_round().await;

    let ids: Vec<_> = report.results.iter().map(|r| r.agent_id.as_str()).collect();
    assert_eq!(ids, ["ok", "failing", "panicking", "stuck"]);

    assert!(!report.results[0].agent_failed);
    for r in &report.results[1..] {
        assert!(r.agent_failed, "{} should be marked failed", r.agent_id);
        assert!(!r.executed);
        assert_eq!(r.decision.action, TradeAction::Hold);
        assert!(r.decision.reasoning.starts_with("Agent error:"));
    }
    assert!(report.results[2].decision.reasoning.contains("model returned garbage"));
    assert!(report.results[3].decision.reasoning.contains("timed out after 5s"));

    assert_eq!(report.errors.len(), 3);
    assert_eq!(report.consensus, Some(Consensus::NoTrades));
    assert_eq!(h.executor_calls(), 0);
    assert_eq!(report.phase, RoundPhase::Aggregated);
}

#[tokio::test]
async fn hold_never_calls_the_executor() {
    let holder = FakeAgent::new("holder", Behavior::Decide(TradingDecision::hold("wait")));
    let h = Harness::new(vec![holder]);

    let report = h.orchestrator.run_trading_round().await;

    assert_eq!(h.executor_calls(), 0);
    assert!(report.results[0].executed);
    assert!(report.results[0].execution.is_none());
    assert!(h.store.all_trades().await.is_empty());
}

#[tokio::test]
async fn buy_is_filled_and_lands_in_the_ledger() {
    let buyer = FakeAgent::new("buyer", Behavior::Decide(buy("nvdax", dec!(10), 0.8)));
    let h = Harness::new(vec![buyer]);

    let report = h.orchestrator.run_trading_round().await;

    let result = &report.results[0];
    assert!(result.executed, "{:?}", result.execution_error);
    let fill = result.execution.as_ref().unwrap();
    assert!(fill.paper);
    assert_eq!(fill.usdc_amount, dec!(10));
    assert_eq!(result.decision.symbol, "NVDAx");
    assert_eq!(h.executor_calls(), 1);

    let trades = h.store.all_trades().await;
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].round_id, report.round_id);
    assert_eq!(report.consensus, Some(Consensus::Unanimous));

    h.orchestrator.publisher().flush().await;
    let rounds = h.store.rounds().await;
    assert_eq!(rounds.len(), 1);
    assert_eq!(rounds[0].round_id, report.round_id);
}

#[tokio::test]
async fn price_outage_still_yields_full_catalog() {
    let observer = FakeAgent::new("observer", Behavior::Decide(TradingDecision::hold("x")));
    let market = MarketSnapshotProvider::new(Some(Arc::new(DownSource)), &MarketConfig::default());
    let h = Harness::with_market(vec![observer.clone()], market);

    let report = h.orchestrator.run_trading_round().await;

    assert!(report.errors.is_empty());
    assert_eq!(*observer.seen_symbols.lock().unwrap(), vec![STOCK_CATALOG.len()]);

    let snapshot = h.orchestrator.market().peek().await.unwrap();
    assert_eq!(snapshot.len(), STOCK_CATALOG.len());
    assert_eq!(snapshot.synthetic_count(), STOCK_CATALOG.len());
    assert!(snapshot.items.iter().all(|m| m.price > Decimal::ZERO));
}

#[tokio::test]
async fn consensus_reflects_final_decisions() {
    let a = FakeAgent::new("a", Behavior::Decide(buy("AAPLx", dec!(10), 80.0)));
    let b = FakeAgent::new("b", Behavior::Decide(buy("TSLAx", dec!(10), 80.0)));
    let c = FakeAgent::new("c", Behavior::Decide(TradingDecision::hold("x")));
    let h = Harness::new(vec![a, b, c]);
    let report = h.orchestrator.run_trading_round().await;
    assert_eq!(report.consensus, Some(Consensus::Majority));

    // Seller needs holdings, otherwise the oversell rule turns it into a hold
    let buyer = FakeAgent::new("buyer", Behavior::Decide(buy("AAPLx", dec!(10), 80.0)));
    let seller = FakeAgent::new(
        "seller",
        Behavior::Decide(
            TradingDecision::new(TradeAction::Sell, "AAPLx", dec!(0.01), "trim").with_confidence(80.0),
        ),
    );
    let h = Harness::new(vec![buyer, seller]);
    assert_ok!(h.store.record_trade(&seed_holding("seller", "AAPLx")).await);

    let report = h.orchestrator.run_trading_round().await;
    assert_eq!(report.results[1].decision.action, TradeAction::Sell);
    assert_eq!(report.consensus, Some(Consensus::Split));
    assert_eq!(h.executor_calls(), 2);
}

#[tokio::test]
async fn gate_veto_blocks_the_round() {
    let agent = FakeAgent::new("a", Behavior::Decide(buy("AAPLx", dec!(10), 80.0)));
    let mut h = Harness::new(vec![agent.clone()]);
    h.orchestrator = h
        .orchestrator
        .with_gate(Arc::new(FakeGate(GateBehavior::Block("maintenance"))));

    let report = h.orchestrator.run_trading_round().await;

    assert_eq!(report.errors, vec!["Pre-round gate blocked: maintenance".to_string()]);
    assert!(report.results.is_empty());
    assert!(!report.lock_skipped);
    assert_eq!(report.phase, RoundPhase::Blocked);
    assert!(report.consensus.is_none());
    assert_eq!(agent.calls(), 0);
    assert_eq!(h.executor_calls(), 0);

    // Blocked rounds are still published
    let cached = h.orchestrator.publisher().cache().latest().unwrap();
    assert_eq!(cached.round_id, report.round_id);
}

#[tokio::test]
async fn gate_failure_does_not_block() {
    let agent = FakeAgent::new("a", Behavior::Decide(TradingDecision::hold("x")));
    let mut h = Harness::new(vec![agent.clone()]);
    h.orchestrator = h.orchestrator.with_gate(Arc::new(FakeGate(GateBehavior::Error)));

    let report = h.orchestrator.run_trading_round().await;

    assert!(report.errors.is_empty());
    assert_eq!(report.results.len(), 1);
    assert_eq!(agent.calls(), 1);
}

#[tokio::test]
async fn breaker_forced_hold_skips_executor_and_shows_replacement() {
    let timid = FakeAgent::new("timid", Behavior::Decide(buy("AAPLx", dec!(10), 10.0)));
    let h = Harness::new(vec![timid]);

    let report = h.orchestrator.run_trading_round().await;

    assert_eq!(h.executor_calls(), 0);
    let result = &report.results[0];
    assert_eq!(result.decision.action, TradeAction::Hold);
    assert!(result.executed);
    assert!(result.decision.reasoning.contains("circuit breaker"));

    assert_eq!(report.circuit_breaker_activations.len(), 1);
    let activation = &report.circuit_breaker_activations[0];
    assert_eq!(activation.rule, BreakerRule::MinConfidence);
    assert_eq!(activation.original_action, TradeAction::Buy);
    assert_eq!(activation.new_action, TradeAction::Hold);
    assert_eq!(activation.agent_id, "timid");
}

#[tokio::test]
async fn oversized_buy_is_reduced_not_blocked() {
    let big = FakeAgent::new("big", Behavior::Decide(buy("AAPLx", dec!(80), 90.0)));
    let h = Harness::new(vec![big]);

    let report = h.orchestrator.run_trading_round().await;

    let result = &report.results[0];
    assert_eq!(result.decision.action, TradeAction::Buy);
    assert!(result.decision.quantity <= dec!(25));
    assert!(result.executed);
    assert!(!report.circuit_breaker_activations.is_empty());
    assert_eq!(h.executor_calls(), 1);
}

#[tokio::test]
async fn orchestrators_sharing_a_lock_exclude_each_other() {
    let slow = || {
        FakeAgent::new(
            "slow",
            Behavior::Sleep(Duration::from_millis(200), TradingDecision::hold("thinking")),
        )
    };
    let (first_agent, second_agent) = (slow(), slow());
    let lock = RoundLock::new();
    let mut first = Harness::new(vec![first_agent.clone()]);
    let mut second = Harness::new(vec![second_agent.clone()]);
    first.orchestrator = first.orchestrator.with_lock(lock.clone());
    second.orchestrator = second.orchestrator.with_lock(lock.clone());

    let (a, b) = tokio::join!(
        first.orchestrator.run_trading_round(),
        second.orchestrator.run_trading_round()
    );

    assert_eq!([&a, &b].iter().filter(|r| r.lock_skipped).count(), 1);
    assert_eq!(first_agent.calls() + second_agent.calls(), 1);
    assert!(!lock.status().held);

    // Separately built orchestrators do not contend
    let (third, fourth) = (Harness::new(vec![slow()]), Harness::new(vec![slow()]));
    let (c, d) = tokio::join!(
        third.orchestrator.run_trading_round(),
        fourth.orchestrator.run_trading_round()
    );
    assert!(!c.lock_skipped && !d.lock_skipped);
}

#[tokio::test(start_paused = true)]
async fn jitter_only_separates_consecutive_agents() {
    let agents: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|id| FakeAgent::new(id, Behavior::Decide(TradingDecision::hold("x"))))
        .collect();
    let mut h = Harness::new(agents);
    h.orchestrator = h.orchestrator.with_settings(RoundSettings {
        min_jitter: Duration::from_secs(1),
        max_jitter: Duration::from_secs(2),
        ..RoundSettings::default()
    });

    let started = tokio::time::Instant::now();
    let report = h.orchestrator.run_trading_round().await;
    let elapsed = started.elapsed();

    assert_eq!(report.results.len(), 3);
    // Two gaps between three agents, none after the last
    assert!(elapsed >= Duration::from_secs(2), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_secs(4), "{:?}", elapsed);

    let mut single = Harness::new(vec![FakeAgent::new("solo", Behavior::Decide(TradingDecision::hold("x")))]);
    single.orchestrator = single.orchestrator.with_settings(RoundSettings {
        min_jitter: Duration::from_secs(1),
        max_jitter: Duration::from_secs(2),
        ..RoundSettings::default()
    });
    let started = tokio::time::Instant::now();
    single.orchestrator.run_trading_round().await;
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn unreachable_accounts_do_not_affect_the_round() {
    let buyer = FakeAgent::new("buyer", Behavior::Decide(buy("AAPLx", dec!(10), 80.0)));
    let holder = FakeAgent::new("holder", Behavior::Decide(TradingDecision::hold("x")));
    let accounts = Arc::new(BrokenAccounts {
        calls: AtomicUsize::new(0),
    });
    let mut h = Harness::new(vec![buyer, holder]);
    h.orchestrator = h.orchestrator.with_accounts(accounts.clone());

    let report = h.orchestrator.run_trading_round().await;

    assert_eq!(report.results.len(), 2);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert!(report.results.iter().all(|r| r.executed && !r.agent_failed));
    assert_eq!(h.executor_calls(), 1);
    // Funding check plus pre- and post-trade balance for each agent
    assert_eq!(accounts.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn failed_enrichment_leaves_the_snapshot_plain() {
    let agent = FakeAgent::new("a", Behavior::Decide(TradingDecision::hold("x")));
    let mut h = Harness::new(vec![agent.clone()]);
    h.orchestrator = h
        .orchestrator
        .with_enricher(Arc::new(FakeEnricher(EnricherBehavior::Fail)));

    let report = h.orchestrator.run_trading_round().await;

    assert!(report.errors.is_empty());
    assert_eq!(report.results.len(), 1);
    assert_eq!(agent.calls(), 1);
    assert!(agent.last_seen().notes.is_empty());
}

#[tokio::test]
async fn enrichment_notes_reach_the_agents() {
    let agent = FakeAgent::new("a", Behavior::Decide(TradingDecision::hold("x")));
    let mut h = Harness::new(vec![agent.clone()]);
    h.orchestrator = h.orchestrator.with_enricher(Arc::new(FakeEnricher(
        EnricherBehavior::Notes(vec![("aaplx".into(), "earnings beat".into())]),
    )));

    let report = h.orchestrator.run_trading_round().await;

    assert!(report.errors.is_empty());
    assert_eq!(agent.last_seen().notes, vec!["earnings beat".to_string()]);
    let cached = h.orchestrator.market().peek().await.unwrap();
    assert_eq!(report.snapshot_version, Some(cached.version));
}

#[tokio::test]
async fn valuation_and_decision_share_one_snapshot() {
    let first = FakeAgent::new("first", Behavior::Decide(TradingDecision::hold("x")));
    let second = FakeAgent::new("second", Behavior::Decide(TradingDecision::hold("x")));
    let h = Harness::new(vec![first.clone(), second.clone()]);
    assert_ok!(h.store.record_trade(&seed_holding("first", "AAPLx")).await);

    let report = h.orchestrator.run_trading_round().await;

    let snapshot = h.orchestrator.market().peek().await.unwrap();
    assert_eq!(report.snapshot_version, Some(snapshot.version));
    let addr = Arc::as_ptr(&snapshot) as usize;
    assert_eq!(first.last_seen().snapshot_addr, addr);
    assert_eq!(second.last_seen().snapshot_addr, addr);

    let aapl = snapshot.price_of("AAPLx").unwrap();
    assert_eq!(first.last_seen().position_prices, vec![("AAPLx".to_string(), aapl)]);
}
