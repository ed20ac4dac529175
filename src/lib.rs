pub mod account;
pub mod agents;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod execution;
pub mod logging;
pub mod market;
pub mod orchestrator;
pub mod persistence;
pub mod portfolio;
pub mod safety;
pub mod supervisor;

pub use account::{AccountMonitor, BalancePhase, FundingStatus, LedgerAccountMonitor};
pub use agents::{build_agents, AgentDecider, GrokClient, GrokTrader, MomentumTrader};
pub use config::AppConfig;
pub use coordination::{CircuitState, DecisionCircuitBreaker, LockStatus, RoundLock};
pub use domain::{
    CircuitBreakerActivation, Consensus, MarketData, MarketSnapshot, PortfolioContext,
    RoundPhase, RoundReport, TradeAction, TradingDecision, TradingRoundResult,
};
pub use error::{ArenaError, Result};
pub use execution::{ExecutionOutcome, ExecutionRequest, PaperExecutor, TradeExecutor};
pub use market::{ContextEnricher, MarketSnapshotProvider, PriceSource};
pub use orchestrator::{run_schedule, RoundOrchestrator, RoundSettings};
pub use persistence::{MemoryStore, PostgresStore, RoundCache, RoundPublisher, RoundSink, TradeLedger};
pub use portfolio::PortfolioBuilder;
pub use safety::{GateResult, HealthGate, KillSwitch, PreRoundGate};
pub use supervisor::{AlertLevel, AlertManager};
