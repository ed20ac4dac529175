use anyhow::{Context, Result};
use arena::account::LedgerAccountMonitor;
use arena::agents::{build_agents, GrokClient};
use arena::config::AppConfig;
use arena::coordination::DecisionCircuitBreaker;
use arena::domain::{MarketSnapshot, RoundReport};
use arena::execution::PaperExecutor;
use arena::logging::{init_logging, init_logging_simple};
use arena::market::{GrokNewsEnricher, JupiterPriceSource, MarketSnapshotProvider, PriceSource};
use arena::orchestrator::{run_schedule, RoundOrchestrator, RoundSettings};
use arena::persistence::{
    MemoryStore, PostgresStore, RoundCache, RoundPublisher, RoundSink, TradeLedger,
};
use arena::portfolio::PortfolioBuilder;
use arena::safety::{HealthGate, KillSwitch};
use arena::supervisor::AlertManager;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tokio::signal;
use tracing::{error, info, warn};

/// Multi-agent trading round orchestrator
#[derive(Parser, Debug)]
#[command(name = "arena")]
#[command(author, version, about = "Runs trading rounds across registered agents")]
struct Cli {
    /// Configuration directory
    #[arg(long, global = true, default_value = "config")]
    config: PathBuf,

    /// Report rounds as paper trading (default)
    #[arg(long, global = true, conflicts_with = "live")]
    paper: bool,

    /// Report rounds as live trading
    #[arg(long, global = true)]
    live: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single trading round and print its summary
    Run,

    /// Run rounds on a fixed interval until Ctrl-C
    Schedule {
        /// Seconds between rounds (defaults to round.schedule_interval_secs)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_secs: Option<u64>,
    },

    /// Print the current market snapshot
    Snapshot,

    /// Print agent circuit state and recent rounds from the database
    Status,
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "24h %")]
    change: String,
    #[tabled(rename = "Volume")]
    volume: String,
    #[tabled(rename = "Source")]
    source: String,
}

#[derive(Tabled)]
struct RoundRow {
    #[tabled(rename = "Round")]
    round_id: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Consensus")]
    consensus: String,
    #[tabled(rename = "Executed")]
    executed: usize,
    #[tabled(rename = "Errors")]
    errors: usize,
    #[tabled(rename = "Summary")]
    summary: String,
}

/// Everything the commands need, wired from configuration
struct Runtime {
    config: AppConfig,
    orchestrator: RoundOrchestrator,
    postgres: Option<PostgresStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if cli.live {
        config.safety.mode = "live".to_string();
    } else if cli.paper {
        config.safety.mode = "paper".to_string();
    }
    if let Err(errors) = config.validate() {
        anyhow::bail!("invalid configuration:\n  {}", errors.join("\n  "));
    }

    match cli.command {
        Commands::Run => {
            init_logging(&config.logging);
            let runtime = build_runtime(config, true).await?;
            let report = runtime.orchestrator.run_trading_round().await;
            print_report(&report);
            runtime.orchestrator.publisher().flush().await;
        }
        Commands::Schedule { interval_secs } => {
            init_logging(&config.logging);
            let interval =
                Duration::from_secs(interval_secs.unwrap_or(config.round.schedule_interval_secs));
            let runtime = build_runtime(config, true).await?;
            let shutdown = async {
                if let Err(e) = signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
            };
            run_schedule(Arc::new(runtime.orchestrator), interval, shutdown).await?;
        }
        Commands::Snapshot => {
            init_logging_simple();
            let provider = build_provider(&config)?;
            let snapshot = provider.get_snapshot().await;
            print_snapshot(&snapshot);
        }
        Commands::Status => {
            init_logging_simple();
            let runtime = build_runtime(config, false).await?;
            print_status(&runtime).await?;
        }
    }

    Ok(())
}

fn build_provider(config: &AppConfig) -> Result<MarketSnapshotProvider> {
    let source: Arc<dyn PriceSource> = Arc::new(JupiterPriceSource::new(&config.market)?);
    Ok(MarketSnapshotProvider::new(Some(source), &config.market))
}

/// `migrate` is false for read-only commands, which never alter the schema
async fn build_runtime(config: AppConfig, migrate: bool) -> Result<Runtime> {
    let memory = MemoryStore::new();
    let postgres = match &config.database.url {
        Some(url) => {
            let store = PostgresStore::new(url, config.database.max_connections).await?;
            if migrate {
                store.migrate().await?;
            }
            info!("Using PostgreSQL trade ledger");
            Some(store)
        }
        None => {
            info!("No database configured, trades and rounds stay in memory");
            None
        }
    };

    let ledger: Arc<dyn TradeLedger>;
    let store_sink: Arc<dyn RoundSink>;
    match &postgres {
        Some(pg) => {
            let pg = Arc::new(pg.clone());
            ledger = pg.clone();
            store_sink = pg;
        }
        None => {
            let mem = Arc::new(memory);
            ledger = mem.clone();
            store_sink = mem;
        }
    }

    let provider = Arc::new(build_provider(&config)?);
    let agents = build_agents(&config)?;
    let agent_ids: Vec<String> = agents.iter().map(|a| a.id().to_string()).collect();

    let breaker = Arc::new(DecisionCircuitBreaker::new(config.risk.clone()));
    for agent_id in &agent_ids {
        match ledger.trades_for_agent(agent_id).await {
            Ok(trades) => breaker.seed_executions(agent_id, trades.iter().map(|t| t.executed_at)),
            Err(e) => warn!(%agent_id, error = %e, "Could not seed breaker history"),
        }
    }

    let alerts = Arc::new(AlertManager::new(config.alerts.clone())?);
    let publisher = RoundPublisher::new(Arc::new(RoundCache::new(
        config.round.recent_round_capacity,
    )))
    .with_sink(store_sink)
    .with_sink(alerts);

    let accounts = Arc::new(LedgerAccountMonitor::new(
        ledger.clone(),
        config.portfolio.initial_capital,
        config.safety.min_funding_usd,
    ));

    let kill_switch = KillSwitch::from_config(config.safety.kill_switch);
    let mut gate = HealthGate::new(
        kill_switch,
        &config.safety.mode,
        Duration::from_millis(config.safety.check_timeout_ms),
    )
    .with_accounts(accounts.clone(), agent_ids)
    .with_ledger(ledger.clone());
    if let Some(source) = provider.source() {
        gate = gate.with_price_source(source);
    }

    if config.safety.mode == "live" {
        warn!("Live mode selected: fills are still simulated by the paper executor");
    }

    let mut orchestrator = RoundOrchestrator::new(
        agents,
        provider,
        Arc::new(PortfolioBuilder::new(
            ledger.clone(),
            config.portfolio.initial_capital,
        )),
        breaker,
        Arc::new(PaperExecutor::new(ledger)),
        Arc::new(publisher),
    )
    .with_gate(Arc::new(gate))
    .with_accounts(accounts)
    .with_settings(RoundSettings::from_config(&config));

    if config.round.enrich_context {
        let grok = Arc::new(GrokClient::new(config.grok.clone())?);
        if grok.is_configured() {
            orchestrator = orchestrator.with_enricher(Arc::new(GrokNewsEnricher::new(grok)));
        } else {
            warn!("round.enrich_context is set but no Grok API key is configured");
        }
    }

    Ok(Runtime {
        config,
        orchestrator,
        postgres,
    })
}

fn print_report(report: &RoundReport) {
    println!("Round:     {}", report.round_id);
    println!("Phase:     {}", report.phase);
    if let Some(consensus) = report.consensus {
        println!("Consensus: {}", consensus);
    }
    println!("Duration:  {} ms", report.duration_ms);
    println!("Summary:   {}", report.summary);
    for e in &report.errors {
        println!("  error: {}", e);
    }
    for a in &report.circuit_breaker_activations {
        println!(
            "  breaker: {} {} {} -> {} ({})",
            a.agent_id, a.rule, a.original_action, a.new_action, a.reason
        );
    }
}

fn print_snapshot(snapshot: &MarketSnapshot) {
    let rows: Vec<SnapshotRow> = snapshot
        .items
        .iter()
        .map(|m| SnapshotRow {
            symbol: m.symbol.clone(),
            name: m.name.clone(),
            price: format!("${}", m.price),
            change: m
                .change_24h
                .map(|c| format!("{:+.2}", c))
                .unwrap_or_else(|| "-".to_string()),
            volume: m
                .volume_24h
                .map(|v| format!("{:.0}", v))
                .unwrap_or_else(|| "-".to_string()),
            source: if m.is_synthetic() { "synthetic" } else { "live" }.to_string(),
        })
        .collect();

    println!("{}", Table::new(rows));
    println!(
        "{} symbols, {} synthetic, fetched {}",
        snapshot.len(),
        snapshot.synthetic_count(),
        snapshot.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if !snapshot.filtered_out.is_empty() {
        println!("Filtered as illiquid: {}", snapshot.filtered_out.join(", "));
    }
}

async fn print_status(runtime: &Runtime) -> Result<()> {
    println!("Mode: {}", runtime.config.safety.mode);
    println!("Agents:");
    for stats in runtime.orchestrator.breaker().stats() {
        println!(
            "  {} circuit={:?} failures={} trips={} last_trade={}",
            stats.agent_id,
            stats.state,
            stats.consecutive_failures,
            stats.total_trips,
            stats
                .last_execution
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    let recent = match &runtime.postgres {
        Some(pg) => Some(pg.recent_rounds(10).await?),
        None => None,
    };
    println!("{}", render_recent(recent.as_deref()));
    Ok(())
}

/// Round history table; `None` means no database is configured
fn render_recent(recent: Option<&[RoundReport]>) -> String {
    let recent = match recent {
        None => {
            return "Round history: no database configured, rounds are only kept by the \
                    running scheduler process"
                .to_string()
        }
        Some([]) => return "No rounds recorded".to_string(),
        Some(recent) => recent,
    };

    let rows: Vec<RoundRow> = recent
        .iter()
        .map(|r| RoundRow {
            round_id: r.round_id.clone(),
            phase: r.phase.to_string(),
            consensus: r
                .consensus
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            executed: r.executed_count(),
            errors: r.errors.len(),
            summary: r.summary.clone(),
        })
        .collect();
    Table::new(rows).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena::domain::{Consensus, RoundPhase};
    use chrono::Utc;

    #[test]
    fn test_schedule_rejects_zero_interval() {
        assert!(Cli::try_parse_from(["arena", "schedule", "--interval-secs", "0"]).is_err());
        let cli = Cli::try_parse_from(["arena", "schedule", "--interval-secs", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Schedule {
                interval_secs: Some(5)
            }
        ));
    }

    #[test]
    fn test_recent_rounds_without_database_is_labelled() {
        let out = render_recent(None);
        assert!(out.contains("no database configured"));
        assert_eq!(render_recent(Some(&[][..])), "No rounds recorded");
    }

    #[test]
    fn test_recent_rounds_table() {
        let report = RoundReport {
            round_id: "round_1_abcd1234".to_string(),
            timestamp: Utc::now(),
            results: Vec::new(),
            errors: vec!["a: boom".to_string()],
            circuit_breaker_activations: Vec::new(),
            lock_skipped: false,
            phase: RoundPhase::Aggregated,
            consensus: Some(Consensus::NoTrades),
            summary: "All agents held".to_string(),
            snapshot_version: Some(1),
            duration_ms: 12,
        };
        let out = render_recent(Some(&[report][..]));
        assert!(out.contains("round_1_abcd1234"));
        assert!(out.contains("All agents held"));
        assert!(out.contains("Consensus"));
    }
}
