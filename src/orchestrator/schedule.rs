//! Fixed-interval round scheduler
//!
//! Each tick runs a round on its own task so a slow round never delays the
//! next tick; the round lock turns overlaps into skipped rounds. Rounds still
//! in flight when shutdown fires are awaited before the publisher is flushed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::round::RoundOrchestrator;
use crate::domain::RoundReport;
use crate::error::{ArenaError, Result};

/// Run rounds every `interval` until `shutdown` resolves. Returns the number
/// of rounds started.
pub async fn run_schedule<F>(
    orchestrator: Arc<RoundOrchestrator>,
    interval: Duration,
    shutdown: F,
) -> Result<u64>
where
    F: Future<Output = ()>,
{
    if interval.is_zero() {
        return Err(ArenaError::Validation(
            "schedule interval must be positive".to_string(),
        ));
    }

    info!(interval_secs = interval.as_secs(), "Round scheduler started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut rounds: JoinSet<RoundReport> = JoinSet::new();
    let mut started = 0u64;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let orch = orchestrator.clone();
                rounds.spawn(async move { orch.run_trading_round().await });
                started += 1;
            }
            Some(joined) = rounds.join_next(), if !rounds.is_empty() => {
                log_finished(joined);
            }
            _ = &mut shutdown => {
                info!(in_flight = rounds.len(), "Shutdown requested, stopping scheduler");
                break;
            }
        }
    }

    let lock = orchestrator.lock_status();
    if lock.held {
        info!(
            round_id = lock.round_id.as_deref().unwrap_or("-"),
            "Waiting for in-flight round to finish"
        );
    }
    while let Some(joined) = rounds.join_next().await {
        log_finished(joined);
    }

    orchestrator.publisher().flush().await;

    let cache = orchestrator.market().cache_stats().await;
    info!(
        rounds = started,
        snapshot_version = cache.version,
        cache_hits = cache.hits,
        cache_misses = cache.misses,
        "Round scheduler stopped"
    );
    Ok(started)
}

fn log_finished(joined: std::result::Result<RoundReport, tokio::task::JoinError>) {
    match joined {
        Ok(report) if report.lock_skipped => {
            info!(round_id = %report.round_id, "Tick skipped, previous round still running");
        }
        Ok(report) => {
            info!(round_id = %report.round_id, summary = %report.summary, "Scheduled round finished");
        }
        Err(e) => error!(error = %e, "Scheduled round task failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentDecider;
    use crate::config::{MarketConfig, RiskConfig};
    use crate::coordination::DecisionCircuitBreaker;
    use crate::domain::{MarketSnapshot, PortfolioContext, TradingDecision};
    use crate::execution::PaperExecutor;
    use crate::market::MarketSnapshotProvider;
    use crate::orchestrator::RoundSettings;
    use crate::persistence::{MemoryStore, RoundCache, RoundPublisher};
    use crate::portfolio::PortfolioBuilder;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Slow {
        delay: Duration,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl AgentDecider for Slow {
        fn id(&self) -> &str {
            "slow"
        }

        fn name(&self) -> &str {
            "Slow"
        }

        async fn decide(
            &self,
            _market: &MarketSnapshot,
            _portfolio: &PortfolioContext,
        ) -> Result<TradingDecision> {
            tokio::time::sleep(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(TradingDecision::hold("waited"))
        }
    }

    fn orchestrator(agent: Arc<Slow>) -> Arc<RoundOrchestrator> {
        let store = Arc::new(MemoryStore::new());
        let settings = RoundSettings {
            decision_timeout: Duration::from_secs(120),
            ..RoundSettings::default()
        }
        .without_jitter();
        Arc::new(
            RoundOrchestrator::new(
                vec![agent as Arc<dyn AgentDecider>],
                Arc::new(MarketSnapshotProvider::offline(&MarketConfig::default())),
                Arc::new(PortfolioBuilder::new(store.clone(), dec!(10000))),
                Arc::new(DecisionCircuitBreaker::new(RiskConfig::default())),
                Arc::new(PaperExecutor::new(store)),
                Arc::new(RoundPublisher::new(Arc::new(RoundCache::new(10)))),
            )
            .with_settings(settings),
        )
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let agent = Arc::new(Slow {
            delay: Duration::ZERO,
            finished: AtomicUsize::new(0),
        });
        let err = run_schedule(orchestrator(agent), Duration::ZERO, async {})
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_round() {
        let agent = Arc::new(Slow {
            delay: Duration::from_secs(30),
            finished: AtomicUsize::new(0),
        });
        let orch = orchestrator(agent.clone());

        let started = run_schedule(
            orch.clone(),
            Duration::from_secs(60),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await
        .unwrap();

        assert_eq!(started, 1);
        assert_eq!(agent.finished.load(Ordering::SeqCst), 1);
        let latest = orch.publisher().cache().latest().unwrap();
        assert!(!latest.lock_skipped);
        assert_eq!(latest.results.len(), 1);
        assert!(!orch.lock_status().held);
    }
}
