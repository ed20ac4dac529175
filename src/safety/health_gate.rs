use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::kill_switch::KillSwitch;
use super::{CheckOutcome, GateResult, GateSummary, PreRoundGate};
use crate::account::AccountMonitor;
use crate::error::Result;
use crate::market::PriceSource;
use crate::persistence::TradeLedger;

/// Fixed battery of readiness checks, each bounded by `check_timeout`.
///
/// Blocking: kill switch, ledger connectivity, and funding when no agent at
/// all is funded. Price-feed trouble is reported but not blocking, since the
/// snapshot provider falls back to synthetic quotes.
pub struct HealthGate {
    kill_switch: KillSwitch,
    price_source: Option<Arc<dyn PriceSource>>,
    accounts: Option<Arc<dyn AccountMonitor>>,
    ledger: Option<Arc<dyn TradeLedger>>,
    agent_ids: Vec<String>,
    check_timeout: Duration,
    mode: String,
}

impl HealthGate {
    pub fn new(kill_switch: KillSwitch, mode: &str, check_timeout: Duration) -> Self {
        Self {
            kill_switch,
            price_source: None,
            accounts: None,
            ledger: None,
            agent_ids: Vec::new(),
            check_timeout,
            mode: mode.to_string(),
        }
    }

    pub fn with_price_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.price_source = Some(source);
        self
    }

    pub fn with_accounts(mut self, accounts: Arc<dyn AccountMonitor>, agent_ids: Vec<String>) -> Self {
        self.accounts = Some(accounts);
        self.agent_ids = agent_ids;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn TradeLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    async fn bounded<F>(&self, fut: F) -> std::result::Result<String, String>
    where
        F: Future<Output = Result<String>>,
    {
        match tokio::time::timeout(self.check_timeout, fut).await {
            Ok(Ok(detail)) => Ok(detail),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}ms", self.check_timeout.as_millis())),
        }
    }

    async fn check_kill_switch(&self) -> CheckOutcome {
        match self.kill_switch.block_reason().await {
            Some(reason) => CheckOutcome {
                name: "kill_switch",
                passed: false,
                blocking: true,
                detail: reason,
            },
            None => CheckOutcome {
                name: "kill_switch",
                passed: true,
                blocking: true,
                detail: "disengaged".to_string(),
            },
        }
    }

    async fn check_price_feed(&self, source: &Arc<dyn PriceSource>) -> CheckOutcome {
        let outcome = self
            .bounded(async { source.ping().await.map(|_| format!("{} reachable", source.name())) })
            .await;
        CheckOutcome {
            name: "price_feed",
            passed: outcome.is_ok(),
            blocking: false,
            detail: outcome.unwrap_or_else(|e| format!("{}: {}", source.name(), e)),
        }
    }

    async fn check_ledger(&self, ledger: &Arc<dyn TradeLedger>) -> CheckOutcome {
        let outcome = self
            .bounded(async { ledger.ping().await.map(|_| "reachable".to_string()) })
            .await;
        CheckOutcome {
            name: "ledger",
            passed: outcome.is_ok(),
            blocking: true,
            detail: outcome.unwrap_or_else(|e| format!("ledger unavailable: {}", e)),
        }
    }

    async fn check_funding(&self, accounts: &Arc<dyn AccountMonitor>) -> CheckOutcome {
        let mut funded = 0usize;
        let mut problems = Vec::new();
        for agent_id in &self.agent_ids {
            let status = self
                .bounded(async {
                    accounts.check_funding(agent_id).await.map(|s| {
                        if s.funded {
                            String::new()
                        } else {
                            format!("{} has ${}", agent_id, s.available_usd.round_dp(2))
                        }
                    })
                })
                .await;
            match status {
                Ok(detail) if detail.is_empty() => funded += 1,
                Ok(detail) => problems.push(detail),
                Err(e) => problems.push(format!("{}: {}", agent_id, e)),
            }
        }

        let total = self.agent_ids.len();
        CheckOutcome {
            name: "funding",
            passed: problems.is_empty(),
            blocking: total > 0 && funded == 0,
            detail: if problems.is_empty() {
                format!("{}/{} agents funded", funded, total)
            } else {
                format!("{}/{} agents funded ({})", funded, total, problems.join(", "))
            },
        }
    }
}

#[async_trait]
impl PreRoundGate for HealthGate {
    async fn check(&self) -> Result<GateResult> {
        let started = Instant::now();
        let mut checks = vec![self.check_kill_switch().await];

        if let Some(source) = &self.price_source {
            checks.push(self.check_price_feed(source).await);
        }
        if let Some(ledger) = &self.ledger {
            checks.push(self.check_ledger(ledger).await);
        }
        if let Some(accounts) = &self.accounts {
            checks.push(self.check_funding(accounts).await);
        }

        for c in &checks {
            if c.passed {
                debug!(check = c.name, detail = %c.detail, "Gate check passed");
            } else {
                warn!(check = c.name, blocking = c.blocking, detail = %c.detail, "Gate check failed");
            }
        }

        let block_reason = checks
            .iter()
            .find(|c| !c.passed && c.blocking)
            .map(|c| c.detail.clone());
        let summary = GateSummary {
            passed: checks.iter().filter(|c| c.passed).count(),
            total: checks.len(),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            proceed = block_reason.is_none(),
            passed = summary.passed,
            total = summary.total,
            duration_ms,
            "Pre-round gate complete"
        );

        Ok(GateResult {
            proceed: block_reason.is_none(),
            block_reason,
            mode: self.mode.clone(),
            summary,
            checks,
            duration_ms,
        })
    }
}
