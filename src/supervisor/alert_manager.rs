//! Alert Manager
//!
//! Turns finished rounds into alerts, broadcasts them locally and optionally
//! POSTs warning-and-above alerts to a webhook. Duplicate alerts are rate
//! limited per key, and a global per-minute cap prevents alert storms.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::AlertConfig;
use crate::domain::{BreakerRule, RoundPhase, RoundReport};
use crate::error::{ArenaError, Result};
use crate::persistence::RoundSink;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Log only
    Info,
    /// Webhook notification
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub component: String,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, component: &str, title: &str, message: &str) -> Self {
        Self {
            level,
            component: component.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Alerts worth raising for a finished round
pub fn alerts_for_round(report: &RoundReport) -> Vec<Alert> {
    let mut alerts = Vec::new();

    match report.phase {
        RoundPhase::Blocked => {
            alerts.push(
                Alert::new(
                    AlertLevel::Error,
                    "safety_gate",
                    "Round Blocked",
                    &report.errors.join("; "),
                )
                .with_metadata(serde_json::json!({ "round_id": report.round_id })),
            );
            return alerts;
        }
        RoundPhase::Skipped => {
            alerts.push(Alert::new(
                AlertLevel::Info,
                "round_lock",
                "Round Skipped",
                &format!("{} skipped: another round in progress", report.round_id),
            ));
            return alerts;
        }
        _ => {}
    }

    for result in report.failed_agents() {
        alerts.push(
            Alert::new(
                AlertLevel::Warning,
                &result.agent_id,
                "Agent Decision Failed",
                &result.decision.reasoning,
            )
            .with_metadata(serde_json::json!({ "round_id": report.round_id })),
        );
    }

    for result in report.results.iter().filter(|r| !r.agent_failed) {
        if let Some(err) = &result.execution_error {
            alerts.push(
                Alert::new(AlertLevel::Warning, &result.agent_id, "Execution Failed", err)
                    .with_metadata(serde_json::json!({
                        "round_id": report.round_id,
                        "symbol": result.decision.symbol,
                    })),
            );
        }
    }

    for activation in &report.circuit_breaker_activations {
        let level = if activation.rule == BreakerRule::AgentCircuitOpen {
            AlertLevel::Error
        } else {
            AlertLevel::Info
        };
        alerts.push(
            Alert::new(
                level,
                &activation.agent_id,
                &format!("Circuit Breaker: {}", activation.rule),
                &activation.reason,
            )
            .with_metadata(serde_json::json!({
                "round_id": report.round_id,
                "symbol": activation.symbol,
                "from": activation.original_action,
                "to": activation.new_action,
            })),
        );
    }

    alerts
}

#[derive(Debug)]
struct RateLimitState {
    last_sent: DateTime<Utc>,
    suppressed_count: u32,
}

pub struct AlertManager {
    config: AlertConfig,
    http: Option<Client>,
    rate_limits: Arc<RwLock<HashMap<String, RateLimitState>>>,
    alerts_this_minute: Arc<RwLock<Vec<DateTime<Utc>>>>,
    event_tx: tokio::sync::broadcast::Sender<Alert>,
}

impl AlertManager {
    pub fn new(config: AlertConfig) -> Result<Self> {
        let (event_tx, _) = tokio::sync::broadcast::channel(64);
        let http = match config.webhook_url.as_deref() {
            Some(url) if !url.is_empty() => Some(
                Client::builder()
                    .timeout(Duration::from_secs(10))
                    .build()
                    .map_err(|e| {
                        ArenaError::Internal(format!("Failed to create HTTP client: {}", e))
                    })?,
            ),
            _ => None,
        };
        Ok(Self {
            config,
            http,
            rate_limits: Arc::new(RwLock::new(HashMap::new())),
            alerts_this_minute: Arc::new(RwLock::new(Vec::new())),
            event_tx,
        })
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Alert> {
        self.event_tx.subscribe()
    }

    fn rate_limit_key(alert: &Alert) -> String {
        format!("{}:{}:{}", alert.component, alert.level, alert.title)
    }

    async fn should_rate_limit(&self, alert: &Alert) -> bool {
        let key = Self::rate_limit_key(alert);
        let now = Utc::now();

        let mut limits = self.rate_limits.write().await;

        if let Some(state) = limits.get_mut(&key) {
            let elapsed = now.signed_duration_since(state.last_sent).num_seconds() as u64;
            if elapsed < self.config.rate_limit_secs {
                state.suppressed_count += 1;
                debug!(
                    "Rate limiting alert '{}' ({} suppressed)",
                    alert.title, state.suppressed_count
                );
                return true;
            }

            state.last_sent = now;
            state.suppressed_count = 0;
        } else {
            limits.insert(
                key,
                RateLimitState {
                    last_sent: now,
                    suppressed_count: 0,
                },
            );
        }

        false
    }

    async fn is_throttled(&self) -> bool {
        let now = Utc::now();
        let minute_ago = now - chrono::Duration::minutes(1);

        let mut alerts = self.alerts_this_minute.write().await;
        alerts.retain(|t| *t > minute_ago);

        if alerts.len() >= self.config.max_alerts_per_minute as usize {
            warn!(
                "Alert throttling: {} alerts in last minute (max: {})",
                alerts.len(),
                self.config.max_alerts_per_minute
            );
            return true;
        }

        alerts.push(now);
        false
    }

    pub async fn alert(&self, alert: Alert) {
        let _ = self.event_tx.send(alert.clone());

        match alert.level {
            AlertLevel::Info => info!("[{}] {}: {}", alert.component, alert.title, alert.message),
            AlertLevel::Warning => {
                warn!("[{}] {}: {}", alert.component, alert.title, alert.message)
            }
            AlertLevel::Error | AlertLevel::Critical => {
                error!("[{}] {}: {}", alert.component, alert.title, alert.message)
            }
        }

        if alert.level < AlertLevel::Warning {
            return;
        }
        if self.should_rate_limit(&alert).await || self.is_throttled().await {
            return;
        }

        if let (Some(http), Some(url)) = (&self.http, self.config.webhook_url.as_deref()) {
            match http.post(url).json(&alert).send().await {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => error!("Alert webhook returned {}", resp.status()),
                Err(e) => error!("Failed to send alert webhook: {}", e),
            }
        }
    }

    pub async fn get_suppressed_counts(&self) -> HashMap<String, u32> {
        let limits = self.rate_limits.read().await;
        limits
            .iter()
            .filter(|(_, state)| state.suppressed_count > 0)
            .map(|(key, state)| (key.clone(), state.suppressed_count))
            .collect()
    }
}

#[async_trait]
impl RoundSink for AlertManager {
    fn name(&self) -> &str {
        "alerts"
    }

    async fn publish(&self, report: &RoundReport) -> Result<()> {
        for alert in alerts_for_round(report) {
            self.alert(alert).await;
        }
        Ok(())
    }
}
