//! Kill switch
//!
//! An operator-controlled halt. While engaged, the pre-round gate blocks
//! every round; nothing already running is interrupted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StopReason {
    /// Manual trigger by operator
    Manual,
    /// Set from configuration at startup
    Configured,
    /// Repeated agent execution failures
    CircuitBreaker,
    Other(String),
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Manual => write!(f, "manual"),
            StopReason::Configured => write!(f, "configured"),
            StopReason::CircuitBreaker => write!(f, "circuit breaker"),
            StopReason::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KillSwitchState {
    pub active: bool,
    pub reason: Option<StopReason>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub context: Option<String>,
}

#[derive(Clone, Default)]
pub struct KillSwitch {
    engaged: Arc<AtomicBool>,
    state: Arc<RwLock<KillSwitchState>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill switch that starts engaged when `engaged` is set
    pub fn from_config(engaged: bool) -> Self {
        let ks = Self::new();
        if engaged {
            ks.engaged.store(true, Ordering::SeqCst);
            if let Ok(mut state) = ks.state.try_write() {
                *state = KillSwitchState {
                    active: true,
                    reason: Some(StopReason::Configured),
                    triggered_at: Some(Utc::now()),
                    context: Some("safety.kill_switch = true".to_string()),
                };
            }
        }
        ks
    }

    /// Fast atomic check
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Relaxed)
    }

    pub async fn state(&self) -> KillSwitchState {
        self.state.read().await.clone()
    }

    pub async fn engage(&self, reason: StopReason, context: Option<String>) {
        error!("KILL SWITCH ENGAGED: {} - {:?}", reason, context);
        self.engaged.store(true, Ordering::SeqCst);

        let mut state = self.state.write().await;
        state.active = true;
        state.reason = Some(reason);
        state.triggered_at = Some(Utc::now());
        state.context = context;
    }

    pub async fn release(&self, operator: &str) {
        info!("Kill switch released (operator: {})", operator);
        self.engaged.store(false, Ordering::SeqCst);
        *self.state.write().await = KillSwitchState::default();
    }

    /// Human-readable block reason while engaged
    pub async fn block_reason(&self) -> Option<String> {
        if !self.is_engaged() {
            return None;
        }
        let state = self.state.read().await;
        let reason = state
            .reason
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "engaged".to_string());
        Some(match state.context.as_deref() {
            Some(ctx) => format!("kill switch ({}): {}", reason, ctx),
            None => format!("kill switch ({})", reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_engage_and_release() {
        let ks = KillSwitch::new();
        assert!(!ks.is_engaged());
        assert!(ks.block_reason().await.is_none());

        ks.engage(StopReason::Manual, Some("maintenance".into())).await;
        assert!(ks.is_engaged());
        assert_eq!(ks.block_reason().await.unwrap(), "kill switch (manual): maintenance");

        ks.release("ops").await;
        assert!(!ks.is_engaged());
        assert!(!ks.state().await.active);
    }

    #[tokio::test]
    async fn test_configured_switch_starts_engaged() {
        let ks = KillSwitch::from_config(true);
        assert!(ks.is_engaged());
        assert!(ks.state().await.active);
    }
}
