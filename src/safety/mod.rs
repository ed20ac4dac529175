//! Pre-round safety gate
//!
//! The gate runs before the round lock is taken. A veto aborts the round with
//! a single error; a gate that cannot run at all is logged and the round
//! proceeds.

pub mod health_gate;
pub mod kill_switch;

pub use health_gate::HealthGate;
pub use kill_switch::{KillSwitch, KillSwitchState, StopReason};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateSummary {
    pub passed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
    /// A failed blocking check vetoes the round
    pub blocking: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateResult {
    pub proceed: bool,
    pub block_reason: Option<String>,
    /// Execution mode label ("paper" or "live")
    pub mode: String,
    pub summary: GateSummary,
    pub checks: Vec<CheckOutcome>,
    pub duration_ms: u64,
}

impl GateResult {
    pub fn pass(mode: &str) -> Self {
        Self {
            proceed: true,
            block_reason: None,
            mode: mode.to_string(),
            summary: GateSummary::default(),
            checks: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn block(mode: &str, reason: impl Into<String>) -> Self {
        Self {
            proceed: false,
            block_reason: Some(reason.into()),
            ..Self::pass(mode)
        }
    }
}

#[async_trait]
pub trait PreRoundGate: Send + Sync {
    async fn check(&self) -> Result<GateResult>;
}
