//! Trade execution boundary

pub mod paper;

pub use paper::PaperExecutor;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{ExecutionDetails, TradingDecision};
use crate::error::Result;

/// One non-hold decision to execute
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub agent_id: String,
    pub round_id: String,
    pub decision: TradingDecision,
    /// Snapshot price for the decision's symbol, if the snapshot has one
    pub reference_price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub details: Option<ExecutionDetails>,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn filled(details: ExecutionDetails) -> Self {
        Self {
            success: true,
            details: Some(details),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            details: None,
            error: Some(error.into()),
        }
    }
}

/// Executes trades. Never called for holds.
///
/// `Err` and `Ok(outcome)` with `success == false` are both recorded as a
/// failed execution for the agent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    fn is_paper(&self) -> bool;

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome>;
}
