use serde::{Deserialize, Serialize};
use std::fmt;

/// Round lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    /// Round object created, nothing checked yet
    NotStarted,
    /// Pre-round safety gate running
    GateCheck,
    /// Gate vetoed the round
    Blocked,
    /// Trying to take the round lock
    LockWait,
    /// Another round holds the lock
    Skipped,
    /// Agents are being processed
    Running,
    /// Results collected and summarized
    Aggregated,
}

impl RoundPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundPhase::NotStarted => "NOT_STARTED",
            RoundPhase::GateCheck => "GATE_CHECK",
            RoundPhase::Blocked => "BLOCKED",
            RoundPhase::LockWait => "LOCK_WAIT",
            RoundPhase::Skipped => "SKIPPED",
            RoundPhase::Running => "RUNNING",
            RoundPhase::Aggregated => "AGGREGATED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: RoundPhase) -> bool {
        use RoundPhase::*;

        matches!(
            (self, target),
            (NotStarted, GateCheck)
                | (GateCheck, Blocked)
                | (GateCheck, LockWait)
                | (LockWait, Skipped)
                | (LockWait, Running)
                | (Running, Aggregated)
        )
    }

    /// No transition leaves a terminal state; a new round id is required
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RoundPhase::Blocked | RoundPhase::Skipped | RoundPhase::Aggregated
        )
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
