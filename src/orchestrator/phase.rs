use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::domain::RoundPhase;
use crate::error::{ArenaError, Result};

/// Tracks one round through its phases, rejecting invalid transitions
#[derive(Debug)]
pub struct PhaseTracker {
    round_id: String,
    phase: RoundPhase,
    history: Vec<(RoundPhase, DateTime<Utc>)>,
}

impl PhaseTracker {
    pub fn new(round_id: &str) -> Self {
        Self {
            round_id: round_id.to_string(),
            phase: RoundPhase::NotStarted,
            history: vec![(RoundPhase::NotStarted, Utc::now())],
        }
    }

    pub fn current(&self) -> RoundPhase {
        self.phase
    }

    pub fn history(&self) -> &[(RoundPhase, DateTime<Utc>)] {
        &self.history
    }

    pub fn advance(&mut self, next: RoundPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            error!(
                round_id = %self.round_id,
                from = %self.phase,
                to = %next,
                "Rejected round phase transition"
            );
            return Err(ArenaError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        debug!(round_id = %self.round_id, from = %self.phase, to = %next, "Round phase");
        self.phase = next;
        self.history.push((next, Utc::now()));
        Ok(())
    }
}
