//! Round orchestration

pub mod aggregate;
pub mod phase;
pub mod round;
pub mod schedule;

pub use aggregate::{build_summary, compute_consensus};
pub use phase::PhaseTracker;
pub use round::{best_effort, new_round_id, RoundOrchestrator, RoundSettings};
pub use schedule::run_schedule;
