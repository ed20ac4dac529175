use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::domain::RoundReport;

/// Bounded in-memory history of finished rounds.
///
/// Writes are synchronous and infallible from the caller's point of view; a
/// poisoned lock is recovered rather than propagated.
pub struct RoundCache {
    capacity: usize,
    rounds: RwLock<VecDeque<Arc<RoundReport>>>,
}

impl RoundCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            rounds: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, report: Arc<RoundReport>) {
        let mut rounds = self.rounds.write().unwrap_or_else(|e| e.into_inner());
        if rounds.len() == self.capacity {
            rounds.pop_front();
        }
        rounds.push_back(report);
    }

    /// Up to `n` rounds, newest first
    pub fn recent(&self, n: usize) -> Vec<Arc<RoundReport>> {
        let rounds = self.rounds.read().unwrap_or_else(|e| e.into_inner());
        rounds.iter().rev().take(n).cloned().collect()
    }

    pub fn latest(&self) -> Option<Arc<RoundReport>> {
        let rounds = self.rounds.read().unwrap_or_else(|e| e.into_inner());
        rounds.back().cloned()
    }

    pub fn get(&self, round_id: &str) -> Option<Arc<RoundReport>> {
        let rounds = self.rounds.read().unwrap_or_else(|e| e.into_inner());
        rounds.iter().find(|r| r.round_id == round_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rounds.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
