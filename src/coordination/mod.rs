//! Round coordination
//!
//! - Round lock: at most one round in flight per process
//! - Decision circuit breaker: per-agent safety rules and failure circuits

pub mod circuit_breaker;
pub mod round_lock;

pub use circuit_breaker::{AgentBreakerStats, BreakerVerdict, CircuitState, DecisionCircuitBreaker};
pub use round_lock::{LockStatus, RoundLock, RoundLockGuard};
