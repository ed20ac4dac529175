//! Round lock.
//!
//! Mutual exclusion is per `RoundLock` value and its clones. Orchestrators
//! only exclude each other when they are built with clones of one lock
//! (`RoundOrchestrator::with_lock`); each `RoundOrchestrator::new` starts with
//! a fresh lock of its own.
//!
//! Non-blocking: a caller that finds the lock held gets `None` and reports the
//! round as skipped. The guard releases on drop, which covers early returns,
//! errors and unwinding panics alike.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Holder {
    lock_id: String,
    round_id: String,
    acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LockStatus {
    pub held: bool,
    pub lock_id: Option<String>,
    pub round_id: Option<String>,
    pub acquired_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct RoundLock {
    inner: Arc<AsyncMutex<()>>,
    holder: Arc<Mutex<Option<Holder>>>,
}

/// Held round lock; dropping it releases the lock
pub struct RoundLockGuard {
    lock_id: String,
    holder: Arc<Mutex<Option<Holder>>>,
    _guard: OwnedMutexGuard<()>,
}

impl RoundLockGuard {
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }
}

impl Drop for RoundLockGuard {
    fn drop(&mut self) {
        let mut holder = self.holder.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(h) = holder.take() {
            let held_ms = (Utc::now() - h.acquired_at).num_milliseconds();
            debug!(lock_id = %h.lock_id, round_id = %h.round_id, held_ms, "Round lock released");
        }
    }
}

impl RoundLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire without waiting
    pub fn try_acquire(&self, round_id: &str) -> Option<RoundLockGuard> {
        let guard = self.inner.clone().try_lock_owned().ok()?;
        let lock_id = format!("lock_{}", Uuid::new_v4().simple());
        {
            let mut holder = self.holder.lock().unwrap_or_else(|e| e.into_inner());
            *holder = Some(Holder {
                lock_id: lock_id.clone(),
                round_id: round_id.to_string(),
                acquired_at: Utc::now(),
            });
        }
        info!(%lock_id, round_id, "Round lock acquired");
        Some(RoundLockGuard {
            lock_id,
            holder: self.holder.clone(),
            _guard: guard,
        })
    }

    /// Run `body` under the lock, or return `None` immediately if it is held
    pub async fn try_run<F, T>(&self, round_id: &str, body: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let guard = self.try_acquire(round_id)?;
        let out = body.await;
        drop(guard);
        Some(out)
    }

    pub fn status(&self) -> LockStatus {
        let holder = self.holder.lock().unwrap_or_else(|e| e.into_inner());
        match holder.as_ref() {
            Some(h) => LockStatus {
                held: true,
                lock_id: Some(h.lock_id.clone()),
                round_id: Some(h.round_id.clone()),
                acquired_at: Some(h.acquired_at),
            },
            None => LockStatus {
                held: false,
                lock_id: None,
                round_id: None,
                acquired_at: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::panic::AssertUnwindSafe;

    #[tokio::test]
    async fn test_second_acquire_fails_while_held() {
        let lock = RoundLock::new();
        let guard = lock.try_acquire("r1").unwrap();
        assert!(lock.try_acquire("r2").is_none());

        let status = lock.status();
        assert!(status.held);
        assert_eq!(status.round_id.as_deref(), Some("r1"));
        assert_eq!(status.lock_id.as_deref(), Some(guard.lock_id()));

        drop(guard);
        assert!(!lock.status().held);
        assert!(lock.try_acquire("r3").is_some());
    }

    #[tokio::test]
    async fn test_try_run_skips_when_contended() {
        let lock = RoundLock::new();
        let _held = lock.try_acquire("r1").unwrap();
        let ran = lock.try_run("r2", async { 42 }).await;
        assert_eq!(ran, None);
    }

    #[tokio::test]
    async fn test_released_after_panic() {
        let lock = RoundLock::new();
        let result = AssertUnwindSafe(lock.try_run::<_, u32>("r1", async { panic!("boom") }))
            .catch_unwind()
            .await;
        assert!(result.is_err());
        assert!(!lock.status().held);
        assert_eq!(lock.try_run("r2", async { 7 }).await, Some(7));
    }
}
