//! Deadline scheduler for phase transitions.
//!
//! Deadlines live on the heist rows, not in the scheduler: a task here is
//! just "sleep until T, then run the transition". The transition itself is
//! a compare-and-set store command, so a task that fires after the row has
//! already moved on (a duplicate from recovery, or a race with another
//! process) detects the mismatch and no-ops. Past-due deadlines run
//! immediately, which is what replays them after a restart.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Sleep until the wall-clock deadline; returns at once when it passed.
pub async fn sleep_until_deadline(at: DateTime<Utc>) {
    let now = Utc::now();
    if at <= now {
        return;
    }
    if let Ok(wait) = (at - now).to_std() {
        tokio::time::sleep(wait).await;
    }
}

/// Spawn a deadline task.
///
/// `StateConflict` and `NotFound` outcomes are the expected no-op paths
/// for a stale timer and only logged at debug level; anything else is a
/// real failure and logged as such.
pub fn spawn_deadline<F, Fut>(label: &'static str, at: DateTime<Utc>, task: F) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = EngineResult<()>> + Send,
{
    tokio::spawn(async move {
        sleep_until_deadline(at).await;
        match task().await {
            Ok(()) => {},
            Err(EngineError::StateConflict(reason)) => {
                debug!(label, reason, "deadline task no-op: state already moved");
            },
            Err(EngineError::NotFound { entity_type, id }) => {
                debug!(label, entity_type, id, "deadline task no-op: entity gone");
            },
            Err(error) => {
                warn!(label, %error, "deadline task failed");
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_past_due_deadline_fires_immediately() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let handle = spawn_deadline("test", Utc::now() - Duration::seconds(10), move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        handle.await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_future_deadline_waits_until_due() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let started = std::time::Instant::now();
        let handle = spawn_deadline(
            "test",
            Utc::now() + Duration::milliseconds(60),
            move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
        );
        handle.await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
        // The task must not have fired early.
        assert!(started.elapsed() >= std::time::Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_conflict_outcome_is_swallowed() {
        let handle = spawn_deadline("test", Utc::now(), || async {
            Err(EngineError::StateConflict("already finished".to_string()))
        });
        // The task must not panic the runtime.
        handle.await.unwrap();
    }
}
