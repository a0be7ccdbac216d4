//! Per-URL single-flight registry
//!
//! At most one pass runs per key. The first caller becomes the leader and
//! gets a [`FlightGuard`]; callers arriving while it runs get a [`Waiter`]
//! that resolves to the leader's outcome. The registry also keeps the
//! `Idle`/`Refreshing` status and the last failure reason per key.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;
use crate::models::SyncStatus;

type Outcome<T> = Result<T, IngestError>;
type Slot<T> = Option<Outcome<T>>;

struct Flight<T> {
    started_at: DateTime<Utc>,
    rx: watch::Receiver<Slot<T>>,
    token: CancellationToken,
}

struct Entry<T> {
    flight: Option<Flight<T>>,
    last_synced_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self {
            flight: None,
            last_synced_at: None,
            last_error: None,
        }
    }
}

pub struct SyncRegistry<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T> Default for SyncRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

/// Outcome of [`SyncRegistry::join`]
pub enum Join<T: Clone> {
    Leader(FlightGuard<T>),
    Follower(Waiter<T>),
}

impl<T: Clone> SyncRegistry<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<T>>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a pass for `key`, or attach to the one already running
    pub fn join(self: &Arc<Self>, key: &str, now: DateTime<Utc>) -> Join<T> {
        let mut entries = self.lock();
        let entry = entries.entry(key.to_string()).or_default();

        if let Some(flight) = &entry.flight {
            return Join::Follower(Waiter {
                rx: flight.rx.clone(),
            });
        }

        let (tx, rx) = watch::channel(None);
        let token = CancellationToken::new();
        entry.flight = Some(Flight {
            started_at: now,
            rx,
            token: token.clone(),
        });
        entry.last_error = None;

        Join::Leader(FlightGuard {
            registry: Arc::clone(self),
            key: key.to_string(),
            tx,
            token,
            finished: false,
        })
    }

    /// Cancel the running pass for `key`; `false` when none runs
    pub fn cancel(&self, key: &str) -> bool {
        match self.lock().get(key).and_then(|e| e.flight.as_ref()) {
            Some(flight) => {
                flight.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.lock().get(key).is_some_and(|e| e.flight.is_some())
    }

    /// Status of `key`, `None` when it was never synced in this process
    pub fn status(&self, key: &str) -> Option<SyncStatus> {
        self.lock().get(key).map(|entry| match &entry.flight {
            Some(flight) => SyncStatus::Refreshing {
                started_at: flight.started_at,
            },
            None => SyncStatus::Idle {
                last_synced_at: entry.last_synced_at,
                last_error: entry.last_error.clone(),
            },
        })
    }

    /// Drop all bookkeeping for `key`
    pub fn forget(&self, key: &str) {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|e| e.flight.is_none()) {
            entries.remove(key);
        }
    }

    fn settle(&self, key: &str, result: Result<Option<DateTime<Utc>>, String>) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.flight = None;
            match result {
                Ok(synced_at) => {
                    if synced_at.is_some() {
                        entry.last_synced_at = synced_at;
                    }
                    entry.last_error = None;
                }
                Err(reason) => entry.last_error = Some(reason),
            }
        }
    }
}

/// Held by the caller that runs the pass
///
/// Dropping it without [`FlightGuard::finish`] (the pass future was dropped)
/// releases the key and resolves every waiter to `Cancelled`.
pub struct FlightGuard<T: Clone> {
    registry: Arc<SyncRegistry<T>>,
    key: String,
    tx: watch::Sender<Slot<T>>,
    token: CancellationToken,
    finished: bool,
}

impl<T: Clone> FlightGuard<T> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Publish the outcome to waiters and release the key
    ///
    /// `synced_at` is recorded as the last successful sync on success.
    pub fn finish(mut self, outcome: Outcome<T>, synced_at: Option<DateTime<Utc>>) -> Outcome<T> {
        let settled = match &outcome {
            Ok(_) => Ok(synced_at),
            Err(e) => Err(e.to_string()),
        };
        // Release before publishing so a caller arriving now starts a fresh pass
        self.registry.settle(&self.key, settled);
        self.finished = true;
        let _ = self.tx.send(Some(outcome.clone()));
        outcome
    }
}

impl<T: Clone> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.registry
                .settle(&self.key, Err(IngestError::Cancelled.to_string()));
        }
    }
}

/// Held by callers piggybacking on a running pass
pub struct Waiter<T> {
    rx: watch::Receiver<Slot<T>>,
}

impl<T: Clone> Waiter<T> {
    pub async fn wait(mut self) -> Outcome<T> {
        // Err means the leader went away; the last value still tells how it ended
        let _ = self.rx.wait_for(Option::is_some).await;
        let slot = self.rx.borrow().clone();
        slot.unwrap_or(Err(IngestError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_000, 0).unwrap()
    }

    #[tokio::test]
    async fn test_second_join_follows_leader() {
        let registry = SyncRegistry::<usize>::new();
        let Join::Leader(guard) = registry.join("k", now()) else {
            panic!("first join must lead");
        };
        let Join::Follower(waiter) = registry.join("k", now()) else {
            panic!("second join must follow");
        };
        assert!(registry.status("k").unwrap().is_refreshing());

        let follower = tokio::spawn(waiter.wait());
        assert_eq!(guard.finish(Ok(7), Some(now())), Ok(7));
        assert_eq!(follower.await.unwrap(), Ok(7));

        assert_eq!(
            registry.status("k"),
            Some(SyncStatus::Idle {
                last_synced_at: Some(now()),
                last_error: None
            })
        );
        assert!(matches!(registry.join("k", now()), Join::Leader(_)));
    }

    #[tokio::test]
    async fn test_failure_is_retained_until_next_attempt() {
        let registry = SyncRegistry::<usize>::new();
        let Join::Leader(guard) = registry.join("k", now()) else {
            panic!("first join must lead");
        };
        let _ = guard.finish(Err(IngestError::NotFound("k".into())), None);
        assert_eq!(
            registry.status("k").unwrap().last_error(),
            Some("Not found: k")
        );

        let Join::Leader(_guard) = registry.join("k", now()) else {
            panic!("idle key must lead");
        };
        assert_eq!(registry.status("k").unwrap().last_error(), None);
    }

    #[tokio::test]
    async fn test_dropped_leader_cancels_waiters() {
        let registry = SyncRegistry::<usize>::new();
        let Join::Leader(guard) = registry.join("k", now()) else {
            panic!("first join must lead");
        };
        let Join::Follower(waiter) = registry.join("k", now()) else {
            panic!("second join must follow");
        };
        drop(guard);

        assert_eq!(waiter.wait().await, Err(IngestError::Cancelled));
        assert!(!registry.is_running("k"));
    }

    #[tokio::test]
    async fn test_cancel_trips_token() {
        let registry = SyncRegistry::<usize>::new();
        assert!(!registry.cancel("k"));
        let Join::Leader(guard) = registry.join("k", now()) else {
            panic!("first join must lead");
        };
        assert!(registry.cancel("k"));
        assert!(guard.token().is_cancelled());
    }
}
