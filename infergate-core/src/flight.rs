//! Single-flight coordination: at most one computation per cache key.
//!
//! The first caller to miss on a key becomes the leader and spawns the
//! computation as its own task. Every caller that misses on the same key
//! while that task is running attaches to it as a follower and receives a
//! clone of the same outcome.
//!
//! The cache re-check, the follower lookup and the leader registration all
//! happen under one lock, so two callers can never both decide they are the
//! first miss for a key.
//!
//! On success the value is written to the cache *before* the in-flight entry
//! is removed, so a concurrent caller always finds one or the other. On
//! failure nothing is cached and the next caller retries.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::{CacheKey, ResultCache};
use crate::error::DispatchError;

type Outcome = Result<Value, DispatchError>;
type SharedComputation = Shared<BoxFuture<'static, Outcome>>;

type InFlightMap = Arc<Mutex<HashMap<CacheKey, InFlight>>>;

/// A running computation and the number of callers attached to it
struct InFlight {
    id: u64,
    computation: SharedComputation,
    waiters: usize,
}

/// How a caller took part in a computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Found the value in the cache at registration time
    Cached,
    /// Started the computation
    Leader,
    /// Attached to a computation another caller started
    Follower,
}

/// Deduplicates concurrent computations of the same key
pub struct SingleFlight {
    cache: Arc<ResultCache>,
    in_flight: InFlightMap,
    leaders: AtomicU64,
    followers: AtomicU64,
}

/// Removes the in-flight entry when the computation task ends, including
/// when it panics or is aborted
struct Unregister {
    in_flight: InFlightMap,
    key: Option<CacheKey>,
}

impl Drop for Unregister {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.in_flight).remove(&key);
        }
    }
}

/// Detaches one caller from a computation when its future completes or is
/// dropped. A stale id means the entry was already replaced.
struct Detach {
    in_flight: InFlightMap,
    key: CacheKey,
    id: u64,
}

impl Drop for Detach {
    fn drop(&mut self) {
        let mut map = lock(&self.in_flight);
        if let Some(entry) = map.get_mut(&self.key) {
            if entry.id == self.id {
                entry.waiters = entry.waiters.saturating_sub(1);
            }
        }
    }
}

fn lock(map: &Mutex<HashMap<CacheKey, InFlight>>) -> MutexGuard<'_, HashMap<CacheKey, InFlight>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SingleFlight {
    /// Create a coordinator publishing successful results into `cache`
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            leaders: AtomicU64::new(0),
            followers: AtomicU64::new(0),
        }
    }

    /// Resolve `key`, running `compute` only if no cached value and no
    /// running computation exists for it.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn run_once<C, F>(&self, key: CacheKey, compute: C) -> Outcome
    where
        C: FnOnce() -> F + Send,
        F: Future<Output = Outcome> + Send + 'static,
    {
        self.run_once_with_role(key, compute).await.0
    }

    /// Same as [`run_once`](Self::run_once), also reporting the caller's role
    pub async fn run_once_with_role<C, F>(&self, key: CacheKey, compute: C) -> (Outcome, Role)
    where
        C: FnOnce() -> F + Send,
        F: Future<Output = Outcome> + Send + 'static,
    {
        let (computation, role, id) = {
            let mut map = lock(&self.in_flight);

            if let Some(value) = self.cache.peek(&key) {
                return (Ok(value), Role::Cached);
            }

            match map.get_mut(&key) {
                Some(entry) => {
                    entry.waiters += 1;
                    self.followers.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        model = %key.model,
                        waiters = entry.waiters,
                        "Joining in-flight computation"
                    );
                    (entry.computation.clone(), Role::Follower, entry.id)
                }
                None => {
                    let id = self.leaders.fetch_add(1, Ordering::Relaxed);
                    let computation = self.spawn(key.clone(), compute());
                    map.insert(
                        key.clone(),
                        InFlight {
                            id,
                            computation: computation.clone(),
                            waiters: 1,
                        },
                    );
                    (computation, Role::Leader, id)
                }
            }
        };

        let _detach = Detach {
            in_flight: self.in_flight.clone(),
            key,
            id,
        };
        (computation.await, role)
    }

    /// Spawn the computation task. Called with the in-flight lock held, so
    /// the task cannot unregister before it has been registered.
    fn spawn<F>(&self, key: CacheKey, fut: F) -> SharedComputation
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let cache = self.cache.clone();
        let guard = Unregister {
            in_flight: self.in_flight.clone(),
            key: Some(key.clone()),
        };

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let outcome = fut.await;
            match &outcome {
                Ok(value) => cache.put(key, value.clone()),
                Err(e) => tracing::debug!(model = %key.model, error = %e, "Computation failed, not cached"),
            }
            outcome
        });

        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(DispatchError::adapter("adapter task panicked")),
                Err(e) => Err(DispatchError::Internal(format!("computation aborted: {e}"))),
            }
        }
        .boxed()
        .shared()
    }

    /// Number of keys currently being computed
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Total callers attached to running computations
    pub fn waiters(&self) -> usize {
        lock(&self.in_flight).values().map(|e| e.waiters).sum()
    }

    /// Computations started so far
    pub fn leaders(&self) -> u64 {
        self.leaders.load(Ordering::Relaxed)
    }

    /// Callers that attached to an existing computation
    pub fn followers(&self) -> u64 {
        self.followers.load(Ordering::Relaxed)
    }
}
