//! Cache Entry Module
//!
//! Per-key slot implementing stale-while-revalidate with single-flight
//! refresh.
//!
//! An entry moves between three observable states:
//! - Fresh: `now < expire_at`, reads return the cached pair.
//! - Loading-Cold: expired and never loaded; readers wait for the first load.
//! - Loading-Warm: expired and loaded before; readers get the stale pair
//!   while one background load runs.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::cache::CacheKey;
use crate::error::{CacheError, Result};
use crate::loader::Loader;
use crate::tasks::{spawn_refresh, Refresher};

/// Outcome of a loader call as handed back to callers.
pub type LoadResult<V, E> = std::result::Result<V, E>;

type SharedResult<L> = Arc<LoadResult<<L as Loader>::Value, <L as Loader>::Error>>;

// == Cache Entry ==
/// A single cache slot and its refresh state.
pub struct Entry<L: Loader> {
    key: CacheKey,
    params: L::Params,
    /// Reference point for `expire_at`
    born: Instant,
    /// Nanoseconds after `born` at which the pair goes stale, 0 = expired
    expire_at: AtomicU64,
    /// Latest stored result, swapped as a unit
    result: RwLock<Option<SharedResult<L>>>,
    initialized: AtomicBool,
    /// Single-flight gate
    refreshing: Mutex<bool>,
    /// Flips to true once, when the first load completes
    completion: watch::Sender<bool>,
}

impl<L: Loader> Entry<L> {
    // == Constructor ==
    /// Creates an expired, never-loaded entry.
    pub fn new(key: CacheKey, params: L::Params) -> Self {
        let (completion, _) = watch::channel(false);
        Self {
            key,
            params,
            born: Instant::now(),
            expire_at: AtomicU64::new(0),
            result: RwLock::new(None),
            initialized: AtomicBool::new(false),
            refreshing: Mutex::new(false),
            completion,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn params(&self) -> &L::Params {
        &self.params
    }

    // == Is Fresh ==
    /// True while the stored pair has not reached its expiry.
    pub fn is_fresh(&self) -> bool {
        self.elapsed_nanos() < self.expire_at.load(Ordering::Acquire)
    }

    /// True once any load has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_refreshing(&self) -> bool {
        *self.refreshing.lock()
    }

    /// Remaining time before the entry goes stale.
    pub fn ttl_remaining(&self) -> Duration {
        let expire_at = self.expire_at.load(Ordering::Acquire);
        Duration::from_nanos(expire_at.saturating_sub(self.elapsed_nanos()))
    }

    // == Value ==
    /// Returns the cached result, refreshing it when stale.
    ///
    /// Fresh and warm reads never wait. A cold read waits for the first load
    /// to complete, or until `cancel` fires.
    pub async fn value(
        self: &Arc<Self>,
        refresher: &Refresher<L>,
        cancel: Option<&CancellationToken>,
    ) -> Result<LoadResult<L::Value, L::Error>> {
        if self.is_fresh() {
            refresher.counters().record_hit();
            return self.current();
        }

        // Sampled before the refresh so a fast load cannot turn a miss into a
        // stale hit.
        let warm = self.is_initialized();
        self.refresh(refresher);

        if warm {
            refresher.counters().record_stale_hit();
        } else {
            refresher.counters().record_miss();
            self.wait_initialized(cancel).await?;
        }
        self.current()
    }

    // == Refresh ==
    /// Starts a background load unless one is already in flight.
    ///
    /// Returns whether a load was started.
    pub fn refresh(self: &Arc<Self>, refresher: &Refresher<L>) -> bool {
        let mut refreshing = self.refreshing.lock();
        if *refreshing {
            trace!(key = %self.key, "refresh already in flight");
            return false;
        }
        *refreshing = true;
        spawn_refresh(Arc::clone(self), refresher.clone());
        true
    }

    // == Complete ==
    /// Records the end of a load.
    ///
    /// `result` is None when the outcome must not replace the stored pair.
    /// Expiry, the single-flight gate and the first-load signal are updated
    /// regardless.
    pub fn complete(
        &self,
        result: Option<LoadResult<L::Value, L::Error>>,
        expire_in: Duration,
    ) {
        if let Some(result) = result {
            *self.result.write() = Some(Arc::new(result));
        }

        let expire_in = u64::try_from(expire_in.as_nanos()).unwrap_or(u64::MAX);
        self.expire_at.store(
            self.elapsed_nanos().saturating_add(expire_in),
            Ordering::Release,
        );

        *self.refreshing.lock() = false;

        if !self.initialized.swap(true, Ordering::AcqRel) {
            self.completion.send_replace(true);
        }
    }

    /// Stored result without touching freshness or refresh state.
    pub fn current(&self) -> Result<LoadResult<L::Value, L::Error>> {
        match self.result.read().as_ref() {
            Some(result) => Ok((**result).clone()),
            None => Err(CacheError::Unloaded(self.key.to_string())),
        }
    }

    async fn wait_initialized(&self, cancel: Option<&CancellationToken>) -> Result<()> {
        let mut rx = self.completion.subscribe();
        let ready = async {
            loop {
                let done = *rx.borrow_and_update();
                if done {
                    return Ok(());
                }
                if rx.changed().await.is_err() {
                    return Err(CacheError::Unloaded(self.key.to_string()));
                }
            }
        };

        match cancel {
            Some(token) => tokio::select! {
                res = ready => res,
                _ = token.cancelled() => Err(CacheError::Cancelled(self.key.to_string())),
            },
            None => ready.await,
        }
    }

    fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.born.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

impl<L: Loader> fmt::Debug for Entry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("ttl_remaining", &self.ttl_remaining())
            .field("initialized", &self.is_initialized())
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}
