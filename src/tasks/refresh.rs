//! Refresh Task
//!
//! Background task that runs one loader call for an entry and stores the
//! outcome.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::cache::{Counters, Entry};
use crate::loader::{LoadContext, Loader};

/// Everything a load task needs besides its entry.
///
/// Holds no reference to the container index, so a task that finishes after
/// its entry was removed writes into an unreachable entry and nothing else.
pub struct Refresher<L: Loader> {
    loader: Arc<L>,
    ttl: Duration,
    error_ttl: Option<Duration>,
    counters: Arc<Counters>,
    token: CancellationToken,
}

impl<L: Loader> Clone for Refresher<L> {
    fn clone(&self) -> Self {
        Self {
            loader: Arc::clone(&self.loader),
            ttl: self.ttl,
            error_ttl: self.error_ttl,
            counters: Arc::clone(&self.counters),
            token: self.token.clone(),
        }
    }
}

impl<L: Loader> Refresher<L> {
    pub fn new(
        loader: Arc<L>,
        ttl: Duration,
        error_ttl: Option<Duration>,
        counters: Arc<Counters>,
        token: CancellationToken,
    ) -> Self {
        Self {
            loader,
            ttl,
            error_ttl,
            counters,
            token,
        }
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Calls the loader for `entry` and completes it.
    ///
    /// Resource exhaustion and loader panics leave the stored pair as it was;
    /// every outcome pushes the expiry forward.
    pub fn run(&self, entry: &Entry<L>) {
        let ctx = LoadContext::new(entry.key().clone(), self.token.child_token());
        let started = Instant::now();
        self.counters.record_load();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.loader.load(entry.params(), &ctx)
        }));

        let (result, expire_in) = match outcome {
            Ok(Err(err)) if self.loader.is_resource_exhausted(&err) => {
                self.counters.record_exhausted();
                warn!(
                    key = %entry.key(),
                    "Loader reported resource exhaustion, keeping previous result"
                );
                (None, self.ttl)
            }
            Ok(Err(err)) => {
                self.counters.record_load_error();
                debug!(key = %entry.key(), "Loader returned an error, caching it");
                (Some(Err(err)), self.error_ttl.unwrap_or(self.ttl))
            }
            Ok(Ok(value)) => (Some(Ok(value)), self.ttl),
            Err(_) => {
                self.counters.record_exhausted();
                error!(key = %entry.key(), "Loader panicked, keeping previous result");
                (None, self.ttl)
            }
        };

        entry.complete(result, expire_in);
        debug!(
            key = %entry.key(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Refresh complete"
        );
    }
}

/// Spawns the load for `entry` on tokio's blocking pool.
///
/// The caller must already have claimed the entry's single-flight gate.
///
/// # Returns
/// A JoinHandle for the spawned task. Dropping it detaches the task; the
/// load always runs to completion.
pub fn spawn_refresh<L: Loader>(
    entry: Arc<Entry<L>>,
    refresher: Refresher<L>,
) -> JoinHandle<()> {
    let mut guard = RefreshGuard::new(entry);
    tokio::task::spawn_blocking(move || {
        refresher.run(&guard.entry);
        guard.disarm();
    })
}

// == Refresh Guard ==
/// Completes its entry without a result if dropped while still armed.
///
/// A blocking task that never starts (runtime shutdown) is dropped with its
/// closure; the guard then releases the single-flight gate and any cold
/// waiters.
struct RefreshGuard<L: Loader> {
    entry: Arc<Entry<L>>,
    armed: bool,
}

impl<L: Loader> RefreshGuard<L> {
    fn new(entry: Arc<Entry<L>>) -> Self {
        Self { entry, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<L: Loader> Drop for RefreshGuard<L> {
    fn drop(&mut self) {
        if self.armed {
            warn!(key = %self.entry.key(), "Refresh dropped before it ran");
            self.entry.complete(None, Duration::ZERO);
        }
    }
}
