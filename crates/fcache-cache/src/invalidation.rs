//! Expiration sweep.
//!
//! Every object written through the cache carries an `_invalidate_at`
//! timestamp. The sweep lists the store and removes the objects whose
//! timestamp has passed. Objects without one are left alone.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use fcache_core::error::{CacheError, InvalidationError};
use fcache_core::result::CacheResult;

use crate::logger::Level;
use crate::loading::LoadingCache;

impl LoadingCache {
    /// Run one sweep and return how many objects were removed.
    ///
    /// Unparseable timestamps and failed removals do not stop the pass; they
    /// are collected into the returned [`InvalidationError`].
    pub async fn invalidate(&self) -> Result<u64, InvalidationError> {
        let metas = match self.store.list().await {
            Ok(metas) => metas,
            Err(err) => {
                return Err(InvalidationError {
                    removed: 0,
                    errors: vec![self.record(err)],
                });
            }
        };

        let now = (self.now)();
        let mut removed = 0;
        let mut errors = Vec::new();

        for meta in metas {
            let deadline = match meta.invalidate_at() {
                None => continue,
                Some(Ok(at)) => at,
                Some(Err(err)) => {
                    errors.push(err);
                    continue;
                }
            };
            if deadline >= now {
                continue;
            }

            match self.store.remove(&meta.key).await {
                Ok(()) => {
                    removed += 1;
                    self.options.logger.log(
                        Level::DEBUG,
                        format_args!("removed file with key {:?}", meta.key),
                    );
                }
                // Already gone.
                Err(err) if err.is_not_found() => {}
                Err(err) => errors.push(self.record(err)),
            }
        }

        if errors.is_empty() {
            Ok(removed)
        } else {
            Err(InvalidationError { removed, errors })
        }
    }

    /// Sweep every `invalidate_period` until the cache is shut down.
    ///
    /// Fails immediately with a configuration error when the period is zero
    /// and returns a cancellation error on shutdown.
    pub async fn run(&self) -> CacheResult<()> {
        let period = self.options.invalidate_period;
        if period.is_zero() {
            return Err(CacheError::configuration(
                "invalidation period cannot be zero",
            ));
        }

        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "Invalidation loop started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.invalidate() => match result {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Invalidated expired files"),
                    Err(err) => {
                        warn!(removed = err.removed, errors = err.len(), "Invalidation pass failed");
                        self.options.logger.log(
                            Level::WARN,
                            format_args!("failed to invalidate cache items: {err}"),
                        );
                    }
                },
            }
        }

        info!("Invalidation loop stopped");
        Err(CacheError::cancelled("invalidation loop cancelled"))
    }

    /// Start [`run`](Self::run) on its own task.
    pub fn spawn_invalidation(self: &Arc<Self>) -> JoinHandle<CacheResult<()>> {
        let cache = Arc::clone(self);
        tokio::spawn(async move { cache.run().await })
    }
}
