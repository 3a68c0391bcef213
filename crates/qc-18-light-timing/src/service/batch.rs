//! Cancellable fan-out over independent jobs.
//!
//! One task per job. Tasks write into shared maps as they finish, so a
//! cancelled batch still returns everything that completed before the
//! cancellation was observed.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::domain::{BatchOutcome, TimingResult};
use crate::ports::TimingStats;

pub(crate) async fn fan_out<K, V, F>(
    jobs: Vec<(K, F)>,
    cancel: &CancellationToken,
    stats: &Arc<dyn TimingStats>,
) -> BatchOutcome<K, V>
where
    K: Eq + Hash + Display + Send + 'static,
    V: Send + 'static,
    F: Future<Output = TimingResult<V>> + Send + 'static,
{
    let total = jobs.len();
    if total == 0 {
        return BatchOutcome::empty();
    }
    if cancel.is_cancelled() {
        debug!(total, "Batch cancelled before start");
        return BatchOutcome {
            results: HashMap::new(),
            failures: Vec::new(),
            total,
            cancelled: true,
        };
    }

    let results = Arc::new(Mutex::new(HashMap::with_capacity(total)));
    let failures = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = JoinSet::new();

    for (key, job) in jobs {
        let results = Arc::clone(&results);
        let failures = Arc::clone(&failures);
        let stats = Arc::clone(stats);
        tasks.spawn(async move {
            match job.await {
                Ok(value) => {
                    stats.batch_item(true);
                    results.lock().insert(key, value);
                }
                Err(e) => {
                    stats.batch_item(false);
                    warn!(item = %key, error = %e, "Batch item failed");
                    failures.lock().push((key, e));
                }
            }
        });
    }

    let mut cancel_requested = false;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancel_requested = true;
                break;
            }
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Err(e)) if e.is_panic() => error!(error = %e, "Batch task panicked"),
                Some(_) => {}
            }
        }
    }
    if cancel_requested {
        // Abort whatever is still running and wait for the aborts to land
        tasks.shutdown().await;
    }

    let results = std::mem::take(&mut *results.lock());
    let failures = std::mem::take(&mut *failures.lock());
    let completed = results.len() + failures.len();
    let cancelled = cancel_requested && completed < total;
    if cancelled {
        debug!(completed, total, "Batch cancelled");
    }

    BatchOutcome {
        results,
        failures,
        total,
        cancelled,
    }
}
