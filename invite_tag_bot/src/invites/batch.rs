//! Bounded-concurrency batch runner.
//!
//! Runs one worker future per task, never more than `concurrency` of them at
//! once, and puts every result at the index of the task it came from. All
//! workers are polled from the calling task, so nothing here needs to be
//! `Send` and the cursor and result slots need no locking.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use futures::{stream::FuturesUnordered, StreamExt};
use tokio::time::Instant;

/// Floor for elapsed time and rate in the ETA math, to dodge division by zero.
const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("Concurrency limit must be at least 1")]
    ZeroConcurrency,
}

/// Snapshot handed to the progress callback after every completed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    /// Estimated seconds remaining. Always at least 1.
    pub eta_secs: u64,
}

impl BatchProgress {
    fn new(completed: usize, total: usize, elapsed_secs: f64) -> Self {
        BatchProgress {
            completed,
            total,
            eta_secs: estimate_eta_secs(completed, total, elapsed_secs),
        }
    }

    pub fn is_final(&self) -> bool {
        self.completed == self.total
    }

    /// Downsampling for slow displays: `true` on every `stride`-th completion
    /// and always on the last one.
    pub fn should_report(&self, stride: usize) -> bool {
        self.is_final() || (stride > 0 && self.completed % stride == 0)
    }
}

/// Throughput extrapolation: remaining tasks divided by the observed rate.
pub fn estimate_eta_secs(completed: usize, total: usize, elapsed_secs: f64) -> u64 {
    let rate = completed as f64 / elapsed_secs.max(EPSILON);
    let remaining = total.saturating_sub(completed) as f64;
    let eta = (remaining / rate.max(EPSILON)).round();
    // Float to int casts saturate, so a huge ETA doesn't wrap around.
    (eta as u64).max(1)
}

/// Cooperative cancellation for [`run_batch_cancellable`].
///
/// Checked before every new worker is launched. Workers already running
/// are left to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run `worker` over every task with at most `concurrency` of them in flight.
///
/// Returns exactly one result per task, in task order, regardless of the
/// order they finished in. `on_progress` is called once per completed task.
/// The worker can't fail: anything fallible must be turned into a result
/// value inside of it.
///
/// # Errors
/// Returns [`BatchError::ZeroConcurrency`] if `concurrency` is zero.
pub async fn run_batch<'a, T, R, W, Fut, P>(
    tasks: &'a [T],
    worker: W,
    concurrency: usize,
    on_progress: P,
) -> Result<Vec<R>, BatchError>
where
    W: FnMut(&'a T) -> Fut,
    Fut: Future<Output = R>,
    P: FnMut(BatchProgress),
{
    let results =
        run_batch_cancellable(tasks, worker, concurrency, on_progress, &CancelFlag::new()).await?;

    // Never cancelled, so every slot is filled.
    let results: Vec<R> = results.into_iter().flatten().collect();
    debug_assert_eq!(results.len(), tasks.len());
    Ok(results)
}

/// Same as [`run_batch`], but stops launching new workers once `cancel`
/// is set. Tasks that were never started get [`None`].
///
/// # Errors
/// Returns [`BatchError::ZeroConcurrency`] if `concurrency` is zero.
pub async fn run_batch_cancellable<'a, T, R, W, Fut, P>(
    tasks: &'a [T],
    mut worker: W,
    concurrency: usize,
    mut on_progress: P,
    cancel: &CancelFlag,
) -> Result<Vec<Option<R>>, BatchError>
where
    W: FnMut(&'a T) -> Fut,
    Fut: Future<Output = R>,
    P: FnMut(BatchProgress),
{
    if concurrency == 0 {
        return Err(BatchError::ZeroConcurrency);
    }

    let total = tasks.len();
    let mut results: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();

    if total == 0 {
        return Ok(results);
    }

    let started = Instant::now();
    let mut in_flight = FuturesUnordered::new();
    let mut cursor = 0;
    let mut completed = 0;

    loop {
        // Keep the pool saturated.
        while in_flight.len() < concurrency && cursor < total && !cancel.is_cancelled() {
            let index = cursor;
            let future = worker(&tasks[index]);
            in_flight.push(async move { (index, future.await) });
            cursor += 1;
        }

        // Nothing running and nothing more to launch: the cursor is past the
        // end (or we got cancelled) and every launched worker has settled.
        let Some((index, result)) = in_flight.next().await else {
            break;
        };

        results[index] = Some(result);
        completed += 1;
        on_progress(BatchProgress::new(
            completed,
            total,
            started.elapsed().as_secs_f64(),
        ));
    }

    if cursor < total {
        log::info!(
            "Batch cancelled with {} of {} tasks never started.",
            total - cursor,
            total
        );
    }

    Ok(results)
}
