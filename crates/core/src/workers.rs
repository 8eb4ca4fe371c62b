//! Bounded fan-out over page indices shared by the sampling and the
//! processing phase.

use crate::error::IngestError;
use crossbeam_channel::{bounded, unbounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::debug;

pub fn available_workers() -> usize {
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

pub(crate) type Status<T> = Result<(usize, T), IngestError>;

/// Runs `step` for every job on at most `workers` scoped threads.
///
/// Each worker builds its own state with `init` and keeps it until it exits,
/// so per-worker clients are dropped on every exit path. The first failing
/// status raises a cancellation flag and workers stop pulling jobs. Statuses
/// come back in completion order.
pub(crate) fn run_pool<S, T, I, F>(jobs: &[usize], workers: usize, init: I, step: F) -> Vec<Status<T>>
where
    T: Send,
    I: Fn(usize) -> Result<S, IngestError> + Sync,
    F: Fn(&mut S, usize) -> Result<T, IngestError> + Sync,
{
    if jobs.is_empty() {
        return Vec::new();
    }

    let workers = workers.clamp(1, jobs.len());
    let (job_tx, job_rx) = bounded::<usize>(jobs.len());
    for &job in jobs {
        if job_tx.send(job).is_err() {
            break;
        }
    }
    drop(job_tx);

    let (status_tx, status_rx) = unbounded::<Status<T>>();
    let cancelled = AtomicBool::new(false);

    thread::scope(|scope| {
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let status_tx = status_tx.clone();
            let init = &init;
            let step = &step;
            let cancelled = &cancelled;

            scope.spawn(move || {
                let mut state = match init(worker_id) {
                    Ok(state) => state,
                    Err(error) => {
                        cancelled.store(true, Ordering::Release);
                        let _ = status_tx.send(Err(error));
                        return;
                    }
                };

                let mut handled = 0usize;
                for job in job_rx.iter() {
                    if cancelled.load(Ordering::Acquire) {
                        debug!(worker_id, "worker cancelled after an earlier failure");
                        break;
                    }

                    let status = step(&mut state, job).map(|value| (job, value));
                    if status.is_err() {
                        cancelled.store(true, Ordering::Release);
                    }
                    if status_tx.send(status).is_err() {
                        break;
                    }
                    handled += 1;
                }

                debug!(worker_id, handled, "worker finished");
            });
        }
    });

    drop(status_tx);
    status_rx.iter().collect()
}
