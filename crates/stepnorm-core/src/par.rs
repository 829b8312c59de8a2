//! # Bounded Worker-Pool Fan-Out
//!
//! Data-parallel fan-out over independent partitions. Workers claim task
//! indices through an atomic cursor (work stealing) inside a scoped thread
//! pool; results come back in task-index order so callers merge them
//! deterministically regardless of scheduling.
//!
//! No async, no channels: each worker owns its partial output and the merge
//! is single-threaded.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Run `work(0..tasks)` across at most `workers` threads and return the
/// results in task-index order.
///
/// With `workers <= 1` (or a single task) everything runs on the caller's
/// thread — the serial baseline used when parallel execution is disabled.
pub fn run_indexed<T, F>(tasks: usize, workers: usize, work: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    if workers <= 1 || tasks <= 1 {
        return (0..tasks).map(work).collect();
    }

    let cursor = AtomicUsize::new(0);
    let mut slots: Vec<Option<T>> = Vec::with_capacity(tasks);
    slots.resize_with(tasks, || None);

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..workers.min(tasks))
            .map(|_| {
                let cursor = &cursor;
                let work = &work;
                s.spawn(move || {
                    let mut partial = Vec::new();
                    loop {
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        if index >= tasks {
                            break;
                        }
                        partial.push((index, work(index)));
                    }
                    partial
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(partial) => {
                    for (index, value) in partial {
                        slots[index] = Some(value);
                    }
                }
                Err(payload) => std::panic::resume_unwind(payload),
            }
        }
    });

    slots.into_iter().flatten().collect()
}

/// Worker count for the configured parallelism toggle.
#[must_use]
pub fn worker_count(parallel: bool) -> usize {
    if parallel {
        std::thread::available_parallelism().map_or(1, usize::from)
    } else {
        1
    }
}

// =============================================================================
// TESTS
// =============================================================================
