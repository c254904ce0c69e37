//! Batch coordinator: counts outstanding jobs of the current batch and emits its summary once.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use runpad_model::{BatchId, BatchResult, BatchSummary};

use crate::error::CoreError;

#[derive(Debug)]
struct BatchState {
    id: BatchId,
    pending: usize,
    results: Vec<BatchResult>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    current: Option<BatchState>,
}

#[derive(Clone, Default)]
pub struct BatchCoordinator {
    inner: Arc<Mutex<Inner>>,
}

impl BatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new batch of `job_count` jobs, discarding any previous state.
    ///
    /// Completions still in flight for a replaced batch are ignored later on.
    pub fn begin(&self, job_count: usize) -> Result<BatchId, CoreError> {
        if job_count == 0 {
            return Err(CoreError::EmptyBatch);
        }

        let mut inner = self.lock();
        inner.next_id += 1;
        let id = BatchId(inner.next_id);

        let previous = inner.current.replace(BatchState {
            id,
            pending: job_count,
            results: Vec::with_capacity(job_count),
        });
        drop(inner);

        if let Some(prev) = previous {
            warn!(
                target: "runpad.core.batch",
                replaced = %prev.id,
                pending = prev.pending,
                "batch replaced before it finished"
            );
        }
        debug!(target: "runpad.core.batch", batch = %id, job_count, "batch started");
        Ok(id)
    }

    /// Record one job's result.
    ///
    /// Returns the summary exactly once, for the completion that brings the pending count to zero,
    /// and closes the batch. Results for a batch that is no longer current are dropped.
    pub fn complete(&self, batch: BatchId, result: BatchResult) -> Option<BatchSummary> {
        let mut inner = self.lock();

        if inner.current.as_ref().is_none_or(|s| s.id != batch) {
            drop(inner);
            debug!(target: "runpad.core.batch", %batch, label = %result.label, "result for inactive batch ignored");
            return None;
        }

        let state = inner.current.as_mut()?;
        state.results.push(result);
        state.pending -= 1;
        if state.pending > 0 {
            return None;
        }

        let done = inner.current.take()?;
        drop(inner);

        let summary = BatchSummary::from_results(&done.results);
        debug!(
            target: "runpad.core.batch",
            %batch,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "batch finished"
        );
        Some(summary)
    }

    /// Outstanding job count of the current batch.
    pub fn pending(&self) -> Option<usize> {
        self.lock().current.as_ref().map(|s| s.pending)
    }

    pub fn current(&self) -> Option<BatchId> {
        self.lock().current.as_ref().map(|s| s.id)
    }

    pub fn is_active(&self) -> bool {
        self.lock().current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runpad_model::JobExit;

    #[test]
    fn empty_batch_is_an_error() {
        let c = BatchCoordinator::new();
        assert_eq!(c.begin(0), Err(CoreError::EmptyBatch));
        assert!(!c.is_active());
    }

    #[test]
    fn summary_fires_on_last_completion_only() {
        let c = BatchCoordinator::new();
        let id = c.begin(3).unwrap();
        assert_eq!(c.pending(), Some(3));

        assert!(c.complete(id, BatchResult::new("/x/a.py", JobExit::Code(0))).is_none());
        assert!(c.complete(id, BatchResult::new("/x/b.py", JobExit::Code(2))).is_none());
        assert_eq!(c.pending(), Some(1));

        let summary = c
            .complete(id, BatchResult::new("/x/c.py", JobExit::SpawnFailed))
            .expect("last completion yields summary");
        assert_eq!(summary.succeeded, vec!["a.py"]);
        assert_eq!(summary.failed, vec!["b.py", "c.py"]);
        assert!(!c.is_active());

        // a stray extra completion does nothing
        assert!(c.complete(id, BatchResult::new("/x/d.py", JobExit::Code(0))).is_none());
    }

    #[test]
    fn rerun_resets_state() {
        let c = BatchCoordinator::new();
        let first = c.begin(1).unwrap();
        c.complete(first, BatchResult::new("old.py", JobExit::Code(1)));

        let second = c.begin(2).unwrap();
        assert_ne!(first, second);
        assert_eq!(c.pending(), Some(2));

        c.complete(second, BatchResult::new("n1.py", JobExit::Code(0)));
        let s = c
            .complete(second, BatchResult::new("n2.py", JobExit::Code(0)))
            .unwrap();
        assert_eq!(s.succeeded, vec!["n1.py", "n2.py"]);
        assert!(s.failed.is_empty());
    }

    #[test]
    fn late_results_of_replaced_batch_do_not_leak() {
        let c = BatchCoordinator::new();
        let old = c.begin(2).unwrap();
        c.complete(old, BatchResult::new("o1.py", JobExit::Code(0)));

        let new = c.begin(1).unwrap();
        assert!(c.complete(old, BatchResult::new("o2.py", JobExit::Code(0))).is_none());
        assert_eq!(c.pending(), Some(1));

        let s = c.complete(new, BatchResult::new("n.py", JobExit::Code(4))).unwrap();
        assert!(s.succeeded.is_empty());
        assert_eq!(s.failed, vec!["n.py"]);
    }

    #[test]
    fn concurrent_completions_emit_one_summary() {
        for _ in 0..20 {
            let c = BatchCoordinator::new();
            let n = 16;
            let id = c.begin(n).unwrap();

            let threads: Vec<_> = (0..n)
                .map(|i| {
                    let c = c.clone();
                    std::thread::spawn(move || {
                        let exit = if i % 2 == 0 { JobExit::Code(0) } else { JobExit::Code(1) };
                        c.complete(id, BatchResult::new(format!("j{i}.py"), exit))
                    })
                })
                .collect();

            let summaries: Vec<BatchSummary> = threads
                .into_iter()
                .filter_map(|t| t.join().unwrap())
                .collect();

            assert_eq!(summaries.len(), 1);
            assert_eq!(summaries[0].total(), n);
            assert_eq!(summaries[0].succeeded.len(), n / 2);
        }
    }
}
