use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use runpad_model::JobId;

/// Non-owning reference to a live child process.
///
/// The launcher owns the process itself; the registry only keeps enough to ask for its
/// termination. Termination is requested through `stop` and carried out by the owner.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    job: JobId,
    pid: Option<u32>,
    label: String,
    stop: CancellationToken,
}

impl ProcessHandle {
    pub fn new(job: JobId, pid: Option<u32>, label: impl Into<String>) -> Self {
        Self {
            job,
            pid,
            label: label.into(),
            stop: CancellationToken::new(),
        }
    }

    #[inline]
    pub fn job(&self) -> JobId {
        self.job
    }

    #[inline]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Request termination. Idempotent.
    pub fn terminate(&self) {
        self.stop.cancel();
    }

    #[inline]
    pub fn is_terminating(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// Set of currently live launched processes.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<JobId, ProcessHandle>>>,
}

/// Proof of registration. Dropping it removes the entry, whatever path the job took.
#[must_use = "dropping the registration deregisters the process immediately"]
pub struct Registration {
    registry: ProcessRegistry,
    job: JobId,
    stop: CancellationToken,
}

impl Registration {
    #[inline]
    pub fn job(&self) -> JobId {
        self.job
    }

    /// Token cancelled when termination of this process is requested.
    #[inline]
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.job);
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, ProcessHandle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `handle` until the returned [`Registration`] is dropped.
    pub fn add(&self, handle: ProcessHandle) -> Registration {
        let job = handle.job;
        let stop = handle.stop.clone();
        let replaced = self.lock().insert(job, handle);
        if replaced.is_some() {
            warn!(target: "runpad.core.registry", %job, "handle replaced an existing registration");
        }
        trace!(target: "runpad.core.registry", %job, "process registered");

        Registration {
            registry: self.clone(),
            job,
            stop,
        }
    }

    /// Remove the entry for `job`. Removing an absent entry is a no-op.
    pub fn remove(&self, job: JobId) -> bool {
        let removed = self.lock().remove(&job).is_some();
        if removed {
            trace!(target: "runpad.core.registry", %job, "process deregistered");
        }
        removed
    }

    /// Ask every registered process to terminate and clear the registry.
    ///
    /// Does not wait for the processes to exit; each owner observes the request and reports
    /// the job's outcome on its own. Returns how many processes were asked.
    pub fn terminate_all(&self) -> usize {
        let snapshot: Vec<ProcessHandle> = self.lock().drain().map(|(_, h)| h).collect();

        for h in &snapshot {
            debug!(target: "runpad.core.registry", job = %h.job, pid = ?h.pid, label = %h.label, "termination requested");
            h.terminate();
        }
        snapshot.len()
    }

    pub fn contains(&self, job: JobId) -> bool {
        self.lock().contains_key(&job)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the registered handles.
    pub fn handles(&self) -> Vec<ProcessHandle> {
        self.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_drop_removes_entry() {
        let reg = ProcessRegistry::new();
        let r = reg.add(ProcessHandle::new(JobId(1), Some(100), "a.py"));
        assert!(reg.contains(JobId(1)));
        assert_eq!(reg.len(), 1);

        drop(r);
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let reg = ProcessRegistry::new();
        let _r = reg.add(ProcessHandle::new(JobId(1), None, "a.py"));
        assert!(reg.remove(JobId(1)));
        assert!(!reg.remove(JobId(1)));
    }

    #[test]
    fn terminate_all_cancels_tokens_and_clears() {
        let reg = ProcessRegistry::new();
        let a = reg.add(ProcessHandle::new(JobId(1), Some(10), "a.py"));
        let b = reg.add(ProcessHandle::new(JobId(2), Some(11), "b.py"));

        assert_eq!(reg.terminate_all(), 2);
        assert!(reg.is_empty());
        assert!(a.stop_token().is_cancelled());
        assert!(b.stop_token().is_cancelled());

        // late drops after stop-all must not panic or resurrect entries
        drop(a);
        drop(b);
        assert!(reg.is_empty());
        assert_eq!(reg.terminate_all(), 0);
    }

    #[test]
    fn registration_added_after_stop_all_is_untouched() {
        let reg = ProcessRegistry::new();
        reg.terminate_all();
        let r = reg.add(ProcessHandle::new(JobId(5), Some(1), "late.py"));
        assert!(!r.stop_token().is_cancelled());
        assert_eq!(reg.handles().len(), 1);
    }

    #[test]
    fn concurrent_add_and_remove() {
        let reg = ProcessRegistry::new();
        let threads: Vec<_> = (0..8u64)
            .map(|i| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    for k in 0..100u64 {
                        let r = reg.add(ProcessHandle::new(JobId(i * 1000 + k), None, "x"));
                        drop(r);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(reg.is_empty());
    }
}
