use std::path::{Path, PathBuf};

use tracing::{error, info};

use runpad_core::{BatchCoordinator, ProcessRegistry, Relay};
use runpad_model::{BatchId, Job, Rejection, ScriptList, Screening};

use crate::{
    config::EngineConfig,
    error::ExecError,
    launcher::{JobHandle, Launcher},
};

const LOG: &str = "runpad.exec.engine";

/// Outcome of starting a batch.
#[derive(Debug)]
pub struct BatchRun {
    /// `None` when nothing was launched.
    pub batch: Option<BatchId>,
    pub jobs: Vec<JobHandle>,
    pub missing: Vec<PathBuf>,
    pub not_executable: Vec<PathBuf>,
}

impl BatchRun {
    fn rejected(screening: Screening) -> Self {
        Self {
            batch: None,
            jobs: Vec::new(),
            missing: screening.missing,
            not_executable: screening.not_executable,
        }
    }
}

/// Front door for running scripts.
///
/// Everything the engine and its jobs have to say goes through the [`Relay`] handed to
/// [`Engine::new`]; the caller owns the matching receiver.
pub struct Engine {
    config: EngineConfig,
    relay: Relay,
    registry: ProcessRegistry,
    batches: BatchCoordinator,
    launcher: Launcher,
    idle: tokio::sync::Mutex<()>,
}

impl Engine {
    pub fn new(config: EngineConfig, relay: Relay) -> Self {
        let registry = ProcessRegistry::new();
        let batches = BatchCoordinator::new();
        let launcher = Launcher::new(
            relay.clone(),
            registry.clone(),
            batches.clone(),
            config.env.clone(),
        );

        Self {
            config,
            relay,
            registry,
            batches,
            launcher,
            idle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn batches(&self) -> &BatchCoordinator {
        &self.batches
    }

    /// Number of processes currently registered.
    pub fn running(&self) -> usize {
        self.registry.len()
    }

    /// Build the job for `script` after checking it against the policy.
    pub fn prepare(&self, script: &Path) -> Result<Job, ExecError> {
        self.config
            .policy
            .check(script)
            .map_err(|reason| ExecError::Rejected {
                path: script.to_path_buf(),
                reason,
            })?;
        Ok(Job::for_script(&self.config.interpreter, script)?)
    }

    /// Launch an arbitrary job outside any batch.
    pub fn launch(&self, job: Job) -> JobHandle {
        self.launcher.launch(job, None)
    }

    /// Run one script outside any batch.
    ///
    /// Rejected scripts are reported as notices and nothing is launched.
    pub fn run_script(&self, script: &Path) -> Option<JobHandle> {
        match self.prepare(script) {
            Ok(job) => Some(self.launch(job)),
            Err(ExecError::Rejected {
                reason: Rejection::Missing,
                ..
            }) => {
                self.relay
                    .notice(format!("[Missing: {}]", script.display()));
                None
            }
            Err(ExecError::Rejected {
                reason: Rejection::NotExecutable,
                ..
            }) => {
                self.relay.notice(format!(
                    "[Skipped] Only {} are run. File: {}",
                    self.config.policy.describe(),
                    script.display()
                ));
                None
            }
            Err(e) => {
                self.relay.diagnostic(None, e.to_string());
                None
            }
        }
    }

    /// Run `scripts` concurrently as one batch.
    ///
    /// Rejected paths are listed in notices; the batch summary is pushed once every
    /// launched job has finished. A previous batch still in flight is replaced.
    pub fn run_batch<I, P>(&self, scripts: I) -> BatchRun
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let screening = self.config.policy.screen(scripts);

        if !screening.missing.is_empty() {
            self.relay
                .notice(format!("[Missing:{}]", bullet_list(&screening.missing)));
        }
        if !screening.not_executable.is_empty() {
            self.relay.notice(format!(
                "[Not executable (allowed: {}):{}]",
                self.config.policy.describe(),
                bullet_list(&screening.not_executable)
            ));
        }

        let mut jobs = Vec::with_capacity(screening.accepted.len());
        for script in &screening.accepted {
            match Job::for_script(&self.config.interpreter, script) {
                Ok(job) => jobs.push(job),
                Err(e) => self.relay.diagnostic(None, e.to_string()),
            }
        }

        if jobs.is_empty() {
            self.relay.notice("[No valid scripts to run]");
            return BatchRun::rejected(screening);
        }

        let batch = match self.batches.begin(jobs.len()) {
            Ok(batch) => batch,
            Err(e) => {
                error!(target: LOG, error = %e, "cannot begin batch");
                self.relay.diagnostic(None, e.to_string());
                return BatchRun::rejected(screening);
            }
        };

        info!(target: LOG, %batch, jobs = jobs.len(), "batch started");
        self.relay
            .notice(format!("=== Running {} script(s) ===", jobs.len()));

        let handles = jobs
            .into_iter()
            .map(|job| self.launcher.launch(job, Some(batch)))
            .collect();

        BatchRun {
            batch: Some(batch),
            jobs: handles,
            missing: screening.missing,
            not_executable: screening.not_executable,
        }
    }

    /// Run the list's candidates (marked items, else all) as one batch.
    pub fn run_list(&self, list: &ScriptList) -> BatchRun {
        self.run_batch(list.candidates())
    }

    /// Ask every running process to terminate. Returns how many were asked.
    ///
    /// Each job still reports its own `Finished` line, and batch accounting completes
    /// normally with those jobs counted as failed.
    pub fn stop(&self) -> usize {
        let n = self.registry.terminate_all();
        info!(target: LOG, processes = n, "stop requested");
        self.relay.notice("[Processes stopped]");
        n
    }

    /// Resolve once every job launched so far has finished.
    ///
    /// Safe to call from several tasks at once; waiters take turns closing the tracker.
    pub async fn wait_idle(&self) {
        let _turn = self.idle.lock().await;
        let tracker = self.launcher.tracker();
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }
}

fn bullet_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("\n  - {}", p.display()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use runpad_core::{RelayMessage, relay};

    #[test]
    fn bullet_list_renders_one_path_per_line() {
        let paths = vec![PathBuf::from("a.py"), PathBuf::from("b.py")];
        assert_eq!(bullet_list(&paths), "\n  - a.py\n  - b.py");
    }

    #[tokio::test]
    async fn batch_of_rejected_scripts_launches_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "hi\n").unwrap();
        let gone = dir.path().join("gone.py");

        let (relay, mut rx) = relay::channel();
        let engine = Engine::new(EngineConfig::default(), relay);
        let run = engine.run_batch([&gone, &txt]);

        assert!(run.batch.is_none());
        assert!(run.jobs.is_empty());
        assert_eq!(run.missing, vec![gone.clone()]);
        assert_eq!(run.not_executable, vec![txt.clone()]);
        assert!(!engine.batches().is_active());

        let notices: Vec<String> = rx.drain().iter().map(ToString::to_string).collect();
        assert_eq!(
            notices,
            vec![
                format!("[Missing:\n  - {}]", gone.display()),
                format!("[Not executable (allowed: .py, .pyw):\n  - {}]", txt.display()),
                "[No valid scripts to run]".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn single_rejected_script_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "hi\n").unwrap();
        let gone = dir.path().join("gone.py");

        let (relay, mut rx) = relay::channel();
        let engine = Engine::new(EngineConfig::default(), relay);

        assert!(engine.run_script(&gone).is_none());
        assert!(engine.run_script(&txt).is_none());

        let msgs = rx.drain();
        assert_eq!(msgs.len(), 2);
        assert!(matches!(&msgs[0], RelayMessage::Notice(t) if t.starts_with("[Missing: ")));
        assert_eq!(
            msgs[1].to_string(),
            format!("[Skipped] Only .py, .pyw are run. File: {}", txt.display())
        );
    }

    #[test]
    fn prepare_rejects_by_reason() {
        let (relay, _rx) = relay::channel();
        let engine = Engine::new(EngineConfig::default(), relay);
        let err = engine.prepare(Path::new("/definitely/not/here.py")).unwrap_err();
        assert!(matches!(
            err,
            ExecError::Rejected {
                reason: Rejection::Missing,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn stop_with_nothing_running() {
        let (relay, mut rx) = relay::channel();
        let engine = Engine::new(EngineConfig::default(), relay);
        assert_eq!(engine.stop(), 0);
        engine.wait_idle().await;
        assert_eq!(rx.drain()[0].to_string(), "[Processes stopped]");
    }
}
