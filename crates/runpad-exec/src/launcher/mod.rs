//! Per-job execution.
//!
//! Every launched [`Job`] runs on its own tokio task tracked by a shared [`TaskTracker`].
//! The task owns the child process for its whole life:
//!
//! 1. announces the job (`Started`)
//! 2. spawns it with stdout and stderr sharing one pipe and stdin closed
//! 3. registers a [`ProcessHandle`] so the job can be stopped
//! 4. forwards the combined output, line by line, into the relay
//! 5. reaps the child and reports exactly one `Finished` line
//! 6. deregisters, then reports the result to the batch it belongs to
//!
//! Stop requests arrive through the registration's token; the task kills the process tree
//! itself, before reaping, so a recycled pid is never signalled.
mod lines;
mod pipe;

use std::{
    io::{self, PipeReader},
    process::{ExitStatus, Stdio},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{
    io::AsyncRead,
    process::{Child, Command},
    task::JoinHandle,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use runpad_core::{BatchCoordinator, ProcessHandle, ProcessRegistry, Relay, RelayMessage};
use runpad_model::{BatchId, BatchResult, Job, JobExit, JobId};

use crate::kill;
use lines::LineReader;

const LOG: &str = "runpad.exec.launcher";

/// Handle to a launched job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    join: JoinHandle<JobExit>,
}

impl JobHandle {
    #[inline]
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the job's outcome.
    pub async fn wait(self) -> JobExit {
        let Self { id, join } = self;
        match join.await {
            Ok(exit) => exit,
            Err(e) => {
                error!(target: LOG, job = %id, error = %e, "job task failed");
                JobExit::IoFailed
            }
        }
    }
}

/// Spawns jobs and supervises them until exit.
#[derive(Clone)]
pub struct Launcher {
    relay: Relay,
    registry: ProcessRegistry,
    batches: BatchCoordinator,
    tracker: TaskTracker,
    env: Arc<[(String, String)]>,
    next_id: Arc<AtomicU64>,
}

impl Launcher {
    pub fn new(
        relay: Relay,
        registry: ProcessRegistry,
        batches: BatchCoordinator,
        env: Vec<(String, String)>,
    ) -> Self {
        Self {
            relay,
            registry,
            batches,
            tracker: TaskTracker::new(),
            env: env.into(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Tracker of every job task this launcher started.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Start `job` on its own task. Never blocks on the process.
    ///
    /// When `batch` is set the outcome is reported to that batch on exit.
    pub fn launch(&self, job: Job, batch: Option<BatchId>) -> JobHandle {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(target: LOG, job = %id, label = %job.label(), batch = ?batch, "launching");

        let this = self.clone();
        let join = self.tracker.spawn(async move { this.execute(id, job, batch).await });
        JobHandle { id, join }
    }

    async fn execute(self, id: JobId, job: Job, batch: Option<BatchId>) -> JobExit {
        self.relay.push(RelayMessage::Started {
            job: id,
            working_dir: job.working_dir().to_path_buf(),
            command: job.command().to_vec(),
        });

        let exit = match self.spawn(&job) {
            Ok((child, output)) => self.supervise(id, &job, child, output).await,
            Err(e) => {
                warn!(target: LOG, job = %id, program = %job.program(), error = %e, "spawn failed");
                self.relay
                    .diagnostic(Some(id), format!("cannot start {}: {e}", job.program()));
                self.finish(id, &job, JobExit::SpawnFailed);
                JobExit::SpawnFailed
            }
        };

        if let Some(batch) = batch {
            let result = BatchResult::new(job.label(), exit);
            if let Some(summary) = self.batches.complete(batch, result) {
                self.relay.push(RelayMessage::Summary(summary));
            }
        }
        exit
    }

    /// Spawn `job` with stdout and stderr on one pipe. Returns the pipe's read end.
    fn spawn(&self, job: &Job) -> io::Result<(Child, PipeReader)> {
        let (output, child_output) = pipe::combined()?;

        let mut cmd = Command::new(job.program());
        cmd.args(job.args())
            .current_dir(job.working_dir())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(child_output.stdout)
            .stderr(child_output.stderr);
        kill::isolate_process_group(&mut cmd);
        let child = cmd.spawn()?;

        // releases the parent's write ends
        drop(cmd);
        Ok((child, output))
    }

    async fn supervise(
        &self,
        id: JobId,
        job: &Job,
        mut child: Child,
        output: PipeReader,
    ) -> JobExit {
        let registration = self
            .registry
            .add(ProcessHandle::new(id, child.id(), job.label()));
        let stop = registration.stop_token().clone();
        debug!(target: LOG, job = %id, pid = ?child.id(), "process running");

        let mut killed = false;
        let pumped = match pipe::into_async(output) {
            Ok(stream) => {
                let mut lines = LineReader::new(stream);
                let mut pumped = self.pump(id, &mut lines, Some(&stop)).await;
                if pumped == Pumped::Stopped {
                    killed = true;
                    self.kill(id, &mut child).await;
                    // whatever was written before the kill still belongs to the job
                    pumped = self.pump(id, &mut lines, None).await;
                }
                pumped
            }
            Err(e) => {
                warn!(target: LOG, job = %id, error = %e, "cannot read process output");
                self.relay
                    .diagnostic(Some(id), format!("cannot read output: {e}"));
                Pumped::Failed
            }
        };

        let status = loop {
            tokio::select! {
                biased;

                status = child.wait() => break status,
                _ = stop.cancelled(), if !killed => {
                    killed = true;
                    self.kill(id, &mut child).await;
                }
            }
        };

        let exit = match status {
            Ok(status) => classify(status, killed),
            Err(e) => {
                warn!(target: LOG, job = %id, error = %e, "waiting for process failed");
                self.relay
                    .diagnostic(Some(id), format!("lost track of process: {e}"));
                JobExit::IoFailed
            }
        };
        let exit = settle(exit, pumped == Pumped::Failed);

        self.finish(id, job, exit);
        drop(registration);
        exit
    }

    /// Relay lines until end of stream, a read error, or `stop` firing.
    async fn pump<R: AsyncRead + Unpin>(
        &self,
        id: JobId,
        lines: &mut LineReader<R>,
        stop: Option<&CancellationToken>,
    ) -> Pumped {
        loop {
            tokio::select! {
                biased;

                _ = stopped(stop) => return Pumped::Stopped,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => self.relay.output(id, line),
                    Ok(None) => return Pumped::Eof,
                    Err(e) => {
                        warn!(target: LOG, job = %id, error = %e, "reading output failed");
                        self.relay
                            .diagnostic(Some(id), format!("reading output failed: {e}"));
                        return Pumped::Failed;
                    }
                },
            }
        }
    }

    async fn kill(&self, id: JobId, child: &mut Child) {
        if let Err(e) = kill::terminate_process_tree(child).await {
            warn!(target: LOG, job = %id, error = %e, "failed to terminate process");
            self.relay
                .diagnostic(Some(id), format!("failed to terminate process: {e}"));
        }
    }

    fn finish(&self, id: JobId, job: &Job, exit: JobExit) {
        info!(target: LOG, job = %id, label = %job.label(), code = exit.code(), %exit, "job finished");
        self.relay.push(RelayMessage::Finished {
            job: id,
            label: job.label().to_string(),
            exit,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pumped {
    Eof,
    Failed,
    Stopped,
}

async fn stopped(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// A broken output stream fails the job unless it was killed anyway.
fn settle(exit: JobExit, stream_failed: bool) -> JobExit {
    match exit {
        JobExit::Killed { .. } => exit,
        _ if stream_failed => JobExit::IoFailed,
        _ => exit,
    }
}

fn classify(status: ExitStatus, stop_requested: bool) -> JobExit {
    if status.success() {
        return JobExit::Code(0);
    }

    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::process::ExitStatusExt;

            let _ = stop_requested;
            match status.code() {
                Some(code) => JobExit::Code(code),
                None => JobExit::Killed { signal: status.signal() },
            }
        } else {
            // a tree kill on windows surfaces as an ordinary exit code
            match status.code() {
                Some(_) if stop_requested => JobExit::Killed { signal: None },
                Some(code) => JobExit::Code(code),
                None => JobExit::Killed { signal: None },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        pin::Pin,
        task::{Context, Poll},
    };
    use tokio::io::ReadBuf;

    use runpad_core::relay;

    /// Yields one line, then fails.
    struct BrokenPipe {
        sent: bool,
    }

    impl AsyncRead for BrokenPipe {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe broke")));
            }
            self.sent = true;
            buf.put_slice(b"partial output\n");
            Poll::Ready(Ok(()))
        }
    }

    fn launcher() -> (Launcher, runpad_core::RelayReceiver) {
        let (relay, rx) = relay::channel();
        let launcher = Launcher::new(
            relay,
            ProcessRegistry::new(),
            BatchCoordinator::new(),
            Vec::new(),
        );
        (launcher, rx)
    }

    #[tokio::test]
    async fn read_error_mid_run_is_reported_and_fails_the_job() {
        let (launcher, mut rx) = launcher();
        let mut lines = LineReader::new(BrokenPipe { sent: false });

        let pumped = launcher.pump(JobId(3), &mut lines, None).await;
        assert_eq!(pumped, Pumped::Failed);

        let msgs = rx.drain();
        assert_eq!(msgs.len(), 2);
        assert_eq!(
            msgs[0],
            RelayMessage::Output {
                job: JobId(3),
                line: "partial output".to_string()
            }
        );
        assert!(matches!(
            &msgs[1],
            RelayMessage::Diagnostic { job: Some(JobId(3)), text } if text.contains("pipe broke")
        ));

        assert_eq!(settle(JobExit::Code(0), true), JobExit::IoFailed);
        assert_eq!(settle(JobExit::Code(0), false), JobExit::Code(0));
        assert_eq!(
            settle(JobExit::Killed { signal: Some(9) }, true),
            JobExit::Killed { signal: Some(9) }
        );
    }

    #[tokio::test]
    async fn pump_returns_when_stop_fires() {
        let (launcher, _rx) = launcher();
        // never yields data or end of stream
        let (_keep_open, reader) = tokio::io::duplex(64);
        let mut lines = LineReader::new(reader);
        let stop = CancellationToken::new();
        stop.cancel();

        assert_eq!(
            launcher.pump(JobId(1), &mut lines, Some(&stop)).await,
            Pumped::Stopped
        );
    }

    #[cfg(unix)]
    #[test]
    fn classify_reads_code_or_signal() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(classify(ExitStatus::from_raw(0), false), JobExit::Code(0));
        assert_eq!(classify(ExitStatus::from_raw(0), true), JobExit::Code(0));
        assert_eq!(classify(ExitStatus::from_raw(2 << 8), false), JobExit::Code(2));
        assert_eq!(
            classify(ExitStatus::from_raw(libc::SIGKILL), true),
            JobExit::Killed {
                signal: Some(libc::SIGKILL)
            }
        );
    }

    #[tokio::test]
    async fn job_handle_reports_panicked_task_as_io_failure() {
        let join: JoinHandle<JobExit> = tokio::spawn(async { panic!("boom") });
        let handle = JobHandle {
            id: JobId(7),
            join,
        };
        assert_eq!(handle.wait().await, JobExit::IoFailed);
    }
}
