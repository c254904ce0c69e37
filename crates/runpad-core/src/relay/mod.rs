//! Output relay: the queue carrying captured process output to the single log consumer.
//!
//! Producers hold a cloned [`Relay`]; exactly one [`RelayReceiver`] exists per channel,
//! so the consumer side needs no lock. Capacity is unbounded and pushes never block.
use std::fmt;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::trace;

use runpad_model::{BatchSummary, JobExit, JobId, display_name};

/// One chunk of text headed for the log sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// A job's process was started.
    Started {
        job: JobId,
        working_dir: PathBuf,
        command: Vec<String>,
    },
    /// One line of a job's combined stdout/stderr, without its line terminator.
    Output { job: JobId, line: String },
    /// Terminal status line of a job.
    Finished {
        job: JobId,
        label: String,
        exit: JobExit,
    },
    /// Something went wrong, optionally on behalf of a job.
    Diagnostic { job: Option<JobId>, text: String },
    /// Free-form annotation (batch header, rejections, stop acknowledgement).
    Notice(String),
    /// Final summary of a batch.
    Summary(BatchSummary),
}

impl RelayMessage {
    /// Job this message was produced for, if any.
    pub fn job(&self) -> Option<JobId> {
        match self {
            RelayMessage::Started { job, .. }
            | RelayMessage::Output { job, .. }
            | RelayMessage::Finished { job, .. } => Some(*job),
            RelayMessage::Diagnostic { job, .. } => *job,
            RelayMessage::Notice(_) | RelayMessage::Summary(_) => None,
        }
    }
}

impl fmt::Display for RelayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayMessage::Started {
                working_dir,
                command,
                ..
            } => {
                writeln!(f, "> Running in: {}", working_dir.display())?;
                write!(f, "> Command: {}", command.join(" "))
            }
            RelayMessage::Output { line, .. } => f.write_str(line),
            RelayMessage::Finished { label, exit, .. } => {
                write!(f, "[{exit}] {}", display_name(label))
            }
            RelayMessage::Diagnostic { text, .. } => write!(f, "[Error: {text}]"),
            RelayMessage::Notice(text) => f.write_str(text),
            RelayMessage::Summary(summary) => fmt::Display::fmt(summary, f),
        }
    }
}

/// Producer half. Cheap to clone; safe to use from any task or thread.
#[derive(Clone, Debug)]
pub struct Relay {
    tx: mpsc::UnboundedSender<RelayMessage>,
}

/// Consumer half. Not `Clone`: ownership keeps the consumer single.
#[derive(Debug)]
pub struct RelayReceiver {
    rx: mpsc::UnboundedReceiver<RelayMessage>,
}

/// Create a connected relay pair.
pub fn channel() -> (Relay, RelayReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Relay { tx }, RelayReceiver { rx })
}

impl Relay {
    /// Enqueue a message. Never blocks; a message pushed after the receiver is gone is dropped.
    pub fn push(&self, msg: RelayMessage) {
        if let Err(e) = self.tx.send(msg) {
            trace!(target: "runpad.core.relay", dropped = %e.0, "receiver gone; message dropped");
        }
    }

    pub fn output(&self, job: JobId, line: impl Into<String>) {
        self.push(RelayMessage::Output {
            job,
            line: line.into(),
        });
    }

    pub fn notice(&self, text: impl Into<String>) {
        self.push(RelayMessage::Notice(text.into()));
    }

    pub fn diagnostic(&self, job: Option<JobId>, text: impl Into<String>) {
        self.push(RelayMessage::Diagnostic {
            job,
            text: text.into(),
        });
    }
}

impl RelayReceiver {
    /// Take whatever has accumulated so far, in arrival order. Never blocks; may be empty.
    pub fn drain(&mut self) -> Vec<RelayMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
