use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

/// Destination of relay output, fed only by the drain loop.
///
/// `append` receives one rendered message, which may span several lines, without a
/// trailing newline. It is called in rapid succession and must not drop text.
pub trait LogSink: Send + 'static {
    fn append(&mut self, text: &str);

    /// Called after every drained burst.
    fn flush(&mut self) {}
}

/// Sink writing each message plus a newline to an `io::Write`.
pub struct WriterSink<W: Write + Send + 'static> {
    writer: W,
}

impl<W: Write + Send + 'static> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> LogSink for WriterSink<W> {
    fn append(&mut self, text: &str) {
        if let Err(e) = writeln!(self.writer, "{text}") {
            warn!(target: "runpad.core.sink", error = %e, "sink write failed");
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(target: "runpad.core.sink", error = %e, "sink flush failed");
        }
    }
}

/// In-memory sink; clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything appended so far.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Appended text joined with newlines, as it would read in a log view.
    pub fn text(&self) -> String {
        self.snapshot().join("\n")
    }
}

impl LogSink for MemorySink {
    fn append(&mut self, text: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
    }
}
