//! One OS pipe shared by a child's stdout and stderr, so its output arrives as one ordered stream.
use std::{
    io::{self, PipeReader},
    process::Stdio,
};

use tokio::io::AsyncRead;

pub(crate) type OutputStream = Box<dyn AsyncRead + Unpin + Send>;

/// Write ends for the child, handed over through `Stdio`.
pub(crate) struct ChildOutput {
    pub(crate) stdout: Stdio,
    pub(crate) stderr: Stdio,
}

/// Create the pipe. The read end stays in the parent.
///
/// Every copy of the write end must be gone from the parent (the `Command` holding the
/// `Stdio` values included) before end of stream can be observed.
pub(crate) fn combined() -> io::Result<(PipeReader, ChildOutput)> {
    let (reader, writer) = io::pipe()?;
    let stdout = Stdio::from(writer.try_clone()?);
    let stderr = Stdio::from(writer);
    Ok((reader, ChildOutput { stdout, stderr }))
}

/// Wrap the read end for async reads on the current runtime.
pub(crate) fn into_async(reader: PipeReader) -> io::Result<OutputStream> {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            let fd = std::os::fd::OwnedFd::from(reader);
            let rx = tokio::net::unix::pipe::Receiver::from_owned_fd(fd)?;
            Ok(Box::new(rx))
        } else if #[cfg(windows)] {
            // anonymous pipes have no overlapped I/O; reads go through the blocking pool
            let handle = std::os::windows::io::OwnedHandle::from(reader);
            let file = tokio::fs::File::from_std(std::fs::File::from(handle));
            Ok(Box::new(file))
        }
    }
}
