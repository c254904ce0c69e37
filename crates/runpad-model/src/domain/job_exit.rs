use std::fmt;

use serde::{Deserialize, Serialize};

/// Exit code reported for a job that never ran to completion on its own
/// (spawn failure, broken output stream, unknown kill signal).
pub const LAUNCH_FAILED_CODE: i32 = -1;

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobExit {
    /// The process exited on its own with this code.
    Code(i32),
    /// The process was forcefully terminated.
    ///
    /// `signal` is set on Unix when the terminating signal is known.
    Killed { signal: Option<i32> },
    /// The OS refused to create the process.
    SpawnFailed,
    /// Output or exit status could not be read.
    IoFailed,
}

impl JobExit {
    /// Only a clean `0` exit counts as success.
    #[inline]
    pub fn success(&self) -> bool {
        matches!(self, JobExit::Code(0))
    }

    /// Integer view of the outcome.
    ///
    /// Killed processes follow the shell convention `128 + signal`.
    pub fn code(&self) -> i32 {
        match self {
            JobExit::Code(c) => *c,
            JobExit::Killed { signal: Some(s) } => 128 + s,
            JobExit::Killed { signal: None } => LAUNCH_FAILED_CODE,
            JobExit::SpawnFailed | JobExit::IoFailed => LAUNCH_FAILED_CODE,
        }
    }
}

impl fmt::Display for JobExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobExit::Code(0) => f.write_str("OK"),
            JobExit::Code(c) => write!(f, "FAILED ({c})"),
            JobExit::Killed { .. } => f.write_str("KILLED"),
            JobExit::SpawnFailed | JobExit::IoFailed => {
                write!(f, "FAILED ({LAUNCH_FAILED_CODE})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_zero_is_success() {
        assert!(JobExit::Code(0).success());
        assert!(!JobExit::Code(2).success());
        assert!(!JobExit::Killed { signal: Some(9) }.success());
        assert!(!JobExit::SpawnFailed.success());
        assert!(!JobExit::IoFailed.success());
    }

    #[test]
    fn codes() {
        assert_eq!(JobExit::Code(3).code(), 3);
        assert_eq!(JobExit::Killed { signal: Some(9) }.code(), 137);
        assert_eq!(JobExit::Killed { signal: None }.code(), LAUNCH_FAILED_CODE);
        assert_eq!(JobExit::SpawnFailed.code(), -1);
    }

    #[test]
    fn status_words() {
        assert_eq!(JobExit::Code(0).to_string(), "OK");
        assert_eq!(JobExit::Code(2).to_string(), "FAILED (2)");
        assert_eq!(JobExit::Killed { signal: None }.to_string(), "KILLED");
        assert_eq!(JobExit::SpawnFailed.to_string(), "FAILED (-1)");
    }
}
