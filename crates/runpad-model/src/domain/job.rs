use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// One request to run a single external command with a fixed working directory.
///
/// A job is immutable once built. Validation of the script it points at
/// (existence, allowed extension) happens before construction, see [`crate::ScriptPolicy`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "JobRepr")]
pub struct Job {
    command: Vec<String>,
    working_dir: PathBuf,
    label: String,
}

/// Unchecked wire form; deserialized jobs go through [`Job::new`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobRepr {
    command: Vec<String>,
    working_dir: PathBuf,
    label: String,
}

impl TryFrom<JobRepr> for Job {
    type Error = ModelError;

    fn try_from(repr: JobRepr) -> Result<Self, Self::Error> {
        Job::new(repr.command, repr.working_dir, repr.label)
    }
}

impl Job {
    /// Build a job from an explicit argv.
    ///
    /// The first element is the program, the rest are its arguments.
    pub fn new(
        command: Vec<String>,
        working_dir: impl Into<PathBuf>,
        label: impl Into<String>,
    ) -> Result<Self, ModelError> {
        if command.first().is_none_or(|p| p.is_empty()) {
            return Err(ModelError::EmptyCommand);
        }
        Ok(Self {
            command,
            working_dir: working_dir.into(),
            label: label.into(),
        })
    }

    /// Build the job that runs `script` with `interpreter`.
    ///
    /// The command is `[interpreter, <script file name>]` and the working directory is the
    /// directory that contains the script (`.` for a bare file name). The label is the full path.
    pub fn for_script(interpreter: &Path, script: &Path) -> Result<Self, ModelError> {
        let name = script
            .file_name()
            .ok_or_else(|| ModelError::NoFileName(script.to_path_buf()))?;

        let working_dir = match script.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Self::new(
            vec![
                interpreter.to_string_lossy().into_owned(),
                name.to_string_lossy().into_owned(),
            ],
            working_dir,
            script.to_string_lossy().into_owned(),
        )
    }

    #[inline]
    pub fn program(&self) -> &str {
        &self.command[0]
    }

    #[inline]
    pub fn args(&self) -> &[String] {
        &self.command[1..]
    }

    #[inline]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    #[inline]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Basename of the label; falls back to the whole label when it has no file name.
    pub fn display_name(&self) -> String {
        display_name(&self.label)
    }
}

/// Basename of a job label, or the whole label when it has no file name.
///
/// Used wherever a job is named to the user, so status lines and summaries agree.
pub fn display_name(label: &str) -> String {
    Path::new(label)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_validates_like_new() {
        let err = serde_json::from_str::<Job>(r#"{"command":[],"workingDir":".","label":"x"}"#);
        assert!(err.is_err());
        let err = serde_json::from_str::<Job>(r#"{"command":[""],"workingDir":".","label":"x"}"#);
        assert!(err.is_err());

        let job: Job =
            serde_json::from_str(r#"{"command":["sh","a.sh"],"workingDir":"/tmp","label":"a"}"#)
                .unwrap();
        assert_eq!(job.program(), "sh");
        assert_eq!(job.args(), ["a.sh".to_string()]);
        assert_eq!(job.working_dir(), Path::new("/tmp"));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert_eq!(
            Job::new(vec![], ".", "x").unwrap_err(),
            ModelError::EmptyCommand
        );
        assert_eq!(
            Job::new(vec![String::new()], ".", "x").unwrap_err(),
            ModelError::EmptyCommand
        );
    }

    #[test]
    fn for_script_splits_dir_and_basename() {
        let job = Job::for_script(Path::new("python3"), Path::new("/srv/tools/build.py")).unwrap();

        assert_eq!(job.program(), "python3");
        assert_eq!(job.args(), ["build.py".to_string()]);
        assert_eq!(job.working_dir(), Path::new("/srv/tools"));
        assert_eq!(job.label(), "/srv/tools/build.py");
        assert_eq!(job.display_name(), "build.py");
    }

    #[test]
    fn for_script_bare_name_runs_in_current_dir() {
        let job = Job::for_script(Path::new("python3"), Path::new("run.py")).unwrap();
        assert_eq!(job.working_dir(), Path::new("."));
        assert_eq!(job.args(), ["run.py".to_string()]);
    }

    #[test]
    fn for_script_without_file_name_fails() {
        let err = Job::for_script(Path::new("python3"), Path::new("/")).unwrap_err();
        assert!(matches!(err, ModelError::NoFileName(_)));
    }

    #[test]
    fn display_name_of_plain_identifier() {
        let job = Job::new(vec!["echo".into()], ".", "greeting").unwrap();
        assert_eq!(job.display_name(), "greeting");
    }
}
