use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Why a script was refused before launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Path does not exist.
    Missing,
    /// Path exists but is not a regular file with an allowed extension.
    NotExecutable,
}

/// Pre-launch filter for script paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptPolicy {
    /// Allowed extensions including the leading dot, compared case-insensitively.
    pub allowed_extensions: Vec<String>,
}

/// Input paths partitioned by [`ScriptPolicy::screen`], each list in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screening {
    pub accepted: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub not_executable: Vec<PathBuf>,
}

impl Default for ScriptPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: vec![".py".to_string(), ".pyw".to_string()],
        }
    }
}

impl ScriptPolicy {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_extensions: extensions.into_iter().map(normalize_ext).collect(),
        }
    }

    /// Extension check only, no filesystem access.
    pub fn allows_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        let ext = format!(".{}", ext.to_string_lossy().to_ascii_lowercase());
        self.allowed_extensions
            .iter()
            .any(|a| a.to_ascii_lowercase() == ext)
    }

    pub fn check(&self, path: &Path) -> Result<(), Rejection> {
        if !path.exists() {
            return Err(Rejection::Missing);
        }
        if !path.is_file() || !self.allows_extension(path) {
            return Err(Rejection::NotExecutable);
        }
        Ok(())
    }

    pub fn screen<I, P>(&self, paths: I) -> Screening
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut out = Screening::default();
        for p in paths {
            let p = p.as_ref();
            match self.check(p) {
                Ok(()) => out.accepted.push(p.to_path_buf()),
                Err(Rejection::Missing) => out.missing.push(p.to_path_buf()),
                Err(Rejection::NotExecutable) => out.not_executable.push(p.to_path_buf()),
            }
        }
        out
    }

    /// Comma-separated extension list for notices, e.g. `.py, .pyw`.
    pub fn describe(&self) -> String {
        self.allowed_extensions.join(", ")
    }
}

fn normalize_ext(ext: impl Into<String>) -> String {
    let ext = ext.into();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Missing => f.write_str("missing"),
            Rejection::NotExecutable => f.write_str("not executable"),
        }
    }
}
