use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("job command is empty")]
    EmptyCommand,
    #[error("path has no file name: {0}")]
    NoFileName(PathBuf),
}
