use std::path::PathBuf;

use thiserror::Error;

use runpad_core::CoreError;
use runpad_model::{ModelError, Rejection};

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("script rejected ({reason}): {}", path.display())]
    Rejected { path: PathBuf, reason: Rejection },
    #[error("invalid job: {0}")]
    Model(#[from] ModelError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}
