use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("batch must contain at least one job")]
    EmptyBatch,
}
