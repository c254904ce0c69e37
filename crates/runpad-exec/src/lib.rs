mod error;
pub use error::ExecError;

mod config;
pub use config::EngineConfig;

pub mod kill;
pub use kill::terminate_process_tree;

mod launcher;
pub use launcher::{JobHandle, Launcher};

mod engine;
pub use engine::{BatchRun, Engine};

pub mod prelude {
    pub use crate::error::ExecError;
    pub use crate::{BatchRun, Engine, EngineConfig, JobHandle};
    pub use runpad_core::{DrainLoop, LogSink, Relay, RelayMessage, RelayReceiver};
    pub use runpad_model::{Job, JobExit, JobId, ScriptList, ScriptPolicy};
}
