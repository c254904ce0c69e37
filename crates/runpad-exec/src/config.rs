use std::path::PathBuf;
use std::time::Duration;

use runpad_model::ScriptPolicy;

/// Engine settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Program every script is handed to.
    pub interpreter: PathBuf,
    /// Pre-launch filter for script paths.
    pub policy: ScriptPolicy,
    /// Extra environment for launched processes.
    pub env: Vec<(String, String)>,
    /// Drain loop period.
    pub drain_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            policy: ScriptPolicy::default(),
            // python block-buffers piped stdout; lines should arrive as they are printed
            env: vec![("PYTHONUNBUFFERED".to_string(), "1".to_string())],
            drain_interval: Duration::from_millis(50),
        }
    }
}

fn default_interpreter() -> PathBuf {
    cfg_if::cfg_if! {
        if #[cfg(target_family = "windows")] {
            PathBuf::from("python")
        } else {
            PathBuf::from("python3")
        }
    }
}
