use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use runpad_core::{DrainLoop, WriterSink, relay};
use runpad_exec::{Engine, EngineConfig, JobHandle};
use runpad_model::{JobExit, ScriptList, ScriptPolicy};
use runpad_observe::{LoggerConfig, LoggerFormat, logger_init};

#[derive(Parser, Debug)]
#[command(name = "runpad")]
#[command(version)]
#[command(about = "Run scripts concurrently and stream their output")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Interpreter every script is run with (default: python3, or python on Windows)
    #[arg(long, env = "RUNPAD_INTERPRETER", global = true)]
    interpreter: Option<PathBuf>,

    /// Allowed script extension; repeat for several (default: .py and .pyw)
    #[arg(long = "ext", global = true)]
    extensions: Vec<String>,

    /// How often buffered output is flushed to stdout, in milliseconds
    #[arg(long, default_value_t = 50, global = true)]
    drain_interval_ms: u64,

    /// Log filter directive, e.g. "info" or "runpad=debug"
    #[arg(long, env = "RUNPAD_LOG", default_value = "warn", global = true)]
    log_level: String,

    /// Log format: text, json or journald
    #[arg(long, default_value = "text", global = true)]
    log_format: LoggerFormat,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a single script
    Run {
        script: PathBuf,
    },

    /// Run several scripts at once and print a summary when all are done
    Batch {
        /// JSON script list; its marked items (or all items, if none are marked) are run
        #[arg(long)]
        list: Option<PathBuf>,

        scripts: Vec<PathBuf>,
    },
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(interpreter) = &self.interpreter {
            config.interpreter = interpreter.clone();
        }
        if !self.extensions.is_empty() {
            config.policy = ScriptPolicy::new(self.extensions.iter().cloned());
        }
        config.drain_interval = Duration::from_millis(self.drain_interval_ms);
        config
    }
}

fn load_list(path: &Path) -> anyhow::Result<ScriptList> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading script list {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing script list {}", path.display()))
}

async fn wait_all(jobs: Vec<JobHandle>) -> Vec<JobExit> {
    let mut exits = Vec::with_capacity(jobs.len());
    for job in jobs {
        exits.push(job.wait().await);
    }
    exits
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    logger_init(
        &LoggerConfig::default()
            .with_format(args.log_format)
            .with_level(args.log_level.as_str()),
    )?;

    let config = args.engine_config();
    let (relay, receiver) = relay::channel();
    let shutdown = CancellationToken::new();
    let drain = DrainLoop::spawn(
        receiver,
        WriterSink::stdout(),
        config.drain_interval,
        shutdown.clone(),
    );
    let engine = Engine::new(config, relay);

    let jobs = match args.command {
        Commands::Run { script } => engine.run_script(&script).into_iter().collect(),
        Commands::Batch { list, mut scripts } => {
            if let Some(list) = list {
                scripts.extend(load_list(&list)?.candidates());
            }
            engine.run_batch(scripts).jobs
        }
    };
    let launched = jobs.len();

    let waiting = wait_all(jobs);
    tokio::pin!(waiting);
    let exits = tokio::select! {
        exits = &mut waiting => exits,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    info!(target: "runpad.cli", "interrupted; stopping running scripts");
                    engine.stop();
                }
                Err(e) => warn!(target: "runpad.cli", error = %e, "cannot listen for ctrl-c"),
            }
            (&mut waiting).await
        }
    };

    engine.wait_idle().await;
    shutdown.cancel();
    drain.await.context("drain loop failed")?;

    let ok = launched > 0 && exits.iter().all(JobExit::success);
    info!(target: "runpad.cli", launched, ok, "done");
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
