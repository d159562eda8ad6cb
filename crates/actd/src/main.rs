//! actd - container-sandboxed verification and debug-loop daemon
//!
//! Thin CLI entry point: parse arguments, wire a `Config`, drive the Debug
//! Loop for one task description, and map its terminal state to an exit
//! code.

use act_core::boundary::create_boundary_enforcer;
use act_core::Config;
use actd::{debug_loop::LoopOutcome, DebugLoop};
use clap::Parser;
use mimalloc::MiMalloc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod cli_collaborators;

/// Run a coding-agent debug loop: scout, edit, verify, repeat until the
/// task passes, gets stuck, or an infrastructure error surfaces.
#[derive(Parser)]
#[command(name = "actd")]
#[command(about = "Debug loop daemon: coordinate scouts, edits, and sandboxed verification")]
#[command(version)]
struct Cli {
    /// Task description to resolve.
    task: String,

    /// Repo working tree to operate on.
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Config file path (key=value format).
    #[arg(long)]
    config: Option<PathBuf>,

    /// External command used to drive scout completions (receives the
    /// prompt on stdin, must print a JSON object on stdout).
    #[arg(long, env = "ACTD_SCOUT_COMMAND")]
    scout_command: Option<String>,

    /// External command used to drive edits (receives the task and scout
    /// context on stdin).
    #[arg(long, env = "ACTD_EDIT_COMMAND")]
    edit_command: Option<String>,
}

fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "failed to load config file");
                std::process::exit(3);
            }
        },
        None => Config::default(),
    };
    config.resolve_paths(&cli.repo);

    let repo_root = match cli.repo.canonicalize() {
        Ok(path) => path,
        Err(e) => {
            error!(error = %e, "repo root does not exist");
            std::process::exit(3);
        }
    };

    let boundary = match create_boundary_enforcer(&repo_root, Some(&config.artifact_root)) {
        Ok(boundary) => boundary.with_agent_dir_name(config.agent_dir_name.clone()),
        Err(e) => {
            error!(error = %e, "failed to set up write boundary enforcer");
            std::process::exit(3);
        }
    };

    match act_core::context_dir::initialize_agent_dir(&repo_root) {
        Ok((dir, true)) => info!(agent_dir = %dir.display(), "initialized agent context directory"),
        Ok((_, false)) => {}
        Err(e) => error!(error = %e, "failed to initialize agent context directory"),
    }

    let scout_driver: Arc<dyn actd::LlmDriver> = Arc::new(cli_collaborators::CommandLineScoutDriver::new(
        cli.scout_command
            .clone()
            .unwrap_or_else(|| "true".to_string()),
    ));
    let editor: Arc<dyn actd::Editor> = Arc::new(cli_collaborators::CommandLineEditor::new(
        cli.edit_command.clone().unwrap_or_else(|| "true".to_string()),
    ));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    let artifact_root = config.artifact_root.clone();
    let max_runs = config.max_runs;
    let max_age_days = config.max_age_days;

    let outcome = runtime.block_on(async {
        let debug_loop = DebugLoop::new(config, repo_root, boundary, scout_driver, editor);
        debug_loop.run(&cli.task).await
    });

    let deleted = act_core::retention::cleanup_runs(&artifact_root, max_runs, max_age_days);
    if deleted > 0 {
        info!(deleted, "retention sweep removed expired runs");
    }

    match &outcome {
        LoopOutcome::Success { summary, run_ids } => {
            info!(run_count = run_ids.len(), "DONE_SUCCESS: {summary}");
        }
        LoopOutcome::Stuck { stuck_report, run_ids } => {
            info!(run_count = run_ids.len(), "DONE_STUCK");
            eprintln!("{stuck_report}");
        }
        LoopOutcome::InfraError { source, message } => {
            error!(source = ?source, "DONE_INFRA_ERROR: {message}");
        }
    }

    std::process::exit(outcome.exit_code());
}
