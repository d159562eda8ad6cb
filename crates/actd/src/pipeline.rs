//! Pipeline Executor (component C5): sequentially run declared steps
//! inside the container, with per-step timeout and stop-on-first-failure.
//!
//! Grounded on `examples/original_source/src/act/verifier/pipeline.py`'s
//! `execute_steps` (`break` on the first non-zero exit) and
//! `_execute_with_timeout` (background worker raced against a deadline).
//! The teacher's own `loopd/src/verifier.rs::execute` does not stop on
//! first failure — it runs every configured command and only aggregates a
//! pass/fail flag — so this module diverges from that file on exactly this
//! point while keeping its timeout-via-race and log-writing idiom.

use crate::container::DockerContainerHandle;
use act_core::logs::{append_combined_log, format_step_log, write_step_log};
use act_core::types::{CommandResult, VerificationStep};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("log writer failed: {0}")]
    Log(#[from] act_core::logs::LogError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Default per-step timeout: 300,000 ms (5 minutes).
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 300_000;

/// Run `steps` in order against `container`, stopping at the first
/// non-zero exit. Returns every result produced so far and whether the
/// full declared sequence passed (`all_passed` requires every declared
/// step to have run, not just every run step to have passed).
pub async fn execute_steps(
    container: &DockerContainerHandle,
    steps: &[VerificationStep],
    env: &HashMap<String, String>,
    timeout_ms: u64,
    logs_dir: &Path,
    combined_log: &Path,
) -> Result<(Vec<CommandResult>, bool)> {
    let mut results = Vec::with_capacity(steps.len());

    for (index, step) in steps.iter().enumerate() {
        let step_number = (index + 1) as u32;
        let start = std::time::Instant::now();

        let (exit_code, output, timed_out) =
            run_one_step(container, step, env, timeout_ms).await;

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            step = step_number,
            name = %step.name,
            exit_code,
            duration_ms,
            timed_out,
            "verification step finished"
        );

        let log_body = format_step_log(
            step_number,
            &step.name,
            &step.command,
            &output,
            exit_code,
            timed_out,
            timeout_ms / 1000,
        );
        write_step_log(logs_dir, step_number, &step.name, &log_body)?;
        append_combined_log(combined_log, &log_body)?;

        let passed = exit_code == 0;
        results.push(CommandResult {
            name: step.name.clone(),
            command: step.command.clone(),
            exit_code,
            duration_ms,
        });

        if !passed {
            return Ok((results, false));
        }
    }

    Ok((results, true))
}

async fn run_one_step(
    container: &DockerContainerHandle,
    step: &VerificationStep,
    env: &HashMap<String, String>,
    timeout_ms: u64,
) -> (i32, String, bool) {
    let deadline = Duration::from_millis(timeout_ms);
    tokio::select! {
        result = container.exec(&step.command, env) => {
            let (exit_code, output) = result;
            (exit_code, output, false)
        }
        () = tokio::time::sleep(deadline) => {
            warn!(name = %step.name, timeout_ms, "step timed out, killing residual processes");
            container.kill_residual_processes().await;
            (124, String::new(), true)
        }
    }
}
