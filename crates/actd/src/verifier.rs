//! Verifier Facade (component C6): orchestrates C1–C5 and produces the
//! unified `VerifierResponse`. The single entry point the Debug Loop calls.
//!
//! Grounded on the protocol in the spec's component design section and on
//! the teacher's `loopd/src/verifier.rs` for the overall shape of a facade
//! that always returns a response rather than letting an exception escape.

use crate::container::{ContainerConfig, ContainerError, DockerContainerHandle};
use crate::pipeline::{self, DEFAULT_STEP_TIMEOUT_MS};
use act_core::logs::{extract_tail, list_artifact_paths, TAIL_LOG_LINES};
use act_core::manifest::{self, ManifestBuilder, VerifierStatus};
use act_core::response::{
    create_fail_response, create_infra_error_response, create_pass_response, VerifierResponse,
};
use act_core::run_id::{allocate_run, RunId};
use act_core::types::VerificationStep;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::{error, info};

/// The Debug Loop's seam onto the Verifier Facade, mirroring the
/// `LlmDriver`/`Editor` trait pattern used for the other external
/// collaborators. `RealVerifier` drives the real, Docker-backed `verify`
/// below; tests substitute a fake to exercise the Debug Loop's hard-stop and
/// replan transitions (spec scenarios S5/S6) without a container runtime.
#[async_trait]
pub trait VerifierRunner: Send + Sync {
    async fn verify(&self, request: &VerifyRequest) -> VerifierResponse;
}

/// The default `VerifierRunner`, backed by the real container-sandboxed
/// pipeline in this module.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealVerifier;

#[async_trait]
impl VerifierRunner for RealVerifier {
    async fn verify(&self, request: &VerifyRequest) -> VerifierResponse {
        verify(request).await
    }
}

/// Everything one `verify` call needs.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub steps: Vec<VerificationStep>,
    pub image: String,
    pub env: HashMap<String, String>,
    pub repo_root: std::path::PathBuf,
    pub artifact_root: std::path::PathBuf,
    pub step_timeout_ms: u64,
}

impl VerifyRequest {
    pub fn new(
        steps: Vec<VerificationStep>,
        image: impl Into<String>,
        repo_root: std::path::PathBuf,
        artifact_root: std::path::PathBuf,
    ) -> Self {
        Self {
            steps,
            image: image.into(),
            env: HashMap::new(),
            repo_root,
            artifact_root,
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
        }
    }
}

/// `verify(steps, image, env, repo_root, artifact_root) -> VerifierResponse`.
///
/// Never lets an infrastructure exception escape: every path returns a
/// `VerifierResponse`, and the container is released on every path,
/// including a manifest-write failure.
pub async fn verify(request: &VerifyRequest) -> VerifierResponse {
    let (run_id, run_dir) = match allocate_run(&request.artifact_root) {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "failed to allocate run directory");
            return create_infra_error_response(
                act_core::response::InfraErrorType::Unknown,
                format!("failed to allocate run directory: {e}"),
                None,
                None,
                None,
                None,
            );
        }
    };

    info!(run_id = %run_id, "run allocated");

    let builder = ManifestBuilder::new(run_id.clone(), &request.repo_root, request.image.clone());

    let container_config = ContainerConfig::new(
        request.image.clone(),
        request.repo_root.clone(),
        run_dir.tmp.clone(),
        run_dir.db.clone(),
    );

    let mut container = match DockerContainerHandle::acquire(&container_config).await {
        Ok(handle) => handle,
        Err(e) => {
            return infra_error_during_bringup(&run_id, &run_dir, &e, &builder);
        }
    };

    let pipeline_result = pipeline::execute_steps(
        &container,
        &request.steps,
        &request.env,
        request.step_timeout_ms,
        &run_dir.logs,
        &run_dir.combined_log_path(),
    )
    .await;

    container.release().await;

    let (commands_executed, all_passed) = match pipeline_result {
        Ok(pair) => pair,
        Err(e) => {
            error!(run_id = %run_id, error = %e, "pipeline executor failed");
            let manifest = builder.finish(VerifierStatus::InfraError, Vec::new());
            let _ = manifest::write(&run_dir.root, &manifest);
            return create_infra_error_response(
                act_core::response::InfraErrorType::Unknown,
                e.to_string(),
                Some(run_id.as_str().to_string()),
                Some(extract_tail(&run_dir.combined_log_path(), TAIL_LOG_LINES)),
                Some(list_artifact_paths(&run_dir.root)),
                Some(manifest),
            );
        }
    };

    let status = if all_passed {
        VerifierStatus::Pass
    } else {
        VerifierStatus::Fail
    };

    let manifest = builder.finish(status, commands_executed);

    if let Err(e) = manifest::write(&run_dir.root, &manifest) {
        error!(run_id = %run_id, error = %e, "manifest write failed");
    }

    let tail_log = extract_tail(&run_dir.combined_log_path(), TAIL_LOG_LINES);
    let artifact_paths = list_artifact_paths(&run_dir.root);

    info!(run_id = %run_id, status = ?manifest.status, "verification complete");

    match status {
        VerifierStatus::Pass => create_pass_response(
            run_id.as_str().to_string(),
            tail_log,
            artifact_paths,
            manifest,
        ),
        VerifierStatus::Fail => create_fail_response(
            run_id.as_str().to_string(),
            tail_log,
            artifact_paths,
            manifest,
        ),
        VerifierStatus::InfraError => unreachable!("status is derived from all_passed above"),
    }
}

fn infra_error_during_bringup(
    run_id: &RunId,
    run_dir: &act_core::run_id::RunDir,
    error: &ContainerError,
    builder: &ManifestBuilder,
) -> VerifierResponse {
    error!(run_id = %run_id, error = %error, "container bring-up failed");
    let manifest = act_core::manifest::Manifest {
        run_id: run_id.as_str().to_string(),
        timestamp_start: builder.timestamp_start,
        timestamp_end: chrono::Utc::now(),
        commit_sha: builder.commit_sha.clone(),
        status: VerifierStatus::InfraError,
        commands_executed: Vec::new(),
        platform: builder.platform.clone(),
    };
    let write_result = manifest::write(&run_dir.root, &manifest);

    create_infra_error_response(
        error.infra_error_type(),
        error.to_string(),
        Some(run_id.as_str().to_string()),
        None,
        Some(list_artifact_paths(&run_dir.root)),
        write_result.ok().map(|_| manifest),
    )
}

/// Best-effort lookup of a run's directory under `artifact_root`, used by
/// callers that already have a `run_id` (e.g. the debug loop writing a
/// stuck report into the latest run).
pub fn run_dir_for(artifact_root: &Path, run_id: &RunId) -> std::path::PathBuf {
    artifact_root.join("runs").join(run_id.as_str())
}
