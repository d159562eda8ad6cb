//! Debug Loop (component C10): the state machine coordinating Scouts, the
//! editing black box, and the Verifier Facade.
//!
//! States: `PARSING -> SCOUTING -> IMPLEMENTING -> VERIFYING -> INTERPRETING
//! -> (SCOUTING|IMPLEMENTING|DONE_SUCCESS|DONE_STUCK|DONE_INFRA_ERROR)`.
//! `TaskState`'s terminal states and thresholds follow
//! `examples/original_source/src/act/task/state.py`; the single coordinating
//! async task that awaits concurrent subtasks and interprets their results
//! follows the teacher's `loopd/src/scheduler.rs`.

use crate::editor::{EditRequest, Editor};
use crate::scout::{BuildSurfaceReport, CodebaseMapReport, LlmDriver, RetryPolicy, ScoutError};
use crate::verifier::{self, VerifierRunner, VerifyRequest};
use act_core::boundary::WriteBoundaryEnforcer;
use act_core::config::Config;
use act_core::run_id::RunId;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Source of a `DONE_INFRA_ERROR` terminal state, carried through so a
/// caller can tell an infrastructure failure in the Verifier apart from one
/// in a Scout or the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfraErrorSource {
    ScoutA,
    ScoutB,
    Editor,
    Verifier,
}

#[derive(Debug)]
pub enum LoopOutcome {
    Success {
        summary: String,
        run_ids: Vec<RunId>,
    },
    Stuck {
        stuck_report: String,
        run_ids: Vec<RunId>,
    },
    InfraError {
        source: InfraErrorSource,
        message: String,
    },
}

impl LoopOutcome {
    /// Exit code per the spec's CLI mapping: 0 success, 2 stuck, 3 infra.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success { .. } => 0,
            Self::Stuck { .. } => 2,
            Self::InfraError { .. } => 3,
        }
    }
}

/// Aggregated context the Scouts produce and the editor consumes.
#[derive(Debug, Clone, Default)]
struct ScoutContext {
    codebase_map: Option<CodebaseMapReport>,
    build_surface: Option<BuildSurfaceReport>,
}

impl ScoutContext {
    fn as_editor_context(&self) -> String {
        let mut parts = Vec::new();
        if let Some(map) = &self.codebase_map {
            parts.push(format!(
                "relevant files: {}",
                map.relevant_files
                    .iter()
                    .map(|f| f.path.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if let Some(surface) = &self.build_surface {
            parts.push(format!(
                "build commands: {}",
                surface.build_commands.join(", ")
            ));
        }
        parts.join("\n")
    }
}

/// Everything the loop needs to run one task end to end.
pub struct DebugLoop {
    config: Config,
    repo_root: PathBuf,
    boundary: WriteBoundaryEnforcer,
    scout_driver: Arc<dyn LlmDriver>,
    editor: Arc<dyn Editor>,
    verifier: Arc<dyn VerifierRunner>,
    cancel_token: CancellationToken,
}

impl DebugLoop {
    pub fn new(
        config: Config,
        repo_root: PathBuf,
        boundary: WriteBoundaryEnforcer,
        scout_driver: Arc<dyn LlmDriver>,
        editor: Arc<dyn Editor>,
    ) -> Self {
        Self::with_verifier(
            config,
            repo_root,
            boundary,
            scout_driver,
            editor,
            Arc::new(crate::verifier::RealVerifier),
        )
    }

    /// Like `new`, but with an explicit `VerifierRunner` — the seam tests use
    /// to exercise the hard-stop (S5) and replan (S6) transitions without a
    /// real container runtime.
    pub fn with_verifier(
        config: Config,
        repo_root: PathBuf,
        boundary: WriteBoundaryEnforcer,
        scout_driver: Arc<dyn LlmDriver>,
        editor: Arc<dyn Editor>,
        verifier: Arc<dyn VerifierRunner>,
    ) -> Self {
        Self {
            config,
            repo_root,
            boundary,
            scout_driver,
            editor,
            verifier,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Cancel any Scout retry currently backing off, the same per-run token
    /// pattern as `loopd/src/lib.rs`'s `register_run_token`. Safe to call
    /// from another task holding a clone of this `DebugLoop`'s `Arc`, or
    /// concurrently with `run()`; cancellation is checked between attempts,
    /// not mid-flight of a single Scout call.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Run the full state machine for one task description, to completion.
    pub async fn run(&self, task_description: &str) -> LoopOutcome {
        // PARSING
        if task_description.trim().is_empty() {
            warn!("task description not understood, empty after trimming");
            return LoopOutcome::Stuck {
                stuck_report: stuck_report_body(
                    task_description,
                    &[],
                    "",
                    &["task description could not be parsed; it was empty".to_string()],
                ),
                run_ids: Vec::new(),
            };
        }

        let mut run_ids: Vec<RunId> = Vec::new();
        let mut attempts_made: u32 = 0;
        let mut consecutive_failures: u32 = 0;
        let mut replans_used: u32 = 0;
        let mut context = ScoutContext::default();

        loop {
            // SCOUTING
            match self.run_scouts(task_description).await {
                Ok(ctx) => context = ctx,
                Err(source) => {
                    return LoopOutcome::InfraError {
                        source,
                        message: "scout retry exhausted".to_string(),
                    }
                }
            }

            // IMPLEMENTING and VERIFYING alternate until a replan or terminal state.
            loop {
                let edit_request = EditRequest {
                    task_description: task_description.to_string(),
                    scout_context: context.as_editor_context(),
                };

                let edit_outcome = match self.editor.apply(edit_request, &self.boundary).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        return LoopOutcome::InfraError {
                            source: InfraErrorSource::Editor,
                            message: e.to_string(),
                        };
                    }
                };
                let agent_notes_touched = edit_outcome
                    .files_changed
                    .iter()
                    .filter(|path| self.boundary.is_in_agent_dir(path))
                    .count();
                if agent_notes_touched > 0 {
                    info!(
                        agent_notes_touched,
                        files_changed = edit_outcome.files_changed.len(),
                        "edit touched agent context notes"
                    );
                }

                // VERIFYING
                let verify_request = VerifyRequest::new(
                    self.config.verify_steps.clone(),
                    self.config.container_image.clone(),
                    self.repo_root.clone(),
                    self.config.artifact_root.clone(),
                );
                let response = self.verifier.verify(&verify_request).await;
                attempts_made += 1;
                if let Some(id) = response.run_id() {
                    if let Ok(run_id) = RunId::parse(id) {
                        run_ids.push(run_id);
                    }
                }

                // INTERPRETING
                if response.is_pass() {
                    info!(attempts_made, "verification passed, task complete");
                    let summary = format!(
                        "task completed after {attempts_made} verify attempt(s), {replans_used} replan(s)"
                    );
                    return LoopOutcome::Success { summary, run_ids };
                }

                if response.is_infra_error() {
                    return LoopOutcome::InfraError {
                        source: InfraErrorSource::Verifier,
                        message: "verifier reported an infrastructure error".to_string(),
                    };
                }

                // FAIL
                consecutive_failures += 1;
                let tail = response.tail_log().unwrap_or_default().to_string();

                if attempts_made >= self.config.total_verify_loop_threshold {
                    let hypotheses = synthesize_hypotheses(&context, &tail);
                    let stuck_report = stuck_report_body(task_description, &run_ids, &tail, &hypotheses);
                    self.write_stuck_report(&run_ids, &stuck_report);
                    return LoopOutcome::Stuck {
                        stuck_report,
                        run_ids,
                    };
                }

                if consecutive_failures >= self.config.consecutive_failure_threshold
                    && replans_used < self.config.max_replans
                {
                    replans_used += 1;
                    consecutive_failures = 0;
                    info!(replans_used, "consecutive failure threshold hit, replanning");
                    break; // back to SCOUTING
                }

                // else: stay in IMPLEMENTING with the updated context.
            }
        }
    }

    async fn run_scouts(&self, task_description: &str) -> Result<ScoutContext, InfraErrorSource> {
        let policy = RetryPolicy {
            initial_delay: std::time::Duration::from_millis(self.config.scout_retry_initial_ms),
            multiplier: self.config.scout_retry_multiplier,
            max_delay: std::time::Duration::from_millis(self.config.scout_retry_max_ms),
            max_attempts: self.config.scout_retry_max_attempts,
        };

        let map_request = crate::scout::LlmRequest {
            system_prompt: "Produce a codebase map for the task.".to_string(),
            messages: vec![task_description.to_string()],
            model_hint: None,
        };
        let surface_request = crate::scout::LlmRequest {
            system_prompt: "Describe the build and test surface for the task.".to_string(),
            messages: vec![task_description.to_string()],
            model_hint: None,
        };

        let (map_result, surface_result) = tokio::join!(
            crate::scout::call_with_retry(
                self.scout_driver.as_ref(),
                map_request,
                policy,
                &self.cancel_token
            ),
            crate::scout::call_with_retry(
                self.scout_driver.as_ref(),
                surface_request,
                policy,
                &self.cancel_token
            ),
        );

        let codebase_map = match map_result {
            Ok(response) => match crate::scout::parse_and_validate::<CodebaseMapReport>(&response.text) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "scout A schema validation failed");
                    return Err(InfraErrorSource::ScoutA);
                }
            },
            Err(ScoutError::RetryExhausted { .. }) => return Err(InfraErrorSource::ScoutA),
            Err(e) => {
                warn!(error = %e, "scout A failed");
                return Err(InfraErrorSource::ScoutA);
            }
        };

        let build_surface = match surface_result {
            Ok(response) => match crate::scout::parse_and_validate::<BuildSurfaceReport>(&response.text) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "scout B schema validation failed");
                    return Err(InfraErrorSource::ScoutB);
                }
            },
            Err(ScoutError::RetryExhausted { .. }) => return Err(InfraErrorSource::ScoutB),
            Err(e) => {
                warn!(error = %e, "scout B failed");
                return Err(InfraErrorSource::ScoutB);
            }
        };

        Ok(ScoutContext {
            codebase_map,
            build_surface,
        })
    }

    /// Write `stuck_report.md` into the latest run directory, which makes
    /// that run retention-protected (§4.7). A best-effort write: if there is
    /// no run directory to write into (the task never reached `VERIFYING`)
    /// or the write fails, the loop still reports `DONE_STUCK` — the report
    /// returned to the caller is not lost either way.
    fn write_stuck_report(&self, run_ids: &[RunId], stuck_report: &str) {
        let Some(latest) = run_ids.last() else {
            return;
        };
        let run_dir = verifier::run_dir_for(&self.config.artifact_root, latest);
        let path = run_dir.join(act_core::retention::STUCK_REPORT_FILENAME);
        if let Err(e) = std::fs::write(&path, stuck_report) {
            warn!(run_id = %latest, error = %e, "failed to persist stuck report");
        }
    }
}

/// Deterministic 3-5 bullet hypothesis synthesis from aggregated scout
/// context and the last tail log, used to fill a stuck report. No LLM call:
/// this is a mechanical summary, not an analysis.
fn synthesize_hypotheses(context: &ScoutContext, tail_log: &str) -> Vec<String> {
    let mut hypotheses = Vec::new();

    if let Some(surface) = &context.build_surface {
        for issue in surface.environment_issues.iter().take(2) {
            hypotheses.push(format!("environment issue reported by scout: {issue}"));
        }
        for analysis in surface.failure_analysis.iter().take(2) {
            hypotheses.push(format!("failure pattern reported by scout: {analysis}"));
        }
    }
    if let Some(map) = &context.codebase_map {
        for zone in map.risk_zones.iter().take(1) {
            hypotheses.push(format!("risk zone flagged by scout: {zone}"));
        }
    }
    if tail_log.to_lowercase().contains("timeout") {
        hypotheses.push("the last verification step may be timing out rather than failing cleanly".to_string());
    }
    if hypotheses.is_empty() {
        hypotheses.push("no scout signal correlated with the failures; inspect the tail log manually".to_string());
    }
    hypotheses.truncate(5);
    hypotheses
}

fn stuck_report_body(
    task_description: &str,
    run_ids: &[RunId],
    tail_log_excerpt: &str,
    hypotheses: &[String],
) -> String {
    let mut body = String::new();
    body.push_str("# Stuck Report\n\n");
    body.push_str("## Task\n\n");
    body.push_str(task_description);
    body.push_str("\n\n## Run IDs\n\n");
    for id in run_ids {
        body.push_str(&format!("- {}\n", id.as_str()));
    }
    body.push_str("\n## Tail Log Excerpt\n\n```\n");
    body.push_str(tail_log_excerpt);
    body.push_str("\n```\n\n## Candidate Root Causes\n\n");
    for hypothesis in hypotheses {
        body.push_str(&format!("- {hypothesis}\n"));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{EditOutcome, EditorError};
    use crate::scout::{LlmError, LlmRequest, LlmResponse};
    use act_core::boundary::create_boundary_enforcer;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct EmptyEditor;

    #[async_trait]
    impl Editor for EmptyEditor {
        async fn apply(
            &self,
            _request: EditRequest,
            _boundary: &WriteBoundaryEnforcer,
        ) -> Result<EditOutcome, EditorError> {
            Ok(EditOutcome {
                files_changed: Vec::new(),
                summary: "no-op edit".to_string(),
            })
        }
    }

    struct AlwaysInvalidScoutDriver;

    #[async_trait]
    impl LlmDriver for AlwaysInvalidScoutDriver {
        async fn complete(&self, _request: LlmRequest) -> std::result::Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                text: "not even json".to_string(),
            })
        }
    }

    /// Returns a well-formed v1 report appropriate to whichever scout asked
    /// (distinguished by the system prompt), counting every call so tests
    /// can assert how many scouting rounds the loop ran.
    struct ValidScoutDriver {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl ValidScoutDriver {
        fn new() -> Self {
            Self {
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmDriver for ValidScoutDriver {
        async fn complete(&self, request: LlmRequest) -> std::result::Result<LlmResponse, LlmError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let text = if request.system_prompt.contains("codebase map") {
                r#"{"version":"1","relevant_files":[],"risk_zones":[],"change_boundaries":[],"conventions":[],"prior_art":[]}"#
            } else {
                r#"{"version":"1","build_system":"cargo","test_framework":"cargo test","build_commands":[],"test_commands":[],"failure_analysis":[],"environment_issues":[]}"#
            };
            Ok(LlmResponse {
                text: text.to_string(),
            })
        }
    }

    /// A `VerifierRunner` that always reports `FAIL`, used to drive the
    /// hard-stop (S5) and replan (S6) transitions without a container
    /// runtime.
    struct AlwaysFailVerifier;

    fn fake_fail_response() -> act_core::response::VerifierResponse {
        let run_id = RunId::new();
        let manifest = act_core::manifest::Manifest {
            run_id: run_id.as_str().to_string(),
            timestamp_start: chrono::Utc::now(),
            timestamp_end: chrono::Utc::now(),
            commit_sha: "unknown".to_string(),
            status: act_core::manifest::VerifierStatus::Fail,
            commands_executed: vec![act_core::types::CommandResult {
                name: "test".into(),
                command: "false".into(),
                exit_code: 1,
                duration_ms: 5,
            }],
            platform: act_core::manifest::PlatformInfo::detect("alpine"),
        };
        act_core::response::create_fail_response(
            run_id.as_str().to_string(),
            "=== Step 1: test ===\nExit code: 1\n".to_string(),
            Vec::new(),
            manifest,
        )
    }

    #[async_trait]
    impl VerifierRunner for AlwaysFailVerifier {
        async fn verify(&self, _request: &VerifyRequest) -> act_core::response::VerifierResponse {
            fake_fail_response()
        }
    }

    #[tokio::test]
    async fn empty_task_description_goes_straight_to_stuck() {
        let repo = TempDir::new().unwrap();
        let boundary = create_boundary_enforcer(repo.path(), None).unwrap();
        let debug_loop = DebugLoop::new(
            Config::default(),
            repo.path().to_path_buf(),
            boundary,
            Arc::new(AlwaysInvalidScoutDriver),
            Arc::new(EmptyEditor),
        );

        let outcome = debug_loop.run("   ").await;
        assert!(matches!(outcome, LoopOutcome::Stuck { .. }));
        assert_eq!(outcome.exit_code(), 2);
    }

    #[tokio::test]
    async fn scout_schema_failure_surfaces_as_infra_error_with_scout_a_source() {
        let repo = TempDir::new().unwrap();
        let boundary = create_boundary_enforcer(repo.path(), None).unwrap();
        let debug_loop = DebugLoop::new(
            Config::default(),
            repo.path().to_path_buf(),
            boundary,
            Arc::new(AlwaysInvalidScoutDriver),
            Arc::new(EmptyEditor),
        );

        let outcome = debug_loop.run("fix the failing test").await;
        assert_eq!(outcome.exit_code(), 3);
        match outcome {
            LoopOutcome::InfraError { source, .. } => assert_eq!(source, InfraErrorSource::ScoutA),
            other => panic!("expected InfraError, got {other:?}"),
        }
    }

    #[test]
    fn write_stuck_report_persists_into_the_latest_run_directory() {
        let artifact_root = TempDir::new().unwrap();
        let (run_id, run_dir) = act_core::run_id::allocate_run(artifact_root.path()).unwrap();

        let repo = TempDir::new().unwrap();
        let boundary = create_boundary_enforcer(repo.path(), None).unwrap();
        let mut config = Config::default();
        config.artifact_root = artifact_root.path().to_path_buf();
        let debug_loop = DebugLoop::new(
            config,
            repo.path().to_path_buf(),
            boundary,
            Arc::new(AlwaysInvalidScoutDriver),
            Arc::new(EmptyEditor),
        );

        debug_loop.write_stuck_report(&[run_id], "# Stuck Report\n\nbody");

        let written = std::fs::read_to_string(run_dir.stuck_report_path()).unwrap();
        assert!(written.contains("# Stuck Report"));
    }

    #[test]
    fn write_stuck_report_is_a_no_op_when_no_run_ever_happened() {
        let repo = TempDir::new().unwrap();
        let boundary = create_boundary_enforcer(repo.path(), None).unwrap();
        let debug_loop = DebugLoop::new(
            Config::default(),
            repo.path().to_path_buf(),
            boundary,
            Arc::new(AlwaysInvalidScoutDriver),
            Arc::new(EmptyEditor),
        );
        // Must not panic with an empty run_ids list.
        debug_loop.write_stuck_report(&[], "unreachable");
    }

    #[test]
    fn synthesize_hypotheses_falls_back_when_scouts_are_silent() {
        let hypotheses = synthesize_hypotheses(&ScoutContext::default(), "plain failure, no timeout mentioned");
        assert_eq!(hypotheses.len(), 1);
    }

    #[test]
    fn synthesize_hypotheses_flags_timeouts_in_tail_log() {
        let hypotheses = synthesize_hypotheses(&ScoutContext::default(), "Step killed: TIMEOUT after 300s");
        assert!(hypotheses.iter().any(|h| h.contains("timing out")));
    }

    /// S5 Hard stop: forcing consecutive FAILs up to `total_verify_loop_threshold`
    /// terminates in `DONE_STUCK` with every verify attempt recorded and a
    /// stuck report persisted into the latest run directory.
    #[tokio::test]
    async fn s5_hard_stop_after_total_verify_loop_threshold() {
        let artifact_root = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let boundary = create_boundary_enforcer(repo.path(), None).unwrap();

        let mut config = Config::default();
        config.artifact_root = artifact_root.path().to_path_buf();
        config.total_verify_loop_threshold = 4;
        config.max_replans = 0; // never replan, so the hard stop is reached directly

        let debug_loop = DebugLoop::with_verifier(
            config,
            repo.path().to_path_buf(),
            boundary,
            Arc::new(ValidScoutDriver::new()),
            Arc::new(EmptyEditor),
            Arc::new(AlwaysFailVerifier),
        );

        let outcome = debug_loop.run("fix the failing test").await;
        assert_eq!(outcome.exit_code(), 2);
        match outcome {
            LoopOutcome::Stuck { run_ids, stuck_report } => {
                assert_eq!(run_ids.len(), 4);
                assert!(stuck_report.contains("# Stuck Report"));
                let latest_dir = verifier::run_dir_for(artifact_root.path(), run_ids.last().unwrap());
                let persisted = std::fs::read_to_string(
                    latest_dir.join(act_core::retention::STUCK_REPORT_FILENAME),
                )
                .unwrap();
                assert_eq!(persisted, stuck_report);
            }
            other => panic!("expected Stuck, got {other:?}"),
        }
    }

    /// S6 Replan trigger: with `CONSECUTIVE_FAILURE_THRESHOLD=3`, three
    /// consecutive FAILs send the loop back to `SCOUTING` (observed here as
    /// an extra round of scout calls) and reset the consecutive-failure
    /// counter rather than replanning again on the very next failure.
    #[tokio::test]
    async fn s6_replan_trigger_resets_consecutive_failures() {
        let artifact_root = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let boundary = create_boundary_enforcer(repo.path(), None).unwrap();

        let mut config = Config::default();
        config.artifact_root = artifact_root.path().to_path_buf();
        config.consecutive_failure_threshold = 3;
        config.max_replans = 2;
        config.total_verify_loop_threshold = 8;

        let scout_driver = Arc::new(ValidScoutDriver::new());
        let debug_loop = DebugLoop::with_verifier(
            config,
            repo.path().to_path_buf(),
            boundary,
            scout_driver.clone(),
            Arc::new(EmptyEditor),
            Arc::new(AlwaysFailVerifier),
        );

        let outcome = debug_loop.run("fix the failing test").await;

        // Hard stop fires on attempt 8 (3 + 3 + 2), having replanned exactly
        // twice — three scouting rounds, two scout calls (A and B) each.
        assert_eq!(scout_driver.call_count(), 6);
        match outcome {
            LoopOutcome::Stuck { run_ids, .. } => assert_eq!(run_ids.len(), 8),
            other => panic!("expected Stuck, got {other:?}"),
        }
    }
}
