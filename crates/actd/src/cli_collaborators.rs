//! Default collaborators wired into the `actd` binary: external commands
//! invoked via `tokio::process::Command`, matching the teacher's convention
//! of shelling out to `git`/`wt`/`claude` rather than linking a client
//! library for anything outside the sandboxed verification path. Swappable
//! at the `actd::{LlmDriver, Editor}` trait boundary; neither talks to a
//! concrete model provider, which the spec places out of scope.

use actd::editor::{EditOutcome, EditRequest, Editor, EditorError};
use actd::{LlmDriver, LlmError, LlmRequest, LlmResponse};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs a configured shell command with the scout prompt on stdin and
/// expects a JSON report on stdout.
pub struct CommandLineScoutDriver {
    command: String,
}

impl CommandLineScoutDriver {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

#[async_trait]
impl LlmDriver for CommandLineScoutDriver {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let prompt = format!("{}\n\n{}", request.system_prompt, request.messages.join("\n"));
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(prompt.as_bytes()).await;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LlmError::Unavailable(stderr.trim().to_string()));
        }

        Ok(LlmResponse {
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// Runs a configured shell command with the task and scout context on
/// stdin. The command is responsible for making whatever edits it wants;
/// this collaborator only reports that it ran, since the boundary
/// enforcement happens against the files the command actually touched, not
/// against a list it self-reports.
pub struct CommandLineEditor {
    command: String,
}

impl CommandLineEditor {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Editor for CommandLineEditor {
    async fn apply(
        &self,
        request: EditRequest,
        _boundary: &act_core::boundary::WriteBoundaryEnforcer,
    ) -> Result<EditOutcome, EditorError> {
        let prompt = format!("{}\n\n{}", request.task_description, request.scout_context);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EditorError::Backend(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(prompt.as_bytes()).await;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EditorError::Backend(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EditorError::Backend(stderr.trim().to_string()));
        }

        Ok(EditOutcome {
            files_changed: Vec::new(),
            summary: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }
}
