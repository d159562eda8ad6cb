//! Core data types shared across the verifier core and the debug loop.
//!
//! These mirror the data model in the spec's data model section: `RunId`,
//! `VerificationStep`, `CommandResult`, `LoopState`, plus the `TaskState`/
//! `Task` pair that gives an outer caller something to report progress
//! against while the loop runs.

use crate::response::VerifierResponse;
use crate::run_id::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A declarative `{name, command}` pair. The pipeline executor receives an
/// ordered sequence of these and runs them one at a time inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStep {
    pub name: String,
    pub command: String,
}

impl VerificationStep {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

/// Outcome of running one `VerificationStep`.
///
/// `duration_ms = floor((end - start) in milliseconds)`, recorded even for
/// timed-out steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub name: String,
    pub command: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Mutable state the debug loop accumulates across its own iterations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopState {
    pub attempts_made: u32,
    pub consecutive_failures: u32,
    pub replans_used: u32,
    pub run_ids: Vec<RunId>,
    pub last_response: Option<VerifierResponse>,
}

impl LoopState {
    pub fn record_run(&mut self, run_id: RunId, response: VerifierResponse) {
        self.run_ids.push(run_id);
        self.attempts_made += 1;
        self.last_response = Some(response);
    }
}

/// Terminal and non-terminal states of a `Task` handed to the debug loop by
/// an outer caller.
///
/// Not part of the core loop itself (the loop only knows `LoopState` and its
/// own five states) but needed so a caller has something to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Cancelled,
    Stuck,
    InfraError,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Cancelled | Self::Stuck | Self::InfraError
        )
    }
}

/// An outer-level unit of work: a natural-language task description plus the
/// accumulated `LoopState` from driving it through the debug loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub state: TaskState,
    pub dry_run: bool,
    pub verbose: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub loop_state: LoopState,
    pub summary: Option<String>,
    pub error_message: Option<String>,
}

impl Task {
    pub fn new(description: impl Into<String>, dry_run: bool, verbose: bool) -> Self {
        Self {
            id: generate_task_id(),
            description: description.into(),
            state: TaskState::Queued,
            dry_run,
            verbose,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            loop_state: LoopState::default(),
            summary: None,
            error_message: None,
        }
    }

    pub fn can_cancel(&self) -> bool {
        !self.state.is_terminal()
    }
}

fn generate_task_id() -> String {
    let now = Utc::now();
    format!(
        "task_{}_{}",
        now.format("%Y%m%d_%H%M%S"),
        crate::run_id::random_lowercase_alnum(6)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_result_passed_reflects_exit_code() {
        let ok = CommandResult {
            name: "lint".into(),
            command: "true".into(),
            exit_code: 0,
            duration_ms: 10,
        };
        let bad = CommandResult {
            exit_code: 1,
            ..ok.clone()
        };
        assert!(ok.passed());
        assert!(!bad.passed());
    }

    #[test]
    fn task_starts_queued_and_not_terminal() {
        let task = Task::new("fix the bug", false, false);
        assert_eq!(task.state, TaskState::Queued);
        assert!(task.can_cancel());
        assert!(task.id.starts_with("task_"));
    }

    #[test]
    fn terminal_states_cannot_cancel() {
        for state in [
            TaskState::Success,
            TaskState::Cancelled,
            TaskState::Stuck,
            TaskState::InfraError,
        ] {
            let mut task = Task::new("x", false, false);
            task.state = state;
            assert!(task.state.is_terminal());
            assert!(!task.can_cancel());
        }
    }

    #[test]
    fn loop_state_records_run() {
        let mut state = LoopState::default();
        assert_eq!(state.attempts_made, 0);
        assert!(state.last_response.is_none());
    }
}
