//! Editing black box (component C8's consumer side): the Debug Loop's
//! `IMPLEMENTING` state drives an `Editor` to change the working tree, with
//! every write checked against a `WriteBoundaryEnforcer`.
//!
//! No concrete editor ships here — applying an LLM's proposed edits to disk
//! is the same kind of external collaborator boundary the spec places out of
//! scope for `LlmDriver`. The trait shape follows the teacher's pattern of
//! keeping such seams as a narrow async trait (see `scout::LlmDriver`) so a
//! real implementation can be dropped in without touching the Debug Loop.

use act_core::boundary::{WriteBoundaryEnforcer, WriteBoundaryError};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct EditRequest {
    pub task_description: String,
    pub scout_context: String,
}

#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub files_changed: Vec<PathBuf>,
    pub summary: String,
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("write boundary violated: {0}")]
    Boundary(#[from] WriteBoundaryError),
    #[error("editor backend failed: {0}")]
    Backend(String),
}

/// A black-box implementer of edits. Every write it reports MUST first pass
/// through `boundary.validate`; a boundary violation is a programmer bug,
/// not a recoverable condition, and surfaces as `DONE_INFRA_ERROR` rather
/// than a retryable failure.
#[async_trait]
pub trait Editor: Send + Sync {
    async fn apply(
        &self,
        request: EditRequest,
        boundary: &WriteBoundaryEnforcer,
    ) -> Result<EditOutcome, EditorError>;
}

/// Validate a batch of proposed write paths against `boundary` before any
/// concrete `Editor` implementation touches disk. Returns the canonicalized
/// paths in the same order, or the first boundary violation encountered.
pub fn validate_write_paths(
    boundary: &WriteBoundaryEnforcer,
    paths: &[PathBuf],
) -> Result<Vec<PathBuf>, EditorError> {
    paths
        .iter()
        .map(|p| boundary.validate(p).map_err(EditorError::from))
        .collect()
}
