//! Agent context directory initialization (component C8 supplement).
//!
//! Grounded on `examples/original_source/src/act/artifacts/context_dir.py`:
//! the Editor is allowed to write into `<repo_root>/agent/` for its own
//! context notes (`WriteBoundaryEnforcer::is_in_agent_dir` reports
//! membership), and that directory is kept out of the repo's git history by
//! an `agent/` entry appended to `.gitignore`.

use std::path::{Path, PathBuf};
use thiserror::Error;

pub const AGENT_DIR_NAME: &str = "agent";
const GITIGNORE_ENTRY: &str = "agent/";

#[derive(Debug, Error)]
pub enum ContextDirError {
    #[error("failed to create agent directory: {0}")]
    Create(std::io::Error),
    #[error("failed to update .gitignore: {0}")]
    Gitignore(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContextDirError>;

pub fn agent_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(AGENT_DIR_NAME)
}

/// Create the agent directory if it doesn't already exist.
pub fn ensure_agent_dir(repo_root: &Path) -> Result<PathBuf> {
    let dir = agent_dir(repo_root);
    std::fs::create_dir_all(&dir).map_err(ContextDirError::Create)?;
    Ok(dir)
}

fn read_gitignore(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Match `agent/`, `agent`, `/agent/`, `/agent` the way the original's
/// `_has_agent_entry` does.
fn has_agent_entry(lines: &[String]) -> bool {
    lines
        .iter()
        .any(|line| matches!(line.trim(), "agent/" | "agent" | "/agent/" | "/agent"))
}

/// Append `agent/` to `.gitignore` if not already present, creating the
/// file if it doesn't exist. Returns whether an entry was added.
pub fn ensure_gitignore_entry(repo_root: &Path) -> Result<bool> {
    let gitignore_path = repo_root.join(".gitignore");
    let lines = read_gitignore(&gitignore_path);
    if has_agent_entry(&lines) {
        return Ok(false);
    }

    let mut content = std::fs::read_to_string(&gitignore_path).unwrap_or_default();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(GITIGNORE_ENTRY);
    content.push('\n');
    std::fs::write(&gitignore_path, content).map_err(ContextDirError::Gitignore)?;
    Ok(true)
}

/// Create the agent directory and ensure its `.gitignore` entry in one
/// call. Returns the directory path and whether `.gitignore` was modified.
pub fn initialize_agent_dir(repo_root: &Path) -> Result<(PathBuf, bool)> {
    let dir = ensure_agent_dir(repo_root)?;
    let modified = ensure_gitignore_entry(repo_root)?;
    Ok((dir, modified))
}

/// Whether `repo_root` already has an agent directory and its `.gitignore`
/// entry in place.
pub fn is_agent_dir_initialized(repo_root: &Path) -> bool {
    let dir = agent_dir(repo_root);
    if !dir.is_dir() {
        return false;
    }
    has_agent_entry(&read_gitignore(&repo_root.join(".gitignore")))
}
