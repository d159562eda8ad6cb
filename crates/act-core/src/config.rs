//! Configuration shared by the Verifier Facade, Scout Runtime, and Debug
//! Loop.
//!
//! Parsed from a simple `key=value` file, matching the teacher's
//! `key=value` convention rather than introducing a TOML/YAML dependency.
//! File discovery and environment-variable precedence are an outer-shell
//! concern and not implemented here — only the shape of `Config` and a
//! parser for one file's content.

use crate::types::VerificationStep;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Declarative configuration consumed by C6 (Verifier Facade), C9 (Scout
/// Runtime), and C10 (Debug Loop).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the artifact store, separate from the repo working tree.
    pub artifact_root: PathBuf,
    /// Container image tag used for every verification run.
    pub container_image: String,
    /// Declarative verification steps, in order.
    pub verify_steps: Vec<VerificationStep>,
    /// Per-step timeout in milliseconds.
    pub verify_timeout_ms: u64,

    /// Retention: maximum non-stuck-report runs to retain.
    pub max_runs: usize,
    /// Retention: maximum age, in days, before a non-stuck-report run is
    /// eligible for deletion.
    pub max_age_days: i64,

    /// Lines of trailing context returned by `extract_tail`.
    pub tail_lines: usize,

    /// Scout retry/backoff: initial delay in milliseconds.
    pub scout_retry_initial_ms: u64,
    /// Scout retry/backoff: delay multiplier per attempt.
    pub scout_retry_multiplier: u32,
    /// Scout retry/backoff: maximum delay in milliseconds.
    pub scout_retry_max_ms: u64,
    /// Scout retry/backoff: maximum attempts before `RetryExhausted`.
    pub scout_retry_max_attempts: u32,

    /// Debug loop: consecutive FAILs before a replan.
    pub consecutive_failure_threshold: u32,
    /// Debug loop: absolute cap on verify calls per task.
    pub total_verify_loop_threshold: u32,
    /// Debug loop: cap on Scout re-invocations.
    pub max_replans: u32,

    /// Name of the agent context directory inside the repo, passed to
    /// `WriteBoundaryEnforcer::with_agent_dir_name`.
    pub agent_dir_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from(".act"),
            container_image: "alpine".to_string(),
            verify_steps: Vec::new(),
            verify_timeout_ms: 300_000,
            max_runs: 20,
            max_age_days: 14,
            tail_lines: 200,
            scout_retry_initial_ms: 1_000,
            scout_retry_multiplier: 2,
            scout_retry_max_ms: 30_000,
            scout_retry_max_attempts: 3,
            consecutive_failure_threshold: 3,
            total_verify_loop_threshold: 12,
            max_replans: 4,
            agent_dir_name: crate::context_dir::AGENT_DIR_NAME.to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    fn parse_content(&mut self, content: &str) -> Result<()> {
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };
            self.apply_value(key.trim(), &Self::unquote(value.trim()))?;
        }
        Ok(())
    }

    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    fn apply_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "artifact_root" => self.artifact_root = PathBuf::from(value),
            "container_image" => self.container_image = value.to_string(),
            "verify_steps" => {
                // pipe-separated `name:command` pairs, e.g.
                // "lint:cargo clippy|test:cargo test"
                self.verify_steps = value
                    .split('|')
                    .filter(|s| !s.trim().is_empty())
                    .map(|pair| {
                        let (name, command) = pair.split_once(':').unwrap_or(("step", pair));
                        VerificationStep::new(name.trim(), command.trim())
                    })
                    .collect();
            }
            "verify_timeout_ms" => self.verify_timeout_ms = Self::parse_int(key, value)?,
            "max_runs" => self.max_runs = Self::parse_int(key, value)? as usize,
            "max_age_days" => self.max_age_days = Self::parse_int(key, value)? as i64,
            "tail_lines" => self.tail_lines = Self::parse_int(key, value)? as usize,
            "scout_retry_initial_ms" => self.scout_retry_initial_ms = Self::parse_int(key, value)?,
            "scout_retry_multiplier" => {
                self.scout_retry_multiplier = Self::parse_int(key, value)? as u32;
            }
            "scout_retry_max_ms" => self.scout_retry_max_ms = Self::parse_int(key, value)?,
            "scout_retry_max_attempts" => {
                self.scout_retry_max_attempts = Self::parse_int(key, value)? as u32;
            }
            "consecutive_failure_threshold" => {
                self.consecutive_failure_threshold = Self::parse_int(key, value)? as u32;
            }
            "total_verify_loop_threshold" => {
                self.total_verify_loop_threshold = Self::parse_int(key, value)? as u32;
            }
            "max_replans" => self.max_replans = Self::parse_int(key, value)? as u32,
            "agent_dir_name" => self.agent_dir_name = value.to_string(),
            _ => {
                tracing::warn!(key, "unknown config key");
            }
        }
        Ok(())
    }

    fn parse_int(key: &str, value: &str) -> Result<u64> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Resolve `artifact_root` against a workspace root if it is relative.
    pub fn resolve_paths(&mut self, workspace_root: &Path) {
        if self.artifact_root.is_relative() {
            self.artifact_root = workspace_root.join(&self.artifact_root);
        }
    }
}
