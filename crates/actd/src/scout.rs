//! Scout Runtime (component C9): two parallel read-only LLM analysts.
//!
//! File discovery, binary/secret filtering, and directory exclusion are
//! ported from `examples/original_source/src/act/scouts/file_filter.py`.
//! The retry/backoff shell generalizes the teacher's
//! `loopd/src/runner.rs::execute_step` (attempt-counted retry around an
//! external process call) to exponential backoff around an `LlmDriver`
//! trait call, per the spec's Scout Runtime section.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Current scout response schema version; any other value is rejected.
pub const SCHEMA_VERSION: &str = "1";

const EXCLUDED_DIRECTORIES: &[&str] = &[
    ".git", ".svn", ".hg", "node_modules", "__pycache__", ".tox", ".nox", ".venv", "venv", "env",
    ".env", "virtualenv", ".mypy_cache", ".pytest_cache", ".ruff_cache", ".coverage", "htmlcov",
    "dist", "build", "target", ".next", ".nuxt", "out", ".idea", ".vscode", ".DS_Store",
    "Thumbs.db",
];

const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "ico", "svg", "bmp", "webp", "tiff", "tif",
    // compiled
    "exe", "dll", "so", "dylib", "a", "o", "obj", "pyc", "pyo", "class", "wasm",
    // archives
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "jar", "war", "ear",
    // fonts
    "ttf", "otf", "woff", "woff2", "eot",
    // media
    "mp3", "mp4", "avi", "mkv", "mov", "wav", "flac", "ogg",
    // docs
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    // db
    "db", "sqlite", "sqlite3",
    // other
    "bin", "dat", "pickle", "pkl", "npy", "npz", "parquet", "feather",
];

const SECRET_PATTERNS: &[&str] = &[
    ".env", ".env.*", "*.env", ".env.local", ".env.development", ".env.production", ".env.test",
    "*credentials*", "*secrets*", "*secret*", "*.pem", "*.key", "*.crt", "*.p12", "*.pfx",
    "id_rsa", "id_rsa.*", "id_dsa", "id_dsa.*", "id_ed25519", "id_ed25519.*", ".htpasswd",
    ".netrc", ".npmrc", ".pypirc",
];

pub fn is_excluded_directory(name: &str) -> bool {
    EXCLUDED_DIRECTORIES.contains(&name)
}

pub fn is_binary_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

pub fn is_secret_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lowered = name.to_lowercase();
    SECRET_PATTERNS
        .iter()
        .any(|pattern| glob_match(&pattern.to_lowercase(), &lowered))
}

/// Minimal `fnmatch`-style glob: `*` matches any run of characters, all
/// other characters match literally. Sufficient for the fixed secret
/// pattern list above.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'*') => {
                (0..=t.len()).any(|i| inner(&p[1..], &t[i..]))
            }
            Some(c) => t.first() == Some(c) && inner(&p[1..], &t[1..]),
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

pub fn should_exclude_path(relative_path: &Path) -> bool {
    let in_excluded_dir = relative_path
        .ancestors()
        .skip(1)
        .filter_map(|p| p.file_name())
        .filter_map(|n| n.to_str())
        .any(is_excluded_directory);
    in_excluded_dir || is_binary_file(relative_path) || is_secret_file(relative_path)
}

/// Walk `repo_root`, pruning excluded directories by name and rejecting
/// binary/secret files, in deterministic (sorted) walk order. `max_files`,
/// if supplied, truncates the result.
pub fn discover_files(repo_root: &Path, max_files: Option<usize>) -> Vec<PathBuf> {
    let mut found = Vec::new();
    walk(repo_root, repo_root, &mut found);
    found.sort();
    if let Some(max) = max_files {
        found.truncate(max);
    }
    found
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(mut entries) = std::fs::read_dir(dir).map(|it| it.flatten().collect::<Vec<_>>()) else {
        return;
    };
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if is_excluded_directory(name) {
                    continue;
                }
            }
            walk(root, &path, out);
        } else if path.is_file() && !should_exclude_path(relative) {
            out.push(relative.to_path_buf());
        }
    }
}

/// Raw request/response contract for the external LLM collaborator. No
/// concrete network-backed driver ships here — this is the boundary `spec.md`
/// places out of scope.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub messages: Vec<String>,
    pub model_hint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm backend unavailable: {0}")]
    Unavailable(String),
    #[error("llm call timed out")]
    Timeout,
    #[error("llm backend rate limited the request")]
    RateLimit,
    #[error("llm response was not valid json: {0}")]
    ResponseInvalid(String),
}

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("scout response failed schema validation: {0}")]
    SchemaValidation(String),
    #[error("retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },
    #[error("scout call cancelled")]
    Cancelled,
}

impl ScoutError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Llm(LlmError::Timeout | LlmError::RateLimit | LlmError::Unavailable(_))
        )
    }
}

#[async_trait]
pub trait LlmDriver: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> std::result::Result<LlmResponse, LlmError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay between attempt `i` and `i+1`: `min(d_max, d0 * m^i)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self
            .initial_delay
            .as_millis()
            .saturating_mul(u128::from(self.multiplier).saturating_pow(attempt));
        Duration::from_millis(scaled.min(self.max_delay.as_millis()) as u64)
    }
}

/// Drive an `LlmDriver` call with exponential backoff, retrying only
/// retryable errors, up to `policy.max_attempts`.
///
/// Checked for cancellation before each backoff sleep (`spec.md` §5): a
/// caller that cancels `cancel_token` between attempts stops the retry loop
/// promptly rather than waiting out the remaining backoff delays.
pub async fn call_with_retry(
    driver: &dyn LlmDriver,
    request: LlmRequest,
    policy: RetryPolicy,
    cancel_token: &CancellationToken,
) -> std::result::Result<LlmResponse, ScoutError> {
    let mut last_error: Option<LlmError> = None;

    for attempt in 0..policy.max_attempts {
        if cancel_token.is_cancelled() {
            return Err(ScoutError::Cancelled);
        }

        match driver.complete(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(err) => {
                let scout_err = ScoutError::from(err.clone());
                if !scout_err.is_retryable() {
                    return Err(scout_err);
                }
                warn!(attempt, error = %err, "scout llm call failed, may retry");
                last_error = Some(err);
                if attempt + 1 < policy.max_attempts {
                    tokio::select! {
                        () = tokio::time::sleep(policy.delay_for_attempt(attempt)) => {}
                        () = cancel_token.cancelled() => return Err(ScoutError::Cancelled),
                    }
                }
            }
        }
    }

    Err(ScoutError::RetryExhausted {
        attempts: policy.max_attempts,
        last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}

/// Relevance tag for files in Scout A's codebase map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Relevance {
    Primary,
    Secondary,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RelevantFile {
    pub path: String,
    pub relevance: Relevance,
}

/// Scout A: codebase map.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CodebaseMapReport {
    pub version: String,
    pub relevant_files: Vec<RelevantFile>,
    pub risk_zones: Vec<String>,
    pub change_boundaries: Vec<String>,
    pub conventions: Vec<String>,
    pub prior_art: Vec<String>,
}

/// Scout B: build/test surface.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BuildSurfaceReport {
    pub version: String,
    pub build_system: String,
    pub test_framework: String,
    pub build_commands: Vec<String>,
    pub test_commands: Vec<String>,
    pub failure_analysis: Vec<String>,
    pub environment_issues: Vec<String>,
}

/// Extract the first JSON object from raw LLM text and validate its
/// `version` field. Schema-mismatch and non-JSON-body failures are both
/// non-retryable per the spec.
pub fn parse_and_validate<T: serde::de::DeserializeOwned>(raw: &str) -> std::result::Result<T, ScoutError> {
    let start = raw
        .find('{')
        .ok_or_else(|| ScoutError::Llm(LlmError::ResponseInvalid("no json object found".into())))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| ScoutError::Llm(LlmError::ResponseInvalid("no json object found".into())))?;
    if end < start {
        return Err(ScoutError::Llm(LlmError::ResponseInvalid(
            "malformed json boundaries".into(),
        )));
    }
    let candidate = &raw[start..=end];

    let value: serde_json::Value = serde_json::from_str(candidate)
        .map_err(|e| ScoutError::Llm(LlmError::ResponseInvalid(e.to_string())))?;

    match value.get("version").and_then(serde_json::Value::as_str) {
        Some(v) if v == SCHEMA_VERSION => {}
        Some(other) => {
            return Err(ScoutError::SchemaValidation(format!(
                "unsupported schema version {other}"
            )))
        }
        None => return Err(ScoutError::SchemaValidation("missing version field".into())),
    }

    serde_json::from_value(value).map_err(|e| ScoutError::SchemaValidation(e.to_string()))
}
