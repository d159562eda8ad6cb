//! Run identity and directory layout (component C1).
//!
//! A `RunId` is an opaque string of the exact shape
//! `run_<YYYYMMDD>_<HHMMSS>_<6 lowercase alphanumerics>`, timestamped in
//! UTC. `allocate_run` composes a fresh id and materializes the run's
//! directory skeleton with exclusive-create semantics — a collision is
//! surfaced as an error, never silently retried into an existing directory.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum RunIdError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("run directory already exists for {0}")]
    Collision(RunId),
    #[error("invalid run id: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, RunIdError>;

/// Opaque, validated run identifier of the shape
/// `run_<YYYYMMDD>_<HHMMSS>_<6 lowercase alphanumerics>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh id stamped with the current UTC time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Generate a fresh id stamped with an explicit timestamp (used by tests
    /// and by callers that want to control the clock).
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self(format!(
            "run_{}_{}_{}",
            timestamp.format("%Y%m%d"),
            timestamp.format("%H%M%S"),
            random_lowercase_alnum(SUFFIX_LEN)
        ))
    }

    /// Validate and wrap an existing string as a `RunId`.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if !is_valid_run_id(&s) {
            return Err(RunIdError::Invalid(s));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the embedded UTC timestamp. `None` if the date/time segments do
    /// not parse, which should not happen for an id that passed `parse`.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_run_id_timestamp(&self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Draw `n` characters from `[a-z0-9]` using `Uuid::new_v4`'s random bytes
/// as the entropy source (the workspace has no `rand` dependency; `uuid`
/// already is one, and v4 generation is backed by the OS RNG).
pub(crate) fn random_lowercase_alnum(n: usize) -> String {
    let bytes = Uuid::new_v4();
    bytes
        .as_bytes()
        .iter()
        .cycle()
        .take(n)
        .map(|b| SUFFIX_ALPHABET[(*b as usize) % SUFFIX_ALPHABET.len()] as char)
        .collect()
}

/// Validate the exact `run_<date>_<time>_<suffix>` shape: four
/// underscore-separated parts, digit-only date/time segments of fixed
/// length, and a 6-character lowercase-alphanumeric suffix.
pub fn is_valid_run_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("run_") else {
        return false;
    };
    let parts: Vec<&str> = rest.split('_').collect();
    let [date_str, time_str, suffix] = parts.as_slice() else {
        return false;
    };
    date_str.len() == 8
        && time_str.len() == 6
        && suffix.len() == SUFFIX_LEN
        && date_str.bytes().all(|b| b.is_ascii_digit())
        && time_str.bytes().all(|b| b.is_ascii_digit())
        && suffix
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        && NaiveDateTime::parse_from_str(
            &format!("{date_str}_{time_str}"),
            "%Y%m%d_%H%M%S",
        )
        .is_ok()
}

/// Parse the UTC timestamp embedded in a run id. Returns `None` if the id is
/// malformed.
pub fn parse_run_id_timestamp(id: &str) -> Option<DateTime<Utc>> {
    if !is_valid_run_id(id) {
        return None;
    }
    let rest = id.strip_prefix("run_")?;
    let mut parts = rest.splitn(3, '_');
    let date_str = parts.next()?;
    let time_str = parts.next()?;
    let naive = NaiveDateTime::parse_from_str(&format!("{date_str}_{time_str}"), "%Y%m%d_%H%M%S")
        .ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Per-run directory skeleton materialized eagerly by `allocate_run`.
pub struct RunDir {
    pub root: PathBuf,
    pub logs: PathBuf,
    pub tmp: PathBuf,
    pub db: PathBuf,
}

impl RunDir {
    fn new(root: PathBuf) -> Self {
        Self {
            logs: root.join("logs"),
            tmp: root.join("tmp"),
            db: root.join("db"),
            root,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    pub fn combined_log_path(&self) -> PathBuf {
        self.logs.join("combined.log")
    }

    pub fn stuck_report_path(&self) -> PathBuf {
        self.root.join("stuck_report.md")
    }
}

/// Allocate a fresh run id and materialize `<root>/runs/<id>/{logs,tmp,db}`.
///
/// The `<root>/runs` and `<root>/cache` directories are created first if
/// absent. The run directory itself is created with exclusive-create
/// semantics: if it already exists (an id collision), the error is
/// surfaced rather than retried.
pub fn allocate_run(root: &Path) -> Result<(RunId, RunDir)> {
    std::fs::create_dir_all(root.join("runs"))?;
    std::fs::create_dir_all(root.join("cache"))?;

    let run_id = RunId::new();
    let run_root = root.join("runs").join(run_id.as_str());

    match std::fs::create_dir(&run_root) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(RunIdError::Collision(run_id));
        }
        Err(e) => return Err(e.into()),
    }

    let run_dir = RunDir::new(run_root);
    std::fs::create_dir_all(&run_dir.logs)?;
    std::fs::create_dir_all(&run_dir.tmp)?;
    std::fs::create_dir_all(&run_dir.db)?;

    Ok((run_id, run_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generated_ids_are_valid_and_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert!(is_valid_run_id(a.as_str()));
        assert!(is_valid_run_id(b.as_str()));
        assert_ne!(a, b);
    }

    #[test]
    fn timestamp_round_trips_through_the_id() {
        let stamp = Utc.with_ymd_and_hms(2026, 3, 5, 12, 30, 45).unwrap();
        let id = RunId::at(stamp);
        let parsed = id.timestamp().expect("valid timestamp");
        assert_eq!(parsed.format("%Y%m%d_%H%M%S").to_string(), "20260305_123045");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!is_valid_run_id("run_2026_123045_abc123"));
        assert!(!is_valid_run_id("run_20260305_123045_ABC123"));
        assert!(!is_valid_run_id("run_20260305_123045_abc12"));
        assert!(!is_valid_run_id("not_a_run_id"));
        assert!(!is_valid_run_id("run_20261305_123045_abc123"));
    }

    #[test]
    fn allocate_run_creates_skeleton() {
        let root = TempDir::new().unwrap();
        let (run_id, dir) = allocate_run(root.path()).unwrap();
        assert!(is_valid_run_id(run_id.as_str()));
        assert!(dir.root.is_dir());
        assert!(dir.logs.is_dir());
        assert!(dir.tmp.is_dir());
        assert!(dir.db.is_dir());
        assert!(root.path().join("cache").is_dir());
    }

    #[test]
    fn allocate_run_rejects_collision() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("runs")).unwrap();
        let stamp = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let existing = RunId::at(stamp);
        std::fs::create_dir(root.path().join("runs").join(existing.as_str())).unwrap();

        // Force the same id by constructing the path manually and checking
        // that create_dir on an existing path surfaces as a collision.
        let result = std::fs::create_dir(root.path().join("runs").join(existing.as_str()));
        assert!(result.is_err());
    }

    #[test]
    fn parse_rejects_invalid_strings() {
        assert!(RunId::parse("garbage").is_err());
        let valid = RunId::new();
        assert!(RunId::parse(valid.as_str().to_string()).is_ok());
    }
}
