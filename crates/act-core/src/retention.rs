//! Retention (component C7): enforce run-count and age caps while
//! protecting any run that carries a stuck report.
//!
//! Grounded on `examples/original_source/src/act/artifacts/cleanup.py`.
//! Resolves the spec's stated open question — whether a run with no
//! parseable timestamp counts against `max_runs` — by following the
//! original: `None` timestamps sort last behind a sentinel maximum instant
//! and are not excluded from the cap.

use crate::run_id::{is_valid_run_id, parse_run_id_timestamp};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

pub const MAX_RUNS: usize = 20;
pub const MAX_AGE_DAYS: i64 = 14;
pub const STUCK_REPORT_FILENAME: &str = "stuck_report.md";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub timestamp: Option<DateTime<Utc>>,
    pub has_stuck_report: bool,
}

/// Enumerate a snapshot of `<root>/runs/*`. Entries whose directory name is
/// not a valid run id are not managed by retention and are skipped.
pub fn list_runs(root: &Path) -> Vec<RunInfo> {
    let runs_dir = root.join("runs");
    let Ok(entries) = std::fs::read_dir(&runs_dir) else {
        return Vec::new();
    };

    let mut runs: Vec<RunInfo> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if !entry.path().is_dir() || !is_valid_run_id(&name) {
                return None;
            }
            let run_dir = entry.path();
            Some(RunInfo {
                timestamp: parse_run_id_timestamp(&name),
                has_stuck_report: run_dir.join(STUCK_REPORT_FILENAME).is_file(),
                run_dir,
                run_id: name,
            })
        })
        .collect();

    // Oldest first; runs with no parseable timestamp sort last via a
    // sentinel maximum instant.
    runs.sort_by_key(|r| r.timestamp.unwrap_or(DateTime::<Utc>::MAX_UTC));
    runs
}

/// Two-pass selection of runs to delete:
/// 1. Any non-stuck-report run older than `max_age_days` is scheduled.
/// 2. Among the remainder, oldest non-stuck runs (timestampless last) are
///    scheduled until the non-stuck count is within `max_runs`.
///
/// Runs carrying a stuck report are never scheduled, regardless of age or
/// count.
pub fn get_runs_to_delete(
    runs: &[RunInfo],
    max_runs: usize,
    max_age_days: i64,
    now: DateTime<Utc>,
) -> Vec<RunInfo> {
    let cutoff = now - chrono::Duration::days(max_age_days);
    let mut to_delete: Vec<RunInfo> = Vec::new();
    let mut deleted_ids = std::collections::HashSet::new();

    for run in runs {
        if run.has_stuck_report {
            continue;
        }
        if let Some(ts) = run.timestamp {
            if ts < cutoff {
                deleted_ids.insert(run.run_id.clone());
                to_delete.push(run.clone());
            }
        }
    }

    let remaining: Vec<&RunInfo> = runs
        .iter()
        .filter(|r| !r.has_stuck_report && !deleted_ids.contains(&r.run_id))
        .collect();

    if remaining.len() > max_runs {
        let excess = remaining.len() - max_runs;
        for run in remaining.into_iter().take(excess) {
            to_delete.push(run.clone());
        }
    }

    to_delete
}

/// Recursively remove a run directory. Swallows failures, returning `false`
/// rather than aborting a sweep over other runs.
pub fn delete_run(run_dir: &Path) -> bool {
    std::fs::remove_dir_all(run_dir).is_ok()
}

/// Run the full retention sweep over a snapshot of `root`'s runs, returning
/// the count of successfully deleted runs.
pub fn cleanup_runs(root: &Path, max_runs: usize, max_age_days: i64) -> usize {
    let runs = list_runs(root);
    let to_delete = get_runs_to_delete(&runs, max_runs, max_age_days, Utc::now());
    to_delete
        .iter()
        .filter(|r| delete_run(&r.run_dir))
        .count()
}

pub fn get_run_count(root: &Path) -> usize {
    list_runs(root).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run(id: &str, ts: Option<DateTime<Utc>>, stuck: bool) -> RunInfo {
        RunInfo {
            run_id: id.to_string(),
            run_dir: PathBuf::from(format!("/runs/{id}")),
            timestamp: ts,
            has_stuck_report: stuck,
        }
    }

    fn days_ago(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
        now - chrono::Duration::days(days)
    }

    #[test]
    fn stuck_reports_are_never_scheduled_for_deletion() {
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        let old_stuck = run("run_20200101_000000_aaaaaa", Some(days_ago(now, 3000)), true);
        let runs = vec![old_stuck.clone()];
        let to_delete = get_runs_to_delete(&runs, 0, 1, now);
        assert!(to_delete.is_empty());
        assert!(!to_delete.contains(&old_stuck));
    }

    #[test]
    fn age_cutoff_schedules_old_non_stuck_runs() {
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        let old = run("run_20200101_000000_aaaaaa", Some(days_ago(now, 30)), false);
        let fresh = run("run_20260301_000000_bbbbbb", Some(days_ago(now, 1)), false);
        let runs = vec![old.clone(), fresh.clone()];
        let to_delete = get_runs_to_delete(&runs, 100, 14, now);
        assert_eq!(to_delete, vec![old]);
    }

    #[test]
    fn cap_enforcement_deletes_oldest_first_when_over_max_runs() {
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        let runs: Vec<RunInfo> = (0..5)
            .map(|i| run(&format!("run_2026010{i}_000000_aaaaaa"), Some(days_ago(now, 5 - i)), false))
            .collect();
        let to_delete = get_runs_to_delete(&runs, 3, 3650, now);
        assert_eq!(to_delete.len(), 2);
        // Oldest two (largest days_ago) are scheduled.
        assert_eq!(to_delete[0].run_id, runs[0].run_id);
        assert_eq!(to_delete[1].run_id, runs[1].run_id);
    }

    #[test]
    fn timestampless_runs_count_against_max_runs_and_sort_last() {
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        let timestamped = run("run_20260101_000000_aaaaaa", Some(days_ago(now, 10)), false);
        let timestampless = run("malformed-but-present", None, false);
        let mut runs = vec![timestampless.clone(), timestamped.clone()];
        runs.sort_by_key(|r| r.timestamp.unwrap_or(DateTime::<Utc>::MAX_UTC));
        assert_eq!(runs[0].run_id, timestamped.run_id);
        assert_eq!(runs[1].run_id, timestampless.run_id);

        // With a cap of 1, the cap-enforcement pass must still evict one of
        // the two even though one has no timestamp.
        let to_delete = get_runs_to_delete(&runs, 1, 3650, now);
        assert_eq!(to_delete.len(), 1);
    }

    #[test]
    fn delete_run_swallows_errors_for_missing_dir() {
        assert!(!delete_run(Path::new("/nonexistent/path/should/not/panic")));
    }
}
