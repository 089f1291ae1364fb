//! Daily database backups with logarithmic retention.
//!
//! Once per day the database is copied to `{backup_dir}/knowledge-YYYY-MM-DD.db`
//! using `VACUUM INTO`, SQLite's online backup primitive. Retention keeps
//! roughly 19 files regardless of age: the last 7 dailies, 4 weeklies,
//! 12 monthlies, and 2 yearlies.

use chrono::{Datelike, NaiveDate};
use sqlx::sqlite::SqlitePool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;

const KEEP_DAILIES: usize = 7;
const KEEP_WEEKLIES: usize = 4;
const KEEP_MONTHLIES: usize = 12;
const KEEP_YEARLIES: usize = 2;

/// Take today's backup if it does not already exist, then prune old copies.
/// Failures are reported but callers treat backups as best-effort.
pub async fn run_daily(pool: &SqlitePool, config: &Config) -> Result<Option<PathBuf>> {
    let backup_dir = config.backup_dir();
    std::fs::create_dir_all(&backup_dir)?;

    let today = chrono::Utc::now().date_naive();
    let target = backup_dir.join(format!("knowledge-{}.db", today.format("%Y-%m-%d")));

    let created = if target.exists() {
        None
    } else {
        sqlx::query("VACUUM INTO ?")
            .bind(target.display().to_string())
            .execute(pool)
            .await?;
        tracing::info!(path = %target.display(), "database backup written");
        Some(target)
    };

    prune(&backup_dir)?;
    Ok(created)
}

/// Delete backups not covered by the retention schedule.
pub fn prune(backup_dir: &Path) -> Result<usize> {
    let mut dated: Vec<(NaiveDate, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(backup_dir)? {
        let entry = entry?;
        let path = entry.path();
        if let Some(date) = parse_backup_date(&path) {
            dated.push((date, path));
        }
    }

    let keep = retained_dates(&dated.iter().map(|(d, _)| *d).collect::<Vec<_>>());

    let mut removed = 0;
    for (date, path) in dated {
        if !keep.contains(&date) {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn parse_backup_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let date_part = name.strip_prefix("knowledge-")?.strip_suffix(".db")?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// The set of dates to keep: newest N per bucket granularity.
fn retained_dates(dates: &[NaiveDate]) -> HashSet<NaiveDate> {
    let mut sorted = dates.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();

    let mut keep = HashSet::new();

    for date in sorted.iter().take(KEEP_DAILIES) {
        keep.insert(*date);
    }

    let mut weeks = HashSet::new();
    for date in &sorted {
        let week = (date.iso_week().year(), date.iso_week().week());
        if weeks.len() >= KEEP_WEEKLIES && !weeks.contains(&week) {
            continue;
        }
        // Newest backup of each of the most recent distinct weeks.
        if weeks.insert(week) {
            keep.insert(*date);
        }
    }

    let mut months = HashSet::new();
    for date in &sorted {
        let month = (date.year(), date.month());
        if months.len() >= KEEP_MONTHLIES && !months.contains(&month) {
            continue;
        }
        if months.insert(month) {
            keep.insert(*date);
        }
    }

    let mut years = HashSet::new();
    for date in &sorted {
        if years.len() >= KEEP_YEARLIES && !years.contains(&date.year()) {
            continue;
        }
        if years.insert(date.year()) {
            keep.insert(*date);
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_recent_dailies_all_kept() {
        let dates: Vec<NaiveDate> = (1..=7).map(|i| d(&format!("2026-07-{i:02}"))).collect();
        let keep = retained_dates(&dates);
        assert_eq!(keep.len(), 7);
    }

    #[test]
    fn test_old_dailies_thin_out() {
        // 60 consecutive days: far more than 7 survive via the weekly and
        // monthly buckets, but most dailies are dropped.
        let start = d("2026-05-01");
        let dates: Vec<NaiveDate> = (0..60)
            .map(|i| start + chrono::Duration::days(i))
            .collect();
        let keep = retained_dates(&dates);
        assert!(keep.len() < 20, "kept {} backups", keep.len());
        // The newest 7 days always survive.
        for i in 53..60 {
            assert!(keep.contains(&(start + chrono::Duration::days(i))));
        }
    }

    #[test]
    fn test_yearly_backups_survive() {
        let dates = vec![d("2024-06-15"), d("2025-06-15"), d("2026-06-15")];
        let keep = retained_dates(&dates);
        // All three are newest-in-year candidates but only 2 yearly slots
        // exist; the two newest also land in daily/weekly/monthly buckets.
        assert!(keep.contains(&d("2026-06-15")));
        assert!(keep.contains(&d("2025-06-15")));
    }

    #[test]
    fn test_parse_backup_date() {
        assert_eq!(
            parse_backup_date(Path::new("/x/knowledge-2026-08-01.db")),
            Some(d("2026-08-01"))
        );
        assert_eq!(parse_backup_date(Path::new("/x/other.db")), None);
        assert_eq!(parse_backup_date(Path::new("/x/knowledge-bad.db")), None);
    }
}
