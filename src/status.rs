//! Monitor status overview.
//!
//! Summarises what the monitor knows: the revision each environment reported
//! at its last check, and the artifacts held in the cache. Used by
//! `harble status` and the console `status` command.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::cache::{ArtifactCache, CachedFile};
use crate::config::Config;
use crate::models::LastCheckedRecord;
use crate::state::StateStore;

pub struct StatusReport {
    pub records: Vec<LastCheckedRecord>,
    pub cached: Vec<CachedFile>,
}

impl StatusReport {
    pub fn is_cached(&self, revision: &str) -> bool {
        self.cached.iter().any(|f| f.revision == revision)
    }
}

pub fn collect(state: &StateStore, cache: &ArtifactCache) -> Result<StatusReport> {
    Ok(StatusReport {
        records: state.load()?,
        cached: cache.list()?,
    })
}

/// Run the status command: read state and cache and print a summary.
pub fn run_status(config: &Config) -> Result<()> {
    let report = collect(
        &StateStore::new(&config.storage.state_file),
        &ArtifactCache::new(&config.storage.cache_dir),
    )?;
    print!("{}", render(&report, None));
    Ok(())
}

pub fn render(report: &StatusReport, next_check: Option<DateTime<Utc>>) -> String {
    let mut out = String::new();
    out.push_str("Revision status\n");
    out.push_str("===============\n\n");

    let now = Utc::now();
    if report.records.is_empty() {
        out.push_str("  No environments checked yet.\n");
    } else {
        out.push_str(&format!(
            "  {:<10} {:<44} {:<8} {}\n",
            "HOTEL", "REVISION", "CACHED", "LAST CHECK"
        ));
        out.push_str(&format!("  {}\n", "-".repeat(80)));
        for record in &report.records {
            let cached = if report.is_cached(record.revision.as_str()) {
                "yes"
            } else {
                "no"
            };
            out.push_str(&format!(
                "  {:<10} {:<44} {:<8} {}\n",
                record.hotel.domain(),
                record.revision.as_str(),
                cached,
                format_age(record.last_checked, now)
            ));
        }
    }

    let total: u64 = report.cached.iter().map(|f| f.size).sum();
    out.push('\n');
    out.push_str(&format!(
        "  Cached revisions: {} ({})\n",
        report.cached.len(),
        format_size(total)
    ));

    if let Some(next) = next_check {
        out.push_str(&format!(
            "  Upcoming check:   {}\n",
            next.format("%m/%d/%Y %H:%M:%S GMT")
        ));
    }
    out
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Age of a check relative to `now`; future or month-old checks show the date.
fn format_age(checked: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now - checked;
    let (n, unit) = if age < Duration::zero() || age >= Duration::days(30) {
        return checked.format("%Y-%m-%d %H:%M").to_string();
    } else if age < Duration::minutes(1) {
        return "just now".to_string();
    } else if age < Duration::hours(1) {
        (age.num_minutes(), "min")
    } else if age < Duration::days(1) {
        (age.num_hours(), "hour")
    } else {
        (age.num_days(), "day")
    };
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Environment, Revision};
    use chrono::TimeZone;
    use std::path::PathBuf;

    #[test]
    fn formats_sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn formats_check_age() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(format_age(now, now), "just now");
        assert_eq!(format_age(now - Duration::minutes(2), now), "2 mins ago");
        assert_eq!(format_age(now - Duration::hours(1), now), "1 hour ago");
        assert_eq!(format_age(now - Duration::days(3), now), "3 days ago");
        assert_eq!(
            format_age(now - Duration::days(40), now),
            "2024-04-22 12:00"
        );
        assert_eq!(
            format_age(now + Duration::hours(1), now),
            "2024-06-01 13:00"
        );
    }

    #[test]
    fn render_marks_cached_revisions() {
        let report = StatusReport {
            records: vec![
                LastCheckedRecord {
                    hotel: Environment::Com,
                    revision: Revision::new("r1").unwrap(),
                    last_checked: Utc::now(),
                },
                LastCheckedRecord {
                    hotel: Environment::Fi,
                    revision: Revision::new("r2").unwrap(),
                    last_checked: Utc::now(),
                },
            ],
            cached: vec![CachedFile {
                revision: "r1".to_string(),
                path: PathBuf::from("r1.json"),
                size: 2048,
            }],
        };

        let text = render(&report, None);
        let com = text.lines().find(|l| l.contains(".com")).unwrap();
        let fi = text.lines().find(|l| l.contains(".fi")).unwrap();
        assert!(com.contains("yes"));
        assert!(fi.contains(" no "));
        assert!(text.contains("Cached revisions: 1 (2.0 KB)"));
    }

    #[test]
    fn render_empty_state() {
        let report = StatusReport {
            records: Vec::new(),
            cached: Vec::new(),
        };
        assert!(render(&report, None).contains("No environments checked yet."));
    }
}
