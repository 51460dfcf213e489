//! C7: Per-Group State. Logical-date arithmetic and the on-disk history
//! directory (§4.7). Date math reuses the same Rata Die day-count the parser
//! uses for RFC dates, so "N days ago" and RFC-date parsing agree on what a
//! day is.

use std::path::{Path, PathBuf};

use chrono::{Datelike, Local};

use crate::error::{Error, Result};
use crate::model::Snapshot;
use crate::parser::date::days_since_epoch;

/// Local calendar date shifted by `day_start_hour`: the hours before
/// rollover count toward the previous logical day (§4.7, glossary).
pub fn logical_today(day_start_hour: u8) -> String {
    let now = Local::now();
    logical_date_for(now, day_start_hour)
}

fn logical_date_for(now: chrono::DateTime<Local>, day_start_hour: u8) -> String {
    let shifted = now - chrono::Duration::hours(i64::from(day_start_hour));
    format!("{:04}-{:02}-{:02}", shifted.year(), shifted.month(), shifted.day())
}

/// Difference in days between two `YYYY-MM-DD` logical dates, computed via
/// the same Rata Die formula the date parser uses (no dependency on month
/// lengths).
pub fn days_between(earlier: &str, later: &str) -> Option<i64> {
    let (ey, em, ed) = split_date(earlier)?;
    let (ly, lm, ld) = split_date(later)?;
    Some(days_since_epoch(ly, lm, ld) - days_since_epoch(ey, em, ed))
}

fn split_date(s: &str) -> Option<(i64, i64, i64)> {
    let mut parts = s.splitn(3, '-');
    let y: i64 = parts.next()?.parse().ok()?;
    let m: i64 = parts.next()?.parse().ok()?;
    let d: i64 = parts.next()?.parse().ok()?;
    Some((y, m, d))
}

pub struct GroupHistory {
    dir: PathBuf,
    group: String,
}

impl GroupHistory {
    pub fn new(history_dir: impl Into<PathBuf>, group: impl Into<String>) -> Self {
        Self { dir: history_dir.into(), group: group.into() }
    }

    fn snapshot_path(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{}_{date}.json", self.group))
    }

    /// Strict filename match for this group's snapshots: exactly
    /// `len(group)+1+10` characters of stem, a digit immediately after
    /// `<group>_`, to avoid `tech_` matching `tech_news_...` (§4.7).
    fn matches_filename(&self, filename: &str) -> bool {
        let prefix = format!("{}_", self.group);
        let Some(rest) = filename.strip_prefix(&prefix) else { return false };
        let Some(date_part) = rest.strip_suffix(".json") else { return false };
        date_part.len() == 10
            && date_part.as_bytes()[0].is_ascii_digit()
            && date_part.as_bytes()[4] == b'-'
            && date_part.as_bytes()[7] == b'-'
    }

    fn list_snapshot_filenames(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io_err(e))?;
            if let Some(name) = entry.file_name().to_str() {
                if self.matches_filename(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// The lexicographically greatest snapshot filename for this group.
    pub fn latest_run(&self) -> Result<Option<String>> {
        Ok(self.list_snapshot_filenames()?.into_iter().next_back())
    }

    pub fn latest_date(&self) -> Result<Option<String>> {
        Ok(self.latest_run()?.and_then(|name| self.date_from_filename(&name)))
    }

    fn date_from_filename(&self, filename: &str) -> Option<String> {
        let prefix = format!("{}_", self.group);
        let rest = filename.strip_prefix(&prefix)?;
        rest.strip_suffix(".json").map(str::to_string)
    }

    /// `offset` 0 = most recent, -1 = previous, etc. Out-of-range returns an
    /// empty snapshot rather than an error (§4.7).
    pub fn load_run_by_offset(&self, offset: i64) -> Result<Snapshot> {
        let names = self.list_snapshot_filenames()?;
        let idx_from_end = offset.unsigned_abs() as usize;
        if idx_from_end >= names.len() {
            return Ok(Snapshot { timestamp: 0, items: Vec::new() });
        }
        let name = &names[names.len() - 1 - idx_from_end];
        self.load_named(name)
    }

    pub fn load_date(&self, date: &str) -> Result<Option<Snapshot>> {
        let path = self.snapshot_path(date);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents).map_err(|e| Error::Json {
                path: path.display().to_string(),
                source: e,
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn load_named(&self, filename: &str) -> Result<Snapshot> {
        let path = self.dir.join(filename);
        let contents = std::fs::read_to_string(&path).map_err(|e| self.io_err(e))?;
        serde_json::from_str(&contents).map_err(|e| Error::Json { path: path.display().to_string(), source: e })
    }

    /// Save today's snapshot if it has items, or if today's file does not
    /// yet exist (records a "read happened" marker on empty days, §4.6
    /// Step 7 / §9 open question).
    pub fn save_today(&self, date: &str, snapshot: &Snapshot) -> Result<()> {
        let path = self.snapshot_path(date);
        if snapshot.items.is_empty() && path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| self.io_err(e))?;
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| Error::Json { path: path.display().to_string(), source: e })?;
        std::fs::write(&path, json).map_err(|e| self.io_err(e))
    }

    /// Delete snapshots older than `retention_days` relative to `today`.
    pub fn prune(&self, today: &str, retention_days: u32) -> Result<()> {
        for name in self.list_snapshot_filenames()? {
            let Some(date) = self.date_from_filename(&name) else { continue };
            let Some(age) = days_between(&date, today) else { continue };
            if age > i64::from(retention_days) {
                let path = self.dir.join(&name);
                if let Err(e) = std::fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(self.io_err(e));
                    }
                }
            }
        }
        Ok(())
    }

    fn io_err(&self, source: std::io::Error) -> Error {
        Error::Io { path: self.dir.display().to_string(), source }
    }
}

pub fn history_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("history")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn logical_date_rolls_back_before_start_hour() {
        let dt = Local.with_ymd_and_hms(2024, 1, 10, 3, 30, 0).unwrap();
        assert_eq!(logical_date_for(dt, 4), "2024-01-09");
        assert_eq!(logical_date_for(dt, 0), "2024-01-10");
    }

    #[test]
    fn days_between_computes_difference() {
        assert_eq!(days_between("2024-01-01", "2024-01-05"), Some(4));
        assert_eq!(days_between("2024-01-05", "2024-01-01"), Some(-4));
        assert_eq!(days_between("2024-01-01", "2024-01-01"), Some(0));
    }

    #[test]
    fn filename_matching_rejects_prefix_collisions() {
        let history = GroupHistory::new("/tmp/unused", "tech");
        assert!(history.matches_filename("tech_2024-01-10.json"));
        assert!(!history.matches_filename("tech_news_2024-01-10.json"));
        assert!(!history.matches_filename("tech_2024-01-1.json"));
        assert!(!history.matches_filename("tech_ab12-01-10.json"));
    }

    #[test]
    fn latest_run_picks_lexicographically_greatest() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tech_2024-01-01.json"), "{}").unwrap();
        std::fs::write(dir.path().join("tech_2024-02-15.json"), "{}").unwrap();
        std::fs::write(dir.path().join("tech_news_2024-03-01.json"), "{}").unwrap();
        let history = GroupHistory::new(dir.path(), "tech");
        assert_eq!(history.latest_run().unwrap().as_deref(), Some("tech_2024-02-15.json"));
    }

    #[test]
    fn save_today_writes_and_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let history = GroupHistory::new(dir.path(), "tech");
        let snap = Snapshot {
            timestamp: 1000,
            items: vec![Item { title: Some("x".into()), timestamp: 1000, ..Default::default() }],
        };
        history.save_today("2024-01-10", &snap).unwrap();
        let loaded = history.load_date("2024-01-10").unwrap().unwrap();
        assert_eq!(loaded.items.len(), 1);
    }

    #[test]
    fn save_today_skips_rewrite_on_empty_if_file_exists() {
        let dir = TempDir::new().unwrap();
        let history = GroupHistory::new(dir.path(), "tech");
        let first = Snapshot { timestamp: 1, items: vec![Item { timestamp: 1, ..Default::default() }] };
        history.save_today("2024-01-10", &first).unwrap();

        let empty = Snapshot { timestamp: 2, items: Vec::new() };
        history.save_today("2024-01-10", &empty).unwrap();

        let loaded = history.load_date("2024-01-10").unwrap().unwrap();
        assert_eq!(loaded.items.len(), 1, "existing non-empty snapshot must survive an empty re-save");
    }

    #[test]
    fn save_today_writes_empty_marker_when_file_absent() {
        let dir = TempDir::new().unwrap();
        let history = GroupHistory::new(dir.path(), "tech");
        let empty = Snapshot { timestamp: 2, items: Vec::new() };
        history.save_today("2024-01-10", &empty).unwrap();
        assert!(history.load_date("2024-01-10").unwrap().is_some());
    }

    #[test]
    fn load_run_by_offset_out_of_range_returns_empty() {
        let dir = TempDir::new().unwrap();
        let history = GroupHistory::new(dir.path(), "tech");
        let snap = history.load_run_by_offset(5).unwrap();
        assert!(snap.items.is_empty());
    }

    #[test]
    fn prune_removes_snapshots_past_retention() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tech_2024-01-01.json"), "{}").unwrap();
        std::fs::write(dir.path().join("tech_2024-06-01.json"), "{}").unwrap();
        let history = GroupHistory::new(dir.path(), "tech");
        history.prune("2024-06-01", 50).unwrap();
        assert!(!dir.path().join("tech_2024-01-01.json").exists());
        assert!(dir.path().join("tech_2024-06-01.json").exists());
    }
}
