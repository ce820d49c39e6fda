//! Cache cleaner (C10): prunes per-day data files and generated images
//! older than the retention window, grounded in
//! `original_source/app/services/cache.py::CacheCleaner`.

use crate::holiday;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupSummary {
    pub deleted_files: u64,
    pub freed_bytes: u64,
    pub oldest_kept: Option<NaiveDate>,
}

fn image_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+_(\d{4})(\d{2})(\d{2})_\d{6}\.jpg$").unwrap())
}

fn parse_image_date(filename: &str) -> Option<NaiveDate> {
    let caps = image_pattern().captures(filename)?;
    NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)
}

fn scan_dir(dir: &Path, parse_date: impl Fn(&str) -> Option<NaiveDate>, cutoff: NaiveDate, summary: &mut CleanupSummary) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some(date) = parse_date(&filename) else {
            continue;
        };
        if date < cutoff {
            let freed = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if std::fs::remove_file(entry.path()).is_ok() {
                summary.deleted_files += 1;
                summary.freed_bytes += freed;
            }
        } else {
            summary.oldest_kept = Some(match summary.oldest_kept {
                Some(current) if current <= date => current,
                _ => date,
            });
        }
    }
}

/// Deletes files under `cache_dir/data/` (`YYYY-MM-DD.json`) and
/// `cache_dir/images/` (`<template>_YYYYMMDD_HHMMSS.jpg`) whose
/// embedded date is strictly older than `today - retain_days`. Intended to
/// run via `spawn_blocking` when invoked from async context (spec §4.10).
pub fn run(cache_dir: &Path, today: NaiveDate, retain_days: i64) -> CleanupSummary {
    let cutoff = today - chrono::Duration::days(retain_days);
    let mut summary = CleanupSummary::default();
    scan_dir(&cache_dir.join("data"), holiday::parse_date_filename, cutoff, &mut summary);
    scan_dir(&cache_dir.join("images"), parse_image_date, cutoff, &mut summary);
    summary
}

impl CleanupSummary {
    pub fn oldest_kept_str(&self) -> String {
        self.oldest_kept
            .map(|d| format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn deletes_data_files_older_than_retention() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        touch(&data_dir, "2026-01-01.json");
        touch(&data_dir, "2026-07-27.json");
        touch(&data_dir, "not-a-date.json");

        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let summary = run(dir.path(), today, 30);

        assert_eq!(summary.deleted_files, 1);
        assert!(!data_dir.join("2026-01-01.json").exists());
        assert!(data_dir.join("2026-07-27.json").exists());
        assert!(data_dir.join("not-a-date.json").exists());
    }

    #[test]
    fn deletes_image_files_older_than_retention() {
        let dir = tempfile::tempdir().unwrap();
        let images_dir = dir.path().join("images");
        std::fs::create_dir_all(&images_dir).unwrap();
        touch(&images_dir, "moyuren_20251201_060000.jpg");
        touch(&images_dir, "moyuren_20260727_060000.jpg");

        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let summary = run(dir.path(), today, 30);

        assert_eq!(summary.deleted_files, 1);
        assert!(!images_dir.join("moyuren_20251201_060000.jpg").exists());
        assert!(images_dir.join("moyuren_20260727_060000.jpg").exists());
    }

    #[test]
    fn tracks_oldest_kept_date() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        touch(&data_dir, "2026-07-01.json");
        touch(&data_dir, "2026-07-15.json");

        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let summary = run(dir.path(), today, 30);

        assert_eq!(summary.oldest_kept_str(), "2026-07-01");
    }
}
