//! Holiday aggregator (C4), grounded in
//! `original_source/app/services/holiday.py::_merge_and_process` /
//! `_group_continuous_holidays` / name-normalisation helpers.

use crate::lunar;
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, Deserialize)]
struct RawDay {
    name: String,
    date: NaiveDate,
    #[serde(rename = "isOffDay")]
    is_off_day: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Holiday {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration: i64,
    pub days_left: i64,
    pub is_legal_holiday: bool,
    pub is_off_day: bool,
}

impl Holiday {
    fn new(name: String, start: NaiveDate, end: NaiveDate, today: NaiveDate, is_legal: bool, is_off_day: bool) -> Self {
        Holiday {
            name,
            start_date: start,
            end_date: end,
            duration: (end - start).num_days() + 1,
            days_left: (start - today).num_days().max(0),
            is_legal_holiday: is_legal,
            is_off_day,
        }
    }
}

const WHITELIST: [&str; 7] = ["春节", "元旦", "清明", "端午", "中秋", "国庆", "劳动"];
const SUFFIXES: [&str; 4] = ["节假期", "假期", "节日", "节"];

/// Normalises a raw holiday/festival name per spec §4.4: whitelisted names
/// pass through untouched; otherwise the longest matching suffix is
/// stripped, and the result is used only if it's long enough (or itself
/// whitelisted) to be a meaningful core name.
pub fn normalize_name(raw: &str) -> String {
    if WHITELIST.contains(&raw) {
        return raw.to_string();
    }
    for suffix in SUFFIXES {
        if let Some(core) = raw.strip_suffix(suffix) {
            if core.chars().count() >= 2 || WHITELIST.contains(&core) {
                return core.to_string();
            }
        }
    }
    raw.to_string()
}

fn parse_raw_days(doc: &Value) -> Vec<RawDay> {
    doc.get("days")
        .and_then(|v| serde_json::from_value::<Vec<RawDay>>(v.clone()).ok())
        .unwrap_or_default()
}

/// Groups consecutive off-days sharing the same name (spec §4.4 steps 1-4),
/// drops groups that have already ended, and prepends make-up-workday
/// entries (step 5).
fn group_and_filter(days: &[RawDay], today: NaiveDate) -> Vec<Holiday> {
    let mut off_days: Vec<&RawDay> = days.iter().filter(|d| d.is_off_day).collect();
    off_days.sort_by_key(|d| d.date);

    let mut groups: Vec<Holiday> = Vec::new();
    let mut idx = 0;
    while idx < off_days.len() {
        let start = off_days[idx];
        let mut end = start;
        let mut j = idx + 1;
        while j < off_days.len() && off_days[j].name == start.name && off_days[j].date == end.date + Duration::days(1) {
            end = off_days[j];
            j += 1;
        }
        groups.push(Holiday::new(start.name.clone(), start.date, end.date, today, true, true));
        idx = j;
    }

    groups.retain(|h| h.end_date >= today);

    let mut make_up: Vec<Holiday> = days
        .iter()
        .filter(|d| !d.is_off_day && d.date == today)
        .map(|d| {
            Holiday::new(format!("{}（补班）", d.name), today, today, today, true, false)
        })
        .collect();

    make_up.append(&mut groups);
    make_up
}

/// Fetches-and-groups all off-days across the three supplied raw year
/// documents (previous, current, next).
pub fn aggregate_legal_holidays(years: &[Value], today: NaiveDate) -> Vec<Holiday> {
    let mut all_days: Vec<RawDay> = Vec::new();
    for doc in years {
        all_days.extend(parse_raw_days(doc));
    }
    group_and_filter(&all_days, today)
}

/// The legal holiday whose span covers `today`, if any — used for the
/// context computer's `date.legal_holiday` field.
pub fn active_legal_holiday<'a>(legal: &'a [Holiday], today: NaiveDate) -> Option<&'a Holiday> {
    legal
        .iter()
        .find(|h| h.is_off_day && h.start_date <= today && today <= h.end_date)
}

/// Solar festival falling on `date` itself, used by the context computer for
/// the `date.festival_solar` field (distinct from the upcoming-countdown
/// merge below).
pub fn solar_festival_today(date: NaiveDate) -> Option<&'static str> {
    solar_festival_name(date.month(), date.day())
}

fn solar_festival_name(month: u32, day: u32) -> Option<&'static str> {
    match (month, day) {
        (1, 1) => Some("元旦"),
        (3, 8) => Some("妇女节"),
        (3, 12) => Some("植树节"),
        (5, 1) => Some("劳动节"),
        (5, 4) => Some("青年节"),
        (6, 1) => Some("儿童节"),
        (9, 10) => Some("教师节"),
        (10, 1) => Some("国庆节"),
        (12, 25) => Some("圣诞节"),
        _ => None,
    }
}

fn next_occurrence(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year >= today {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    }
}

fn solar_festivals_upcoming(today: NaiveDate) -> Vec<Holiday> {
    (1..=12)
        .flat_map(|m| (1..=31).filter_map(move |d| solar_festival_name(m, d).map(|name| (m, d, name))))
        .filter_map(|(m, d, name)| {
            next_occurrence(today, m, d).map(|date| Holiday::new(name.to_string(), date, date, today, false, false))
        })
        .collect()
}

fn lunar_festivals_upcoming(today: NaiveDate) -> Vec<Holiday> {
    let mut out = Vec::new();
    for year_offset in 0..2 {
        let year = today.year() + year_offset;
        let Some(last_day) = NaiveDate::from_ymd_opt(year, 12, 31) else { continue };
        let mut cursor = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
        while cursor <= last_day {
            if let Some(lunar_date) = lunar::solar_to_lunar(cursor) {
                if let Some(name) = lunar::lunar_festival_name(lunar_date) {
                    if cursor >= today {
                        out.push(Holiday::new(name.to_string(), cursor, cursor, today, false, false));
                    }
                }
            }
            cursor += Duration::days(1);
        }
    }
    out
}

/// Merges legal holidays (from government calendars), lunar festivals, and
/// solar festivals by priority, suppressing a festival whenever its
/// normalised name matches one already kept, per spec §4.4.
pub fn merge_with_festivals(legal: Vec<Holiday>, today: NaiveDate) -> Vec<Holiday> {
    let mut kept: Vec<Holiday> = legal;
    let mut seen_normalized: std::collections::HashSet<String> =
        kept.iter().map(|h| normalize_name(&h.name)).collect();

    for festival in lunar_festivals_upcoming(today) {
        let key = normalize_name(&festival.name);
        if seen_normalized.insert(key) {
            kept.push(festival);
        }
    }
    for festival in solar_festivals_upcoming(today) {
        let key = normalize_name(&festival.name);
        if seen_normalized.insert(key) {
            kept.push(festival);
        }
    }

    kept.sort_by_key(|h| h.days_left);
    kept.truncate(10);
    kept
}

fn filename_date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})\.json$").unwrap())
}

/// Exposed for the cache cleaner (C10), which matches the same
/// `YYYY-MM-DD.json` pattern used for daily data files.
pub fn parse_date_filename(filename: &str) -> Option<NaiveDate> {
    let caps = filename_date_pattern().captures(filename)?;
    NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(name: &str, date: &str, is_off: bool) -> Value {
        serde_json::json!({"name": name, "date": date, "isOffDay": is_off})
    }

    #[test]
    fn groups_consecutive_same_name_off_days() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let doc = serde_json::json!({"days": [
            day("春节", "2026-02-15", true),
            day("春节", "2026-02-16", true),
            day("春节", "2026-02-17", true),
            day("春节", "2026-02-21", true),
        ]});
        let holidays = aggregate_legal_holidays(&[doc], today);
        assert_eq!(holidays.len(), 2);
        assert_eq!(holidays[0].duration, 3);
        assert_eq!(holidays[1].duration, 1);
    }

    #[test]
    fn make_up_workday_is_prepended() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let doc = serde_json::json!({"days": [
            day("春节", "2026-02-14", false),
            day("春节", "2026-02-15", true),
            day("春节", "2026-02-16", true),
            day("春节", "2026-02-17", true),
            day("春节", "2026-02-18", true),
            day("春节", "2026-02-19", true),
            day("春节", "2026-02-20", true),
            day("春节", "2026-02-21", true),
        ]});
        let holidays = aggregate_legal_holidays(&[doc], today);
        assert_eq!(holidays[0].name, "春节（补班）");
        assert_eq!(holidays[0].duration, 1);
        assert_eq!(holidays[0].is_off_day, false);
        assert_eq!(holidays[1].duration, 7);
    }

    #[test]
    fn past_holidays_are_dropped() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let doc = serde_json::json!({"days": [day("元旦", "2026-01-01", true)]});
        let holidays = aggregate_legal_holidays(&[doc], today);
        assert!(holidays.is_empty());
    }

    #[test]
    fn normalize_strips_longest_suffix() {
        assert_eq!(normalize_name("中秋节"), "中秋");
        assert_eq!(normalize_name("春节"), "春节");
        assert_eq!(normalize_name("教师节"), "教师");
    }

    #[test]
    fn suffix_stripped_core_too_short_keeps_original() {
        // Single-character core after stripping and not whitelisted: kept as-is.
        assert_eq!(normalize_name("元节"), "元节");
    }

    #[test]
    fn name_dedup_suppresses_festival_matching_legal_holiday() {
        let today = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let legal = vec![Holiday::new(
            "中秋".to_string(),
            NaiveDate::from_ymd_opt(2026, 9, 25).unwrap(),
            NaiveDate::from_ymd_opt(2026, 9, 27).unwrap(),
            today,
            true,
            true,
        )];
        let merged = merge_with_festivals(legal, today);
        let names: Vec<_> = merged.iter().map(|h| h.name.as_str()).collect();
        assert!(names.contains(&"中秋"));
        assert!(!names.iter().any(|n| *n == "中秋节"));
    }

    #[test]
    fn parses_filename_date() {
        assert_eq!(parse_date_filename("2026-07-28.json"), NaiveDate::from_ymd_opt(2026, 7, 28));
        assert_eq!(parse_date_filename("not-a-date.json"), None);
    }
}
