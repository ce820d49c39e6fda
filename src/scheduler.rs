//! Scheduler (C11): cron-style clock driving the generation orchestrator
//! on configured daily times or an hourly minute. Generalises
//! `daemon.rs`'s single-interval sleep loop to a set of independently
//! scheduled, named jobs with replace-by-id semantics (spec §4.11),
//! and `original_source/app/core/scheduler.py`'s job-id convention.

use crate::config::{SchedulerConfig, SchedulerMode};
use crate::context::AppContext;
use crate::orchestrator;
use crate::render::ScreenshotEngine;
use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Daily { hour: u32, minute: u32 },
    Hourly { minute: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub id: String,
    pub kind: JobKind,
}

fn hhmm_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").unwrap())
}

fn parse_hhmm(raw: &str) -> Option<(u32, u32)> {
    let caps = hhmm_pattern().captures(raw)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Installs one job per `daily_times` entry (daily mode) or a single job
/// for `minute_of_hour` (hourly mode). Job ids are stable across a config
/// reload, so re-deriving this list on reload naturally replaces rather
/// than duplicates jobs (spec §4.11 "replace_existing" semantics).
pub fn jobs_from_config(config: &SchedulerConfig) -> Vec<ScheduledJob> {
    match config.mode {
        SchedulerMode::Daily => config
            .daily_times
            .iter()
            .filter_map(|t| parse_hhmm(t).map(|(hour, minute)| ScheduledJob { id: format!("daily:{t}"), kind: JobKind::Daily { hour, minute } }))
            .collect(),
        SchedulerMode::Hourly => {
            let minute = config.minute_of_hour.unwrap_or(0);
            vec![ScheduledJob { id: format!("hourly:{minute:02}"), kind: JobKind::Hourly { minute } }]
        }
    }
}

/// The next instant strictly after `now` at which `kind` is due.
fn next_fire(kind: JobKind, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    match kind {
        JobKind::Daily { hour, minute } => {
            let today_fire = now.date_naive().and_hms_opt(hour, minute, 0).unwrap();
            let today_fire = now.timezone().from_local_datetime(&today_fire).single().unwrap_or(now);
            if today_fire > now {
                today_fire
            } else {
                today_fire + chrono::Duration::days(1)
            }
        }
        JobKind::Hourly { minute } => {
            let candidate = now.with_minute(minute).and_then(|d| d.with_second(0)).and_then(|d| d.with_nanosecond(0)).unwrap_or(now);
            if candidate > now {
                candidate
            } else {
                candidate + chrono::Duration::hours(1)
            }
        }
    }
}

/// Runs every configured template through the orchestrator; failures are
/// logged and do not stop the remaining templates or the scheduler loop.
async fn fire_all_templates<E: ScreenshotEngine>(app: &AppContext, engine: &E) {
    for item in &app.config.templates.items {
        match orchestrator::generate(app, engine, Some(&item.name)).await {
            Ok(filename) => tracing::info!(template = %item.name, %filename, "scheduled generation succeeded"),
            Err(e) => tracing::error!(template = %item.name, error = %e, "scheduled generation failed"),
        }
    }
}

/// Drives the daemon loop: sleeps until the soonest configured fire time,
/// runs generation for every template, then recomputes. A wake that
/// overshoots more than one job's fire time coalesces to a single
/// catch-up, since every job's next fire is always recomputed strictly
/// after the current instant.
pub async fn run<E: ScreenshotEngine>(app: &AppContext, engine: &E) -> ! {
    let jobs = jobs_from_config(&app.config.scheduler);
    loop {
        let now = app.clock.business_now();
        let soonest = jobs
            .iter()
            .map(|job| (job.id.as_str(), next_fire(job.kind, now)))
            .min_by_key(|(_, fire_at)| *fire_at);

        let Some((job_id, fire_at)) = soonest else {
            tracing::warn!("no scheduler jobs configured; idling");
            tokio::time::sleep(Duration::from_secs(3600)).await;
            continue;
        };

        let wait = (fire_at - now).to_std().unwrap_or(Duration::ZERO);
        tracing::info!(job = job_id, fire_at = %fire_at, wait_secs = wait.as_secs(), "scheduler sleeping until next fire");
        tokio::time::sleep(wait).await;
        fire_all_templates(app, engine).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600).unwrap().with_ymd_and_hms(2026, 7, 28, hour, minute, second).unwrap()
    }

    #[test]
    fn daily_jobs_parsed_from_config() {
        let config = SchedulerConfig { mode: SchedulerMode::Daily, daily_times: vec!["06:00".into(), "18:30".into()], minute_of_hour: None };
        let jobs = jobs_from_config(&config);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].kind, JobKind::Daily { hour: 6, minute: 0 });
        assert_eq!(jobs[1].kind, JobKind::Daily { hour: 18, minute: 30 });
    }

    #[test]
    fn malformed_daily_time_is_skipped() {
        let config = SchedulerConfig { mode: SchedulerMode::Daily, daily_times: vec!["not-a-time".into(), "06:00".into()], minute_of_hour: None };
        let jobs = jobs_from_config(&config);
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn hourly_job_uses_configured_minute() {
        let config = SchedulerConfig { mode: SchedulerMode::Hourly, daily_times: vec![], minute_of_hour: Some(15) };
        let jobs = jobs_from_config(&config);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::Hourly { minute: 15 });
    }

    #[test]
    fn next_daily_fire_rolls_to_tomorrow_once_passed() {
        let now = at(7, 0, 0);
        let fire = next_fire(JobKind::Daily { hour: 6, minute: 0 }, now);
        assert_eq!(fire.day(), now.day() + 1);
        assert_eq!(fire.hour(), 6);
    }

    #[test]
    fn next_daily_fire_today_if_still_ahead() {
        let now = at(5, 0, 0);
        let fire = next_fire(JobKind::Daily { hour: 6, minute: 0 }, now);
        assert_eq!(fire.day(), now.day());
        assert_eq!(fire.hour(), 6);
    }

    #[test]
    fn next_hourly_fire_rolls_to_next_hour_once_passed() {
        let now = at(10, 20, 0);
        let fire = next_fire(JobKind::Hourly { minute: 15 }, now);
        assert_eq!(fire.hour(), 11);
        assert_eq!(fire.minute(), 15);
    }
}
