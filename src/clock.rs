//! Calendar clock (C1): business-timezone "today" and display-timezone "now".
//!
//! Mirrors `original_source/app/services/calendar.py`'s timezone resolution,
//! generalised to also accept fixed `UTC±HH[:MM]` offsets per the spec's
//! timezone parser (§4.1).

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub enum TimeZoneSpec {
    Iana(chrono_tz::Tz),
    Fixed(FixedOffset),
    Local,
}

fn offset_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^UTC([+-])(\d{1,2})(?::?(\d{2}))?$").unwrap())
}

/// Parses an IANA zone name or a `UTC±HH[:MM]` offset.
///
/// `"local"` is only accepted when `allow_local` is set (business timezones
/// reject it per spec §6). Range: hours in [-12, 14], minutes in [0, 59],
/// with `(14, 0]` rejected — i.e. `UTC+14:30` is invalid even though 14 and
/// 30 are each individually in range.
pub fn parse_timezone(raw: &str, allow_local: bool) -> Result<TimeZoneSpec, String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("local") {
        return if allow_local {
            Ok(TimeZoneSpec::Local)
        } else {
            Err("\"local\" is not permitted for this timezone field".to_string())
        };
    }

    if let Some(caps) = offset_pattern().captures(trimmed) {
        let sign = if &caps[1] == "-" { -1 } else { 1 };
        let hours: i32 = caps[2].parse().map_err(|_| "invalid hour offset".to_string())?;
        let minutes: i32 = caps
            .get(3)
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0);

        if !(-12..=14).contains(&hours) {
            return Err(format!("offset hours {hours} out of range [-12, 14]"));
        }
        if !(0..=59).contains(&minutes) {
            return Err(format!("offset minutes {minutes} out of range [0, 59]"));
        }
        if hours == 14 && minutes != 0 {
            return Err("UTC+14:MM is only valid with MM == 0".to_string());
        }

        let total_seconds = sign * (hours * 3600 + minutes * 60);
        let offset = FixedOffset::east_opt(total_seconds)
            .ok_or_else(|| "offset out of representable range".to_string())?;
        return Ok(TimeZoneSpec::Fixed(offset));
    }

    chrono_tz::Tz::from_str(trimmed)
        .map(TimeZoneSpec::Iana)
        .map_err(|_| format!("\"{trimmed}\" is neither an IANA zone nor a UTC offset"))
}

fn now_in(spec: &TimeZoneSpec) -> DateTime<FixedOffset> {
    match spec {
        TimeZoneSpec::Iana(tz) => Utc::now().with_timezone(tz).fixed_offset(),
        TimeZoneSpec::Fixed(offset) => Utc::now().with_timezone(offset),
        TimeZoneSpec::Local => Local::now().fixed_offset(),
    }
}

/// Process-wide business/display timezone pair, constructed once at startup.
pub struct CalendarClock {
    business: TimeZoneSpec,
    display: TimeZoneSpec,
}

const DEFAULT_BUSINESS_TZ: &str = "Asia/Shanghai";

impl CalendarClock {
    /// Resolves both timezones, falling back per spec §4.1 on parse failure:
    /// `Asia/Shanghai` for business, `UTC` for display. Unparseable input is
    /// logged as a warning rather than surfaced as a startup error, matching
    /// `get_local_timezone()`'s defensive fallback in the original service.
    pub fn new(business_raw: &str, display_raw: &str) -> Self {
        let business = parse_timezone(business_raw, false).unwrap_or_else(|err| {
            tracing::warn!(raw = business_raw, %err, "falling back to default business timezone");
            parse_timezone(DEFAULT_BUSINESS_TZ, false).expect("default business tz must parse")
        });
        let display = parse_timezone(display_raw, true).unwrap_or_else(|err| {
            tracing::warn!(raw = display_raw, %err, "falling back to UTC display timezone");
            TimeZoneSpec::Fixed(FixedOffset::east_opt(0).unwrap())
        });
        CalendarClock { business, display }
    }

    pub fn business_now(&self) -> DateTime<FixedOffset> {
        now_in(&self.business)
    }

    pub fn business_today(&self) -> NaiveDate {
        self.business_now().date_naive()
    }

    pub fn display_now(&self) -> DateTime<FixedOffset> {
        now_in(&self.display)
    }

    /// Offset label such as `UTC+08` or `UTC-05:30`, used for display-facing
    /// timezone annotations.
    pub fn display_offset_label(&self) -> String {
        offset_label(now_in(&self.display).offset())
    }
}

pub fn offset_label(offset: &FixedOffset) -> String {
    let total_minutes = offset.local_minus_utc() / 60;
    let sign = if total_minutes < 0 { '-' } else { '+' };
    let abs_minutes = total_minutes.abs();
    let hours = abs_minutes / 60;
    let minutes = abs_minutes % 60;
    if minutes == 0 {
        format!("UTC{sign}{hours:02}")
    } else {
        format!("UTC{sign}{hours:02}:{minutes:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_offsets() {
        assert!(matches!(parse_timezone("UTC+8", false), Ok(TimeZoneSpec::Fixed(_))));
        assert!(matches!(parse_timezone("UTC-05:30", false), Ok(TimeZoneSpec::Fixed(_))));
    }

    #[test]
    fn rejects_fourteen_thirty() {
        assert!(parse_timezone("UTC+14:30", false).is_err());
        assert!(parse_timezone("UTC+14", false).is_ok());
    }

    #[test]
    fn rejects_out_of_range_hours() {
        assert!(parse_timezone("UTC+15", false).is_err());
        assert!(parse_timezone("UTC-13", false).is_err());
    }

    #[test]
    fn local_rejected_for_business_but_allowed_elsewhere() {
        assert!(parse_timezone("local", false).is_err());
        assert!(parse_timezone("local", true).is_ok());
    }

    #[test]
    fn iana_name_resolves() {
        assert!(matches!(parse_timezone("Asia/Shanghai", false), Ok(TimeZoneSpec::Iana(_))));
    }

    #[test]
    fn offset_label_formats_halves() {
        let offset = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        assert_eq!(offset_label(&offset), "UTC+05:30");
    }

    #[test]
    fn unparseable_falls_back_to_default() {
        let clock = CalendarClock::new("not-a-zone", "also-not-a-zone");
        // Falls back rather than panicking; business_today must still work.
        let _ = clock.business_today();
    }
}
