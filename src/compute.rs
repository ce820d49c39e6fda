//! Context computer (C6), grounded in
//! `original_source/app/services/compute.py::build_context` and
//! `_normalize_datetime`. Transforms a fan-out fetch result into the fully
//! populated template context consumed by the renderer (C7).

use crate::clock::CalendarClock;
use crate::fetch::FetchResult;
use crate::holiday;
use crate::lunar::{self, LunarDate};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

const WEEK_CN: [&str; 7] = ["星期一", "星期二", "星期三", "星期四", "星期五", "星期六", "星期日"];
const WEEK_EN: [&str; 7] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

const DEFAULT_YI: [&str; 4] = ["宜", "摸鱼", "早睡", "喝水"];
const DEFAULT_JI: [&str; 4] = ["忌", "加班", "emo", "点外卖"];

const MOON_PHASES: [&str; 8] = ["新月", "峨眉月", "上弦月", "盈凸月", "满月", "亏凸月", "下弦月", "残月"];

fn moon_phase_name(lunar: LunarDate) -> &'static str {
    let month_len: u32 = if lunar.day > 29 { 30 } else { 29 };
    let idx = (((lunar.day.saturating_sub(1)) as f64 / month_len as f64) * 8.0).floor() as usize;
    MOON_PHASES[idx.min(7)]
}

fn constellation_for(month: u32, day: u32) -> &'static str {
    match (month, day) {
        (1, 1..=19) | (12, 22..=31) => "摩羯座",
        (1, 20..=31) | (2, 1..=18) => "水瓶座",
        (2, 19..=29) | (3, 1..=20) => "双鱼座",
        (3, 21..=31) | (4, 1..=19) => "白羊座",
        (4, 20..=30) | (5, 1..=20) => "金牛座",
        (5, 21..=31) | (6, 1..=21) => "双子座",
        (6, 22..=30) | (7, 1..=22) => "巨蟹座",
        (7, 23..=31) | (8, 1..=22) => "狮子座",
        (8, 23..=31) | (9, 1..=22) => "处女座",
        (9, 23..=30) | (10, 1..=23) => "天秤座",
        (10, 24..=31) | (11, 1..=21) => "天蝎座",
        (11, 22..=30) | (12, 1..=21) => "射手座",
        _ => "摩羯座",
    }
}

fn date_block(clock: &CalendarClock, legal_holidays: &[holiday::Holiday]) -> Value {
    let today = clock.business_today();
    let weekday_idx = today.weekday().num_days_from_monday() as usize;
    let lunar = lunar::solar_to_lunar(today);

    let (lunar_year, lunar_date_str, zodiac, moon_phase, festival_lunar) = match lunar {
        Some(l) => (
            Some(l.year),
            Some(l.display()),
            Some(lunar::zodiac_for_lunar_year(l.year)),
            Some(moon_phase_name(l)),
            lunar::lunar_festival_name(l),
        ),
        None => (None, None, None, None, None),
    };

    let festival_solar = holiday::solar_festival_today(today);
    let legal_holiday = holiday::active_legal_holiday(legal_holidays, today);
    let is_holiday = legal_holiday.is_some() || weekday_idx >= 5;

    json!({
        "year_month": today.format("%Y.%m").to_string(),
        "day": today.day(),
        "week_cn": WEEK_CN[weekday_idx],
        "week_en": WEEK_EN[weekday_idx],
        "lunar_year": lunar_year,
        "lunar_date": lunar_date_str,
        "zodiac": zodiac,
        "constellation": constellation_for(today.month(), today.day()),
        "moon_phase": moon_phase,
        "festival_solar": festival_solar,
        "festival_lunar": festival_lunar,
        "legal_holiday": legal_holiday.map(|h| h.name.clone()),
        "is_holiday": is_holiday,
    })
}

fn weekend_block(clock: &CalendarClock) -> Value {
    let weekday_idx = clock.business_today().weekday().num_days_from_monday() as i64;
    let days_left = if weekday_idx < 5 { 5 - weekday_idx } else { 0 };
    json!({
        "days_left": days_left,
        "is_weekend": weekday_idx >= 5,
    })
}

fn solar_term_block(clock: &CalendarClock) -> Value {
    let today = clock.business_today();
    let terms = lunar::surrounding_solar_terms(today);
    let today_term = terms.iter().find(|(d, _)| *d == today);
    match today_term {
        Some((_, name)) => json!({ "name": name, "is_today": true, "days_left": 0 }),
        None => match terms.iter().find(|(d, _)| *d > today) {
            Some((d, name)) => json!({
                "name": name,
                "is_today": false,
                "days_left": (*d - today).num_days(),
            }),
            None => Value::Null,
        },
    }
}

fn guide_block() -> Value {
    json!({ "yi": DEFAULT_YI, "ji": DEFAULT_JI })
}

fn history_block(fun_content: &Option<Value>) -> Value {
    match fun_content {
        Some(v) => v.clone(),
        None => json!({ "title": "🐟 摸鱼小贴士", "content": "保持微笑，摸鱼一时爽，一直摸鱼一直爽。" }),
    }
}

fn default_news_list() -> Vec<Value> {
    [
        "今日暂无新闻摘要",
        "请稍后重试",
        "服务正在恢复中",
        "感谢您的耐心等待",
        "祝您今日愉快",
    ]
    .iter()
    .enumerate()
    .map(|(i, text)| json!({ "num": i + 1, "text": text }))
    .collect()
}

fn news_list_block(news: &Value) -> Vec<Value> {
    if let Some(items) = news.get("news").and_then(Value::as_array) {
        let strings: Vec<Value> = items
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_str().map(|s| json!({ "num": i + 1, "text": s })))
            .collect();
        if !strings.is_empty() {
            return strings;
        }
    }
    if let Some(items) = news.as_array() {
        let legacy: Vec<Value> = items
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.get("text").and_then(Value::as_str).map(|s| json!({ "num": i + 1, "text": s })))
            .collect();
        if !legacy.is_empty() {
            return legacy;
        }
    }
    default_news_list()
}

fn news_meta_block(news: &Value, today: NaiveDate) -> Value {
    let updated = news.get("updated").and_then(Value::as_str).and_then(normalize_datetime);
    match &updated {
        Some(u) => json!({
            "date": today.format("%Y-%m-%d").to_string(),
            "updated": u,
            "updated_at": u,
        }),
        None => Value::Object(serde_json::Map::new()),
    }
}

fn kfc_content_block(clock: &CalendarClock, kfc: &Option<Value>) -> Value {
    use chrono::Weekday;
    if clock.business_today().weekday() != Weekday::Thu {
        return Value::Null;
    }
    match kfc {
        Some(Value::String(s)) => Value::String(s.clone()),
        _ => Value::Null,
    }
}

/// Groups the integer part of `n` with commas, e.g. `3274.67` -> `3,274.67`
/// (spec §4.6 `%,.2f`).
fn with_thousands_separator(n: f64) -> String {
    let formatted = format!("{n:.2}");
    let (sign, rest) = formatted.strip_prefix('-').map(|r| ("-", r)).unwrap_or(("", formatted.as_str()));
    let (int_part, frac_part) = rest.split_once('.').unwrap_or((rest, ""));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    format!("{sign}{grouped}.{frac_part}")
}

fn format_price(v: &Value) -> Value {
    match v.as_f64() {
        Some(n) => Value::String(with_thousands_separator(n)),
        None => Value::String("--".to_string()),
    }
}

fn format_change_pct(v: &Value) -> Value {
    match v.as_f64() {
        Some(n) if n >= 0.0 => Value::String(format!("+{n:.2}%")),
        Some(n) => Value::String(format!("{n:.2}%")),
        None => Value::String("--".to_string()),
    }
}

fn normalize_is_trading_day(v: &Value) -> Value {
    match v {
        Value::Bool(b) => Value::Bool(*b),
        Value::String(s) => match s.as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => Value::Bool(false),
        },
        Value::Number(n) => Value::Bool(n.as_i64().map(|i| i != 0).unwrap_or(false)),
        _ => Value::Bool(false),
    }
}

fn stock_indices_block(stock_indices: &Option<Value>) -> Value {
    let Some(payload) = stock_indices else {
        return Value::Null;
    };
    let Some(indices) = payload.get("indices").and_then(Value::as_array) else {
        return payload.clone();
    };
    let formatted: Vec<Value> = indices
        .iter()
        .map(|row| {
            let mut row = row.clone();
            if let Some(obj) = row.as_object_mut() {
                if let Some(price) = obj.get("price").cloned() {
                    obj.insert("price".to_string(), format_price(&price));
                }
                if let Some(pct) = obj.get("change_pct").cloned() {
                    obj.insert("change_pct".to_string(), format_change_pct(&pct));
                }
                if let Some(trading) = obj.get("is_trading_day").cloned() {
                    obj.insert("is_trading_day".to_string(), normalize_is_trading_day(&trading));
                }
            }
            row
        })
        .collect();
    let mut out = payload.clone();
    if let Some(obj) = out.as_object_mut() {
        obj.insert("indices".to_string(), Value::Array(formatted));
    }
    out
}

fn abbreviation_offset(abbr: &str) -> Option<FixedOffset> {
    let seconds = match abbr.to_ascii_uppercase().as_str() {
        "CST" | "CCT" | "BJT" => 8 * 3600,
        "UTC" | "GMT" | "Z" => 0,
        "EST" => -5 * 3600,
        "EDT" => -4 * 3600,
        "CDT" => -5 * 3600,
        "MST" => -7 * 3600,
        "MDT" => -6 * 3600,
        "PST" => -8 * 3600,
        "PDT" => -7 * 3600,
        "JST" | "KST" => 9 * 3600,
        "IST" => 5 * 3600 + 30 * 60,
        "AEST" => 10 * 3600,
        "AEDT" => 11 * 3600,
        _ => return None,
    };
    FixedOffset::east_opt(seconds)
}

fn explicit_offset(raw: &str) -> Option<FixedOffset> {
    let trimmed = raw.trim();
    let (sign, digits) = if let Some(rest) = trimmed.strip_prefix("UTC").or_else(|| trimmed.strip_prefix("GMT")) {
        let rest = rest.trim();
        let sign = rest.chars().next()?;
        (sign, &rest[1..])
    } else {
        let sign = trimmed.chars().next()?;
        if sign != '+' && sign != '-' {
            return None;
        }
        (sign, &trimmed[1..])
    };
    let digits = digits.replace(':', "");
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    let total = hours * 3600 + minutes * 60;
    let total = if sign == '-' { -total } else { total };
    FixedOffset::east_opt(total)
}

fn suffix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})[T ](\d{2}:\d{2}:\d{2})\s*(.*)$").unwrap())
}

fn parse_space_or_t_separated(raw: &str) -> Option<DateTime<FixedOffset>> {
    let caps = suffix_pattern().captures(raw.trim())?;
    let naive = chrono::NaiveDateTime::parse_from_str(
        &format!("{} {}", &caps[1], &caps[2]),
        "%Y-%m-%d %H:%M:%S",
    )
    .ok()?;
    let suffix = caps[3].trim();
    let offset = if suffix.is_empty() {
        return None;
    } else if suffix.starts_with('+') || suffix.starts_with('-') {
        explicit_offset(suffix)?
    } else if suffix.starts_with("UTC") || suffix.starts_with("GMT") {
        explicit_offset(suffix).or_else(|| abbreviation_offset(suffix))?
    } else {
        abbreviation_offset(suffix)?
    };
    offset.from_local_datetime(&naive).single()
}

fn parse_unix_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit() || c == '-') {
        return None;
    }
    let n: i64 = trimmed.parse().ok()?;
    let dt = if trimmed.len() >= 13 {
        Utc.timestamp_millis_opt(n).single()?
    } else {
        Utc.timestamp_opt(n, 0).single()?
    };
    Some(dt.fixed_offset())
}

/// Parses a timestamp in any of the three accepted shapes (spec §4.6) and
/// renders it back out in the canonical `YYYY-MM-DDTHH:MM:SS±HH:MM` form.
/// Unparseable input yields `None` rather than propagating an error, since a
/// bad upstream timestamp must never block generation.
pub fn normalize_datetime(raw: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .or_else(|| parse_space_or_t_separated(raw))
        .or_else(|| parse_unix_timestamp(raw))?;
    Some(parsed.format("%Y-%m-%dT%H:%M:%S%:z").to_string())
}

/// Builds the full render context from a fetch result, per spec §4.6.
pub fn build_context(
    clock: &CalendarClock,
    fetch: &FetchResult,
    show_kfc: bool,
    show_stock: bool,
) -> Value {
    let today = clock.business_today();
    let legal_holidays = holiday::aggregate_legal_holidays(&fetch.holiday_years, today);
    let merged_holidays = holiday::merge_with_festivals(legal_holidays.clone(), today);

    let mut ctx = json!({
        "date": date_block(clock, &legal_holidays),
        "weekend": weekend_block(clock),
        "solar_term": solar_term_block(clock),
        "guide": guide_block(),
        "history": history_block(&fetch.fun_content),
        "news_list": news_list_block(&fetch.news),
        "news_meta": news_meta_block(&fetch.news, today),
        "holidays": merged_holidays
            .iter()
            .map(|h| json!({
                "name": h.name,
                "start_date": h.start_date.format("%Y-%m-%d").to_string(),
                "end_date": h.end_date.format("%Y-%m-%d").to_string(),
                "duration": h.duration,
                "days_left": h.days_left,
                "is_legal_holiday": h.is_legal_holiday,
                "is_off_day": h.is_off_day,
            }))
            .collect::<Vec<_>>(),
    });

    if let Some(obj) = ctx.as_object_mut() {
        if show_kfc {
            obj.insert("kfc_content".to_string(), kfc_content_block(clock, &fetch.kfc));
        }
        if show_stock {
            obj.insert("stock_indices".to_string(), stock_indices_block(&fetch.stock_indices));
        }
    }

    ctx
}
