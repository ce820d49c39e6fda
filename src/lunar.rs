//! Lunar calendar conversion and solar-term lookup backing the context
//! computer's `date.lunar_date`, `date.zodiac`, `date.solar_term`, and
//! lunar-festival inputs to the holiday aggregator (C4/C6).
//!
//! Uses the standard 1900-2100 compact lunar-year encoding (one `u32` per
//! year packing each month's 29/30-day length plus the leap-month index)
//! that underlies most open lunar-calendar implementations, and the
//! classical fixed-constant approximation for the 24 solar terms valid over
//! the same range. Out of range dates fall back gracefully (empty results)
//! rather than panicking.

use chrono::{Datelike, NaiveDate};

const BASE_YEAR: i32 = 1900;

#[rustfmt::skip]
const LUNAR_INFO: [u32; 201] = [
    0x04bd8, 0x04ae0, 0x0a570, 0x054d5, 0x0d260, 0x0d950, 0x16554, 0x056a0, 0x09ad0, 0x055d2,
    0x04ae0, 0x0a5b6, 0x0a4d0, 0x0d250, 0x1d255, 0x0b540, 0x0d6a0, 0x0ada2, 0x095b0, 0x14977,
    0x04970, 0x0a4b0, 0x0b4b5, 0x06a50, 0x06d40, 0x1ab54, 0x02b60, 0x09570, 0x052f2, 0x04970,
    0x06566, 0x0d4a0, 0x0ea50, 0x06e95, 0x05ad0, 0x02b60, 0x186e3, 0x092e0, 0x1c8d7, 0x0c950,
    0x0d4a0, 0x1d8a6, 0x0b550, 0x056a0, 0x1a5b4, 0x025d0, 0x092d0, 0x0d2b2, 0x0a950, 0x0b557,
    0x06ca0, 0x0b550, 0x15355, 0x04da0, 0x0a5b0, 0x14573, 0x052b0, 0x0a9a8, 0x0e950, 0x06aa0,
    0x0aea6, 0x0ab50, 0x04b60, 0x0aae4, 0x0a570, 0x05260, 0x0f263, 0x0d950, 0x05b57, 0x056a0,
    0x096d0, 0x04dd5, 0x04ad0, 0x0a4d0, 0x0d4d4, 0x0d250, 0x0d558, 0x0b540, 0x0b6a0, 0x195a6,
    0x095b0, 0x049b0, 0x0a974, 0x0a4b0, 0x0b27a, 0x06a50, 0x06d40, 0x0af46, 0x0ab60, 0x09570,
    0x04af5, 0x04970, 0x064b0, 0x074a3, 0x0ea50, 0x06b58, 0x055c0, 0x0ab60, 0x096d5, 0x092e0,
    0x0c960, 0x0d954, 0x0d4a0, 0x0da50, 0x07552, 0x056a0, 0x0abb7, 0x025d0, 0x092d0, 0x0cab5,
    0x0a950, 0x0b4a0, 0x0baa4, 0x0ad50, 0x055d9, 0x04ba0, 0x0a5b0, 0x15176, 0x052b0, 0x0a930,
    0x07954, 0x06aa0, 0x0ad50, 0x05b52, 0x04b60, 0x0a6e6, 0x0a4e0, 0x0d260, 0x0ea65, 0x0d530,
    0x05aa0, 0x076a3, 0x096d0, 0x04bd7, 0x04ad0, 0x0a4d0, 0x1d0b6, 0x0d250, 0x0d520, 0x0dd45,
    0x0b5a0, 0x056d0, 0x055b2, 0x049b0, 0x0a577, 0x0a4b0, 0x0aa50, 0x1b255, 0x06d20, 0x0ada0,
    0x14b63, 0x09370, 0x049f8, 0x04970, 0x064b0, 0x168a6, 0x0ea50, 0x06b20, 0x1a6c4, 0x0aae0,
    0x092e0, 0x0d2e3, 0x0c960, 0x0d557, 0x0d4a0, 0x0da50, 0x05d55, 0x056a0, 0x0a6d0, 0x055d4,
    0x052d0, 0x0a9b8, 0x0a950, 0x0b4a0, 0x0b6a6, 0x0ad50, 0x055a0, 0x0aba4, 0x0a5b0, 0x052b0,
    0x0b273, 0x06930, 0x07337, 0x06aa0, 0x0ad50, 0x14b55, 0x04b60, 0x0a570, 0x054e4, 0x0d160,
    0x0e968, 0x0d520, 0x0daa0, 0x16aa6, 0x056d0, 0x04ae0, 0x0a9d4, 0x0a2d0, 0x0d150, 0x0f252,
    0x0d520,
];

fn lunar_year_days(year: i32) -> u32 {
    let info = LUNAR_INFO[(year - BASE_YEAR) as usize];
    let mut days = 348u32;
    for shift in 0..12 {
        days += if info & (0x8000 >> shift) != 0 { 30 } else { 29 };
    }
    days + leap_days(year)
}

fn leap_month(year: i32) -> u32 {
    LUNAR_INFO[(year - BASE_YEAR) as usize] & 0xf
}

fn leap_days(year: i32) -> u32 {
    if leap_month(year) != 0 {
        if LUNAR_INFO[(year - BASE_YEAR) as usize] & 0x10000 != 0 {
            30
        } else {
            29
        }
    } else {
        0
    }
}

fn month_days(year: i32, month: u32) -> u32 {
    if month > 12 || month < 1 {
        return 29;
    }
    let info = LUNAR_INFO[(year - BASE_YEAR) as usize];
    if info & (0x10000 >> month) != 0 {
        30
    } else {
        29
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LunarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub is_leap: bool,
}

const LUNAR_MONTH_NAMES: [&str; 12] = [
    "正月", "二月", "三月", "四月", "五月", "六月", "七月", "八月", "九月", "十月", "冬月", "腊月",
];
const LUNAR_DAY_NAMES: [&str; 30] = [
    "初一", "初二", "初三", "初四", "初五", "初六", "初七", "初八", "初九", "初十", "十一", "十二",
    "十三", "十四", "十五", "十六", "十七", "十八", "十九", "二十", "廿一", "廿二", "廿三", "廿四",
    "廿五", "廿六", "廿七", "廿八", "廿九", "三十",
];

impl LunarDate {
    pub fn display(&self) -> String {
        let month_label = if self.is_leap {
            format!("闰{}", LUNAR_MONTH_NAMES[(self.month - 1) as usize])
        } else {
            LUNAR_MONTH_NAMES[(self.month - 1) as usize].to_string()
        };
        format!("{}{}", month_label, LUNAR_DAY_NAMES[(self.day - 1) as usize])
    }
}

const ZODIAC: [&str; 12] = ["鼠", "牛", "虎", "兔", "龙", "蛇", "马", "羊", "猴", "鸡", "狗", "猪"];

pub fn zodiac_for_lunar_year(lunar_year: i32) -> &'static str {
    let idx = ((lunar_year - 4) % 12 + 12) % 12;
    ZODIAC[idx as usize]
}

/// Converts a Gregorian date to its lunar equivalent. Returns `None` outside
/// the supported 1900-01-31..2100-12-31 table range.
pub fn solar_to_lunar(date: NaiveDate) -> Option<LunarDate> {
    if date.year() < BASE_YEAR || date.year() > BASE_YEAR + 200 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1900, 1, 31)?;
    let mut offset = (date - base).num_days();
    if offset < 0 {
        return None;
    }

    let mut year = BASE_YEAR;
    loop {
        let year_days = lunar_year_days(year) as i64;
        if offset < year_days {
            break;
        }
        offset -= year_days;
        year += 1;
        if year > BASE_YEAR + 200 {
            return None;
        }
    }

    let leap = leap_month(year);
    let mut month = 1u32;
    let mut is_leap = false;
    loop {
        let days_in_month = if is_leap {
            leap_days(year) as i64
        } else {
            month_days(year, month) as i64
        };
        if offset < days_in_month {
            break;
        }
        offset -= days_in_month;
        if !is_leap && leap != 0 && month == leap {
            is_leap = true;
        } else {
            is_leap = false;
            month += 1;
        }
        if month > 12 {
            return None;
        }
    }

    Some(LunarDate {
        year,
        month,
        day: (offset + 1) as u32,
        is_leap,
    })
}

/// Fixed lunar festivals keyed by `(month, day)`, matched against a
/// `solar_to_lunar` result (never against a leap month).
pub fn lunar_festival_name(lunar: LunarDate) -> Option<&'static str> {
    if lunar.is_leap {
        return None;
    }
    match (lunar.month, lunar.day) {
        (1, 1) => Some("春节"),
        (1, 15) => Some("元宵节"),
        (5, 5) => Some("端午节"),
        (7, 7) => Some("七夕节"),
        (7, 15) => Some("中元节"),
        (8, 15) => Some("中秋节"),
        (9, 9) => Some("重阳节"),
        (12, 8) => Some("腊八节"),
        _ => None,
    }
}

/// Solar-term boundary dates for a Gregorian year, using the classical
/// fixed-constant approximation (accurate to within a day over 1900-2100).
/// Index 0 is 小寒 (around Jan 6), stepping forward roughly every 15 days.
const SOLAR_TERM_NAMES: [&str; 24] = [
    "小寒", "大寒", "立春", "雨水", "惊蛰", "春分", "清明", "谷雨", "立夏", "小满", "芒种", "夏至",
    "小暑", "大暑", "立秋", "处暑", "白露", "秋分", "寒露", "霜降", "立冬", "小雪", "大雪", "冬至",
];

#[rustfmt::skip]
const SOLAR_TERM_C: [f64; 24] = [
    5.4055, 20.12, 3.87, 18.73, 5.63, 20.646, 4.81, 20.1, 5.52, 21.04, 5.678, 21.37,
    7.108, 22.83, 7.5, 23.13, 7.646, 23.042, 8.318, 23.438, 7.438, 22.36, 7.18, 21.94,
];

fn solar_term_dates(year: i32) -> Vec<(NaiveDate, &'static str)> {
    let y = (year % 100) as f64;
    let leap_adjust = ((year - 2000) as f64 / 4.0).floor();
    let mut out = Vec::with_capacity(24);
    for (i, name) in SOLAR_TERM_NAMES.iter().enumerate() {
        let d = (y * 0.2422 + SOLAR_TERM_C[i] - leap_adjust).floor() as i64;
        let month = (i / 2) as u32 + 1;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, d.clamp(1, 28) as u32) {
            out.push((date, *name));
        }
    }
    out
}

/// Next solar term on/after `date` within `date`'s year (or the following
/// year if none remain), matching §4.6's "next term if not today, else
/// today's term" rule at the call site.
pub fn surrounding_solar_terms(date: NaiveDate) -> Vec<(NaiveDate, &'static str)> {
    let mut terms = solar_term_dates(date.year());
    terms.extend(solar_term_dates(date.year() + 1));
    terms.sort_by_key(|(d, _)| *d);
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spring_festival_2026_is_february_seventeenth() {
        // 2026 春节 falls on 2026-02-17 per the public lunar calendar.
        let date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        let lunar = solar_to_lunar(date).unwrap();
        assert_eq!(lunar.month, 1);
        assert_eq!(lunar.day, 1);
        assert_eq!(lunar_festival_name(lunar), Some("春节"));
    }

    #[test]
    fn zodiac_cycles_every_twelve_years() {
        assert_eq!(zodiac_for_lunar_year(2020), zodiac_for_lunar_year(2032));
    }

    #[test]
    fn out_of_range_dates_return_none() {
        assert!(solar_to_lunar(NaiveDate::from_ymd_opt(1850, 1, 1).unwrap()).is_none());
    }

    #[test]
    fn solar_terms_are_sorted_ascending() {
        let terms = surrounding_solar_terms(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        for w in terms.windows(2) {
            assert!(w[0].0 <= w[1].0);
        }
    }
}
