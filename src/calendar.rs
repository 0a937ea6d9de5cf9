//! Calendar handling for the `CreatDate` column.
//!
//! Service exports stamp the creation date either in the Jalali (Persian
//! solar hijri) calendar, recognizable by a `14xx` year, or in the Gregorian
//! calendar with a `20xx` year. Either form may carry a trailing time of day
//! and may use `/` or `-` between its parts. [`normalize_creat_date`] reduces
//! every variant to a Gregorian [`NaiveDate`] and reports which path it took.
//!
//! The Jalali conversion uses the 33-year break table of the proleptic
//! arithmetic calendar, which matches the astronomical calendar for the
//! years exports actually contain.

use std::sync::OnceLock;

use chrono::{Days, NaiveDate};
use regex::Regex;

const JALALI_BREAKS: [i64; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    Jalali,
    Gregorian,
}

/// Result of normalizing one raw `CreatDate` cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateOutcome {
    Converted { date: NaiveDate, source: Calendar },
    /// The year prefix is neither `14` nor `20`.
    Unrecognized(String),
    /// The prefix was recognized but the token is not a valid `y/m/d` date.
    Invalid(String),
}

impl DateOutcome {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            DateOutcome::Converted { date, .. } => Some(*date),
            DateOutcome::Unrecognized(_) | DateOutcome::Invalid(_) => None,
        }
    }

    pub fn is_converted(&self) -> bool {
        matches!(self, DateOutcome::Converted { .. })
    }
}

fn date_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})[/-](\d{1,2})[/-](\d{1,2})$").expect("date token pattern compiles")
    })
}

pub fn normalize_creat_date(raw: &str) -> DateOutcome {
    let token = raw.split_whitespace().next().unwrap_or_default();
    let calendar = if token.starts_with("14") {
        Calendar::Jalali
    } else if token.starts_with("20") {
        Calendar::Gregorian
    } else {
        return DateOutcome::Unrecognized(raw.to_string());
    };

    let Some((year, month, day)) = split_date_token(token) else {
        return DateOutcome::Invalid(raw.to_string());
    };
    let converted = match calendar {
        Calendar::Jalali => jalali_to_gregorian(year, month, day),
        Calendar::Gregorian => NaiveDate::from_ymd_opt(year, month, day),
    };
    match converted {
        Some(date) => DateOutcome::Converted {
            date,
            source: calendar,
        },
        None => DateOutcome::Invalid(raw.to_string()),
    }
}

fn split_date_token(token: &str) -> Option<(i32, u32, u32)> {
    let captures = date_token_pattern().captures(token)?;
    let year = captures.get(1)?.as_str().parse().ok()?;
    let month = captures.get(2)?.as_str().parse().ok()?;
    let day = captures.get(3)?.as_str().parse().ok()?;
    Some((year, month, day))
}

struct JalaliYear {
    /// Zero for leap years.
    leap: i64,
    gregorian_year: i64,
    /// Day of March on which Farvardin 1 falls.
    march_day: i64,
}

fn jalali_year(jy: i64) -> Option<JalaliYear> {
    let first = JALALI_BREAKS[0];
    let last = JALALI_BREAKS[JALALI_BREAKS.len() - 1];
    if jy < first || jy >= last {
        return None;
    }

    let gregorian_year = jy + 621;
    let mut leap_j = -14;
    let mut previous = first;
    let mut jump = 0;
    for &brk in &JALALI_BREAKS[1..] {
        jump = brk - previous;
        if jy < brk {
            break;
        }
        leap_j += jump / 33 * 8 + (jump % 33) / 4;
        previous = brk;
    }

    let mut n = jy - previous;
    leap_j += n / 33 * 8 + (n % 33 + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }
    let leap_g = gregorian_year / 4 - (gregorian_year / 100 + 1) * 3 / 4 - 150;
    let march_day = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + (jump + 4) / 33 * 33;
    }
    let mut leap = ((n + 1) % 33 - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    Some(JalaliYear {
        leap,
        gregorian_year,
        march_day,
    })
}

pub fn is_jalali_leap_year(year: i32) -> Option<bool> {
    jalali_year(i64::from(year)).map(|info| info.leap == 0)
}

pub fn jalali_month_length(year: i32, month: u32) -> Option<u32> {
    match month {
        1..=6 => Some(31),
        7..=11 => Some(30),
        12 => is_jalali_leap_year(year).map(|leap| if leap { 30 } else { 29 }),
        _ => None,
    }
}

pub fn jalali_to_gregorian(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let length = jalali_month_length(year, month)?;
    if day == 0 || day > length {
        return None;
    }
    let info = jalali_year(i64::from(year))?;
    let nowruz = NaiveDate::from_ymd_opt(
        i32::try_from(info.gregorian_year).ok()?,
        3,
        u32::try_from(info.march_day).ok()?,
    )?;
    let month = i64::from(month);
    let offset = (month - 1) * 31 - (month / 7) * (month - 7) + i64::from(day) - 1;
    nowruz.checked_add_days(Days::new(u64::try_from(offset).ok()?))
}
