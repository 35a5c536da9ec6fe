// Utility helpers for parsing and formatting.
//
// This module centralizes the forgiving count/date handling so the
// aggregators can assume typed values.
use crate::error::{ReportError, Result};
use crate::types::CellValue;
use chrono::{Datelike, Duration, Local, NaiveDate};
use num_format::{Locale, ToFormattedString};

/// 2^64, the first float no `u64` can hold.
const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

/// Largest serial Excel can represent (9999-12-31).
const MAX_SPREADSHEET_SERIAL: i64 = 2_958_465;

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues common in spreadsheet exports (spaces, thousands separators).
///
/// Returns `None` for blanks and anything containing letters.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace([',', ' ', '\u{a0}'], "");
    s.parse::<f64>().ok()
}

/// Strict count: a finite, non-negative whole number.
pub fn parse_count_strict(v: &CellValue) -> Option<u64> {
    let n = match v {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => parse_f64_safe(Some(s))?,
    };
    if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n < U64_LIMIT {
        Some(n as u64)
    } else {
        None
    }
}

/// Loose count used during aggregation: negatives and garbage count as 0,
/// fractions are truncated.
pub fn parse_count_loose(v: Option<&CellValue>) -> u64 {
    let n = match v {
        Some(CellValue::Number(n)) => *n,
        Some(CellValue::Text(s)) => parse_f64_safe(Some(s)).unwrap_or(0.0),
        None => 0.0,
    };
    if n.is_finite() && n > 0.0 {
        n.trunc() as u64
    } else {
        0
    }
}

/// Convert a spreadsheet date serial to a calendar date.
///
/// Serials follow the 1900 date system including its fictitious 1900-02-29
/// (serial 60), which is mapped onto 1900-02-28. Time fractions are dropped.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let days = serial.floor() as i64;
    if days > MAX_SPREADSHEET_SERIAL {
        return None;
    }
    let (base, offset) = match days {
        d if d < 60 => (NaiveDate::from_ymd_opt(1899, 12, 31)?, d),
        60 => return NaiveDate::from_ymd_opt(1900, 2, 28),
        d => (NaiveDate::from_ymd_opt(1899, 12, 30)?, d),
    };
    base.checked_add_signed(Duration::days(offset))
}

/// Parse the date layouts found in activity sheets:
/// `YYYY-MM-DD` (optionally followed by a time), `DD.MM.YYYY`, `DD-MM-YYYY`,
/// `DD/MM/YYYY` and their two-digit-year variants (read as 20YY).
pub fn parse_flexible_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = s.split(['T', ' ']).next()?;
    if head.is_empty() {
        return None;
    }
    let parts: Vec<&str> = head.split(['-', '.', '/']).collect();
    let numeric = |p: &&str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
    if parts.len() != 3 || !parts.iter().all(numeric) {
        return None;
    }
    let num = |p: &str| p.parse::<u32>().ok();
    if parts[0].len() == 4 {
        let year = parts[0].parse::<i32>().ok()?;
        return NaiveDate::from_ymd_opt(year, num(parts[1])?, num(parts[2])?);
    }
    let year = match parts[2].len() {
        4 => parts[2].parse::<i32>().ok()?,
        2 => 2000 + parts[2].parse::<i32>().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, num(parts[1])?, num(parts[0])?)
}

/// Interpret a date cell: date strings, numeric serials, or digit-only text serials.
pub fn date_from_cell(v: &CellValue) -> Option<NaiveDate> {
    match v {
        CellValue::Number(n) => serial_to_date(*n),
        CellValue::Text(s) => parse_flexible_date(s).or_else(|| {
            let t = s.trim();
            if !t.is_empty() && t.chars().all(|c| c.is_ascii_digit() || c == '.') {
                serial_to_date(t.parse::<f64>().ok()?)
            } else {
                None
            }
        }),
    }
}

/// Calendar month of a stored date, or 0 when it cannot be parsed.
pub fn month_of(date: &str) -> u32 {
    parse_flexible_date(date).map(|d| d.month()).unwrap_or(0)
}

/// Form-prefill policy: unparseable or missing dates fall back to today.
pub fn prefill_date(v: Option<&CellValue>) -> NaiveDate {
    v.and_then(date_from_cell)
        .unwrap_or_else(|| Local::now().date_naive())
}

/// Add two counts, failing with `Processing` where `u64` would wrap.
pub fn add_count(total: u64, n: u64) -> Result<u64> {
    total.checked_add(n).ok_or_else(|| {
        ReportError::Processing(format!(
            "count overflow: {} + {} does not fit in {}",
            total,
            n,
            u64::MAX
        ))
    })
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for counts in console messages.
    n.to_formatted_string(&Locale::en)
}
