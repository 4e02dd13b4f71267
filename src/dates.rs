use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

/// A release date reduced to calendar terms. Store dates come in day
/// precision ("16 Oct, 2025") or month precision ("October 2025");
/// anything vaguer cannot be placed on a calendar and parses to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedDate {
    Day(NaiveDate),
    Month { start: NaiveDate, end: NaiveDate },
}

const VAGUE_VALUES: [&str; 4] = ["Unknown", "TBA", "TBD", "Coming Soon"];

/// Day-precision formats accepted, tried in order, first match wins.
const DAY_FORMATS: [&str; 3] = ["%d %b, %Y", "%b %d, %Y", "%B %d, %Y"];

pub fn parse_release_date(text: &str) -> Option<ParsedDate> {
    let text = text.trim();
    if text.is_empty() || VAGUE_VALUES.contains(&text) {
        return None;
    }

    // Bare years and quarter markers carry no usable precision.
    let year_only = Regex::new(r"^\d{4}$").unwrap();
    let quarter = Regex::new(r"^Q[1-4]\s+\d{4}").unwrap();
    if year_only.is_match(text) || quarter.is_match(text) {
        return None;
    }

    for format in DAY_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(ParsedDate::Day(date));
        }
    }

    // "October 2025" / "Oct 2025" spans the whole month.
    let month_year = Regex::new(r"^[A-Za-z]+\s+\d{4}$").unwrap();
    if month_year.is_match(text) {
        let mut parts = text.split_whitespace();
        let month = month_from_name(parts.next()?)?;
        let year: i32 = parts.next()?.parse().ok()?;
        let (start, end) = month_bounds(year, month)?;
        return Some(ParsedDate::Month { start, end });
    }

    None
}

/// Inclusive range test against a stored free-text release date.
/// Unparsable dates never match. A month-precision date matches if any
/// day of the month falls inside the query range.
pub fn is_in_range(text: &str, start: NaiveDate, end: NaiveDate) -> bool {
    match parse_release_date(text) {
        Some(ParsedDate::Day(date)) => start <= date && date <= end,
        Some(ParsedDate::Month {
            start: month_start,
            end: month_end,
        }) => !(month_end < start || month_start > end),
        None => false,
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    MONTHS.iter().position(|full| {
        *full == name || (name.len() == 3 && full.starts_with(&name))
    }).map(|i| i as u32 + 1)
}

/// First and last calendar day of the month, leap years included.
fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, next_month - Duration::days(1)))
}

/// Parse a `YYYY-MM-DD` query bound.
pub fn parse_query_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

#[allow(dead_code)]
pub fn month_length(year: i32, month: u32) -> Option<u32> {
    month_bounds(year, month).map(|(_, end)| end.day())
}
