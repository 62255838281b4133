//! Calendar-date normalization for printed report dates.
//!
//! Day-first wins over month-first whenever both readings are valid: the
//! documents come mostly from DD/MM regions. Month-first is only tried once
//! every day-first format has failed.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

/// Numeric and ISO shapes, day-first.
const DAY_FIRST_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y",
];

/// Month-name shapes. `%B` also accepts the three-letter abbreviation.
const NAMED_MONTH_FORMATS: &[&str] = &["%d-%B-%Y", "%d %B %Y", "%B %d %Y", "%d-%B-%y", "%d %B %y"];

const TWO_DIGIT_YEAR_FORMATS: &[&str] = &["%d/%m/%y", "%d-%m-%y", "%d.%m.%y"];

/// Tried last.
const MONTH_FIRST_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%m/%d/%y"];

static RE_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").unwrap());

static RE_DATE_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b(
            \d{4}[-/.]\d{1,2}[-/.]\d{1,2}
          | \d{1,2}[-/.]\d{1,2}[-/.]\d{2,4}
          | \d{1,2}(?:st|nd|rd|th)?[\s-]+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?[\s,-]+\d{2,4}
          | (?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}
        )\b",
    )
    .unwrap()
});

/// Parse one date string into a calendar date.
///
/// Accepts ISO dates and datetimes, DD/MM/YYYY style dates with `/`, `-` or
/// `.`, month names ("15-Jan-2025", "Jan 15, 2025") and two-digit years.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = clean(raw);
    if cleaned.is_empty() {
        return None;
    }

    // ISO datetime: keep the date part
    let candidate = match cleaned.split_once('T') {
        Some((date, _)) if date.len() == 10 && date.as_bytes()[4] == b'-' => date,
        _ => cleaned.as_str(),
    };

    try_formats(candidate, DAY_FIRST_FORMATS)
        .or_else(|| try_formats(candidate, NAMED_MONTH_FORMATS))
        .or_else(|| try_formats(candidate, TWO_DIGIT_YEAR_FORMATS))
        .or_else(|| try_formats(candidate, MONTH_FIRST_FORMATS))
        .or_else(|| {
            // "15/01/2025 10:30" and similar: retry on the first token
            let first = candidate.split_whitespace().next()?;
            (first != candidate).then(|| parse_date(first)).flatten()
        })
}

/// First parseable date appearing anywhere in free text.
pub fn find_date_in_text(text: &str) -> Option<NaiveDate> {
    RE_DATE_IN_TEXT
        .find_iter(text)
        .find_map(|m| parse_date(m.as_str()))
}

fn clean(raw: &str) -> String {
    let without_ordinals = RE_ORDINAL.replace_all(raw.trim(), "$1");
    without_ordinals
        .replace(',', " ")
        .replace(". ", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_string()
}

fn try_formats(text: &str, formats: &[&str]) -> Option<NaiveDate> {
    formats.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(text, fmt)
            .ok()
            .filter(|d| (1900..=2100).contains(&d.year()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn equivalent_spellings() {
        for raw in ["15/01/2025", "2025-01-15", "15-Jan-2025", "15 January 2025", "Jan 15, 2025"] {
            assert_eq!(parse_date(raw), ymd(2025, 1, 15), "{raw}");
        }
    }

    #[test]
    fn day_first_when_ambiguous() {
        assert_eq!(parse_date("03/04/2025"), ymd(2025, 4, 3));
        assert_eq!(parse_date("03.04.2025"), ymd(2025, 4, 3));
    }

    #[test]
    fn month_first_only_when_day_first_impossible() {
        assert_eq!(parse_date("12/25/2025"), ymd(2025, 12, 25));
    }

    #[test]
    fn two_digit_year_and_ordinals() {
        assert_eq!(parse_date("15/01/25"), ymd(2025, 1, 15));
        assert_eq!(parse_date("1st Feb 2025"), ymd(2025, 2, 1));
    }

    #[test]
    fn datetimes_keep_the_date() {
        assert_eq!(parse_date("2025-01-15T08:30:00Z"), ymd(2025, 1, 15));
        assert_eq!(parse_date("15/01/2025 10:30"), ymd(2025, 1, 15));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("32/13/2025"), None);
    }

    #[test]
    fn date_found_in_free_text() {
        let text = "PATIENT: A. Patient  Age 45\nCollected on: 05-Mar-2025 09:12\nHb 10.5";
        assert_eq!(find_date_in_text(text), ymd(2025, 3, 5));
        assert_eq!(find_date_in_text("Reported 2025/02/01"), ymd(2025, 2, 1));
        assert_eq!(find_date_in_text("Hb 10.5 g/dL"), None);
    }
}
