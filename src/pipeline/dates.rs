//! Session-date extraction: layered regex patterns, each with a fixed
//! confidence reflecting how unambiguous the pattern is.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use serde::Serialize;

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december";

static LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)session\s+date\s*[:\-]\s*({MONTHS})\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})"
    ))
    .expect("labeled date pattern")
});

static ISO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date pattern"));

static SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("slash date pattern"));

static MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b({MONTHS})\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b"
    ))
    .expect("month-name date pattern")
});

/// Result of a regex scan. `confidence` is fixed per pattern tier, zero when
/// nothing matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateExtraction {
    pub extracted_date: Option<String>,
    pub confidence: u8,
}

impl DateExtraction {
    fn none() -> Self {
        Self {
            extracted_date: None,
            confidence: 0,
        }
    }

    fn found(date: NaiveDate, confidence: u8) -> Self {
        Self {
            extracted_date: Some(date.format("%Y-%m-%d").to_string()),
            confidence,
        }
    }
}

/// Scan text for a session date, most explicit pattern first:
/// labeled "Session Date: Month D, Year" (100), ISO (95), slash (90),
/// bare "Month D, YYYY" (85).
pub fn extract_date(text: &str) -> DateExtraction {
    if let Some(caps) = LABELED.captures(text) {
        if let Some(date) = month_day_year(&caps[1], &caps[2], &caps[3]) {
            return DateExtraction::found(date, 100);
        }
    }
    if let Some(caps) = ISO.captures(text) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            return DateExtraction::found(date, 95);
        }
    }
    if let Some(caps) = SLASH.captures(text) {
        if let Some(date) = ymd(&caps[3], &caps[1], &caps[2]) {
            return DateExtraction::found(date, 90);
        }
    }
    if let Some(caps) = MONTH_NAME.captures(text) {
        if let Some(date) = month_day_year(&caps[1], &caps[2], &caps[3]) {
            return DateExtraction::found(date, 85);
        }
    }
    DateExtraction::none()
}

/// A date is plausible for review when it falls inside
/// [today − 730 days, today + 30 days]. Dates outside the window usually mean
/// the scan matched a birthdate or a template artifact.
pub fn within_review_window(date: NaiveDate, today: NaiveDate) -> bool {
    let floor = today.checked_sub_days(Days::new(730));
    let ceil = today.checked_add_days(Days::new(30));
    match (floor, ceil) {
        (Some(floor), Some(ceil)) => date >= floor && date <= ceil,
        _ => false,
    }
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn month_day_year(month_name: &str, day: &str, year: &str) -> Option<NaiveDate> {
    let month = match month_name.to_lowercase().as_str() {
        "january" => 1,
        "february" => 2,
        "march" => 3,
        "april" => 4,
        "may" => 5,
        "june" => 6,
        "july" => 7,
        "august" => 8,
        "september" => 9,
        "october" => 10,
        "november" => 11,
        "december" => 12,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_session_date_scores_100() {
        let out = extract_date("Session Date: August 4, 2025\nClient presented calm.");
        assert_eq!(out.extracted_date.as_deref(), Some("2025-08-04"));
        assert_eq!(out.confidence, 100);
    }

    #[test]
    fn ordinal_suffix_in_label_is_accepted() {
        let out = extract_date("session date: March 3rd, 2024");
        assert_eq!(out.extracted_date.as_deref(), Some("2024-03-03"));
        assert_eq!(out.confidence, 100);
    }

    #[test]
    fn iso_date_scores_95() {
        let out = extract_date("Appointment on 2025-01-15 went well.");
        assert_eq!(out.extracted_date.as_deref(), Some("2025-01-15"));
        assert_eq!(out.confidence, 95);
    }

    #[test]
    fn slash_date_scores_90() {
        let out = extract_date("Seen on 3/3/2024 for intake.");
        assert_eq!(out.extracted_date.as_deref(), Some("2024-03-03"));
        assert_eq!(out.confidence, 90);
    }

    #[test]
    fn bare_month_name_scores_85() {
        let out = extract_date("Met with client on March 3, 2024 to review goals.");
        assert_eq!(out.extracted_date.as_deref(), Some("2024-03-03"));
        assert_eq!(out.confidence, 85);
    }

    #[test]
    fn labeled_pattern_wins_over_other_dates_in_text() {
        let out = extract_date("DOB 1990-01-01. Session Date: August 4, 2025.");
        assert_eq!(out.extracted_date.as_deref(), Some("2025-08-04"));
        assert_eq!(out.confidence, 100);
    }

    #[test]
    fn no_date_returns_none_with_zero_confidence() {
        let out = extract_date("Client discussed work stress and sleep hygiene.");
        assert_eq!(out, DateExtraction::none());
    }

    #[test]
    fn invalid_calendar_date_is_rejected() {
        let out = extract_date("Session Date: February 30, 2025");
        assert_eq!(out.extracted_date, None);
    }

    #[test]
    fn review_window_bounds() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        assert!(within_review_window(
            NaiveDate::from_ymd_opt(2025, 8, 4).unwrap(),
            today
        ));
        assert!(within_review_window(
            NaiveDate::from_ymd_opt(2026, 9, 20).unwrap(),
            today
        ));
        // Beyond two years back or a month ahead is implausible for a session.
        assert!(!within_review_window(
            NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
            today
        ));
        assert!(!within_review_window(
            NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
            today
        ));
    }
}
