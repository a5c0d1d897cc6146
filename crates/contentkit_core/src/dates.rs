//! Tolerant date normalization.
//!
//! Authors write dates in many shapes (`2026-03-01`, `Q1 2026`, `1-Mar-26`,
//! spreadsheet serials). [`normalize_date`] runs an ordered list of grammars
//! and returns the first match as a canonical `YYYY-MM-DD` string plus a
//! display string that keeps the author's granularity. It never fails: an
//! unusable value produces an empty `iso` and at least one warning.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate};
use regex::Regex;
use serde::Serialize;

/// Two-digit years at or below this value land in the 2000s, above it in the 1900s.
pub const TWO_DIGIT_YEAR_PIVOT: u32 = 68;

const MONTH_NAMES: [&str; 12] = [
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

const FALLBACK_FORMATS: [&str; 9] = [
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d %B, %Y",
    "%Y/%m/%d",
    "%Y.%m.%d",
];

static AMBIGUOUS_SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("valid regex"));
static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ]\S.*)?$").expect("valid regex")
});
static ISO_YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})$").expect("valid regex"));
static QUARTER_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^q([1-4])[\s\-/]*(\d{4})$").expect("valid regex"));
static YEAR_FIRST_QUARTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d{4})[\s\-/]*q([1-4])$").expect("valid regex"));
static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[\s\-/]+([A-Za-z]{3,})\.?[\s\-/,]+(\d{2}|\d{4})$").expect("valid regex")
});
static MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{3,})\.?,?[\s\-/]+(\d{4})$").expect("valid regex")
});
static MONTH_SHORT_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]{3,})\.?[\s\-/]*'?(\d{2})$").expect("valid regex"));
static BARE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})$").expect("valid regex"));
static SERIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{3,6})$").expect("valid regex"));
static CANONICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedDate {
    pub display: String,
    /// Canonical `YYYY-MM-DD`, empty when the input could not be resolved.
    pub iso: String,
    pub warnings: Vec<String>,
}

impl NormalizedDate {
    pub fn is_resolved(&self) -> bool {
        !self.iso.is_empty()
    }
}

/// Outcome of one grammar that recognized the input's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarMatch {
    /// `None` when the shape matched but the calendar rejected it (e.g. Feb 30).
    pub date: Option<NaiveDate>,
    pub display: String,
    pub warnings: Vec<String>,
}

impl GrammarMatch {
    fn exact(date: NaiveDate, display: String) -> Self {
        Self {
            date: Some(date),
            display,
            warnings: Vec::new(),
        }
    }

    fn with_warning(mut self, warning: String) -> Self {
        self.warnings.push(warning);
        self
    }

    fn invalid(input: &str) -> Self {
        Self {
            date: None,
            display: input.to_string(),
            warnings: vec![format!("`{input}` is not a valid calendar date")],
        }
    }
}

pub type Grammar = fn(&str) -> Option<GrammarMatch>;

/// Grammars in priority order; the first one returning `Some` wins.
pub const GRAMMARS: [(&str, Grammar); 9] = [
    ("iso_date", iso_date),
    ("iso_year_month", iso_year_month),
    ("quarter", quarter),
    ("day_month_year", day_month_year),
    ("month_year", month_year),
    ("month_short_year", month_short_year),
    ("bare_year", bare_year),
    ("serial", spreadsheet_serial),
    ("general", general),
];

pub fn normalize_date(input: &str) -> NormalizedDate {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return NormalizedDate {
            display: String::new(),
            iso: String::new(),
            warnings: vec!["date is empty".to_string()],
        };
    }

    if AMBIGUOUS_SLASH.is_match(trimmed) {
        return NormalizedDate {
            display: trimmed.to_string(),
            iso: String::new(),
            warnings: vec![format!(
                "`{trimmed}` is ambiguous between day/month and month/day order; write it as YYYY-MM-DD"
            )],
        };
    }

    for (_, grammar) in GRAMMARS {
        if let Some(found) = grammar(trimmed) {
            return NormalizedDate {
                display: found.display,
                iso: found
                    .date
                    .map(|date| date.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                warnings: found.warnings,
            };
        }
    }

    NormalizedDate {
        display: trimmed.to_string(),
        iso: String::new(),
        warnings: vec![format!("`{trimmed}` does not match any supported date format")],
    }
}

/// True for a strict `YYYY-MM-DD` string naming a real calendar day.
pub fn is_canonical_date(value: &str) -> bool {
    CANONICAL.is_match(value) && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

pub fn iso_date(input: &str) -> Option<GrammarMatch> {
    let caps = ISO_DATE.captures(input)?;
    let year = caps[1].parse::<i32>().ok()?;
    let month = caps[2].parse::<u32>().ok()?;
    let day = caps[3].parse::<u32>().ok()?;
    Some(match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => GrammarMatch::exact(date, display_day(date)),
        None => GrammarMatch::invalid(input),
    })
}

pub fn iso_year_month(input: &str) -> Option<GrammarMatch> {
    let caps = ISO_YEAR_MONTH.captures(input)?;
    let year = caps[1].parse::<i32>().ok()?;
    let month = caps[2].parse::<u32>().ok()?;
    Some(match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(date) => GrammarMatch::exact(date, display_month(date)),
        None => GrammarMatch::invalid(input),
    })
}

pub fn quarter(input: &str) -> Option<GrammarMatch> {
    let (quarter, year) = if let Some(caps) = QUARTER_FIRST.captures(input) {
        (caps[1].parse::<u32>().ok()?, caps[2].parse::<i32>().ok()?)
    } else {
        let caps = YEAR_FIRST_QUARTER.captures(input)?;
        (caps[2].parse::<u32>().ok()?, caps[1].parse::<i32>().ok()?)
    };
    let month = (quarter - 1) * 3 + 1;
    Some(match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(date) => GrammarMatch::exact(date, format!("Q{quarter} {year}")),
        None => GrammarMatch::invalid(input),
    })
}

pub fn day_month_year(input: &str) -> Option<GrammarMatch> {
    let caps = DAY_MONTH_YEAR.captures(input)?;
    let day = caps[1].parse::<u32>().ok()?;
    let month = month_from_token(&caps[2])?;
    let (year, warning) = resolve_year(&caps[3])?;
    let found = match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => GrammarMatch::exact(date, display_day(date)),
        None => GrammarMatch::invalid(input),
    };
    Some(match warning {
        Some(warning) => found.with_warning(warning),
        None => found,
    })
}

pub fn month_year(input: &str) -> Option<GrammarMatch> {
    let caps = MONTH_YEAR.captures(input)?;
    let month = month_from_token(&caps[1])?;
    let year = caps[2].parse::<i32>().ok()?;
    Some(match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(date) => GrammarMatch::exact(date, display_month(date)),
        None => GrammarMatch::invalid(input),
    })
}

pub fn month_short_year(input: &str) -> Option<GrammarMatch> {
    let caps = MONTH_SHORT_YEAR.captures(input)?;
    let month = month_from_token(&caps[1])?;
    let (year, warning) = resolve_year(&caps[2])?;
    let found = match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(date) => GrammarMatch::exact(date, display_month(date)),
        None => GrammarMatch::invalid(input),
    };
    Some(match warning {
        Some(warning) => found.with_warning(warning),
        None => found,
    })
}

pub fn bare_year(input: &str) -> Option<GrammarMatch> {
    let caps = BARE_YEAR.captures(input)?;
    let year = caps[1].parse::<i32>().ok()?;
    Some(match NaiveDate::from_ymd_opt(year, 1, 1) {
        Some(date) => GrammarMatch::exact(date, year.to_string()),
        None => GrammarMatch::invalid(input),
    })
}

/// Spreadsheet day serials count from 1899-12-31 and include the fictitious
/// 1900-02-29, so serials from 60 onward are shifted back one day.
pub fn spreadsheet_serial(input: &str) -> Option<GrammarMatch> {
    let caps = SERIAL.captures(input)?;
    let serial = caps[1].parse::<i64>().ok()?;
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 31)?;
    let offset = if serial >= 60 { serial - 1 } else { serial };
    let Some(date) = epoch.checked_add_signed(Duration::days(offset)) else {
        return Some(GrammarMatch::invalid(input));
    };
    Some(
        GrammarMatch::exact(date, display_day(date)).with_warning(format!(
            "`{input}` interpreted as a spreadsheet serial day number ({})",
            date.format("%Y-%m-%d")
        )),
    )
}

pub fn general(input: &str) -> Option<GrammarMatch> {
    let date = FALLBACK_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(input)
                .ok()
                .map(|value| value.date_naive())
        })
        .or_else(|| {
            DateTime::parse_from_rfc2822(input)
                .ok()
                .map(|value| value.date_naive())
        })?;
    Some(
        GrammarMatch::exact(date, display_day(date)).with_warning(format!(
            "`{input}` parsed with general date parsing; prefer YYYY-MM-DD"
        )),
    )
}

/// Map a month name, abbreviation or 3+ letter prefix to 1..=12.
fn month_from_token(token: &str) -> Option<u32> {
    let token = token.trim_end_matches('.').to_ascii_lowercase();
    if token.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|name| name.starts_with(&token))
        .map(|index| index as u32 + 1)
}

fn resolve_year(digits: &str) -> Option<(i32, Option<String>)> {
    let value = digits.parse::<u32>().ok()?;
    if digits.len() == 4 {
        return Some((value as i32, None));
    }
    let year = expand_two_digit_year(value);
    Some((
        year,
        Some(format!(
            "two-digit year `{digits}` read as {year} (00-{TWO_DIGIT_YEAR_PIVOT} -> 2000s, {}-99 -> 1900s)",
            TWO_DIGIT_YEAR_PIVOT + 1
        )),
    ))
}

pub fn expand_two_digit_year(value: u32) -> i32 {
    if value <= TWO_DIGIT_YEAR_PIVOT {
        2000 + value as i32
    } else {
        1900 + value as i32
    }
}

fn display_day(date: NaiveDate) -> String {
    format!(
        "{} {}, {}",
        month_title(date.month()),
        date.day(),
        date.year()
    )
}

fn display_month(date: NaiveDate) -> String {
    format!("{} {}", month_title(date.month()), date.year())
}

fn month_title(month: u32) -> String {
    let name = MONTH_NAMES[(month - 1) as usize];
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
