//! Cycle identity and the on-device file naming convention.
//!
//! Both dialects name cycle files `S{YYYYMMDD}_{NNNNN}_{serial}.{ext}` under
//! `{base}/{YYYY}/{MM}/{DD}/`, and both UIs render cycle numbers with five
//! digits. Everything here reproduces that convention.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::CYCLE_NUMBER_WIDTH;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Invalid cycle number '{0}'")]
    CycleNumber(String),

    #[error("Invalid date {year}-{month}-{day}")]
    Date {
        year: String,
        month: String,
        day: String,
    },
}

/// Zero-pad a cycle number to five digits. Already padded input is unchanged.
///
/// Returns `None` for empty, non-numeric or over-long input.
pub fn normalize_cycle_number(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let trimmed = raw.trim_start_matches('0');
    if trimmed.len() > CYCLE_NUMBER_WIDTH {
        return None;
    }
    Some(format!("{:0>width$}", trimmed, width = CYCLE_NUMBER_WIDTH))
}

/// Render an integer cycle number the way the device UIs do.
pub fn pad_cycle_number(number: u32) -> String {
    format!("{:0>width$}", number, width = CYCLE_NUMBER_WIDTH)
}

/// Two-digit month or day, accepting "1", "01" or 1.
pub fn pad2(raw: &str) -> String {
    let raw = raw.trim();
    match raw.parse::<u32>() {
        Ok(n) => format!("{:02}", n),
        Err(_) => raw.to_string(),
    }
}

/// Loose month/day comparison: exact, unpadded or re-padded.
pub fn loose_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    a == b || a.trim_start_matches('0') == b.trim_start_matches('0') || pad2(a) == pad2(b)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(31)
}

/// A single cycle on a single device.
///
/// Equality is by date and cycle number; the serial only helps Modern
/// devices locate the cycle file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleIdentifier {
    pub year: String,
    pub month: String,
    pub day: String,
    cycle_number: String,
    pub serial: Option<String>,
}

impl CycleIdentifier {
    pub fn new(
        year: impl Into<String>,
        month: impl Into<String>,
        day: impl Into<String>,
        cycle_number: &str,
    ) -> Result<Self, IdentifierError> {
        let cycle_number = normalize_cycle_number(cycle_number)
            .ok_or_else(|| IdentifierError::CycleNumber(cycle_number.to_string()))?;
        let (year, month, day) = (year.into(), pad2(&month.into()), pad2(&day.into()));

        Ok(Self {
            year,
            month,
            day,
            cycle_number,
            serial: None,
        })
    }

    /// Same as [`new`](Self::new) with the date parts taken from `date`.
    pub fn from_date(date: NaiveDate, cycle_number: &str) -> Result<Self, IdentifierError> {
        Self::new(
            date.format("%Y").to_string(),
            date.format("%m").to_string(),
            date.format("%d").to_string(),
            cycle_number,
        )
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn cycle_number(&self) -> &str {
        &self.cycle_number
    }

    pub fn date(&self) -> Result<NaiveDate, IdentifierError> {
        let err = || IdentifierError::Date {
            year: self.year.clone(),
            month: self.month.clone(),
            day: self.day.clone(),
        };
        let y = self.year.parse::<i32>().map_err(|_| err())?;
        let m = self.month.parse::<u32>().map_err(|_| err())?;
        let d = self.day.parse::<u32>().map_err(|_| err())?;
        NaiveDate::from_ymd_opt(y, m, d).ok_or_else(err)
    }

    /// `S{YYYYMMDD}_{NNNNN}_{serial}` without extension.
    pub fn file_stem(&self, serial: &str) -> String {
        format!(
            "S{}{}{}_{}_{}",
            self.year, self.month, self.day, self.cycle_number, serial
        )
    }

    /// Full on-device path of the cycle file.
    pub fn file_path(&self, base: &str, serial: &str, ext: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}.{}",
            base.trim_end_matches('/'),
            self.year,
            self.month,
            self.day,
            self.file_stem(serial),
            ext
        )
    }
}

impl PartialEq for CycleIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.year == other.year
            && self.month == other.month
            && self.day == other.day
            && self.cycle_number == other.cycle_number
    }
}

impl Eq for CycleIdentifier {}

impl Hash for CycleIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.year.hash(state);
        self.month.hash(state);
        self.day.hash(state);
        self.cycle_number.hash(state);
    }
}

impl fmt::Display for CycleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{} #{}",
            self.year, self.month, self.day, self.cycle_number
        )
    }
}

static FILE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"S(\d{4})(\d{2})(\d{2})_(\d{1,5})(?:_([A-Za-z0-9]+))?").expect("valid regex")
});

/// A cycle file name decoded back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleFileName {
    pub date: NaiveDate,
    /// Five-digit, zero-padded.
    pub cycle_number: String,
    pub serial: Option<String>,
}

impl CycleFileName {
    /// Decode the first cycle file name found in `text`.
    pub fn parse(text: &str) -> Option<Self> {
        FILE_NAME_RE
            .captures(text)
            .and_then(|caps| Self::from_captures(&caps))
    }

    /// Every cycle file name mentioned in `text`, e.g. a directory listing.
    pub fn scan(text: &str) -> Vec<Self> {
        FILE_NAME_RE
            .captures_iter(text)
            .filter_map(|caps| Self::from_captures(&caps))
            .collect()
    }

    fn from_captures(caps: &regex::Captures<'_>) -> Option<Self> {
        let year = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let day = caps.get(3)?.as_str().parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;

        Some(Self {
            date,
            cycle_number: normalize_cycle_number(caps.get(4)?.as_str())?,
            serial: caps.get(5).map(|m| m.as_str().to_string()),
        })
    }
}
