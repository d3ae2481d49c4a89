//! Cycle detail record returned by both dialects' `cycleData` endpoints.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ParseError;
use super::flex::{i64_or_string, loose_bool, string_or_number};

/// Full detail for one cycle.
///
/// Series are kept as the raw delimited strings the device sent; Modern
/// firmware separates points with commas, Legacy with spaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleTelemetry {
    #[serde(default, deserialize_with = "loose_bool")]
    pub succeeded: bool,
    #[serde(default, deserialize_with = "string_or_number")]
    pub date: String,
    #[serde(rename = "number", default, deserialize_with = "i64_or_string")]
    pub cycle_number: i64,
    #[serde(rename = "runmode", default, deserialize_with = "i64_or_string")]
    pub run_mode: i64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub display_units: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub status: String,
    #[serde(rename = "x_axis_points", default, deserialize_with = "i64_or_string")]
    pub point_count: i64,
    #[serde(rename = "temp", default, deserialize_with = "string_or_number")]
    pub temperature: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub pressure: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub log: String,
}

impl CycleTelemetry {
    pub fn from_json(body: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn temperature_series(&self) -> Vec<f64> {
        parse_series(&self.temperature)
    }

    pub fn pressure_series(&self) -> Vec<f64> {
        parse_series(&self.pressure)
    }

    /// Calendar date of the cycle, if the device reported a usable one.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_device_date(&self.date)
    }
}

/// Split a series on commas and/or whitespace, skipping unparseable points.
pub fn parse_series(raw: &str) -> Vec<f64> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<f64>().ok())
        .collect()
}

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})").expect("valid regex"));
static US_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").expect("valid regex"));

/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `MM/DD/YYYY`, optionally followed by a time.
pub fn parse_device_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(c) = ISO_DATE_RE.captures(raw) {
        return NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
    }
    let c = US_DATE_RE.captures(raw)?;
    NaiveDate::from_ymd_opt(c[3].parse().ok()?, c[1].parse().ok()?, c[2].parse().ok()?)
}
