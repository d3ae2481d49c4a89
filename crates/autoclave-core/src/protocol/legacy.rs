//! Legacy (MQX/Freescale) dialect payloads.
//!
//! Legacy requests are JSON documents POSTed with a form content type. The
//! index response is walked as an untyped tree because the firmware is
//! inconsistent about quoting and about which levels are present.

use serde::Serialize;
use serde_json::Value;

use super::catalog::{CycleIndex, DayCycles, MonthEntry, YearEntry};
use super::error::ParseError;
use super::flex::value_to_string;
use super::identifier::{loose_eq, normalize_cycle_number, pad2};

/// Body of `POST /data/cycles.cgi`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IndexRequest {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl IndexRequest {
    pub fn new(year: impl Into<String>, month: &str, day: &str) -> Self {
        Self {
            year: year.into(),
            month: pad2(month),
            day: pad2(day),
        }
    }
}

/// Body of `POST /data/cycleData.cgi`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CycleDataRequest {
    pub year: String,
    pub month: String,
    pub day: String,
    /// Five-digit cycle number.
    pub cycle: String,
}

/// Decode the index response into a catalog tree.
///
/// Accepts a bare array of years or an object wrapping one under `years`.
pub fn parse_index(body: &str) -> Result<CycleIndex, ParseError> {
    let root: Value = serde_json::from_str(body)?;
    let years = match &root {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("years") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Err(ParseError::Shape("index object without 'years'".into())),
        },
        _ => return Err(ParseError::Shape("index is not an array".into())),
    };

    Ok(years.iter().filter_map(parse_year).collect())
}

fn parse_year(node: &Value) -> Option<YearEntry> {
    let year = node.get("year").and_then(value_to_string)?;
    let months = node
        .get("months")
        .and_then(Value::as_array)
        .map(|months| months.iter().filter_map(parse_month).collect())
        .unwrap_or_default();
    Some(YearEntry { year, months })
}

fn parse_month(node: &Value) -> Option<MonthEntry> {
    // Some firmware lists months as bare strings.
    let month = match node {
        Value::Object(_) => node.get("month").and_then(value_to_string)?,
        other => value_to_string(other)?,
    };

    // Day stubs without cycles carry no detail; the month then counts as a
    // skeleton so the caller's fallback chain runs.
    let days = node
        .get("days")
        .and_then(Value::as_array)
        .map(|days| {
            let mut days: Vec<DayCycles> = days
                .iter()
                .filter_map(parse_day)
                .filter(|d| !d.cycles.is_empty())
                .collect();
            days.sort_by(|a, b| a.day.cmp(&b.day));
            days
        })
        .filter(|days| !days.is_empty());

    Some(MonthEntry {
        month: pad2(&month),
        days,
    })
}

fn parse_day(node: &Value) -> Option<DayCycles> {
    let day = node.get("day").and_then(value_to_string)?;
    let mut cycles: Vec<String> = node
        .get("cycles")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|c| match c {
            Value::Object(_) => c
                .get("cycle")
                .or_else(|| c.get("number"))
                .and_then(value_to_string),
            other => value_to_string(other),
        })
        .filter_map(|c| normalize_cycle_number(&c))
        .collect();
    cycles.sort();
    cycles.dedup();

    Some(DayCycles {
        day: pad2(&day),
        cycles,
    })
}

/// Locate `(year, month)` in an index, matching loosely.
pub fn find_month<'a>(index: &'a CycleIndex, year: &str, month: &str) -> Option<&'a MonthEntry> {
    index
        .iter()
        .find(|y| y.year.trim() == year.trim())?
        .months
        .iter()
        .find(|m| loose_eq(&m.month, month))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_bodies_are_padded() {
        let req = IndexRequest::new("2026", "3", "7");
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"year":"2026","month":"03","day":"07"}"#
        );
    }

    #[test]
    fn test_parse_index_with_days() {
        let body = r#"[{"year": 2026, "months": [
            {"month": "1", "days": [
                {"day": "15", "cycles": ["152", "00151"]},
                {"day": "03", "cycles": [140]}
            ]},
            {"month": "02"}
        ]}]"#;
        let index = parse_index(body).unwrap();
        assert_eq!(index[0].year, "2026");

        let jan = find_month(&index, "2026", "01").unwrap();
        let days = jan.days.as_ref().unwrap();
        assert_eq!(days[0].day, "03");
        assert_eq!(days[0].cycles, vec!["00140"]);
        assert_eq!(days[1].cycles, vec!["00151", "00152"]);

        let feb = find_month(&index, "2026", "2").unwrap();
        assert!(feb.days.is_none());
        assert!(find_month(&index, "2025", "01").is_none());
    }

    #[test]
    fn test_parse_index_day_stubs_are_not_detail() {
        let body = r#"[{"year": "2026", "months": [
            {"month": "01", "days": [{"day": "05"}, {"day": "12", "cycles": []}]},
            {"month": "02", "days": [{"day": "09"}, {"day": "10", "cycles": ["7"]}]}
        ]}]"#;
        let index = parse_index(body).unwrap();
        assert!(find_month(&index, "2026", "01").unwrap().days.is_none());

        let feb = find_month(&index, "2026", "02").unwrap().days.as_ref().unwrap();
        assert_eq!(feb.len(), 1);
        assert_eq!(feb[0].day, "10");
        assert_eq!(feb[0].cycles, vec!["00007"]);
    }

    #[test]
    fn test_parse_index_rejects_garbage() {
        assert!(matches!(parse_index("<html>"), Err(ParseError::Json(_))));
        assert!(matches!(parse_index("42"), Err(ParseError::Shape(_))));
    }

    #[test]
    fn test_parse_index_bare_month_strings() {
        let index = parse_index(r#"{"years": [{"year": "2026", "months": ["4", "5"]}]}"#).unwrap();
        assert_eq!(index[0].months.len(), 2);
        assert_eq!(index[0].months[0].month, "04");
    }
}
