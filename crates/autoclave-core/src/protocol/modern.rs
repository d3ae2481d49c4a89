//! Modern (nginx) dialect payloads.
//!
//! The archive page is HTML with the whole catalog embedded as a script
//! literal: `var cyclesInfo = [{...}, ...];`.

use chrono::{DateTime, Datelike, Local, NaiveDate};
use serde::Deserialize;

use super::catalog::{DayCycles, DayGrouper};
use super::constants::CYCLES_INFO_MARKER;
use super::error::ParseError;
use super::flex::{i64_or_string, string_or_number};
use super::identifier::{CycleFileName, normalize_cycle_number, pad_cycle_number};

/// One entry of the embedded `cyclesInfo` array.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub records_id: String,
    /// Unix seconds.
    #[serde(deserialize_with = "i64_or_string")]
    pub cycle_start_time: i64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub file_name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub cycle_number: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub cycle_id: String,
}

impl ArchiveRecord {
    /// Five-digit cycle number, falling back to the one in the file name.
    pub fn padded_cycle_number(&self) -> Option<String> {
        normalize_cycle_number(&self.cycle_number)
            .or_else(|| self.parsed_file_name().map(|f| f.cycle_number))
    }

    /// Local calendar date of the cycle start.
    pub fn start_date(&self) -> Option<NaiveDate> {
        DateTime::from_timestamp(self.cycle_start_time, 0)
            .map(|utc| utc.with_timezone(&Local).date_naive())
    }

    pub fn parsed_file_name(&self) -> Option<CycleFileName> {
        CycleFileName::parse(&self.file_name)
    }

    pub fn serial(&self) -> Option<String> {
        self.parsed_file_name().and_then(|f| f.serial)
    }

    /// Whether `file_name` carries the given cycle number as `_NNNNN_`.
    pub fn names_cycle(&self, cycle_number: u32) -> bool {
        self.file_name
            .contains(&format!("_{}_", pad_cycle_number(cycle_number)))
    }
}

/// Extract the JSON array literal that follows `cyclesInfo =` in `page`.
pub fn extract_cycles_info(page: &str) -> Result<&str, ParseError> {
    // The name can also appear in element ids; only an assignment counts.
    let rest = page
        .match_indices(CYCLES_INFO_MARKER)
        .find_map(|(start, _)| {
            let rest = page[start + CYCLES_INFO_MARKER.len()..].trim_start();
            let rest = rest.strip_prefix('=')?.trim_start();
            rest.starts_with('[').then_some(rest)
        })
        .ok_or(ParseError::MarkerNotFound(CYCLES_INFO_MARKER))?;

    let end = matching_bracket(rest).ok_or(ParseError::Unterminated(CYCLES_INFO_MARKER))?;
    Ok(&rest[..=end])
}

/// Index of the bracket closing the one at position 0, skipping string contents.
fn matching_bracket(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (i, b) in s.bytes().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the archive page into its records.
pub fn parse_archive_page(page: &str) -> Result<Vec<ArchiveRecord>, ParseError> {
    let literal = extract_cycles_info(page)?;
    Ok(serde_json::from_str(literal)?)
}

/// Group records by local start date, keeping only those in `(year, month)`.
pub fn group_month(
    records: &[ArchiveRecord],
    year: i32,
    month: u32,
) -> Vec<DayCycles> {
    let mut grouper = DayGrouper::new();
    for record in records {
        let (Some(date), Some(cycle)) = (record.start_date(), record.padded_cycle_number()) else {
            continue;
        };
        if date.year() == year && date.month() == month {
            grouper.insert(date, cycle);
        }
    }
    grouper.finish()
}
