//! Structured fields from the printer-style log embedded in telemetry.
//!
//! Each line is matched by independent rules keyed on prefix or shape. Three
//! rules also consume the line after their marker: the timestamp (program
//! name), the min/max markers (value pair) and the signature marker.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2})\s+(\d{1,2})/(\d{1,2})/(\d{4})$").expect("valid regex")
});
static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*C/\s*(\d+)\s*min").expect("valid regex")
});
static STERILIZING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^STERILIZING\s+(\d+):\d{2}").expect("valid regex"));
static DRYING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^DRYING\s+(\d+):\d{2}").expect("valid regex"));
static COMPLETED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:CYCLE\s+)?(?:END|COMPLETE)\s+(\d+):\d{2}").expect("valid regex")
});
static VALUES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*(-?\d+(?:\.\d+)?)\s*C\s+(-?\d+(?:\.\d+)?)\s*([A-Za-z]+)\s*\]")
        .expect("valid regex")
});
static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

const MIN_VALUES_MARKER: &str = "Min. steri. Values:";
const MAX_VALUES_MARKER: &str = "Max. steri. Values:";
const SIGNATURE_MARKER: &str = "SIGNATURE";

/// Temperature and pressure pair from a `[134.2C  216kPa]` line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SteriValues {
    pub temperature: f64,
    pub pressure: f64,
    pub pressure_unit: String,
}

/// Everything recognized in one cycle log. Minute offsets are from cycle start.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedCycleLog {
    pub model: String,
    pub serial_number: Option<String>,
    pub unit_number: Option<u32>,
    pub water_quality: Option<String>,
    pub cycle_number: u32,
    pub timestamp: Option<NaiveDateTime>,
    pub program: Option<String>,
    pub target_temperature: Option<f64>,
    pub target_time: Option<u32>,
    pub min_values: Option<SteriValues>,
    pub max_values: Option<SteriValues>,
    /// Firmware prints a single `MM:SS` here; start and end both get its
    /// minutes.
    pub sterilizing_start: Option<u32>,
    pub sterilizing_end: Option<u32>,
    pub drying_start: Option<u32>,
    pub completed_at: Option<u32>,
    pub signature: Option<String>,
}

/// Which rule a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Serial,
    Unit,
    Water,
    Cycle,
    Timestamp,
    Target,
    Sterilizing,
    Drying,
    Completed,
    MinMarker,
    MaxMarker,
    Signature,
    Separator,
}

fn classify(line: &str) -> Option<LineKind> {
    let upper = line.to_ascii_uppercase();
    let kind = if line.starts_with(MIN_VALUES_MARKER) {
        LineKind::MinMarker
    } else if line.starts_with(MAX_VALUES_MARKER) {
        LineKind::MaxMarker
    } else if upper.contains(SIGNATURE_MARKER) {
        LineKind::Signature
    } else if is_dashed(line) {
        LineKind::Separator
    } else if line.starts_with("SN ") {
        LineKind::Serial
    } else if TIMESTAMP_RE.is_match(line) {
        LineKind::Timestamp
    } else if STERILIZING_RE.is_match(line) {
        LineKind::Sterilizing
    } else if DRYING_RE.is_match(line) {
        LineKind::Drying
    } else if COMPLETED_RE.is_match(line) {
        LineKind::Completed
    } else if upper.starts_with("CYCLE") && !upper.starts_with("CYCLE END") {
        LineKind::Cycle
    } else if upper.starts_with("UNIT") {
        LineKind::Unit
    } else if upper.starts_with("WATER") {
        LineKind::Water
    } else if line.contains("C/") && line.contains("min") {
        LineKind::Target
    } else {
        return None;
    };
    Some(kind)
}

fn is_dashed(line: &str) -> bool {
    line.len() >= 3 && line.chars().all(|c| c == '-' || c == '=')
}

fn first_integer(line: &str) -> Option<u32> {
    INTEGER_RE.find(line)?.as_str().parse().ok()
}

fn minutes(re: &Regex, line: &str) -> Option<u32> {
    re.captures(line)?.get(1)?.as_str().parse().ok()
}

/// Text after the label: after the first colon, else after the first word.
fn labelled_value(line: &str) -> Option<String> {
    let value = match line.split_once(':') {
        Some((_, rest)) => rest,
        None => line.split_once(char::is_whitespace).map(|(_, rest)| rest)?,
    };
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_timestamp(line: &str) -> Option<NaiveDateTime> {
    let c = TIMESTAMP_RE.captures(line)?;
    let field = |i: usize| c.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    NaiveDate::from_ymd_opt(c[6].parse().ok()?, field(4)?, field(5)?)?.and_hms_opt(
        field(1)?,
        field(2)?,
        field(3)?,
    )
}

fn parse_values(line: &str) -> Option<SteriValues> {
    let c = VALUES_RE.captures(line)?;
    Some(SteriValues {
        temperature: c[1].parse().ok()?,
        pressure: c[2].parse().ok()?,
        pressure_unit: c[3].to_string(),
    })
}

/// Parse a cycle log. `None` unless both a model and a cycle number were found.
pub fn parse_cycle_log(text: &str) -> Option<ParsedCycleLog> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut log = ParsedCycleLog::default();
    let mut model = None;
    let mut cycle_number = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let next = lines.get(i + 1).copied();
        i += 1;

        let Some(kind) = classify(line) else {
            if model.is_none() {
                model = Some(line.to_string());
            }
            continue;
        };

        match kind {
            LineKind::Serial => log.serial_number = labelled_value(line),
            LineKind::Unit => log.unit_number = first_integer(line),
            LineKind::Water => log.water_quality = labelled_value(line),
            LineKind::Cycle => cycle_number = first_integer(line).or(cycle_number),
            LineKind::Timestamp => {
                log.timestamp = parse_timestamp(line);
                if let Some(program) = next.filter(|n| classify(n).is_none()) {
                    log.program = Some(program.to_string());
                    i += 1;
                }
            }
            LineKind::Target => {
                if let Some(c) = TARGET_RE.captures(line) {
                    log.target_temperature = c[1].parse().ok();
                    log.target_time = c[2].parse().ok();
                }
            }
            LineKind::Sterilizing => {
                // Only the minutes of the one printed time are captured.
                let at = minutes(&STERILIZING_RE, line);
                log.sterilizing_start = at;
                log.sterilizing_end = at;
            }
            LineKind::Drying => log.drying_start = minutes(&DRYING_RE, line),
            LineKind::Completed => log.completed_at = minutes(&COMPLETED_RE, line),
            LineKind::MinMarker | LineKind::MaxMarker => {
                if let Some(values) = next.and_then(parse_values) {
                    if kind == LineKind::MinMarker {
                        log.min_values = Some(values);
                    } else {
                        log.max_values = Some(values);
                    }
                    i += 1;
                }
            }
            LineKind::Signature => {
                if let Some(signature) = next.filter(|n| !is_dashed(n)) {
                    log.signature = Some(signature.to_string());
                    i += 1;
                }
            }
            LineKind::Separator => {}
        }
    }

    log.model = model?;
    log.cycle_number = cycle_number?;
    Some(log)
}
