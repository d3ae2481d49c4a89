//! Date-range cycle listing, the main entry point.
//!
//! Ranges other than `today` end yesterday: a cycle finished today is only
//! reported by `today`.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::cache::FirmwareType;
use crate::config::ClientConfig;
use crate::device::{CycleSource, DeviceAddress, FlattenedCycle};
use crate::error::RequestError;
use crate::firmware::FirmwareClassifier;
use crate::index::CycleIndexReader;
use crate::transport::AdaptiveTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Today,
    Yesterday,
    Week,
    Month,
}

impl TimeRange {
    /// Inclusive `(first, last)` dates covered when the current date is `today`.
    pub fn window(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let back = |days: u64| today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
        match self {
            TimeRange::Today => (today, today),
            TimeRange::Yesterday => (back(1), back(1)),
            TimeRange::Week => (back(7), back(1)),
            TimeRange::Month => (back(30), back(1)),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeRange::Today => write!(f, "today"),
            TimeRange::Yesterday => write!(f, "yesterday"),
            TimeRange::Week => write!(f, "week"),
            TimeRange::Month => write!(f, "month"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown range '{0}' (expected today, yesterday, week or month)")]
pub struct UnknownRange(pub String);

impl FromStr for TimeRange {
    type Err = UnknownRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(TimeRange::Today),
            "yesterday" => Ok(TimeRange::Yesterday),
            "week" => Ok(TimeRange::Week),
            "month" => Ok(TimeRange::Month),
            other => Err(UnknownRange(other.to_string())),
        }
    }
}

/// Every `(year, month)` touched by `[first, last]`, ascending.
fn months_between(first: NaiveDate, last: NaiveDate) -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    let (mut year, mut month) = (first.year(), first.month());
    while (year, month) <= (last.year(), last.month()) {
        months.push((year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    months
}

pub struct RangeAggregator<'a> {
    transport: &'a AdaptiveTransport,
    config: &'a ClientConfig,
}

impl<'a> RangeAggregator<'a> {
    pub fn new(transport: &'a AdaptiveTransport, config: &'a ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn cycles_for_range(
        &self,
        address: &DeviceAddress,
        range: TimeRange,
    ) -> Result<Vec<FlattenedCycle>, RequestError> {
        self.cycles_for_range_on(address, range, Local::now().date_naive())
    }

    /// Cycles dated inside `range`, sorted by date then cycle number.
    ///
    /// A catalog the device sent but that could not be decoded counts as
    /// empty; failures to reach the device are returned as errors.
    #[instrument(level = "debug", skip(self), fields(address = %address, range = %range))]
    pub fn cycles_for_range_on(
        &self,
        address: &DeviceAddress,
        range: TimeRange,
        today: NaiveDate,
    ) -> Result<Vec<FlattenedCycle>, RequestError> {
        let firmware = FirmwareClassifier::new(self.transport).classify(address);
        let (first, last) = range.window(today);

        let mut cycles = match firmware {
            FirmwareType::Modern => self.modern(address, first, last)?,
            FirmwareType::Legacy | FirmwareType::Unknown => self.legacy(address, first, last)?,
        };

        cycles.sort_by(|a, b| (a.date, &a.cycle_number).cmp(&(b.date, &b.cycle_number)));
        cycles.dedup();
        info!(firmware = %firmware, found = cycles.len(), "Range listed");
        Ok(cycles)
    }

    fn modern(
        &self,
        address: &DeviceAddress,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<FlattenedCycle>, RequestError> {
        let reader = CycleIndexReader::new(self.transport, self.config);
        let records = match reader.fetch_archive(address) {
            Ok(records) => records,
            Err(e) if e.is_parse() => {
                warn!(error = %e, "Archive page unreadable, reporting no cycles");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        Ok(records
            .iter()
            .filter_map(|record| {
                let date = record.start_date()?;
                let cycle = record.padded_cycle_number()?;
                (first..=last).contains(&date).then(|| {
                    FlattenedCycle::new(date, cycle, CycleSource::Catalog)
                        .with_serial(record.serial())
                })
            })
            .collect())
    }

    fn legacy(
        &self,
        address: &DeviceAddress,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<FlattenedCycle>, RequestError> {
        let reader = CycleIndexReader::new(self.transport, self.config);
        let mut cycles = Vec::new();

        for (year, month) in months_between(first, last) {
            let listed =
                match reader.list_month_sourced(address, FirmwareType::Legacy, year, month) {
                    Ok(listed) => listed,
                    Err(e) if e.is_parse() => {
                        warn!(year, month, error = %e, "Index unreadable, skipping month");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

            for day in &listed.days {
                let Some(date) = day
                    .day
                    .parse()
                    .ok()
                    .and_then(|d| NaiveDate::from_ymd_opt(year, month, d))
                else {
                    continue;
                };
                if !(first..=last).contains(&date) {
                    continue;
                }
                cycles.extend(
                    day.cycles
                        .iter()
                        .map(|c| FlattenedCycle::new(date, c.clone(), listed.source)),
                );
            }
        }
        Ok(cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ParsingMode;
    use crate::testing::{FakeLegacyDevice, FakeModernDevice, Rig, date};
    use crate::transport::{HttpResponse, TransportError};

    #[test]
    fn test_windows() {
        let today = date(2026, 3, 1);
        assert_eq!(TimeRange::Today.window(today), (today, today));
        assert_eq!(
            TimeRange::Yesterday.window(today),
            (date(2026, 2, 28), date(2026, 2, 28))
        );
        assert_eq!(
            TimeRange::Week.window(today),
            (date(2026, 2, 22), date(2026, 2, 28))
        );
        assert_eq!(
            TimeRange::Month.window(today),
            (date(2026, 1, 30), date(2026, 2, 28))
        );
    }

    #[test]
    fn test_range_names() {
        for range in [
            TimeRange::Today,
            TimeRange::Yesterday,
            TimeRange::Week,
            TimeRange::Month,
        ] {
            assert_eq!(range.to_string().parse::<TimeRange>(), Ok(range));
        }
        assert_eq!("WEEK".parse::<TimeRange>(), Ok(TimeRange::Week));
        assert!("fortnight".parse::<TimeRange>().is_err());
    }

    #[test]
    fn test_months_between_crosses_year() {
        assert_eq!(
            months_between(date(2025, 12, 20), date(2026, 1, 5)),
            vec![(2025, 12), (2026, 1)]
        );
    }

    #[test]
    fn test_modern_single_record() {
        let device = FakeModernDevice::new().record(date(2026, 1, 15), 152, "710125H00004");
        let rig = Rig::new(device.responder());
        let aggregator = RangeAggregator::new(&rig.transport, &rig.config);

        let cycles = aggregator
            .cycles_for_range_on(&rig.address, TimeRange::Today, date(2026, 1, 15))
            .unwrap();
        assert_eq!(cycles.len(), 1);
        let c = &cycles[0];
        assert_eq!(
            (c.year.as_str(), c.month.as_str(), c.day.as_str(), c.cycle_number.as_str()),
            ("2026", "01", "15", "00152")
        );
        assert_eq!(c.serial.as_deref(), Some("710125H00004"));
    }

    #[test]
    fn test_yesterday_excludes_today() {
        let today = date(2026, 1, 15);
        let device = FakeModernDevice::new()
            .record(date(2026, 1, 13), 150, "X1")
            .record(date(2026, 1, 14), 151, "X1")
            .record(today, 152, "X1")
            .record(today, 153, "X1");
        let rig = Rig::new(device.responder());
        let aggregator = RangeAggregator::new(&rig.transport, &rig.config);

        let yesterday = aggregator
            .cycles_for_range_on(&rig.address, TimeRange::Yesterday, today)
            .unwrap();
        assert_eq!(yesterday.len(), 1);
        assert!(yesterday.iter().all(|c| c.date != today));

        let week = aggregator
            .cycles_for_range_on(&rig.address, TimeRange::Week, today)
            .unwrap();
        let numbers: Vec<_> = week.iter().map(|c| c.cycle_number.as_str()).collect();
        assert_eq!(numbers, vec!["00150", "00151"]);
    }

    #[test]
    fn test_legacy_listing_scenario_sorted() {
        let device = FakeLegacyDevice::new()
            .skeleton_index(2026, &[1])
            .listing(
                "/archives/2026/01/",
                "S20260112_00131_X1.txt S20260105_00122_X1.txt S20260112_00129_X1.txt",
            );
        let rig = Rig::new(device.responder());
        let aggregator = RangeAggregator::new(&rig.transport, &rig.config);

        let cycles = aggregator
            .cycles_for_range_on(&rig.address, TimeRange::Month, date(2026, 1, 20))
            .unwrap();
        let got: Vec<_> = cycles
            .iter()
            .map(|c| (c.day.as_str(), c.cycle_number.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![("05", "00122"), ("12", "00129"), ("12", "00131")]
        );
    }

    #[test]
    fn test_unlearned_legacy_device_switches_to_lenient() {
        let device = FakeLegacyDevice::new()
            .cycle(121, date(2026, 1, 14))
            .cycle(122, date(2026, 1, 15));
        let rig = Rig::unlearned(device.responder());
        let aggregator = RangeAggregator::new(&rig.transport, &rig.config);

        let cycles = aggregator
            .cycles_for_range_on(&rig.address, TimeRange::Week, date(2026, 1, 20))
            .unwrap();
        let numbers: Vec<_> = cycles.iter().map(|c| c.cycle_number.as_str()).collect();
        assert_eq!(numbers, vec!["00121", "00122"]);

        assert_eq!(rig.caches.parsing_mode(&rig.address), ParsingMode::Lenient);
        assert_eq!(rig.caches.firmware(&rig.address), FirmwareType::Legacy);
        // Only the detection attempt went to the strict executor.
        assert_eq!(rig.strict.request_count(), 1);
        assert_eq!(rig.lenient.request_count(), 2);
    }

    #[test]
    fn test_legacy_window_spans_two_months() {
        let device = FakeLegacyDevice::new()
            .cycle(90, date(2025, 12, 20))
            .cycle(91, date(2025, 12, 31))
            .cycle(92, date(2026, 1, 2))
            .cycle(93, date(2026, 1, 3));
        let rig = Rig::new(device.responder());
        let aggregator = RangeAggregator::new(&rig.transport, &rig.config);

        let cycles = aggregator
            .cycles_for_range_on(&rig.address, TimeRange::Week, date(2026, 1, 3))
            .unwrap();
        let numbers: Vec<_> = cycles.iter().map(|c| c.cycle_number.as_str()).collect();
        assert_eq!(numbers, vec!["00091", "00092"]);
    }

    #[test]
    fn test_catalog_and_probe_agree() {
        let fill = |device: FakeLegacyDevice| {
            device
                .cycle(1000, date(2026, 2, 27))
                .cycle(1001, date(2026, 3, 2))
                .cycle(1002, date(2026, 3, 4))
        };
        // Week of Feb 26 .. Mar 4.
        let today = date(2026, 3, 5);

        let rig = Rig::new(fill(FakeLegacyDevice::new().full_index()).responder());
        let from_catalog = RangeAggregator::new(&rig.transport, &rig.config)
            .cycles_for_range_on(&rig.address, TimeRange::Week, today)
            .unwrap();

        let rig = Rig::new(fill(FakeLegacyDevice::new().skeleton_index(2026, &[2, 3])).responder());
        let from_probe = RangeAggregator::new(&rig.transport, &rig.config)
            .cycles_for_range_on(&rig.address, TimeRange::Week, today)
            .unwrap();

        assert_eq!(from_catalog.len(), 3);
        assert_eq!(from_catalog, from_probe);
        assert!(from_catalog.iter().all(|c| c.source == CycleSource::Catalog));
        assert!(from_probe.iter().all(|c| c.source == CycleSource::Probe));
    }

    #[test]
    fn test_unreadable_catalog_is_empty_but_unreachable_is_error() {
        let rig = Rig::new(|_, req| {
            Ok(match req.method {
                crate::transport::Method::Head => {
                    HttpResponse::new(200).with_header("Server", "nginx")
                }
                _ => HttpResponse::ok("<html>no catalog here</html>"),
            })
        });
        let cycles = RangeAggregator::new(&rig.transport, &rig.config)
            .cycles_for_range_on(&rig.address, TimeRange::Today, date(2026, 1, 15))
            .unwrap();
        assert!(cycles.is_empty());

        let rig = Rig::new(|addr, _| {
            Err(TransportError::ConnectionFailed {
                address: addr.to_string(),
                message: "no route to host".into(),
            })
        });
        let result = RangeAggregator::new(&rig.transport, &rig.config).cycles_for_range_on(
            &rig.address,
            TimeRange::Today,
            date(2026, 1, 15),
        );
        assert!(matches!(result, Err(RequestError::Transport(_))));
    }
}
