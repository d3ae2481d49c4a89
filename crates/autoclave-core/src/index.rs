//! Cycle catalog retrieval.
//!
//! Modern devices embed their whole catalog in the archive page. Legacy
//! devices answer an index POST, but often with only the year/month skeleton;
//! for those months the day detail is recovered from directory listings, a
//! second index request, and finally numeric probing.

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::cache::FirmwareType;
use crate::config::ClientConfig;
use crate::device::{CycleSource, DeviceAddress};
use crate::error::RequestError;
use crate::events::{DeviceEvent, RecoveryStage};
use crate::prober::CatalogProber;
use crate::protocol::catalog::{CycleIndex, DayCycles, DayGrouper, MonthEntry, YearEntry};
use crate::protocol::constants::{LEGACY_CONTENT_TYPE, LEGACY_INDEX_PATH, MODERN_ARCHIVE_PATH};
use crate::protocol::identifier::{CycleFileName, days_in_month};
use crate::protocol::legacy::{IndexRequest, find_month, parse_index};
use crate::protocol::modern::{ArchiveRecord, group_month, parse_archive_page};
use crate::telemetry::TelemetryReader;
use crate::transport::{AdaptiveTransport, HttpRequest, HttpResponse};

/// Milliseconds since the epoch, used as a cache-busting query parameter.
pub(crate) fn cache_buster() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One month of cycles and how they were obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthListing {
    pub days: Vec<DayCycles>,
    pub source: CycleSource,
}

impl MonthListing {
    fn catalog(days: Vec<DayCycles>) -> Self {
        Self {
            days,
            source: CycleSource::Catalog,
        }
    }
}

pub struct CycleIndexReader<'a> {
    transport: &'a AdaptiveTransport,
    config: &'a ClientConfig,
}

impl<'a> CycleIndexReader<'a> {
    pub fn new(transport: &'a AdaptiveTransport, config: &'a ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Full year → month → day tree.
    ///
    /// Legacy months may come back without day detail; use
    /// [`list_month`](Self::list_month) to fill them in.
    #[instrument(level = "debug", skip(self), fields(address = %address))]
    pub fn list_all_years(
        &self,
        address: &DeviceAddress,
        firmware: FirmwareType,
        today: NaiveDate,
    ) -> Result<CycleIndex, RequestError> {
        match firmware {
            FirmwareType::Modern => Ok(index_from_records(&self.fetch_archive(address)?)),
            FirmwareType::Legacy | FirmwareType::Unknown => {
                let request = IndexRequest::new(
                    today.year().to_string(),
                    &today.month().to_string(),
                    &today.day().to_string(),
                );
                self.post_index(address, &request)
            }
        }
    }

    /// Cycles of one month, grouped by day.
    pub fn list_month(
        &self,
        address: &DeviceAddress,
        firmware: FirmwareType,
        year: i32,
        month: u32,
    ) -> Result<Vec<DayCycles>, RequestError> {
        self.list_month_sourced(address, firmware, year, month)
            .map(|listed| listed.days)
    }

    /// Like [`list_month`](Self::list_month), also reporting whether the
    /// days came from the device's catalog or from probing.
    #[instrument(level = "debug", skip(self), fields(address = %address))]
    pub fn list_month_sourced(
        &self,
        address: &DeviceAddress,
        firmware: FirmwareType,
        year: i32,
        month: u32,
    ) -> Result<MonthListing, RequestError> {
        match firmware {
            FirmwareType::Modern => Ok(MonthListing::catalog(group_month(
                &self.fetch_archive(address)?,
                year,
                month,
            ))),
            FirmwareType::Legacy | FirmwareType::Unknown => self.legacy_month(address, year, month),
        }
    }

    /// Fetch and decode the Modern archive page.
    pub fn fetch_archive(&self, address: &DeviceAddress) -> Result<Vec<ArchiveRecord>, RequestError> {
        let request = HttpRequest::get(MODERN_ARCHIVE_PATH).header("Accept", "text/html");
        let response = self.send(address, &request)?;
        let records = parse_archive_page(&response.text())?;
        debug!(records = records.len(), "Archive page decoded");
        Ok(records)
    }

    fn post_index(
        &self,
        address: &DeviceAddress,
        body: &IndexRequest,
    ) -> Result<CycleIndex, RequestError> {
        let path = format!("{}?{}", LEGACY_INDEX_PATH, cache_buster());
        let request = HttpRequest::post_json(path, LEGACY_CONTENT_TYPE, body)?;
        let response = self.send(address, &request)?;
        Ok(parse_index(&response.text())?)
    }

    fn send(
        &self,
        address: &DeviceAddress,
        request: &HttpRequest,
    ) -> Result<HttpResponse, RequestError> {
        let response = self
            .transport
            .execute(address, request, self.config.request_timeout())?;
        if !response.is_success() {
            return Err(RequestError::Status {
                path: request.path.clone(),
                status: response.status,
            });
        }
        Ok(response)
    }

    fn legacy_month(
        &self,
        address: &DeviceAddress,
        year: i32,
        month: u32,
    ) -> Result<MonthListing, RequestError> {
        let (year_s, month_s) = (year.to_string(), format!("{:02}", month));
        let index = self.post_index(address, &IndexRequest::new(year_s.as_str(), &month_s, "01"))?;

        match find_month(&index, &year_s, &month_s) {
            None => {
                debug!(year, month, "Month absent from index");
                return Ok(MonthListing::catalog(Vec::new()));
            }
            Some(MonthEntry {
                days: Some(days), ..
            }) => return Ok(MonthListing::catalog(days.clone())),
            Some(_) => {}
        }

        self.stage(address, RecoveryStage::MonthListing);
        let answered = match self.month_listing(address, year, month) {
            Ok(days) if !days.is_empty() => return Ok(MonthListing::catalog(days)),
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Month listing unavailable");
                matches!(e, RequestError::Status { .. })
            }
        };

        if answered {
            self.stage(address, RecoveryStage::DayListings);
            let days = self.day_listings(address, year, month);
            if !days.is_empty() {
                return Ok(MonthListing::catalog(days));
            }
        }

        self.stage(address, RecoveryStage::IndexRetry);
        let last_day = days_in_month(year, month).to_string();
        match self.post_index(address, &IndexRequest::new(year_s.as_str(), &month_s, &last_day)) {
            Ok(index) => {
                if let Some(days) = find_month(&index, &year_s, &month_s).and_then(|m| m.days.clone())
                {
                    return Ok(MonthListing::catalog(days));
                }
            }
            Err(e) => warn!(error = %e, "Second index request failed"),
        }

        self.stage(address, RecoveryStage::Probing);
        let telemetry = TelemetryReader::new(self.transport, self.config);
        let days = CatalogProber::new(&telemetry, &self.config.probe).discover_month(
            address, year, month,
        )?;
        info!(days = days.len(), "Catalog recovered by probing");
        Ok(MonthListing {
            days,
            source: CycleSource::Probe,
        })
    }

    fn stage(&self, address: &DeviceAddress, stage: RecoveryStage) {
        self.transport
            .observer()
            .on_event(&DeviceEvent::CatalogFallback {
                address: address.clone(),
                stage,
            });
    }

    fn listing_path(&self, year: i32, month: u32, day: Option<u32>) -> String {
        let base = self.config.legacy_listing_base_path.trim_end_matches('/');
        match day {
            Some(day) => format!("{}/{}/{:02}/{:02}/", base, year, month, day),
            None => format!("{}/{}/{:02}/", base, year, month),
        }
    }

    fn month_listing(
        &self,
        address: &DeviceAddress,
        year: i32,
        month: u32,
    ) -> Result<Vec<DayCycles>, RequestError> {
        let response = self.send(address, &HttpRequest::get(self.listing_path(year, month, None)))?;
        let mut grouper = DayGrouper::new();
        collect_listing(&response.text(), year, month, &mut grouper);
        Ok(grouper.finish())
    }

    /// One listing per day; stops early if the device stops answering.
    fn day_listings(&self, address: &DeviceAddress, year: i32, month: u32) -> Vec<DayCycles> {
        let mut grouper = DayGrouper::new();
        for day in 1..=days_in_month(year, month) {
            let request = HttpRequest::get(self.listing_path(year, month, Some(day)));
            match self.send(address, &request) {
                Ok(response) => collect_listing(&response.text(), year, month, &mut grouper),
                Err(RequestError::Status { .. }) => {}
                Err(e) => {
                    debug!(day, error = %e, "Day listing failed, abandoning listings");
                    break;
                }
            }
        }
        grouper.finish()
    }
}

/// Add every cycle file in `listing` dated inside `(year, month)`.
fn collect_listing(listing: &str, year: i32, month: u32, grouper: &mut DayGrouper) {
    for file in CycleFileName::scan(listing) {
        if file.date.year() == year && file.date.month() == month {
            grouper.insert(file.date, file.cycle_number);
        }
    }
}

/// Build the catalog tree from Modern archive records.
pub fn index_from_records(records: &[ArchiveRecord]) -> CycleIndex {
    use std::collections::BTreeMap;

    let mut tree: BTreeMap<i32, BTreeMap<u32, DayGrouper>> = BTreeMap::new();
    for record in records {
        let (Some(date), Some(cycle)) = (record.start_date(), record.padded_cycle_number()) else {
            continue;
        };
        tree.entry(date.year())
            .or_default()
            .entry(date.month())
            .or_default()
            .insert(date, cycle);
    }

    tree.into_iter()
        .map(|(year, months)| YearEntry {
            year: year.to_string(),
            months: months
                .into_iter()
                .map(|(month, grouper)| MonthEntry {
                    month: format!("{:02}", month),
                    days: Some(grouper.finish()),
                })
                .collect(),
        })
        .collect()
}
