//! Autoclave session - the public operation surface.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cache::{DeviceCaches, FirmwareType};
use crate::config::ClientConfig;
use crate::cycle_log::{ParsedCycleLog, parse_cycle_log};
use crate::device::{DeviceAddress, FlattenedCycle};
use crate::error::RequestError;
use crate::events::{DeviceObserver, TracingObserver};
use crate::firmware::FirmwareClassifier;
use crate::index::CycleIndexReader;
use crate::protocol::{CycleIdentifier, CycleIndex, CycleTelemetry};
use crate::range::{RangeAggregator, TimeRange};
use crate::telemetry::TelemetryReader;
use crate::transport::{
    AdaptiveTransport, LenientExecutor, RequestExecutor, StrictExecutor, TransportError,
};

/// Outcome of [`AutoclaveSession::test_connection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub firmware: FirmwareType,
    /// Model name printed in the most recent cycle log, when one was readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Entry point for talking to autoclaves.
///
/// Learned per-device state lives in a [`DeviceCaches`] shared with every
/// other session over the same instance (the process-wide one by default),
/// so a session is cheap to create. Requests are issued one at a time; use
/// separate threads for separate devices.
pub struct AutoclaveSession {
    config: ClientConfig,
    transport: AdaptiveTransport,
}

impl AutoclaveSession {
    /// Real executors, process-wide caches, events logged through tracing.
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    pub fn with_observer(
        config: ClientConfig,
        observer: Arc<dyn DeviceObserver>,
    ) -> Result<Self, TransportError> {
        Ok(Self::with_executors(
            config,
            Box::new(StrictExecutor::new()?),
            Box::new(LenientExecutor::new()),
            DeviceCaches::global(),
            observer,
        ))
    }

    /// Fully injected session.
    pub fn with_executors(
        config: ClientConfig,
        strict: Box<dyn RequestExecutor>,
        lenient: Box<dyn RequestExecutor>,
        caches: Arc<DeviceCaches>,
        observer: Arc<dyn DeviceObserver>,
    ) -> Self {
        let transport = AdaptiveTransport::new(strict, lenient, caches, observer)
            .with_detection_timeout(config.detection_timeout());
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn caches(&self) -> &DeviceCaches {
        self.transport.caches()
    }

    /// Firmware dialect of `address`, sniffing it on first contact.
    pub fn firmware(&self, address: &DeviceAddress) -> FirmwareType {
        FirmwareClassifier::new(&self.transport).classify(address)
    }

    /// Check that the device answers its catalog endpoint and, if possible,
    /// read its model name from the latest cycle.
    #[instrument(skip(self), fields(address = %address))]
    pub fn test_connection(&self, address: &DeviceAddress) -> ConnectionReport {
        let firmware = self.firmware(address);
        let latest = match self.latest_cycle(address, firmware) {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "Connection test failed");
                return ConnectionReport {
                    success: false,
                    firmware,
                    model: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let model = latest.and_then(|identifier| {
            match self.get_telemetry(address, &identifier) {
                Ok(telemetry) => telemetry
                    .and_then(|t| parse_cycle_log(&t.log))
                    .map(|log| log.model),
                Err(e) => {
                    debug!(error = %e, cycle = %identifier, "Model lookup failed");
                    None
                }
            }
        });

        info!(firmware = %firmware, model = ?model, "Device reachable");
        ConnectionReport {
            success: true,
            firmware,
            model,
            error: None,
        }
    }

    /// Most recent cycle in the device catalog, if any.
    fn latest_cycle(
        &self,
        address: &DeviceAddress,
        firmware: FirmwareType,
    ) -> Result<Option<CycleIdentifier>, RequestError> {
        let reader = CycleIndexReader::new(&self.transport, &self.config);
        match firmware {
            FirmwareType::Modern => {
                let records = reader.fetch_archive(address)?;
                Ok(records
                    .iter()
                    .max_by_key(|r| r.cycle_start_time)
                    .and_then(|r| {
                        let identifier = CycleIdentifier::from_date(
                            r.start_date()?,
                            &r.padded_cycle_number()?,
                        )
                        .ok()?;
                        Some(match r.serial() {
                            Some(serial) => identifier.with_serial(serial),
                            None => identifier,
                        })
                    }))
            }
            FirmwareType::Legacy | FirmwareType::Unknown => {
                let index = reader.list_all_years(address, firmware, Local::now().date_naive())?;
                Ok(latest_in_index(&index))
            }
        }
    }

    /// Cycles on the device dated inside `range`.
    pub fn cycles_for_range(
        &self,
        address: &DeviceAddress,
        range: TimeRange,
    ) -> Result<Vec<FlattenedCycle>, RequestError> {
        RangeAggregator::new(&self.transport, &self.config).cycles_for_range(address, range)
    }

    /// Same as [`cycles_for_range`](Self::cycles_for_range) with an explicit current date.
    pub fn cycles_for_range_on(
        &self,
        address: &DeviceAddress,
        range: TimeRange,
        today: NaiveDate,
    ) -> Result<Vec<FlattenedCycle>, RequestError> {
        RangeAggregator::new(&self.transport, &self.config).cycles_for_range_on(
            address, range, today,
        )
    }

    /// Full catalog tree. Legacy months may lack day detail; an unreadable
    /// catalog is empty.
    pub fn list_all_years(&self, address: &DeviceAddress) -> Result<CycleIndex, RequestError> {
        let firmware = self.firmware(address);
        match CycleIndexReader::new(&self.transport, &self.config).list_all_years(
            address,
            firmware,
            Local::now().date_naive(),
        ) {
            Err(e) if e.is_parse() => {
                warn!(address = %address, error = %e, "Catalog unreadable, treating as empty");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Telemetry for one cycle; `Ok(None)` if the device does not have it or
    /// sent something undecodable.
    pub fn get_telemetry(
        &self,
        address: &DeviceAddress,
        identifier: &CycleIdentifier,
    ) -> Result<Option<CycleTelemetry>, RequestError> {
        let firmware = self.firmware(address);
        match TelemetryReader::new(&self.transport, &self.config).get_telemetry(
            address, firmware, identifier,
        ) {
            Err(e) if e.is_parse() => {
                warn!(error = %e, cycle = %identifier, "Telemetry unreadable");
                Ok(None)
            }
            other => other,
        }
    }

    pub fn parse_log(&self, text: &str) -> Option<ParsedCycleLog> {
        parse_cycle_log(text)
    }
}

/// Highest (year, month, day, cycle) present in an index with day detail.
fn latest_in_index(index: &CycleIndex) -> Option<CycleIdentifier> {
    index
        .iter()
        .flat_map(|y| {
            y.months.iter().flat_map(move |m| {
                m.days.iter().flatten().flat_map(move |d| {
                    d.cycles
                        .iter()
                        .map(move |c| (y.year.as_str(), m.month.as_str(), d.day.as_str(), c.as_str()))
                })
            })
        })
        .max()
        .and_then(|(year, month, day, cycle)| CycleIdentifier::new(year, month, day, cycle).ok())
}
