//! Per-cycle telemetry retrieval.

use tracing::{debug, instrument};

use crate::cache::FirmwareType;
use crate::config::ClientConfig;
use crate::device::DeviceAddress;
use crate::error::RequestError;
use crate::index::{CycleIndexReader, cache_buster};
use crate::protocol::constants::{
    LEGACY_CONTENT_TYPE, LEGACY_CYCLE_DATA_PATH, MODERN_CYCLE_DATA_PATH,
};
use crate::protocol::identifier::{CycleIdentifier, IdentifierError, pad_cycle_number};
use crate::protocol::legacy::CycleDataRequest;
use crate::protocol::telemetry::CycleTelemetry;
use crate::transport::{AdaptiveTransport, HttpRequest, HttpResponse};

pub struct TelemetryReader<'a> {
    transport: &'a AdaptiveTransport,
    config: &'a ClientConfig,
}

impl<'a> TelemetryReader<'a> {
    pub fn new(transport: &'a AdaptiveTransport, config: &'a ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &'a AdaptiveTransport {
        self.transport
    }

    /// Telemetry for one cycle. `Ok(None)` when the device reports the cycle
    /// does not exist.
    #[instrument(level = "debug", skip(self), fields(address = %address, cycle = %identifier))]
    pub fn get_telemetry(
        &self,
        address: &DeviceAddress,
        firmware: FirmwareType,
        identifier: &CycleIdentifier,
    ) -> Result<Option<CycleTelemetry>, RequestError> {
        match firmware {
            FirmwareType::Modern => self.modern(address, identifier),
            FirmwareType::Legacy | FirmwareType::Unknown => self.legacy(
                address,
                CycleDataRequest {
                    year: identifier.year.clone(),
                    month: identifier.month.clone(),
                    day: identifier.day.clone(),
                    cycle: identifier.cycle_number().to_string(),
                },
            ),
        }
    }

    /// Legacy lookup by bare cycle number, with placeholder date parts.
    pub fn probe_legacy(
        &self,
        address: &DeviceAddress,
        year: &str,
        month: &str,
        day: &str,
        cycle: u32,
    ) -> Result<Option<CycleTelemetry>, RequestError> {
        self.legacy(
            address,
            CycleDataRequest {
                year: year.to_string(),
                month: month.to_string(),
                day: day.to_string(),
                cycle: pad_cycle_number(cycle),
            },
        )
    }

    fn legacy(
        &self,
        address: &DeviceAddress,
        body: CycleDataRequest,
    ) -> Result<Option<CycleTelemetry>, RequestError> {
        let path = format!("{}?{}", LEGACY_CYCLE_DATA_PATH, cache_buster());
        let request = HttpRequest::post_json(path, LEGACY_CONTENT_TYPE, &body)?;
        let response =
            self.transport
                .execute(address, &request, self.config.legacy_telemetry_timeout())?;
        decode(&request, &response)
    }

    fn modern(
        &self,
        address: &DeviceAddress,
        identifier: &CycleIdentifier,
    ) -> Result<Option<CycleTelemetry>, RequestError> {
        let serial = match &identifier.serial {
            Some(serial) => serial.clone(),
            None => self.resolve_serial(address, identifier)?,
        };
        let file = identifier.file_path(&self.config.archive_base_path, &serial, "cpt");
        let path = format!(
            "{}?filename={}&t={}",
            MODERN_CYCLE_DATA_PATH,
            file,
            cache_buster()
        );

        let request = HttpRequest::get(path);
        let response = self
            .transport
            .execute(address, &request, self.config.request_timeout())?;
        decode(&request, &response)
    }

    /// Find the serial by re-reading the archive catalog.
    fn resolve_serial(
        &self,
        address: &DeviceAddress,
        identifier: &CycleIdentifier,
    ) -> Result<String, RequestError> {
        let number: u32 = identifier
            .cycle_number()
            .parse()
            .map_err(|_| IdentifierError::CycleNumber(identifier.cycle_number().to_string()))?;
        let records = CycleIndexReader::new(self.transport, self.config).fetch_archive(address)?;
        let same_day = format!("S{}{}{}", identifier.year, identifier.month, identifier.day);

        let mut matches = records.iter().filter(|r| r.names_cycle(number));
        let first = matches.clone().next();
        matches
            .find(|r| r.file_name.starts_with(&same_day))
            .or(first)
            .and_then(|r| r.serial())
            .inspect(|serial| debug!(serial = %serial, "Resolved serial from archive"))
            .ok_or_else(|| RequestError::SerialNotFound {
                cycle: identifier.cycle_number().to_string(),
            })
    }
}

fn decode(
    request: &HttpRequest,
    response: &HttpResponse,
) -> Result<Option<CycleTelemetry>, RequestError> {
    if !response.is_success() {
        return Err(RequestError::Status {
            path: request.path.clone(),
            status: response.status,
        });
    }
    let telemetry = CycleTelemetry::from_json(&response.text())?;
    Ok(telemetry.succeeded.then_some(telemetry))
}
