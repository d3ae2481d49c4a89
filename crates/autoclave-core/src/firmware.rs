//! Firmware dialect detection.
//!
//! Modern units run nginx; Legacy units run an MQX/Freescale web server
//! whose `HEAD /` occasionally hangs or resets. Anything inconclusive is
//! treated as Legacy, the dialect whose requests degrade most gracefully.

use tracing::{debug, instrument};

use crate::cache::FirmwareType;
use crate::device::DeviceAddress;
use crate::events::{ClassificationSource, DeviceEvent};
use crate::protocol::constants::{
    LEGACY_SERVER_TOKENS, MODERN_ARCHIVE_PATH, MODERN_SERVER_TOKENS, ROOT_PATH,
};
use crate::transport::{AdaptiveTransport, HttpRequest, TransportError};

/// Dialect implied by a `server` header value, if any.
pub fn firmware_from_server_header(server: &str) -> Option<FirmwareType> {
    let server = server.to_ascii_lowercase();
    if MODERN_SERVER_TOKENS.iter().any(|t| server.contains(t)) {
        Some(FirmwareType::Modern)
    } else if LEGACY_SERVER_TOKENS.iter().any(|t| server.contains(t)) {
        Some(FirmwareType::Legacy)
    } else {
        None
    }
}

pub struct FirmwareClassifier<'a> {
    transport: &'a AdaptiveTransport,
}

impl<'a> FirmwareClassifier<'a> {
    pub fn new(transport: &'a AdaptiveTransport) -> Self {
        Self { transport }
    }

    /// Resolve the dialect of `address`. Never fails; cached per device.
    #[instrument(level = "debug", skip(self), fields(address = %address))]
    pub fn classify(&self, address: &DeviceAddress) -> FirmwareType {
        let cached = self.transport.caches().firmware(address);
        if cached != FirmwareType::Unknown {
            return cached;
        }

        let (firmware, source) = match self.sniff(address) {
            Ok(found) => found,
            Err(e) => {
                debug!(error = %e, "Sniff failed, assuming Legacy");
                (FirmwareType::Legacy, ClassificationSource::Fallback)
            }
        };

        self.transport.caches().set_firmware(address, firmware);
        self.transport
            .observer()
            .on_event(&DeviceEvent::FirmwareClassified {
                address: address.clone(),
                firmware,
                source,
            });
        firmware
    }

    fn sniff(
        &self,
        address: &DeviceAddress,
    ) -> Result<(FirmwareType, ClassificationSource), TransportError> {
        let timeout = self.transport.detection_timeout();

        let root = self
            .transport
            .execute(address, &HttpRequest::head(ROOT_PATH), timeout)?;
        if let Some(firmware) = root.header("server").and_then(firmware_from_server_header) {
            return Ok((firmware, ClassificationSource::ServerHeader));
        }

        let archive = self
            .transport
            .execute(address, &HttpRequest::head(MODERN_ARCHIVE_PATH), timeout)?;
        if archive.is_success() {
            return Ok((FirmwareType::Modern, ClassificationSource::ArchiveProbe));
        }

        Ok((FirmwareType::Legacy, ClassificationSource::Fallback))
    }
}
