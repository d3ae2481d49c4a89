//! Event system for UI decoupling.
//!
//! Lets a front end follow detection and discovery progress without
//! coupling to the engine internals.

use std::fmt;

use chrono::NaiveDate;

use crate::cache::{FirmwareType, ParsingMode};
use crate::device::DeviceAddress;

/// Evidence a firmware classification was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    /// `server` header of `HEAD /`.
    ServerHeader,
    /// Modern-only archive endpoint answered.
    ArchiveProbe,
    /// Nothing conclusive; defaulted to Legacy.
    Fallback,
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationSource::ServerHeader => write!(f, "server header"),
            ClassificationSource::ArchiveProbe => write!(f, "archive probe"),
            ClassificationSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// Stage of the Legacy catalog fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    MonthListing,
    DayListings,
    IndexRetry,
    Probing,
}

impl fmt::Display for RecoveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryStage::MonthListing => write!(f, "month listing"),
            RecoveryStage::DayListings => write!(f, "day listings"),
            RecoveryStage::IndexRetry => write!(f, "index retry"),
            RecoveryStage::Probing => write!(f, "numeric probing"),
        }
    }
}

/// Events emitted by the engine.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// Parsing mode resolved for a device.
    ParsingModeLearned {
        address: DeviceAddress,
        mode: ParsingMode,
    },
    /// Firmware dialect resolved for a device.
    FirmwareClassified {
        address: DeviceAddress,
        firmware: FirmwareType,
        source: ClassificationSource,
    },
    /// Legacy index had no day detail; trying the next recovery stage.
    CatalogFallback {
        address: DeviceAddress,
        stage: RecoveryStage,
    },
    /// A probed cycle number returned telemetry.
    ProbeHit {
        cycle: u32,
        date: NaiveDate,
    },
    /// A probed cycle number returned nothing.
    ProbeMiss { cycle: u32 },
    /// A new highest valid cycle number was confirmed.
    FrontierAdvanced {
        address: DeviceAddress,
        cycle: u32,
    },
    /// Discovery finished.
    ProbeFinished {
        address: DeviceAddress,
        found: usize,
        requests: u32,
    },
}

/// Observer trait for receiving engine events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait DeviceObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &DeviceEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DeviceObserver for NullObserver {
    fn on_event(&self, _event: &DeviceEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DeviceObserver for TracingObserver {
    fn on_event(&self, event: &DeviceEvent) {
        match event {
            DeviceEvent::ParsingModeLearned { address, mode } => {
                tracing::info!(address = %address, mode = %mode, "Parsing mode learned");
            }
            DeviceEvent::FirmwareClassified {
                address,
                firmware,
                source,
            } => {
                tracing::info!(address = %address, firmware = %firmware, via = %source, "Firmware classified");
            }
            DeviceEvent::CatalogFallback { address, stage } => {
                tracing::info!(address = %address, stage = %stage, "Index lacks day detail, falling back");
            }
            DeviceEvent::ProbeHit { cycle, date } => {
                tracing::debug!(cycle = cycle, date = %date, "Probe hit");
            }
            DeviceEvent::ProbeMiss { cycle } => {
                tracing::trace!(cycle = cycle, "Probe miss");
            }
            DeviceEvent::FrontierAdvanced { address, cycle } => {
                tracing::debug!(address = %address, cycle = cycle, "Last valid cycle advanced");
            }
            DeviceEvent::ProbeFinished {
                address,
                found,
                requests,
            } => {
                tracing::info!(address = %address, found = found, requests = requests, "Probing finished");
            }
        }
    }
}
