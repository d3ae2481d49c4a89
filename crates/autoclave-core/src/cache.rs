//! Per-device learned state.
//!
//! Three process-wide tables keyed by [`DeviceAddress`]: parsing mode,
//! firmware dialect and the highest cycle number ever confirmed. Entries are
//! created on first contact, replaced whole, and never evicted. The tables
//! grow with the number of distinct devices contacted, which is bounded by
//! the size of a clinic network.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::device::DeviceAddress;

/// Which executor a device's responses need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParsingMode {
    #[default]
    Unlearned,
    Standard,
    Lenient,
}

impl fmt::Display for ParsingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsingMode::Unlearned => write!(f, "unlearned"),
            ParsingMode::Standard => write!(f, "standard"),
            ParsingMode::Lenient => write!(f, "lenient"),
        }
    }
}

/// API dialect spoken by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmwareType {
    #[default]
    Unknown,
    /// nginx-served archive page with embedded catalog.
    Modern,
    /// MQX/Freescale CGI endpoints taking JSON POSTs.
    Legacy,
}

impl fmt::Display for FirmwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareType::Unknown => write!(f, "Unknown"),
            FirmwareType::Modern => write!(f, "Modern"),
            FirmwareType::Legacy => write!(f, "Legacy"),
        }
    }
}

/// The three learned-state tables.
#[derive(Debug, Default)]
pub struct DeviceCaches {
    parsing_modes: RwLock<HashMap<DeviceAddress, ParsingMode>>,
    firmware: RwLock<HashMap<DeviceAddress, FirmwareType>>,
    last_valid_cycle: RwLock<HashMap<DeviceAddress, u32>>,
}

impl DeviceCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// The instance shared by every session in this process.
    pub fn global() -> Arc<DeviceCaches> {
        static GLOBAL: OnceLock<Arc<DeviceCaches>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(DeviceCaches::new())).clone()
    }

    pub fn parsing_mode(&self, address: &DeviceAddress) -> ParsingMode {
        self.parsing_modes
            .read()
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_parsing_mode(&self, address: &DeviceAddress, mode: ParsingMode) {
        self.parsing_modes.write().insert(address.clone(), mode);
    }

    pub fn firmware(&self, address: &DeviceAddress) -> FirmwareType {
        self.firmware
            .read()
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_firmware(&self, address: &DeviceAddress, firmware: FirmwareType) {
        self.firmware.write().insert(address.clone(), firmware);
    }

    pub fn last_valid_cycle(&self, address: &DeviceAddress) -> Option<u32> {
        self.last_valid_cycle.read().get(address).copied()
    }

    /// Raise the high-water mark. Returns true if `cycle` is a new maximum.
    pub fn record_valid_cycle(&self, address: &DeviceAddress, cycle: u32) -> bool {
        let mut table = self.last_valid_cycle.write();
        match table.get(address) {
            Some(&known) if known >= cycle => false,
            _ => {
                table.insert(address.clone(), cycle);
                true
            }
        }
    }

    /// Drop everything learned about one device.
    ///
    /// Never called by the engine itself; for callers that know a device was
    /// replaced or re-flashed.
    pub fn forget(&self, address: &DeviceAddress) {
        self.parsing_modes.write().remove(address);
        self.firmware.write().remove(address);
        self.last_valid_cycle.write().remove(address);
    }
}
