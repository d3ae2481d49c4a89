//! Device addressing and the uniform cycle record handed to callers.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default HTTP port used when an address omits one.
pub const DEFAULT_PORT: u16 = 80;

/// Host and port of one physical autoclave.
///
/// Used as the key for every piece of learned per-device state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL for the strict executor, e.g. `http://10.0.0.5:80`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("Empty device address")]
    Empty,

    #[error("Invalid port in address '{0}'")]
    InvalidPort(String),
}

impl FromStr for DeviceAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("http://").unwrap_or(s).trim_end_matches('/');
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        match s.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(AddressError::Empty);
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| AddressError::InvalidPort(s.to_string()))?;
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }
}

/// Where a flattened cycle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleSource {
    /// Listed by the device's own catalog (archive page, index or directory listing).
    Catalog,
    /// Recovered by numeric probing.
    Probe,
}

/// One sterilization run, in the shape every dialect is reduced to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenedCycle {
    pub year: String,
    pub month: String,
    pub day: String,
    /// Five-digit, zero-padded.
    pub cycle_number: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    pub source: CycleSource,
}

impl FlattenedCycle {
    pub fn new(date: NaiveDate, cycle_number: String, source: CycleSource) -> Self {
        Self {
            year: date.format("%Y").to_string(),
            month: date.format("%m").to_string(),
            day: date.format("%d").to_string(),
            cycle_number,
            date,
            serial: None,
            source,
        }
    }

    pub fn with_serial(mut self, serial: Option<String>) -> Self {
        self.serial = serial;
        self
    }
}

/// Provenance is not part of a cycle's identity.
impl PartialEq for FlattenedCycle {
    fn eq(&self, other: &Self) -> bool {
        self.year == other.year
            && self.month == other.month
            && self.day == other.day
            && self.cycle_number == other.cycle_number
            && self.date == other.date
            && self.serial == other.serial
    }
}

impl Eq for FlattenedCycle {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_with_port() {
        let addr: DeviceAddress = "192.168.1.40:8080".parse().unwrap();
        assert_eq!(addr.host, "192.168.1.40");
        assert_eq!(addr.port, 8080);
        assert_eq!(addr.to_string(), "192.168.1.40:8080");
    }

    #[test]
    fn test_parse_address_defaults() {
        let addr: DeviceAddress = "http://autoclave.local/".parse().unwrap();
        assert_eq!(addr, DeviceAddress::new("autoclave.local", DEFAULT_PORT));
        assert_eq!(addr.base_url(), "http://autoclave.local:80");
    }

    #[test]
    fn test_parse_address_errors() {
        assert_eq!("".parse::<DeviceAddress>(), Err(AddressError::Empty));
        assert!(matches!(
            "host:http".parse::<DeviceAddress>(),
            Err(AddressError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_flattened_cycle_ignores_source() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let a = FlattenedCycle::new(date, "00152".into(), CycleSource::Catalog);
        let b = FlattenedCycle::new(date, "00152".into(), CycleSource::Probe);
        assert_eq!(a, b);
        assert_eq!(a.year, "2026");
        assert_eq!(a.month, "01");
        assert_eq!(a.day, "15");
    }
}
