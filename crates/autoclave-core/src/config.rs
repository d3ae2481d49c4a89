//! Client configuration, loadable from TOML.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::*;

/// Bounds on numeric catalog recovery.
///
/// The defaults were tuned against real Legacy units, where every probe is a
/// slow round trip; raising them trades minutes of latency for completeness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeLimits {
    /// Cycle numbers tried before binary search.
    pub heuristic_seeds: Vec<u32>,
    /// Binary search covers `[1, search_upper_bound]`.
    pub search_upper_bound: u32,
    /// Binary search stops once `hi - lo` drops below this.
    pub narrow_bracket: u32,
    pub max_consecutive_misses: u32,
    pub max_backward_steps: u32,
    pub max_forward_steps: u32,
}

impl Default for ProbeLimits {
    fn default() -> Self {
        Self {
            heuristic_seeds: HEURISTIC_SEEDS.to_vec(),
            search_upper_bound: SEARCH_UPPER_BOUND,
            narrow_bracket: NARROW_BRACKET,
            max_consecutive_misses: MAX_CONSECUTIVE_MISSES,
            max_backward_steps: MAX_BACKWARD_STEPS,
            max_forward_steps: MAX_FORWARD_STEPS,
        }
    }
}

/// Configuration for an [`AutoclaveSession`](crate::session::AutoclaveSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeout for ordinary requests, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for the strict attempt while a parsing mode is unknown, in seconds.
    pub detection_timeout_secs: u64,
    /// Legacy telemetry reads get this many request timeouts.
    pub legacy_telemetry_timeout_factor: u32,
    /// On-device root of Modern cycle files.
    pub archive_base_path: String,
    /// Root under which Legacy firmware serves directory listings.
    pub legacy_listing_base_path: String,
    pub probe: ProbeLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            detection_timeout_secs: DETECTION_TIMEOUT.as_secs(),
            legacy_telemetry_timeout_factor: LEGACY_TELEMETRY_TIMEOUT_FACTOR,
            archive_base_path: DEFAULT_ARCHIVE_BASE.to_string(),
            legacy_listing_base_path: DEFAULT_ARCHIVE_BASE.to_string(),
            probe: ProbeLimits::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn detection_timeout(&self) -> Duration {
        Duration::from_secs(self.detection_timeout_secs)
    }

    pub fn legacy_telemetry_timeout(&self) -> Duration {
        self.request_timeout() * self.legacy_telemetry_timeout_factor.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.detection_timeout(), Duration::from_secs(3));
        assert_eq!(config.legacy_telemetry_timeout(), Duration::from_secs(30));
        assert_eq!(config.probe.max_consecutive_misses, 50);
        assert_eq!(config.probe.max_backward_steps, 500);
        assert_eq!(config.probe.max_forward_steps, 1000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            "request_timeout_secs = 20\n[probe]\nmax_consecutive_misses = 10\n",
        )
        .unwrap();
        assert_eq!(config.request_timeout_secs, 20);
        assert_eq!(config.detection_timeout_secs, 3);
        assert_eq!(config.probe.max_consecutive_misses, 10);
        assert_eq!(config.probe.search_upper_bound, 50_000);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autoclave.toml");

        let mut config = ClientConfig::default();
        config.archive_base_path = "/mnt/sd/archives".into();
        config.save_to_file(&path).unwrap();

        assert_eq!(ClientConfig::load_from_file(&path).unwrap(), config);
    }
}
