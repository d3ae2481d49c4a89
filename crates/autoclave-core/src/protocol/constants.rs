//! Wire constants shared by both autoclave dialects.
//!
//! Endpoints and limits were established against real Modern (nginx) and
//! Legacy (MQX/Freescale) units.

use std::time::Duration;

// ============================================================================
// Endpoints
// ============================================================================

/// Landing page, used for the firmware sniff.
pub const ROOT_PATH: &str = "/";

/// Modern archive page; also the Modern-only existence probe.
pub const MODERN_ARCHIVE_PATH: &str = "/us/archives.php";
/// Modern telemetry endpoint (`?filename=<cpt path>&t=<ms>`).
pub const MODERN_CYCLE_DATA_PATH: &str = "/data/cycleData.php";

/// Legacy catalog index (`?<ms>`).
pub const LEGACY_INDEX_PATH: &str = "/data/cycles.cgi";
/// Legacy telemetry endpoint (`?<ms>`).
pub const LEGACY_CYCLE_DATA_PATH: &str = "/data/cycleData.cgi";

/// Legacy firmware ignores POST bodies sent with any other content type.
pub const LEGACY_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Marker preceding the JSON array embedded in the Modern archive page.
pub const CYCLES_INFO_MARKER: &str = "cyclesInfo";

/// Default on-device root of cycle files.
pub const DEFAULT_ARCHIVE_BASE: &str = "/archives";

// ============================================================================
// Server header fingerprints
// ============================================================================

pub const MODERN_SERVER_TOKENS: &[&str] = &["nginx"];
pub const LEGACY_SERVER_TOKENS: &[&str] = &["mqx", "freescale"];

// ============================================================================
// Timeouts
// ============================================================================

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Strict-parser attempt while a device's parsing mode is unknown.
pub const DETECTION_TIMEOUT: Duration = Duration::from_secs(3);
/// Legacy telemetry reads take this many request timeouts.
pub const LEGACY_TELEMETRY_TIMEOUT_FACTOR: u32 = 2;

// ============================================================================
// Cycle numbering
// ============================================================================

/// Cycle numbers are always rendered with this many digits.
pub const CYCLE_NUMBER_WIDTH: usize = 5;

/// Placeholder day used when probing a cycle whose date is unknown.
pub const PLACEHOLDER_DAY: &str = "01";

// ============================================================================
// Probe limits
// ============================================================================

/// Tried before any binary search (common operational ranges).
pub const HEURISTIC_SEEDS: &[u32] = &[1000, 1500, 2000, 500, 3000, 5000, 250, 100];
/// Upper bound of the binary search range `[1, SEARCH_UPPER_BOUND]`.
pub const SEARCH_UPPER_BOUND: u32 = 50_000;
/// Binary search stops once the bracket is narrower than this.
pub const NARROW_BRACKET: u32 = 8;
/// A walk stops after this many consecutive empty cycle numbers.
pub const MAX_CONSECUTIVE_MISSES: u32 = 50;
pub const MAX_BACKWARD_STEPS: u32 = 500;
pub const MAX_FORWARD_STEPS: u32 = 1000;
