//! Autoclave-Core: cycle retrieval for networked autoclaves.
//!
//! Two firmware generations expose incompatible HTTP dialects. Modern units
//! (nginx) embed their whole cycle catalog in one page; Legacy units (MQX)
//! answer JSON POSTs, often with framing a strict HTTP parser rejects and
//! with catalogs missing their day detail. This crate hides both behind one
//! "cycles in a date range" operation.
//!
//! # Architecture
//!
//! - **Transport**: strict (reqwest) and lenient (raw TCP) executors, and the
//!   adaptive layer that learns which one each device needs
//! - **Protocol**: endpoints, payloads and file naming of both dialects
//! - **Firmware**: dialect detection
//! - **Index / Telemetry**: catalog and per-cycle reads
//! - **Prober**: catalog recovery by numeric probing
//! - **Cycle log**: structured fields from the printed cycle log
//! - **Range**: date-range aggregation
//! - **Events**: observer pattern for UI decoupling
//! - **Session**: high-level facade
//!
//! # Example
//!
//! ```no_run
//! use autoclave_core::{AutoclaveSession, ClientConfig, TimeRange};
//!
//! let session = AutoclaveSession::new(ClientConfig::default()).expect("HTTP client");
//! let address = "192.168.1.40".parse().expect("address");
//! for cycle in session.cycles_for_range(&address, TimeRange::Week).expect("cycles") {
//!     println!("{} {}", cycle.date, cycle.cycle_number);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod cycle_log;
pub mod device;
pub mod error;
pub mod events;
pub mod firmware;
pub mod index;
pub mod prober;
pub mod protocol;
pub mod range;
pub mod session;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use cache::{DeviceCaches, FirmwareType, ParsingMode};
pub use config::{ClientConfig, ProbeLimits};
pub use cycle_log::{ParsedCycleLog, SteriValues, parse_cycle_log};
pub use device::{AddressError, CycleSource, DeviceAddress, FlattenedCycle};
pub use error::RequestError;
pub use events::{DeviceEvent, DeviceObserver, NullObserver, TracingObserver};
pub use protocol::{
    CycleIdentifier, CycleIndex, CycleTelemetry, DayCycles, ParseError, normalize_cycle_number,
};
pub use range::{TimeRange, UnknownRange};
pub use session::{AutoclaveSession, ConnectionReport};
pub use transport::{MockExecutor, RequestExecutor, TransportError};
