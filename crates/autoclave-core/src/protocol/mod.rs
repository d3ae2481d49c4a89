//! Protocol module - wire formats of the Modern and Legacy dialects.

pub mod catalog;
pub mod constants;
pub mod error;
pub mod flex;
pub mod identifier;
pub mod legacy;
pub mod modern;
pub mod telemetry;

pub use catalog::{CycleIndex, DayCycles, DayGrouper, MonthEntry, YearEntry};
pub use constants::*;
pub use error::ParseError;
pub use identifier::{
    CycleFileName, CycleIdentifier, IdentifierError, normalize_cycle_number, pad_cycle_number,
};
pub use telemetry::CycleTelemetry;
