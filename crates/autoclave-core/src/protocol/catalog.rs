//! Catalog tree shared by indexed, listed and probed results.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Cycles recorded on one day of a month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCycles {
    /// Two-digit day of month.
    pub day: String,
    /// Five-digit cycle numbers, ascending.
    pub cycles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthEntry {
    pub month: String,
    /// `None` when the device only returned the year/month skeleton.
    pub days: Option<Vec<DayCycles>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearEntry {
    pub year: String,
    pub months: Vec<MonthEntry>,
}

/// year → months → optional days → cycle numbers.
pub type CycleIndex = Vec<YearEntry>;

/// Collects (date, cycle) pairs into day buckets.
///
/// Days come out ascending; cycle numbers are sorted and de-duplicated
/// within each day.
#[derive(Debug, Default)]
pub struct DayGrouper {
    days: BTreeMap<NaiveDate, Vec<String>>,
}

impl DayGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, cycle_number: String) {
        self.days.entry(date).or_default().push(cycle_number);
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn finish(self) -> Vec<DayCycles> {
        self.days
            .into_iter()
            .map(|(date, mut cycles)| {
                cycles.sort();
                cycles.dedup();
                DayCycles {
                    day: date.format("%d").to_string(),
                    cycles,
                }
            })
            .collect()
    }
}
