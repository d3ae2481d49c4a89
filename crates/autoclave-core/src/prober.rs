//! Catalog recovery by numeric probing.
//!
//! When a Legacy device will not say which cycles it holds, ask for cycle
//! numbers directly and follow the hits. Probe requests carry the target
//! year/month with day `01`; the device ignores the date parts but rejects
//! requests without them.
//!
//! Failed probes count as misses, except a refused connection: a device that
//! drops off mid-recovery aborts the walk with an error.

use chrono::{Datelike, NaiveDate};
use tracing::{debug, instrument, warn};

use crate::config::ProbeLimits;
use crate::device::DeviceAddress;
use crate::error::RequestError;
use crate::events::DeviceEvent;
use crate::protocol::catalog::{DayCycles, DayGrouper};
use crate::protocol::constants::PLACEHOLDER_DAY;
use crate::protocol::identifier::{pad2, pad_cycle_number};
use crate::telemetry::TelemetryReader;

/// Where a probed date falls relative to the month being recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonthPosition {
    Before,
    Inside,
    After,
}

fn position(date: NaiveDate, year: i32, month: u32) -> MonthPosition {
    match (date.year(), date.month()).cmp(&(year, month)) {
        std::cmp::Ordering::Less => MonthPosition::Before,
        std::cmp::Ordering::Equal => MonthPosition::Inside,
        std::cmp::Ordering::Greater => MonthPosition::After,
    }
}

/// Ephemeral walk state. Never cached.
#[derive(Debug, Default)]
struct ProbeSession {
    requests: u32,
    consecutive_misses: u32,
    steps: u32,
}

impl ProbeSession {
    fn reset_walk(&mut self) {
        self.consecutive_misses = 0;
        self.steps = 0;
    }
}

pub struct CatalogProber<'a> {
    telemetry: &'a TelemetryReader<'a>,
    limits: &'a ProbeLimits,
}

impl<'a> CatalogProber<'a> {
    pub fn new(telemetry: &'a TelemetryReader<'a>, limits: &'a ProbeLimits) -> Self {
        Self { telemetry, limits }
    }

    /// Recover the cycles of one month. Empty if no valid cycle was found.
    #[instrument(level = "debug", skip(self), fields(address = %address))]
    pub fn discover_month(
        &self,
        address: &DeviceAddress,
        year: i32,
        month: u32,
    ) -> Result<Vec<DayCycles>, RequestError> {
        let mut session = ProbeSession::default();
        let days = match self.find_seed(&mut session, address, year, month)? {
            Some(seed) => self.walk(&mut session, address, year, month, seed)?,
            None => Vec::new(),
        };
        self.finished(address, &days, session.requests);
        Ok(days)
    }

    /// First valid cycle number: cached high-water mark, seeds, then
    /// binary search.
    pub fn bootstrap(
        &self,
        address: &DeviceAddress,
        year: i32,
        month: u32,
    ) -> Result<Option<u32>, RequestError> {
        self.find_seed(&mut ProbeSession::default(), address, year, month)
    }

    /// Walk both directions from a known-valid `seed`.
    pub fn probe_month_from(
        &self,
        address: &DeviceAddress,
        year: i32,
        month: u32,
        seed: u32,
    ) -> Result<Vec<DayCycles>, RequestError> {
        let mut session = ProbeSession::default();
        let days = self.walk(&mut session, address, year, month, seed)?;
        self.finished(address, &days, session.requests);
        Ok(days)
    }

    fn find_seed(
        &self,
        session: &mut ProbeSession,
        address: &DeviceAddress,
        year: i32,
        month: u32,
    ) -> Result<Option<u32>, RequestError> {
        let cached = self.telemetry.transport().caches().last_valid_cycle(address);
        for candidate in cached.into_iter().chain(self.limits.heuristic_seeds.iter().copied()) {
            if candidate > 0 && self.probe(session, address, year, month, candidate)?.is_some() {
                debug!(seed = candidate, "Seed confirmed");
                self.advance_frontier(address, candidate);
                return Ok(Some(candidate));
            }
        }

        let found = self.binary_search(session, address, year, month)?;
        if let Some(found) = found {
            self.advance_frontier(address, found);
        }
        Ok(found)
    }

    /// Highest confirmed cycle under the assumption that valid numbers form
    /// a prefix `1..=N`.
    fn binary_search(
        &self,
        session: &mut ProbeSession,
        address: &DeviceAddress,
        year: i32,
        month: u32,
    ) -> Result<Option<u32>, RequestError> {
        let (mut lo, mut hi) = (1u32, self.limits.search_upper_bound);
        let mut best = None;

        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            if self.probe(session, address, year, month, mid)?.is_some() {
                best = Some(mid);
                lo = mid + 1;
            } else if mid == 1 {
                break;
            } else {
                hi = mid - 1;
            }

            if best.is_some() && hi.saturating_sub(lo) < self.limits.narrow_bracket {
                break;
            }
        }

        debug!(found = ?best, requests = session.requests, "Binary search done");
        Ok(best)
    }

    fn walk(
        &self,
        session: &mut ProbeSession,
        address: &DeviceAddress,
        year: i32,
        month: u32,
        seed: u32,
    ) -> Result<Vec<DayCycles>, RequestError> {
        let mut grouper = DayGrouper::new();

        // Downward, seed included.
        session.reset_walk();
        let mut cycle = seed;
        while cycle >= 1
            && session.steps < self.limits.max_backward_steps
            && session.consecutive_misses < self.limits.max_consecutive_misses
        {
            session.steps += 1;
            if let Some(date) = self.probe(session, address, year, month, cycle)? {
                match position(date, year, month) {
                    MonthPosition::Before => break,
                    MonthPosition::Inside => grouper.insert(date, pad_cycle_number(cycle)),
                    MonthPosition::After => {}
                }
            }
            cycle -= 1;
        }

        // Upward from the cycle after the seed.
        session.reset_walk();
        let mut cycle = seed.saturating_add(1);
        while session.steps < self.limits.max_forward_steps
            && session.consecutive_misses < self.limits.max_consecutive_misses
        {
            session.steps += 1;
            if let Some(date) = self.probe(session, address, year, month, cycle)? {
                self.advance_frontier(address, cycle);
                match position(date, year, month) {
                    MonthPosition::After => break,
                    MonthPosition::Inside => grouper.insert(date, pad_cycle_number(cycle)),
                    MonthPosition::Before => {}
                }
            }
            cycle = match cycle.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }

        Ok(grouper.finish())
    }

    /// One telemetry request. Unparseable dates and errors other than an
    /// unreachable device are misses.
    fn probe(
        &self,
        session: &mut ProbeSession,
        address: &DeviceAddress,
        year: i32,
        month: u32,
        cycle: u32,
    ) -> Result<Option<NaiveDate>, RequestError> {
        session.requests += 1;
        let year_s = year.to_string();
        let month_s = pad2(&month.to_string());

        let date = match self
            .telemetry
            .probe_legacy(address, &year_s, &month_s, PLACEHOLDER_DAY, cycle)
        {
            Ok(Some(telemetry)) => telemetry.parsed_date(),
            Ok(None) => None,
            Err(e) if e.is_unreachable() => {
                warn!(cycle, error = %e, "Device unreachable, aborting probe");
                return Err(e);
            }
            Err(e) => {
                debug!(cycle, error = %e, "Probe failed, counting as miss");
                None
            }
        };

        let observer = self.telemetry.transport().observer();
        match date {
            Some(date) => {
                session.consecutive_misses = 0;
                observer.on_event(&DeviceEvent::ProbeHit { cycle, date });
            }
            None => {
                session.consecutive_misses += 1;
                observer.on_event(&DeviceEvent::ProbeMiss { cycle });
            }
        }
        Ok(date)
    }

    fn advance_frontier(&self, address: &DeviceAddress, cycle: u32) {
        let transport = self.telemetry.transport();
        if transport.caches().record_valid_cycle(address, cycle) {
            transport.observer().on_event(&DeviceEvent::FrontierAdvanced {
                address: address.clone(),
                cycle,
            });
        }
    }

    fn finished(&self, address: &DeviceAddress, days: &[DayCycles], requests: u32) {
        let found = days.iter().map(|d| d.cycles.len()).sum();
        self.telemetry
            .transport()
            .observer()
            .on_event(&DeviceEvent::ProbeFinished {
                address: address.clone(),
                found,
                requests,
            });
    }
}
