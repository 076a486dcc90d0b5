//! Event stream classification.
//!
//! A single pass over rows sorted by client then timestamp. Each row goes
//! through three filters in order:
//!
//! 1. **Containment**: rows outside the normalized boundary are dropped.
//! 2. **Motionless** (threshold > 0, aggregated categories only): time spent
//!    at an unchanged position accumulates; once it reaches the threshold the
//!    row is dropped.
//! 3. **Pruning** (pruning-inclusion disabled): TIMEOUT marks the fleet
//!    offline, ONLINE marks it online again; LOCAL rows seen while offline
//!    are dropped.
//!
//! Surviving rows of the five aggregated categories increment their cell's
//! counter. The classifier does no I/O.

use crate::compute::spatial::{CellLocator, GridGeometry};
use crate::config::FilterConfig;
use crate::types::{AGGREGATED_CATEGORIES, CellIndex, EventRow, EventType};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Per-cell counters, one slot per aggregated category in code order
/// (LOCAL, UNICAST, MULTICAST, BROADCAST, ACK).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellCounters([u64; AGGREGATED_CATEGORIES]);

impl CellCounters {
    /// Count one event. Non-aggregated categories are ignored.
    pub fn record(&mut self, event_type: EventType) {
        if let Some(slot) = event_type.counter_slot() {
            self.0[slot] += 1;
        }
    }

    pub fn get(&self, event_type: EventType) -> u64 {
        event_type.counter_slot().map_or(0, |slot| self.0[slot])
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Element-wise sum.
    pub fn merge(&mut self, other: &CellCounters) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine += theirs;
        }
    }

    pub fn as_array(&self) -> [u64; AGGREGATED_CATEGORIES] {
        self.0
    }
}

/// Lazily populated cells; entries are never removed during a run.
pub type CellMap = FxHashMap<CellIndex, CellCounters>;

/// Merge `other` into `into` by counter summation.
pub fn merge_cell_maps(into: &mut CellMap, other: &CellMap) {
    for (index, counters) in other {
        into.entry(*index).or_default().merge(counters);
    }
}

/// What happened to a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDecision {
    OutsideBoundary,
    Motionless,
    PrunedOffline,
    /// Passed every filter but is not an aggregated category.
    Control,
    Counted(CellIndex),
}

/// Tallies of row decisions over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierStats {
    pub rows_seen: u64,
    pub outside_boundary: u64,
    pub motionless: u64,
    pub pruned_offline: u64,
    pub control: u64,
    pub counted: u64,
}

impl ClassifierStats {
    fn record(&mut self, decision: RowDecision) {
        self.rows_seen += 1;
        match decision {
            RowDecision::OutsideBoundary => self.outside_boundary += 1,
            RowDecision::Motionless => self.motionless += 1,
            RowDecision::PrunedOffline => self.pruned_offline += 1,
            RowDecision::Control => self.control += 1,
            RowDecision::Counted(_) => self.counted += 1,
        }
    }

    pub fn merge(&mut self, other: &ClassifierStats) {
        self.rows_seen += other.rows_seen;
        self.outside_boundary += other.outside_boundary;
        self.motionless += other.motionless;
        self.pruned_offline += other.pruned_offline;
        self.control += other.control;
        self.counted += other.counted;
    }
}

#[derive(Debug, Clone, Default)]
struct MotionlessTracker {
    previous: Option<(f64, f64, i64)>,
    seconds: u64,
}

impl MotionlessTracker {
    /// Feed one row; returns the time accumulated at the current position.
    fn observe(&mut self, lat: f64, long: f64, timestamp: i64) -> u64 {
        match self.previous {
            Some((prev_lat, prev_long, prev_time)) if prev_lat == lat && prev_long == long => {
                self.seconds = self.seconds.saturating_add(timestamp.abs_diff(prev_time));
            }
            _ => self.seconds = 0,
        }
        self.previous = Some((lat, long, timestamp));
        self.seconds
    }
}

#[derive(Debug, Clone)]
struct ClassifierState {
    motionless: MotionlessTracker,
    online: bool,
    client: Option<String>,
}

impl Default for ClassifierState {
    fn default() -> Self {
        Self {
            motionless: MotionlessTracker::default(),
            online: true,
            client: None,
        }
    }
}

/// Stateful classifier over one sorted batch of rows.
///
/// Owns its cell map exclusively until [`EventClassifier::finish`].
#[derive(Debug)]
pub struct EventClassifier {
    geometry: GridGeometry,
    locator: CellLocator,
    filters: FilterConfig,
    state: ClassifierState,
    cells: CellMap,
    stats: ClassifierStats,
}

impl EventClassifier {
    pub fn new(geometry: &GridGeometry, filters: FilterConfig) -> Self {
        Self {
            geometry: geometry.clone(),
            locator: CellLocator::new(geometry),
            filters,
            state: ClassifierState::default(),
            cells: CellMap::default(),
            stats: ClassifierStats::default(),
        }
    }

    /// Classify one row and update state and counters.
    pub fn classify(&mut self, row: &EventRow) -> RowDecision {
        let decision = self.decide(row);
        self.stats.record(decision);
        if let RowDecision::Counted(index) = decision {
            self.cells.entry(index).or_default().record(row.event_type);
        }
        decision
    }

    pub fn classify_all<'a, I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = &'a EventRow>,
    {
        for row in rows {
            self.classify(row);
        }
    }

    fn decide(&mut self, row: &EventRow) -> RowDecision {
        if self.filters.reset_state_per_client {
            self.reset_on_client_change(&row.client_id);
        }

        if !self.geometry.contains(row.lat, row.long) {
            return RowDecision::OutsideBoundary;
        }

        if let Some(threshold) = self.filters.motionless_threshold()
            && row.event_type.is_aggregated()
        {
            let idle = self
                .state
                .motionless
                .observe(row.lat, row.long, row.timestamp);
            if idle >= threshold {
                log::trace!(
                    "{} motionless for {}s at ({}, {})",
                    row.client_id,
                    idle,
                    row.lat,
                    row.long
                );
                return RowDecision::Motionless;
            }
        }

        if !self.filters.pruning_inclusion {
            match row.event_type {
                EventType::Timeout => self.state.online = false,
                EventType::Online => self.state.online = true,
                _ => {}
            }
            if !self.state.online && row.event_type == EventType::Local {
                return RowDecision::PrunedOffline;
            }
        }

        if row.event_type.is_aggregated() {
            RowDecision::Counted(self.locator.locate(row.lat, row.long))
        } else {
            RowDecision::Control
        }
    }

    fn reset_on_client_change(&mut self, client_id: &str) {
        if self.state.client.as_deref() != Some(client_id) {
            self.state = ClassifierState {
                client: Some(client_id.to_string()),
                ..ClassifierState::default()
            };
        }
    }

    pub fn cells(&self) -> &CellMap {
        &self.cells
    }

    pub fn stats(&self) -> ClassifierStats {
        self.stats
    }

    pub fn locator(&self) -> &CellLocator {
        &self.locator
    }

    /// Whether the pruning filter currently considers the stream online.
    pub fn is_online(&self) -> bool {
        self.state.online
    }

    pub fn finish(self) -> (CellMap, ClassifierStats) {
        (self.cells, self.stats)
    }
}
