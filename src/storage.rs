//! Data source and report sink abstractions.
//!
//! The engine consumes rows from an [`EventSource`] and hands finished
//! reports to a [`ReportSink`]. In-memory implementations live here; the
//! JSON-lines reader and the SQLite store live in submodules.

use crate::aggregate::CellAggregate;
use crate::compute::temporal::{ResolvedWindow, TimeWindow};
use crate::config::{BoundaryConfig, Config, FilterConfig, GridConfig};
use crate::error::{AggregatorError, Result};
use crate::types::{Boundary, EventRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod jsonl;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use jsonl::JsonLinesSource;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// First identifier handed out by an empty sink.
pub const FIRST_REPORT_ID: u64 = 1000;

/// Server-side filter applied by a data source.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    /// Inclusive time window
    pub window: ResolvedWindow,
    /// Coarse bounding box, normally the normalized boundary
    pub bbox: Boundary,
    pub clients: Vec<String>,
}

impl EventQuery {
    pub fn matches(&self, row: &EventRow) -> bool {
        self.window.contains(row.timestamp)
            && self.bbox.contains(row.lat, row.long)
            && self.clients.iter().any(|client| *client == row.client_id)
    }
}

/// Sort rows by client id, then timestamp ascending. Stable.
pub fn sort_rows(rows: &mut [EventRow]) {
    rows.sort_by(|a, b| {
        a.client_id
            .cmp(&b.client_id)
            .then(a.timestamp.cmp(&b.timestamp))
    });
}

/// Provider of event rows.
///
/// Implementations return only rows matching the query, sorted by client id
/// then timestamp.
pub trait EventSource {
    fn fetch(&mut self, query: &EventQuery) -> Result<Vec<EventRow>>;
}

/// Exact configuration of a recorded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportParameters {
    pub report_id: u64,
    /// Report whose parameters this run replayed
    pub reused_report_id: Option<u64>,
    pub boundary: BoundaryConfig,
    pub grid: GridConfig,
    pub filters: FilterConfig,
    pub window: TimeWindow,
    pub clients: Vec<String>,
    /// Seconds since the Unix epoch
    pub created_at: i64,
}

impl ReportParameters {
    pub fn from_config(
        report_id: u64,
        config: &Config,
        reused_report_id: Option<u64>,
        created_at: i64,
    ) -> Self {
        Self {
            report_id,
            reused_report_id,
            boundary: config.boundary,
            grid: config.grid,
            filters: config.filters,
            window: config.window.clone(),
            clients: config.clients.clone(),
            created_at,
        }
    }

    /// Overwrite the run parameters of `config` with the recorded ones.
    /// `record_report` is left alone.
    pub fn apply_to(&self, config: &mut Config) {
        config.boundary = self.boundary;
        config.grid = self.grid;
        config.filters = self.filters;
        config.window = self.window.clone();
        config.clients = self.clients.clone();
    }
}

/// Destination for finished reports and their parameters.
pub trait ReportSink {
    /// One past the largest recorded id, or [`FIRST_REPORT_ID`].
    fn next_report_id(&mut self) -> Result<u64>;

    /// Record a run's parameters and its cells under `parameters.report_id`.
    /// Either both are stored or neither is.
    fn store_report(
        &mut self,
        parameters: &ReportParameters,
        cell_size_meters: f64,
        cells: &[CellAggregate],
    ) -> Result<()>;

    /// Fails with [`AggregatorError::ReportNotFound`] for unknown ids.
    fn load_parameters(&mut self, report_id: u64) -> Result<ReportParameters>;
}

/// Rows held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: Vec<EventRow>,
}

impl MemorySource {
    pub fn new(rows: Vec<EventRow>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: EventRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl EventSource for MemorySource {
    fn fetch(&mut self, query: &EventQuery) -> Result<Vec<EventRow>> {
        let mut rows: Vec<EventRow> = self
            .rows
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        sort_rows(&mut rows);
        Ok(rows)
    }
}

/// A recorded report held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub cell_size_meters: f64,
    pub cells: Vec<CellAggregate>,
}

/// Report sink backed by in-memory maps.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    parameters: BTreeMap<u64, ReportParameters>,
    reports: BTreeMap<u64, StoredReport>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, report_id: u64) -> Option<&StoredReport> {
        self.reports.get(&report_id)
    }

    pub fn report_count(&self) -> usize {
        self.parameters.len()
    }
}

impl ReportSink for MemorySink {
    fn next_report_id(&mut self) -> Result<u64> {
        Ok(self
            .parameters
            .keys()
            .next_back()
            .map_or(FIRST_REPORT_ID, |max| max + 1))
    }

    fn store_report(
        &mut self,
        parameters: &ReportParameters,
        cell_size_meters: f64,
        cells: &[CellAggregate],
    ) -> Result<()> {
        self.parameters
            .insert(parameters.report_id, parameters.clone());
        self.reports.insert(
            parameters.report_id,
            StoredReport {
                cell_size_meters,
                cells: cells.to_vec(),
            },
        );
        Ok(())
    }

    fn load_parameters(&mut self, report_id: u64) -> Result<ReportParameters> {
        self.parameters
            .get(&report_id)
            .cloned()
            .ok_or(AggregatorError::ReportNotFound(report_id))
    }
}
