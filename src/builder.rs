//! Run builder and the aggregation facade.
//!
//! [`AggregatorBuilder`] validates a [`Config`] and normalizes its boundary
//! once; the resulting [`Aggregator`] owns both and runs any number of
//! batches against them.

use crate::aggregate::{AggregateReport, extract};
use crate::classifier::{CellMap, ClassifierStats, EventClassifier, merge_cell_maps};
use crate::compute::spatial::{CellLocator, GridGeometry};
use crate::config::Config;
use crate::error::{AggregatorError, Result};
use crate::storage::{EventQuery, EventSource, ReportParameters, ReportSink};
use crate::types::{Boundary, EventRow};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Builder for a validated aggregation run.
///
/// # Examples
///
/// ```rust
/// use fleetgrid::{AggregatorBuilder, Boundary, EventRow, EventType};
///
/// let aggregator = AggregatorBuilder::new()
///     .boundary(Boundary::new(10.0, 20.0, 10.1, 19.9))
///     .cell_size(500.0)
///     .motionless_max_seconds(0)
///     .build()?;
///
/// let rows = vec![EventRow::new("bus-1", 0, 10.05, 19.95, EventType::Local)];
/// let report = aggregator.aggregate(&rows)?;
/// assert_eq!(report.cells.len(), 1);
/// assert_eq!(report.cells[0].local, 1);
/// # Ok::<(), fleetgrid::AggregatorError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct AggregatorBuilder {
    config: Config,
}

impl AggregatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn boundary(mut self, boundary: Boundary) -> Self {
        self.config = self.config.with_boundary(boundary);
        self
    }

    pub fn cell_size(mut self, meters: f64) -> Self {
        self.config = self.config.with_cell_size(meters);
        self
    }

    pub fn motionless_max_seconds(mut self, seconds: i64) -> Self {
        self.config = self.config.with_motionless_max_seconds(seconds);
        self
    }

    pub fn pruning_inclusion(mut self, include: bool) -> Self {
        self.config = self.config.with_pruning_inclusion(include);
        self
    }

    pub fn reset_state_per_client(mut self, reset: bool) -> Self {
        self.config = self.config.with_reset_state_per_client(reset);
        self
    }

    /// Validate the configuration and normalize the boundary.
    pub fn build(self) -> Result<Aggregator> {
        self.config.validate()?;
        let geometry =
            GridGeometry::normalize(&self.config.boundary(), self.config.grid.cell_size_meters)?;

        let (lat_cells, long_cells) = geometry.dimensions();
        let normalized = geometry.normalized();
        log::info!(
            "grid {}x{} cells of {} m, boundary ({}, {})-({}, {}) normalized to ({}, {})-({}, {})",
            lat_cells,
            long_cells,
            geometry.cell_size_meters(),
            geometry.original().lat1(),
            geometry.original().long1(),
            geometry.original().lat2(),
            geometry.original().long2(),
            normalized.lat1(),
            normalized.long1(),
            normalized.lat2(),
            normalized.long2(),
        );

        let locator = CellLocator::new(&geometry);
        Ok(Aggregator {
            config: self.config,
            geometry,
            locator,
        })
    }
}

/// A validated run context: immutable configuration plus grid geometry.
#[derive(Debug, Clone)]
pub struct Aggregator {
    config: Config,
    geometry: GridGeometry,
    locator: CellLocator,
}

impl Aggregator {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn locator(&self) -> &CellLocator {
        &self.locator
    }

    /// Data source query for this run, with the window resolved against `now`.
    pub fn event_query(&self, now: DateTime<Utc>) -> Result<EventQuery> {
        Ok(EventQuery {
            window: self.config.window.resolve(now)?,
            bbox: *self.geometry.normalized(),
            clients: self.config.clients.clone(),
        })
    }

    /// Classify the whole batch with one classifier state.
    ///
    /// `rows` must be sorted by client id, then timestamp.
    pub fn aggregate(&self, rows: &[EventRow]) -> Result<AggregateReport> {
        if rows.is_empty() {
            return Err(AggregatorError::EmptyInput);
        }
        let mut classifier = EventClassifier::new(&self.geometry, self.config.filters);
        classifier.classify_all(rows);
        let (cells, stats) = classifier.finish();
        Ok(self.finish_report(&cells, stats))
    }

    /// Classify each client's rows with its own classifier state and merge
    /// the cell maps by counter summation.
    pub fn aggregate_partitioned(&self, rows: &[EventRow]) -> Result<AggregateReport> {
        if rows.is_empty() {
            return Err(AggregatorError::EmptyInput);
        }
        let mut cells = CellMap::default();
        let mut stats = ClassifierStats::default();
        for partition in partition_by_client(rows).into_values() {
            let mut classifier = EventClassifier::new(&self.geometry, self.config.filters);
            classifier.classify_all(partition);
            let (partial, partial_stats) = classifier.finish();
            merge_cell_maps(&mut cells, &partial);
            stats.merge(&partial_stats);
        }
        Ok(self.finish_report(&cells, stats))
    }

    /// One report per client id, each from a fresh classifier state.
    pub fn aggregate_each_client(
        &self,
        rows: &[EventRow],
    ) -> Result<BTreeMap<String, AggregateReport>> {
        if rows.is_empty() {
            return Err(AggregatorError::EmptyInput);
        }
        Ok(partition_by_client(rows)
            .into_iter()
            .map(|(client, partition)| {
                let mut classifier = EventClassifier::new(&self.geometry, self.config.filters);
                classifier.classify_all(partition);
                let (cells, stats) = classifier.finish();
                (client.to_string(), self.finish_report(&cells, stats))
            })
            .collect())
    }

    /// Fetch rows for this run from `source` and aggregate them.
    pub fn run(
        &self,
        source: &mut dyn EventSource,
        now: DateTime<Utc>,
    ) -> Result<AggregateReport> {
        let query = self.event_query(now)?;
        let rows = source.fetch(&query)?;
        log::info!(
            "fetched {} rows for {} clients in [{}, {}]",
            rows.len(),
            query.clients.len(),
            query.window.start,
            query.window.end
        );
        self.aggregate(&rows)
    }

    /// Store `report` and this run's parameters under a fresh report id.
    pub fn record(
        &self,
        sink: &mut dyn ReportSink,
        report: &AggregateReport,
        reused_report_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let report_id = sink.next_report_id()?;
        let parameters =
            ReportParameters::from_config(report_id, &self.config, reused_report_id, now.timestamp());
        sink.store_report(&parameters, report.cell_size_meters, &report.cells)?;
        log::info!("recorded report {} ({} cells)", report_id, report.cells.len());
        Ok(report_id)
    }

    fn finish_report(&self, cells: &CellMap, stats: ClassifierStats) -> AggregateReport {
        log::debug!(
            "classified {} rows: {} counted, {} outside, {} motionless, {} pruned, {} control",
            stats.rows_seen,
            stats.counted,
            stats.outside_boundary,
            stats.motionless,
            stats.pruned_offline,
            stats.control
        );
        AggregateReport {
            cell_size_meters: self.geometry.cell_size_meters(),
            cells: extract(cells, &self.locator),
            stats,
        }
    }
}

/// Group rows by client id, preserving row order within each client.
fn partition_by_client(rows: &[EventRow]) -> BTreeMap<&str, Vec<&EventRow>> {
    let mut partitions: BTreeMap<&str, Vec<&EventRow>> = BTreeMap::new();
    for row in rows {
        partitions.entry(row.client_id.as_str()).or_default().push(row);
    }
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemorySink, MemorySource};
    use crate::types::EventType;
    use chrono::TimeZone;

    fn builder() -> AggregatorBuilder {
        AggregatorBuilder::new()
            .boundary(Boundary::new(10.0, 20.0, 10.1, 19.9))
            .cell_size(500.0)
            .motionless_max_seconds(0)
    }

    #[test]
    fn test_builder_rejects_invalid_boundary() {
        let err = AggregatorBuilder::new()
            .boundary(Boundary::new(10.1, 20.0, 10.0, 19.9))
            .cell_size(500.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, AggregatorError::InvalidBoundary { .. }));
    }

    #[test]
    fn test_builder_rejects_bad_cell_size() {
        let err = builder().cell_size(0.0).build().unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_empty_input() {
        let aggregator = builder().build().unwrap();
        assert!(aggregator.aggregate(&[]).unwrap_err().is_empty_input());
        assert!(aggregator.aggregate_partitioned(&[]).unwrap_err().is_empty_input());
        assert!(aggregator.aggregate_each_client(&[]).unwrap_err().is_empty_input());
    }

    #[test]
    fn test_partitioned_does_not_share_state() {
        let aggregator = builder().pruning_inclusion(false).build().unwrap();
        let rows = vec![
            EventRow::new("a", 0, 10.05, 19.95, EventType::Timeout),
            EventRow::new("b", 1, 10.05, 19.95, EventType::Local),
        ];

        let shared = aggregator.aggregate(&rows).unwrap();
        assert!(shared.is_empty());
        assert_eq!(shared.stats.pruned_offline, 1);

        let partitioned = aggregator.aggregate_partitioned(&rows).unwrap();
        assert_eq!(partitioned.total_events(), 1);
        assert_eq!(partitioned.stats.rows_seen, 2);
    }

    #[test]
    fn test_each_client_reports() {
        let aggregator = builder().build().unwrap();
        let rows = vec![
            EventRow::new("a", 0, 10.05, 19.95, EventType::Local),
            EventRow::new("a", 1, 10.05, 19.95, EventType::Ack),
            EventRow::new("b", 0, 10.02, 19.98, EventType::Unicast),
        ];
        let reports = aggregator.aggregate_each_client(&rows).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports["a"].total_events(), 2);
        assert_eq!(reports["b"].summary().unicast, 1);
    }

    #[test]
    fn test_run_and_record() {
        let now = Utc.with_ymd_and_hms(2014, 7, 30, 12, 0, 0).unwrap();
        let t = now.timestamp();
        let aggregator = builder()
            .config(
                Config::default()
                    .with_boundary(Boundary::new(10.0, 20.0, 10.1, 19.9))
                    .with_cell_size(500.0)
                    .with_motionless_max_seconds(0)
                    .with_clients(["bus-1"]),
            )
            .build()
            .unwrap();

        let mut source = MemorySource::new(vec![
            EventRow::new("bus-1", t - 60, 10.05, 19.95, EventType::Local),
            EventRow::new("bus-1", t - 7200, 10.05, 19.95, EventType::Local),
            EventRow::new("bus-2", t - 60, 10.05, 19.95, EventType::Local),
        ]);
        let report = aggregator.run(&mut source, now).unwrap();
        assert_eq!(report.total_events(), 1);

        let mut sink = MemorySink::new();
        let first = aggregator.record(&mut sink, &report, None, now).unwrap();
        let second = aggregator.record(&mut sink, &report, Some(first), now).unwrap();
        assert_eq!(first, 1000);
        assert_eq!(second, 1001);
        assert_eq!(
            sink.load_parameters(second).unwrap().reused_report_id,
            Some(1000)
        );
    }
}
