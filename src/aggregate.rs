//! Aggregate extraction and report summaries.

use crate::classifier::{CellMap, ClassifierStats};
use crate::compute::spatial::CellLocator;
#[cfg(feature = "geojson")]
use crate::error::Result;
use crate::types::{CellIndex, EventType};
use geo::Point;
use serde::{Deserialize, Serialize};

/// One non-empty cell of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellAggregate {
    pub index: CellIndex,
    /// Anchor corner of the cell (x = longitude, y = latitude).
    pub reference: Point,
    /// Corner one cell step north and west of `reference`.
    pub opposite: Point,
    pub local: u64,
    pub unicast: u64,
    pub broadcast: u64,
    pub multicast: u64,
    pub ack: u64,
}

impl CellAggregate {
    pub fn total(&self) -> u64 {
        self.local + self.unicast + self.broadcast + self.multicast + self.ack
    }

    pub fn count(&self, event_type: EventType) -> u64 {
        match event_type {
            EventType::Local => self.local,
            EventType::Unicast => self.unicast,
            EventType::Multicast => self.multicast,
            EventType::Broadcast => self.broadcast,
            EventType::Ack => self.ack,
            _ => 0,
        }
    }
}

/// Turn a cell map into aggregates, sorted by cell index, dropping cells
/// whose counters are all zero.
pub fn extract(cells: &CellMap, locator: &CellLocator) -> Vec<CellAggregate> {
    let mut aggregates: Vec<CellAggregate> = cells
        .iter()
        .filter(|(_, counters)| !counters.is_empty())
        .map(|(index, counters)| CellAggregate {
            index: *index,
            reference: locator.reference_corner(*index),
            opposite: locator.opposite_corner(*index),
            local: counters.get(EventType::Local),
            unicast: counters.get(EventType::Unicast),
            broadcast: counters.get(EventType::Broadcast),
            multicast: counters.get(EventType::Multicast),
            ack: counters.get(EventType::Ack),
        })
        .collect();
    aggregates.sort_by_key(|cell| cell.index);
    aggregates
}

/// Category totals with percentages relative to LOCAL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub cells: usize,
    pub local: u64,
    pub unicast: u64,
    pub broadcast: u64,
    pub multicast: u64,
    pub ack: u64,
    pub unicast_pct: Option<f64>,
    pub broadcast_pct: Option<f64>,
    pub multicast_pct: Option<f64>,
    pub ack_pct: Option<f64>,
}

impl ReportSummary {
    pub fn total(&self) -> u64 {
        self.local + self.unicast + self.broadcast + self.multicast + self.ack
    }
}

/// Result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub cell_size_meters: f64,
    pub cells: Vec<CellAggregate>,
    pub stats: ClassifierStats,
}

impl AggregateReport {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn total_events(&self) -> u64 {
        self.cells.iter().map(CellAggregate::total).sum()
    }

    pub fn cell(&self, index: CellIndex) -> Option<&CellAggregate> {
        self.cells
            .binary_search_by_key(&index, |cell| cell.index)
            .ok()
            .map(|pos| &self.cells[pos])
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            cells: self.cells.len(),
            local: 0,
            unicast: 0,
            broadcast: 0,
            multicast: 0,
            ack: 0,
            unicast_pct: None,
            broadcast_pct: None,
            multicast_pct: None,
            ack_pct: None,
        };
        for cell in &self.cells {
            summary.local += cell.local;
            summary.unicast += cell.unicast;
            summary.broadcast += cell.broadcast;
            summary.multicast += cell.multicast;
            summary.ack += cell.ack;
        }

        if summary.local > 0 {
            let pct = |count: u64| Some(count as f64 * 100.0 / summary.local as f64);
            summary.unicast_pct = pct(summary.unicast);
            summary.broadcast_pct = pct(summary.broadcast);
            summary.multicast_pct = pct(summary.multicast);
            summary.ack_pct = pct(summary.ack);
        }
        summary
    }

    /// Cells as a GeoJSON FeatureCollection of rectangles, counters as
    /// properties.
    #[cfg(feature = "geojson")]
    pub fn to_geojson(&self) -> Result<String> {
        use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};

        let features = self
            .cells
            .iter()
            .map(|cell| {
                let (x1, y1) = cell.reference.x_y();
                let (x2, y2) = cell.opposite.x_y();
                let ring = vec![
                    vec![x1, y1],
                    vec![x1, y2],
                    vec![x2, y2],
                    vec![x2, y1],
                    vec![x1, y1],
                ];

                let mut properties = JsonObject::new();
                properties.insert("lat_step".into(), cell.index.lat_step.into());
                properties.insert("long_step".into(), cell.index.long_step.into());
                properties.insert("local".into(), cell.local.into());
                properties.insert("unicast".into(), cell.unicast.into());
                properties.insert("broadcast".into(), cell.broadcast.into());
                properties.insert("multicast".into(), cell.multicast.into());
                properties.insert("ack".into(), cell.ack.into());

                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        let collection = FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };
        Ok(serde_json::to_string(&collection)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::CellCounters;
    use crate::compute::spatial::GridGeometry;
    use crate::types::Boundary;

    fn locator() -> CellLocator {
        let geometry =
            GridGeometry::normalize(&Boundary::new(10.0, 20.0, 10.1, 19.9), 500.0).unwrap();
        CellLocator::new(&geometry)
    }

    fn counters(events: &[EventType]) -> CellCounters {
        let mut counters = CellCounters::default();
        for event in events {
            counters.record(*event);
        }
        counters
    }

    #[test]
    fn test_extract_sorts_and_drops_empty() {
        let locator = locator();
        let mut cells = CellMap::default();
        cells.insert(CellIndex::new(3, 1), counters(&[EventType::Ack]));
        cells.insert(CellIndex::new(0, 5), counters(&[EventType::Local, EventType::Local]));
        cells.insert(CellIndex::new(2, 2), CellCounters::default());

        let aggregates = extract(&cells, &locator);
        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates[0].index, CellIndex::new(0, 5));
        assert_eq!(aggregates[0].local, 2);
        assert_eq!(aggregates[1].index, CellIndex::new(3, 1));
        assert_eq!(aggregates[1].ack, 1);
        assert_eq!(aggregates[1].total(), 1);
    }

    #[test]
    fn test_corners_are_one_step_apart() {
        let locator = locator();
        let mut cells = CellMap::default();
        cells.insert(CellIndex::new(1, 1), counters(&[EventType::Broadcast]));
        let cell = extract(&cells, &locator)[0];

        assert!(cell.opposite.y() > cell.reference.y());
        assert!(cell.opposite.x() < cell.reference.x());
        let height = crate::compute::distance_m(
            &cell.reference,
            &Point::new(cell.reference.x(), cell.opposite.y()),
        );
        assert!((height - 500.0).abs() < 1e-3);
        assert_eq!(cell.count(EventType::Broadcast), 1);
    }

    #[test]
    fn test_summary_percentages() {
        let locator = locator();
        let mut cells = CellMap::default();
        let mut events = vec![EventType::Local; 4];
        events.extend([EventType::Unicast, EventType::Unicast, EventType::Ack]);
        cells.insert(CellIndex::new(0, 0), counters(&events));
        cells.insert(CellIndex::new(0, 1), counters(&[EventType::Multicast]));

        let report = AggregateReport {
            cell_size_meters: 500.0,
            cells: extract(&cells, &locator),
            stats: ClassifierStats::default(),
        };
        let summary = report.summary();
        assert_eq!(summary.cells, 2);
        assert_eq!(summary.total(), 8);
        assert_eq!(report.total_events(), 8);
        assert_eq!(summary.unicast_pct, Some(50.0));
        assert_eq!(summary.ack_pct, Some(25.0));
        assert_eq!(summary.multicast_pct, Some(25.0));
        assert_eq!(summary.broadcast_pct, Some(0.0));
        assert!(report.cell(CellIndex::new(0, 1)).is_some());
        assert!(report.cell(CellIndex::new(9, 9)).is_none());
    }

    #[test]
    fn test_summary_without_local_events() {
        let locator = locator();
        let mut cells = CellMap::default();
        cells.insert(CellIndex::new(0, 0), counters(&[EventType::Unicast]));
        let report = AggregateReport {
            cell_size_meters: 500.0,
            cells: extract(&cells, &locator),
            stats: ClassifierStats::default(),
        };
        assert_eq!(report.summary().unicast_pct, None);
    }

    #[cfg(feature = "geojson")]
    #[test]
    fn test_geojson_export() {
        let locator = locator();
        let mut cells = CellMap::default();
        cells.insert(CellIndex::new(0, 0), counters(&[EventType::Local]));
        let report = AggregateReport {
            cell_size_meters: 500.0,
            cells: extract(&cells, &locator),
            stats: ClassifierStats::default(),
        };
        let json = report.to_geojson().unwrap();
        assert!(json.contains("FeatureCollection"));
        assert!(json.contains("Polygon"));
        assert!(json.contains("\"local\":1"));
    }
}
