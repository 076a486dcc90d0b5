//! Spatial-temporal grid aggregation of fleet geolocation events.
//!
//! A region is tiled into square cells of a configured size; a sorted batch
//! of event rows is classified (containment, motionless suppression,
//! online/offline pruning) and counted per cell and category.
//!
//! ```rust
//! use fleetgrid::{AggregatorBuilder, Boundary, EventRow, EventType};
//!
//! let aggregator = AggregatorBuilder::new()
//!     .boundary(Boundary::new(10.0, 20.0, 10.1, 19.9))
//!     .cell_size(500.0)
//!     .build()?;
//!
//! let rows = vec![
//!     EventRow::new("bus-1", 1_000, 10.05, 19.95, EventType::Local),
//!     EventRow::new("bus-1", 1_030, 10.06, 19.95, EventType::Unicast),
//! ];
//! let report = aggregator.aggregate(&rows)?;
//! assert_eq!(report.total_events(), 2);
//! # Ok::<(), fleetgrid::AggregatorError>(())
//! ```

pub mod aggregate;
pub mod builder;
pub mod classifier;
pub mod compute;
pub mod config;
pub mod error;
pub mod storage;
pub mod types;

pub use aggregate::{AggregateReport, CellAggregate, ReportSummary};
pub use builder::{Aggregator, AggregatorBuilder};
pub use classifier::{CellCounters, ClassifierStats, EventClassifier, RowDecision};
pub use compute::spatial::{CellLocator, GridGeometry, ScaleFactors, distance_km};
pub use compute::temporal::{ResolvedWindow, TimeWindow};
pub use config::{BoundaryConfig, Config, FilterConfig, GridConfig};
pub use error::{AggregatorError, Result};
pub use storage::{
    EventQuery, EventSource, JsonLinesSource, MemorySink, MemorySource, ReportParameters,
    ReportSink,
};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
pub use types::{Boundary, CellIndex, EventRow, EventType};

pub use geo::Point;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::{
        AggregateReport, Aggregator, AggregatorBuilder, AggregatorError, Boundary, CellIndex,
        Config, EventRow, EventType, Result, TimeWindow,
    };

    pub use crate::{EventSource, MemorySink, MemorySource, ReportSink};

    #[cfg(feature = "sqlite")]
    pub use crate::SqliteStore;

    pub use geo::Point;
}
