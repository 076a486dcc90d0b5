use fleetgrid::compute::distance_m;
use fleetgrid::{
    AggregatorBuilder, AggregatorError, Boundary, CellIndex, Config, EventClassifier, EventRow,
    EventType, GridGeometry, MemorySink, MemorySource, Point, ReportSink, RowDecision, TimeWindow,
};

const POINT_A: (f64, f64) = (10.001, 19.999);
const POINT_B: (f64, f64) = (10.05, 19.95);

fn reference_boundary() -> Boundary {
    Boundary::new(10.0, 20.0, 10.1, 19.9)
}

fn reference_builder() -> AggregatorBuilder {
    AggregatorBuilder::new()
        .boundary(reference_boundary())
        .cell_size(500.0)
        .motionless_max_seconds(0)
        .pruning_inclusion(true)
}

fn row(t: i64, (lat, long): (f64, f64), event_type: EventType) -> EventRow {
    EventRow::new("bus-1", t, lat, long, event_type)
}

#[test]
fn test_two_cells_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();
    let aggregator = reference_builder().build().unwrap();

    // Ten rows alternating between the two points; each point sees
    // LOCAL, UNICAST, LOCAL, UNICAST, LOCAL.
    let rows: Vec<EventRow> = (0..10)
        .map(|i| {
            let point = if i % 2 == 0 { POINT_A } else { POINT_B };
            let event_type = if (i / 2) % 2 == 0 {
                EventType::Local
            } else {
                EventType::Unicast
            };
            row(i, point, event_type)
        })
        .collect();

    let report = aggregator.aggregate(&rows).unwrap();
    assert_eq!(report.cells.len(), 2);
    assert_eq!(report.total_events(), 10);
    assert_eq!(report.stats.counted, 10);

    assert_eq!(report.cells[0].index, CellIndex::new(0, 0));
    assert_eq!(report.cells[1].index, CellIndex::new(11, 10));
    for cell in &report.cells {
        assert_eq!(cell.local, 3);
        assert_eq!(cell.unicast, 2);
        assert_eq!(cell.broadcast + cell.multicast + cell.ack, 0);
    }
}

#[test]
fn test_two_cells_one_of_each() {
    let aggregator = reference_builder().build().unwrap();
    let rows = vec![
        row(0, POINT_A, EventType::Local),
        row(1, POINT_B, EventType::Unicast),
        row(2, POINT_A, EventType::Unicast),
        row(3, POINT_B, EventType::Local),
    ];

    let report = aggregator.aggregate(&rows).unwrap();
    assert_eq!(report.cells.len(), 2);
    for cell in &report.cells {
        assert_eq!((cell.local, cell.unicast), (1, 1));

        // Opposite corner sits one 500 m step north and west
        let north = Point::new(cell.reference.x(), cell.opposite.y());
        let west = Point::new(cell.opposite.x(), cell.reference.y());
        assert!((distance_m(&cell.reference, &north) - 500.0).abs() < 1e-3);
        assert!((distance_m(&cell.reference, &west) - 500.0).abs() < 0.5);

        for (lat, long) in [POINT_A, POINT_B] {
            let inside = lat >= cell.reference.y()
                && lat < cell.opposite.y()
                && long <= cell.reference.x()
                && long > cell.opposite.x();
            if inside {
                assert_eq!(aggregator.locator().locate(lat, long), cell.index);
            }
        }
    }
}

#[test]
fn test_single_local_row_round_trip() {
    let aggregator = reference_builder().build().unwrap();
    let report = aggregator
        .aggregate(&[row(0, POINT_B, EventType::Local)])
        .unwrap();

    assert_eq!(report.cells.len(), 1);
    let cell = &report.cells[0];
    assert_eq!(cell.local, 1);
    assert_eq!(cell.total(), 1);
    assert_eq!(
        aggregator.locator().locate(POINT_B.0, POINT_B.1),
        cell.index
    );
}

#[test]
fn test_invalid_boundary_fails_before_rows() {
    let err = AggregatorBuilder::new()
        .boundary(Boundary::new(10.1, 20.0, 10.1, 19.9))
        .cell_size(500.0)
        .build()
        .unwrap_err();
    assert!(matches!(err, AggregatorError::InvalidBoundary { .. }));
}

#[test]
fn test_normalized_boundary_tiles_exactly() {
    let boundaries = [
        reference_boundary(),
        Boundary::new(-33.95, 18.55, -33.85, 18.35),
        Boundary::new(51.45, 0.1, 51.6, -0.25),
        Boundary::new(0.0, 0.5, 0.01, 0.49),
    ];

    for boundary in boundaries {
        for cell_size in [37.0, 250.0, 1000.0] {
            let grid = GridGeometry::normalize(&boundary, cell_size).unwrap();
            let (k1, k2) = grid.dimensions();
            let (width, height) = grid.normalized_extent_m();
            assert!((width - k1 as f64 * cell_size).abs() < 1e-3);
            assert!((height - k2 as f64 * cell_size).abs() < 1e-3);

            let normalized = grid.normalized();
            assert_eq!(normalized.corner1, boundary.corner1);
            assert!(normalized.lat2() >= boundary.lat2());
            assert!(normalized.long2() <= boundary.long2());
        }
    }
}

#[test]
fn test_locator_strategies_agree_inside_cells() {
    let grid = GridGeometry::normalize(&reference_boundary(), 500.0).unwrap();
    let locator = fleetgrid::CellLocator::new(&grid);
    let (k1, k2) = grid.dimensions();

    for lat_step in (0..k1).step_by(3) {
        for long_step in (0..k2).step_by(3) {
            let index = CellIndex::new(lat_step, long_step);
            let reference = locator.reference_corner(index);
            let opposite = locator.opposite_corner(index);
            let lat = reference.y() + (opposite.y() - reference.y()) * 0.37;
            let long = reference.x() + (opposite.x() - reference.x()) * 0.61;
            assert_eq!(locator.locate(lat, long), index);
            assert_eq!(locator.locate_by_stepping(lat, long), index);
        }
    }
}

#[test]
fn test_motionless_and_pruning_together() {
    let aggregator = reference_builder()
        .motionless_max_seconds(60)
        .pruning_inclusion(false)
        .build()
        .unwrap();

    let rows = vec![
        row(0, POINT_A, EventType::Local),
        row(30, POINT_A, EventType::Unicast),
        row(60, POINT_A, EventType::Local), // parked for 60 s
        row(70, POINT_B, EventType::Timeout),
        row(80, POINT_B, EventType::Local), // offline
        row(90, POINT_B, EventType::Online),
        row(100, POINT_B, EventType::Local),
    ];
    let report = aggregator.aggregate(&rows).unwrap();
    let summary = report.summary();
    assert_eq!(summary.local, 2);
    assert_eq!(summary.unicast, 1);
    assert_eq!(report.stats.motionless, 1);
    assert_eq!(report.stats.pruned_offline, 1);
    assert_eq!(report.stats.control, 2);
}

#[test]
fn test_classifier_decisions_in_order() {
    let grid = GridGeometry::normalize(&reference_boundary(), 500.0).unwrap();
    let filters = fleetgrid::FilterConfig {
        motionless_max_seconds: 0,
        pruning_inclusion: false,
        reset_state_per_client: false,
    };
    let mut classifier = EventClassifier::new(&grid, filters);

    let decisions: Vec<RowDecision> = [
        EventType::Local,
        EventType::Timeout,
        EventType::Local,
        EventType::Online,
        EventType::Local,
    ]
    .into_iter()
    .enumerate()
    .map(|(i, event)| classifier.classify(&row(i as i64, POINT_A, event)))
    .collect();

    let kept = decisions
        .iter()
        .filter(|d| matches!(d, RowDecision::Counted(_)))
        .count();
    assert_eq!(kept, 2);
    assert_eq!(decisions[2], RowDecision::PrunedOffline);
}

#[test]
fn test_run_record_and_reuse() {
    let now = chrono::Utc::now();
    let t = now.timestamp();
    let config = Config::default()
        .with_boundary(reference_boundary())
        .with_cell_size(500.0)
        .with_motionless_max_seconds(0)
        .with_window(TimeWindow::LastHours { hours: 2 })
        .with_clients(["bus-1", "bus-2"]);

    let aggregator = AggregatorBuilder::new().config(config).build().unwrap();
    let mut source = MemorySource::new(vec![
        EventRow::new("bus-2", t - 100, POINT_A.0, POINT_A.1, EventType::Ack),
        EventRow::new("bus-1", t - 50, POINT_B.0, POINT_B.1, EventType::Broadcast),
        EventRow::new("bus-1", t - 3 * 3600, POINT_B.0, POINT_B.1, EventType::Local),
        EventRow::new("bus-3", t - 50, POINT_B.0, POINT_B.1, EventType::Local),
    ]);

    let report = aggregator.run(&mut source, now).unwrap();
    assert_eq!(report.total_events(), 2);

    let mut sink = MemorySink::new();
    let report_id = aggregator.record(&mut sink, &report, None, now).unwrap();
    assert_eq!(report_id, 1000);

    // Replaying the recorded parameters reproduces the run
    let mut replay = Config::default();
    sink.load_parameters(report_id).unwrap().apply_to(&mut replay);
    let replayed = AggregatorBuilder::new()
        .config(replay)
        .build()
        .unwrap()
        .run(&mut source, now)
        .unwrap();
    assert_eq!(replayed.cells, report.cells);
}

#[test]
fn test_empty_fetch_is_distinguishable() {
    let aggregator = reference_builder().build().unwrap();
    let mut source = MemorySource::default();
    let err = aggregator.run(&mut source, chrono::Utc::now()).unwrap_err();
    assert!(err.is_empty_input());
    assert!(!err.is_configuration_error());
}

#[cfg(feature = "geojson")]
#[test]
fn test_geojson_report() {
    let aggregator = reference_builder().build().unwrap();
    let report = aggregator
        .aggregate(&[
            row(0, POINT_A, EventType::Local),
            row(1, POINT_B, EventType::Multicast),
        ])
        .unwrap();
    let json = report.to_geojson().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["type"], "FeatureCollection");
    assert_eq!(value["features"].as_array().unwrap().len(), 2);
    assert_eq!(value["features"][1]["properties"]["multicast"], 1);
}
