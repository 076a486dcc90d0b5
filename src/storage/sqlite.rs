//! SQLite-backed event source and report sink.
//!
//! Tables:
//! - `gpsdata`: raw events, coordinates stored as text or numbers
//! - `reportparam`: one row per recorded run
//! - `reportdata`: one row per non-empty cell of a recorded run

use super::{EventQuery, EventSource, FIRST_REPORT_ID, ReportParameters, ReportSink};
use crate::aggregate::CellAggregate;
use crate::compute::temporal::TimeWindow;
use crate::config::{BoundaryConfig, FilterConfig, GridConfig};
use crate::error::{AggregatorError, Result};
use crate::types::{CellIndex, EventRow, EventType, RawCoordinate};
use geo::Point;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::Path;

/// Event source and report sink over one SQLite database.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS gpsdata (
                client_name TEXT NOT NULL,
                client_timestamp INTEGER NOT NULL,
                client_lat TEXT,
                client_long TEXT,
                event_type INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_gpsdata_client_time
                ON gpsdata(client_name, client_timestamp);

            CREATE TABLE IF NOT EXISTS reportparam (
                report_id INTEGER PRIMARY KEY,
                reused_report_id INTEGER,
                date_range_use INTEGER NOT NULL,
                date_range_start TEXT NOT NULL,
                date_range_end TEXT NOT NULL,
                date_last_hours INTEGER NOT NULL,
                corner1_lat REAL NOT NULL,
                corner1_long REAL NOT NULL,
                corner2_lat REAL NOT NULL,
                corner2_long REAL NOT NULL,
                client_devices TEXT NOT NULL,
                grid_size REAL NOT NULL,
                motionless_max_second INTEGER NOT NULL,
                pruning_inclusion INTEGER NOT NULL,
                reset_state_per_client INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reportdata (
                report_id INTEGER NOT NULL,
                grid_size REAL NOT NULL,
                lat_step INTEGER NOT NULL,
                long_step INTEGER NOT NULL,
                ref_lat REAL NOT NULL,
                ref_long REAL NOT NULL,
                opp_lat REAL NOT NULL,
                opp_long REAL NOT NULL,
                local INTEGER NOT NULL,
                unicast INTEGER NOT NULL,
                broadcast INTEGER NOT NULL,
                multicast INTEGER NOT NULL,
                ack INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reportdata_report ON reportdata(report_id);
            "#,
        )?;
        Ok(())
    }

    /// Append raw events to `gpsdata`.
    pub fn insert_events(&mut self, rows: &[EventRow]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO gpsdata (client_name, client_timestamp, client_lat, client_long, event_type)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.client_id,
                    row.timestamp,
                    row.lat.to_string(),
                    row.long.to_string(),
                    row.event_type.code(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Cells recorded for a report, in insertion order.
    pub fn load_report(&self, report_id: u64) -> Result<Vec<CellAggregate>> {
        let mut stmt = self.conn.prepare(
            "SELECT lat_step, long_step, ref_lat, ref_long, opp_lat, opp_long,
                    local, unicast, broadcast, multicast, ack
             FROM reportdata WHERE report_id = ? ORDER BY rowid",
        )?;
        let cells = stmt
            .query_map(params![report_id as i64], |row| {
                Ok(CellAggregate {
                    index: CellIndex::new(row.get(0)?, row.get(1)?),
                    reference: Point::new(row.get(3)?, row.get(2)?),
                    opposite: Point::new(row.get(5)?, row.get(4)?),
                    local: row.get::<_, i64>(6)? as u64,
                    unicast: row.get::<_, i64>(7)? as u64,
                    broadcast: row.get::<_, i64>(8)? as u64,
                    multicast: row.get::<_, i64>(9)? as u64,
                    ack: row.get::<_, i64>(10)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cells)
    }
}

fn raw_coordinate(value: Value) -> Option<RawCoordinate> {
    match value {
        Value::Real(v) => Some(RawCoordinate::Number(v)),
        Value::Integer(v) => Some(RawCoordinate::Number(v as f64)),
        Value::Text(s) => Some(RawCoordinate::Text(s)),
        Value::Null | Value::Blob(_) => None,
    }
}

impl EventSource for SqliteStore {
    fn fetch(&mut self, query: &EventQuery) -> Result<Vec<EventRow>> {
        if query.clients.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; query.clients.len()].join(", ");
        let sql = format!(
            "SELECT client_name, client_timestamp, client_lat, client_long, event_type
             FROM gpsdata
             WHERE client_timestamp >= ? AND client_timestamp <= ?
               AND client_lat != '' AND client_long != ''
               AND CAST(client_lat AS REAL) >= ? AND CAST(client_lat AS REAL) <= ?
               AND CAST(client_long AS REAL) >= ? AND CAST(client_long AS REAL) <= ?
               AND client_name IN ({})
             ORDER BY client_name, client_timestamp",
            placeholders
        );

        let mut values = vec![
            Value::Integer(query.window.start),
            Value::Integer(query.window.end),
            Value::Real(query.bbox.lat1()),
            Value::Real(query.bbox.lat2()),
            Value::Real(query.bbox.long2()),
            Value::Real(query.bbox.long1()),
        ];
        values.extend(query.clients.iter().cloned().map(Value::Text));

        let mut stmt = self.conn.prepare(&sql)?;
        let raw_rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Value>(2)?,
                    row.get::<_, Value>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(raw_rows.len());
        for (client_id, timestamp, lat, long, code) in raw_rows {
            let lat = raw_coordinate(lat).as_ref().and_then(RawCoordinate::parse);
            let long = raw_coordinate(long).as_ref().and_then(RawCoordinate::parse);
            let event_type = EventType::from_wire(code);
            match (lat, long) {
                (Some(lat), Some(long)) => {
                    rows.push(EventRow::new(client_id, timestamp, lat, long, event_type))
                }
                _ => log::warn!(
                    "gpsdata: skipping {} event of {} at {} with unparsable coordinates",
                    event_type,
                    client_id,
                    timestamp
                ),
            }
        }

        log::debug!("gpsdata: {} rows match the query", rows.len());
        Ok(rows)
    }
}

impl ReportSink for SqliteStore {
    fn next_report_id(&mut self) -> Result<u64> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(report_id) FROM reportparam", [], |row| {
                    row.get(0)
                })?;
        Ok(max.map_or(FIRST_REPORT_ID, |id| id as u64 + 1))
    }

    fn store_report(
        &mut self,
        parameters: &ReportParameters,
        cell_size_meters: f64,
        cells: &[CellAggregate],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        insert_parameters(&tx, parameters)?;
        insert_report(&tx, parameters.report_id, cell_size_meters, cells)?;
        tx.commit()?;
        Ok(())
    }

    fn load_parameters(&mut self, report_id: u64) -> Result<ReportParameters> {
        let parameters = self
            .conn
            .query_row(
                "SELECT report_id, reused_report_id, date_range_use, date_range_start,
                        date_range_end, date_last_hours, corner1_lat, corner1_long,
                        corner2_lat, corner2_long, client_devices, grid_size,
                        motionless_max_second, pruning_inclusion, reset_state_per_client,
                        created_at
                 FROM reportparam WHERE report_id = ?",
                params![report_id as i64],
                |row| {
                    let window = if row.get::<_, bool>(2)? {
                        TimeWindow::Range {
                            start: row.get(3)?,
                            end: row.get(4)?,
                        }
                    } else {
                        TimeWindow::LastHours { hours: row.get(5)? }
                    };
                    let clients: String = row.get(10)?;
                    Ok(ReportParameters {
                        report_id: row.get::<_, i64>(0)? as u64,
                        reused_report_id: row.get::<_, Option<i64>>(1)?.map(|id| id as u64),
                        boundary: BoundaryConfig {
                            corner1_lat: row.get(6)?,
                            corner1_long: row.get(7)?,
                            corner2_lat: row.get(8)?,
                            corner2_long: row.get(9)?,
                        },
                        grid: GridConfig {
                            cell_size_meters: row.get(11)?,
                        },
                        filters: FilterConfig {
                            motionless_max_seconds: row.get(12)?,
                            pruning_inclusion: row.get(13)?,
                            reset_state_per_client: row.get(14)?,
                        },
                        window,
                        clients: clients
                            .split(',')
                            .filter(|c| !c.is_empty())
                            .map(str::to_string)
                            .collect(),
                        created_at: row.get(15)?,
                    })
                },
            )
            .optional()?;

        parameters.ok_or(AggregatorError::ReportNotFound(report_id))
    }
}

fn insert_parameters(conn: &Connection, parameters: &ReportParameters) -> Result<()> {
    let (range_use, range_start, range_end, last_hours) = match &parameters.window {
        TimeWindow::Range { start, end } => (true, start.as_str(), end.as_str(), 0),
        TimeWindow::LastHours { hours } => (false, "", "", *hours),
    };
    let boundary = &parameters.boundary;

    conn.execute(
        "INSERT INTO reportparam (report_id, reused_report_id, date_range_use,
                                  date_range_start, date_range_end, date_last_hours,
                                  corner1_lat, corner1_long, corner2_lat, corner2_long,
                                  client_devices, grid_size, motionless_max_second,
                                  pruning_inclusion, reset_state_per_client, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            parameters.report_id as i64,
            parameters.reused_report_id.map(|id| id as i64),
            range_use,
            range_start,
            range_end,
            last_hours,
            boundary.corner1_lat,
            boundary.corner1_long,
            boundary.corner2_lat,
            boundary.corner2_long,
            parameters.clients.join(","),
            parameters.grid.cell_size_meters,
            parameters.filters.motionless_max_seconds,
            parameters.filters.pruning_inclusion,
            parameters.filters.reset_state_per_client,
            parameters.created_at,
        ],
    )?;
    Ok(())
}

fn insert_report(
    conn: &Connection,
    report_id: u64,
    cell_size_meters: f64,
    cells: &[CellAggregate],
) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO reportdata (report_id, grid_size, lat_step, long_step,
                                 ref_lat, ref_long, opp_lat, opp_long,
                                 local, unicast, broadcast, multicast, ack)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for cell in cells {
        stmt.execute(params![
            report_id as i64,
            cell_size_meters,
            cell.index.lat_step,
            cell.index.long_step,
            cell.reference.y(),
            cell.reference.x(),
            cell.opposite.y(),
            cell.opposite.x(),
            cell.local as i64,
            cell.unicast as i64,
            cell.broadcast as i64,
            cell.multicast as i64,
            cell.ack as i64,
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::temporal::ResolvedWindow;
    use crate::types::Boundary;

    fn query(clients: &[&str]) -> EventQuery {
        EventQuery {
            window: ResolvedWindow { start: 0, end: 1000 },
            bbox: Boundary::new(10.0, 20.0, 10.1, 19.9),
            clients: clients.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_fetch_filters_and_orders() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .insert_events(&[
                EventRow::new("b", 5, 10.05, 19.95, EventType::Local),
                EventRow::new("a", 9, 10.05, 19.95, EventType::Ack),
                EventRow::new("a", 3, 10.02, 19.98, EventType::Local),
                EventRow::new("a", 2000, 10.05, 19.95, EventType::Local),
                EventRow::new("a", 4, 12.0, 19.95, EventType::Local),
                EventRow::new("c", 4, 10.05, 19.95, EventType::Local),
            ])
            .unwrap();

        let rows = store.fetch(&query(&["a", "b"])).unwrap();
        let keys: Vec<(&str, i64)> = rows
            .iter()
            .map(|r| (r.client_id.as_str(), r.timestamp))
            .collect();
        assert_eq!(keys, vec![("a", 3), ("a", 9), ("b", 5)]);
        assert_eq!(rows[1].event_type, EventType::Ack);
        assert_eq!(rows[0].lat, 10.02);
    }

    #[test]
    fn test_fetch_skips_empty_coordinates() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO gpsdata VALUES ('a', 1, '', '19.95', 0), ('a', 2, '10.05', '19.95', 1)",
                [],
            )
            .unwrap();
        let mut store = store;
        let rows = store.fetch(&query(&["a"])).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, EventType::Unicast);
    }

    #[test]
    fn test_report_ids_start_at_1000() {
        let mut store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.next_report_id().unwrap(), 1000);
    }

    #[test]
    fn test_failed_report_insert_leaves_no_parameters() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_cells BEFORE INSERT ON reportdata
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let config = crate::config::Config::default()
            .with_boundary(Boundary::new(10.0, 20.0, 10.1, 19.9))
            .with_clients(["bus-1"]);
        let parameters = ReportParameters::from_config(1000, &config, None, 0);
        let cell = CellAggregate {
            index: CellIndex::new(0, 0),
            reference: Point::new(20.0, 10.0),
            opposite: Point::new(19.99, 10.01),
            local: 1,
            unicast: 0,
            broadcast: 0,
            multicast: 0,
            ack: 0,
        };

        assert!(store.store_report(&parameters, 500.0, &[cell]).is_err());
        assert!(matches!(
            store.load_parameters(1000),
            Err(AggregatorError::ReportNotFound(1000))
        ));
        assert_eq!(store.next_report_id().unwrap(), 1000);

        store.conn.execute_batch("DROP TRIGGER reject_cells").unwrap();
        store.store_report(&parameters, 500.0, &[cell]).unwrap();
        assert_eq!(store.load_report(1000).unwrap(), vec![cell]);
        assert_eq!(store.next_report_id().unwrap(), 1001);
    }
}
