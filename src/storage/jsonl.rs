//! JSON-lines event source.
//!
//! One object per line:
//!
//! ```text
//! {"client_id":"bus-1","timestamp":1406723400,"lat":"10.05","long":19.95,"event_type":0}
//! ```
//!
//! Coordinates may be numbers or strings. Rows whose coordinates are missing
//! or unparsable are skipped with a warning; lines that are not valid JSON
//! fail the fetch.

use super::{EventQuery, EventSource, sort_rows};
use crate::error::{AggregatorError, Result};
use crate::types::{EventRow, EventType, RawCoordinate};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct RawEventLine {
    client_id: String,
    timestamp: i64,
    #[serde(default)]
    lat: Option<RawCoordinate>,
    #[serde(default)]
    long: Option<RawCoordinate>,
    event_type: EventType,
}

impl RawEventLine {
    fn into_row(self) -> std::result::Result<EventRow, Self> {
        let lat = self.lat.as_ref().and_then(RawCoordinate::parse);
        let long = self.long.as_ref().and_then(RawCoordinate::parse);
        match (lat, long) {
            (Some(lat), Some(long)) => Ok(EventRow::new(
                self.client_id,
                self.timestamp,
                lat,
                long,
                self.event_type,
            )),
            _ => Err(self),
        }
    }
}

/// Reads events from a JSON-lines file on every fetch.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSource for JsonLinesSource {
    fn fetch(&mut self, query: &EventQuery) -> Result<Vec<EventRow>> {
        let file = File::open(&self.path)?;
        let origin = self.path.display().to_string();
        let mut rows = read_rows(BufReader::new(file), &origin)?;
        rows.retain(|row| query.matches(row));
        sort_rows(&mut rows);
        log::debug!("{}: {} rows match the query", origin, rows.len());
        Ok(rows)
    }
}

/// Parse every line of `reader`, skipping blank lines and rows with bad
/// coordinates. `origin` names the input in messages.
pub fn read_rows<R: BufRead>(reader: R, origin: &str) -> Result<Vec<EventRow>> {
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let raw: RawEventLine = serde_json::from_str(line).map_err(|e| {
            AggregatorError::Other(format!("{}:{}: {}", origin, line_no + 1, e))
        })?;

        match raw.into_row() {
            Ok(row) => rows.push(row),
            Err(raw) => {
                skipped += 1;
                log::warn!(
                    "{}:{}: skipping {} event of {} with unparsable coordinates ({:?}, {:?})",
                    origin,
                    line_no + 1,
                    raw.event_type,
                    raw.client_id,
                    raw.lat,
                    raw.long
                );
            }
        }
    }

    if skipped > 0 {
        log::warn!("{}: skipped {} rows with bad coordinates", origin, skipped);
    }
    Ok(rows)
}
