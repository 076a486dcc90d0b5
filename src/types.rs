//! Core data types: event rows, event categories, boundaries and grid addresses.
use geo::Point;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Number of event categories that carry a per-cell counter.
pub const AGGREGATED_CATEGORIES: usize = 5;

/// Event category reported by a fleet client.
///
/// The first five variants are counted per cell. `Online`, `Offline` and
/// `Timeout` are control events that only drive filter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawEventCode", into = "u8")]
pub enum EventType {
    Local,
    Unicast,
    Multicast,
    Broadcast,
    Ack,
    Online,
    Offline,
    Timeout,
    /// Codes with no meaning to the aggregator. Never counted, never change state.
    Unknown(u8),
}

impl EventType {
    pub const fn code(self) -> u8 {
        match self {
            EventType::Local => 0,
            EventType::Unicast => 1,
            EventType::Multicast => 2,
            EventType::Broadcast => 3,
            EventType::Ack => 4,
            EventType::Online => 7,
            EventType::Offline => 8,
            EventType::Timeout => 9,
            EventType::Unknown(code) => code,
        }
    }

    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => EventType::Local,
            1 => EventType::Unicast,
            2 => EventType::Multicast,
            3 => EventType::Broadcast,
            4 => EventType::Ack,
            7 => EventType::Online,
            8 => EventType::Offline,
            9 => EventType::Timeout,
            other => EventType::Unknown(other),
        }
    }

    /// Category for a code read from a data source. Codes that do not fit a
    /// `u8` become `Unknown(u8::MAX)`.
    pub fn from_wire(code: i64) -> Self {
        u8::try_from(code)
            .map(EventType::from_code)
            .unwrap_or(EventType::Unknown(u8::MAX))
    }

    /// Counter slot for the five aggregated categories, `None` otherwise.
    ///
    /// Slots follow the category codes: LOCAL, UNICAST, MULTICAST, BROADCAST, ACK.
    pub const fn counter_slot(self) -> Option<usize> {
        match self {
            EventType::Local => Some(0),
            EventType::Unicast => Some(1),
            EventType::Multicast => Some(2),
            EventType::Broadcast => Some(3),
            EventType::Ack => Some(4),
            _ => None,
        }
    }

    pub const fn is_aggregated(self) -> bool {
        self.counter_slot().is_some()
    }
}

impl From<u8> for EventType {
    fn from(code: u8) -> Self {
        EventType::from_code(code)
    }
}

/// An event code as delivered by a data source, either as a number or as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEventCode {
    Number(i64),
    Text(String),
}

impl From<RawEventCode> for EventType {
    fn from(raw: RawEventCode) -> Self {
        match raw {
            RawEventCode::Number(code) => EventType::from_wire(code),
            RawEventCode::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(EventType::from_wire)
                .unwrap_or(EventType::Unknown(u8::MAX)),
        }
    }
}

impl From<EventType> for u8 {
    fn from(event: EventType) -> Self {
        event.code()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Local => write!(f, "local"),
            EventType::Unicast => write!(f, "ucast"),
            EventType::Multicast => write!(f, "mcast"),
            EventType::Broadcast => write!(f, "bcast"),
            EventType::Ack => write!(f, "ack"),
            EventType::Online => write!(f, "online"),
            EventType::Offline => write!(f, "offline"),
            EventType::Timeout => write!(f, "timeout"),
            EventType::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// A coordinate as delivered by a data source: decimal degrees, either as a
/// number or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinate {
    Number(f64),
    Text(String),
}

impl RawCoordinate {
    /// Parse into finite decimal degrees. Empty or malformed text yields `None`.
    pub fn parse(&self) -> Option<f64> {
        let value = match self {
            RawCoordinate::Number(v) => *v,
            RawCoordinate::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

fn deserialize_coordinate<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawCoordinate::deserialize(deserializer)?;
    raw.parse()
        .ok_or_else(|| serde::de::Error::custom(format!("invalid coordinate: {:?}", raw)))
}

/// One geolocation event, consumed once in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub client_id: String,
    /// Seconds since the Unix epoch, UTC.
    pub timestamp: i64,
    #[serde(deserialize_with = "deserialize_coordinate")]
    pub lat: f64,
    #[serde(deserialize_with = "deserialize_coordinate")]
    pub long: f64,
    pub event_type: EventType,
}

impl EventRow {
    pub fn new(
        client_id: impl Into<String>,
        timestamp: i64,
        lat: f64,
        long: f64,
        event_type: EventType,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            timestamp,
            lat,
            long,
            event_type,
        }
    }

    /// Position as a `geo::Point` (x = longitude, y = latitude).
    pub fn position(&self) -> Point {
        Point::new(self.long, self.lat)
    }
}

/// Region of interest given by two opposite corners.
///
/// `corner1` is the lower-latitude, higher-longitude reference corner and
/// `corner2` the higher-latitude, lower-longitude one: `lat1 < lat2` and
/// `long1 > long2`. Points use x = longitude, y = latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    pub corner1: Point,
    pub corner2: Point,
}

impl Boundary {
    pub fn new(corner1_lat: f64, corner1_long: f64, corner2_lat: f64, corner2_long: f64) -> Self {
        Self {
            corner1: Point::new(corner1_long, corner1_lat),
            corner2: Point::new(corner2_long, corner2_lat),
        }
    }

    pub fn lat1(&self) -> f64 {
        self.corner1.y()
    }

    pub fn long1(&self) -> f64 {
        self.corner1.x()
    }

    pub fn lat2(&self) -> f64 {
        self.corner2.y()
    }

    pub fn long2(&self) -> f64 {
        self.corner2.x()
    }

    /// Inclusive containment test.
    pub fn contains(&self, lat: f64, long: f64) -> bool {
        lat >= self.lat1() && lat <= self.lat2() && long <= self.long1() && long >= self.long2()
    }
}

/// Integer address of a grid cell, counted in cell-size steps from corner1:
/// `lat_step` northward and `long_step` westward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellIndex {
    pub lat_step: u32,
    pub long_step: u32,
}

impl CellIndex {
    pub const fn new(lat_step: u32, long_step: u32) -> Self {
        Self {
            lat_step,
            long_step,
        }
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lat_step, self.long_step)
    }
}
