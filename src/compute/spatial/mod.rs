//! Spatial computation: distance, boundary normalization, cell addressing.

pub mod distance;
pub mod grid;
pub mod locator;

pub use distance::{EARTH_RADIUS_KM, distance_km, distance_m};
pub use grid::{GridGeometry, METERS_PER_DEGREE_LATITUDE, ScaleFactors};
pub use locator::CellLocator;
