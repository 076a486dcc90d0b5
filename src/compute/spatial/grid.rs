//! Boundary normalization and grid geometry.
//!
//! The configured boundary is enlarged northward and westward until its
//! height and width are whole multiples of the cell size. corner1 never moves,
//! so every cell is addressed by integer steps away from it.

use super::distance::{EARTH_RADIUS_KM, distance_m};
use crate::compute::validation::{validate_boundary, validate_cell_size};
use crate::error::{AggregatorError, Result};
use crate::types::Boundary;
use geo::Point;
use serde::{Deserialize, Serialize};

/// Meters spanned by one degree of latitude on the haversine sphere.
pub const METERS_PER_DEGREE_LATITUDE: f64 =
    EARTH_RADIUS_KM * 1000.0 * std::f64::consts::PI / 180.0;

/// Meter to degree conversion, fixed for the duration of a run.
///
/// Latitude degrees per meter is a constant. Longitude degrees per meter grow
/// toward the poles and are taken at corner1's latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactors {
    pub lat_degrees_per_meter: f64,
    pub long_degrees_per_meter: f64,
}

impl ScaleFactors {
    pub fn at_latitude(lat: f64) -> Self {
        let lat_degrees_per_meter = 1.0 / METERS_PER_DEGREE_LATITUDE;
        Self {
            lat_degrees_per_meter,
            long_degrees_per_meter: lat_degrees_per_meter / lat.to_radians().cos(),
        }
    }
}

/// Working grid for one run: the original boundary, its normalized
/// enlargement, and the number of cells along each axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    cell_size_meters: f64,
    original: Boundary,
    normalized: Boundary,
    scale: ScaleFactors,
    /// Cells stacked northward from corner1 (k1).
    lat_cells: u32,
    /// Cells laid out westward from corner1 (k2).
    long_cells: u32,
    original_width_m: f64,
    original_height_m: f64,
    normalized_width_m: f64,
    normalized_height_m: f64,
}

impl GridGeometry {
    /// Normalize `boundary` for cells of `cell_size_meters`.
    ///
    /// Width is the meridian span from corner1 to corner2's latitude. Height is
    /// the arc along corner1's parallel, in the same units the locator steps
    /// by. Each is rounded up to the smallest whole number of cells and
    /// corner2 is moved to the far edge of the last cell, north and west.
    ///
    /// # Errors
    ///
    /// `InvalidBoundary` if the corner ordering is violated, `InvalidConfiguration`
    /// if the cell size is not positive or too small to index the region.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fleetgrid::Boundary;
    /// use fleetgrid::compute::spatial::GridGeometry;
    ///
    /// let grid = GridGeometry::normalize(&Boundary::new(10.0, 20.0, 10.1, 19.9), 500.0)?;
    /// assert_eq!(grid.dimensions(), (23, 22));
    /// assert!(grid.normalized().lat2() > 10.1);
    /// assert!(grid.normalized().long2() < 19.9);
    /// # Ok::<(), fleetgrid::AggregatorError>(())
    /// ```
    pub fn normalize(boundary: &Boundary, cell_size_meters: f64) -> Result<Self> {
        validate_boundary(boundary)?;
        validate_cell_size(cell_size_meters)?;

        let scale = ScaleFactors::at_latitude(boundary.lat1());
        let corner1 = boundary.corner1;

        let width = distance_m(&corner1, &Point::new(boundary.long1(), boundary.lat2()));
        let height = distance_m(&corner1, &Point::new(boundary.long2(), boundary.lat1()));
        let parallel_height = (boundary.long1() - boundary.long2()) / scale.long_degrees_per_meter;

        let lat_cells = cells_to_cover(width, cell_size_meters)?;
        let long_cells = cells_to_cover(parallel_height.max(height), cell_size_meters)?;

        // corner2 sits on the last grid line so the locator's cells tile it
        let lat_step = cell_size_meters * scale.lat_degrees_per_meter;
        let long_step = cell_size_meters * scale.long_degrees_per_meter;
        let normalized_lat2 =
            (boundary.lat1() + lat_cells as f64 * lat_step).max(boundary.lat2());
        let normalized_long2 =
            (boundary.long1() - long_cells as f64 * long_step).min(boundary.long2());
        let normalized = Boundary::new(
            boundary.lat1(),
            boundary.long1(),
            normalized_lat2,
            normalized_long2,
        );

        let normalized_width_m =
            distance_m(&corner1, &Point::new(boundary.long1(), normalized_lat2));
        let normalized_height_m =
            (boundary.long1() - normalized_long2) / scale.long_degrees_per_meter;

        log::debug!(
            "Normalized boundary {:?} -> {:?}: {}x{} cells of {}m",
            boundary,
            normalized,
            lat_cells,
            long_cells,
            cell_size_meters
        );

        Ok(Self {
            cell_size_meters,
            original: *boundary,
            normalized,
            scale,
            lat_cells,
            long_cells,
            original_width_m: width,
            original_height_m: height,
            normalized_width_m,
            normalized_height_m,
        })
    }

    pub fn cell_size_meters(&self) -> f64 {
        self.cell_size_meters
    }

    pub fn original(&self) -> &Boundary {
        &self.original
    }

    pub fn normalized(&self) -> &Boundary {
        &self.normalized
    }

    pub fn scale(&self) -> ScaleFactors {
        self.scale
    }

    /// Grid dimensions `(k1, k2)`: cells along the latitude span, then along
    /// the longitude span.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.lat_cells, self.long_cells)
    }

    pub fn cell_count(&self) -> u64 {
        self.lat_cells as u64 * self.long_cells as u64
    }

    /// One cell step in latitude degrees.
    pub fn lat_step_degrees(&self) -> f64 {
        self.cell_size_meters * self.scale.lat_degrees_per_meter
    }

    /// One cell step in longitude degrees.
    pub fn long_step_degrees(&self) -> f64 {
        self.cell_size_meters * self.scale.long_degrees_per_meter
    }

    /// Original `(width, height)` in meters.
    pub fn original_extent_m(&self) -> (f64, f64) {
        (self.original_width_m, self.original_height_m)
    }

    /// Normalized `(width, height)` in meters, recomputed from the enlarged
    /// corners. Height is measured along corner1's parallel.
    pub fn normalized_extent_m(&self) -> (f64, f64) {
        (self.normalized_width_m, self.normalized_height_m)
    }

    /// Inclusive containment within the normalized boundary.
    pub fn contains(&self, lat: f64, long: f64) -> bool {
        self.normalized.contains(lat, long)
    }
}

/// Smallest `k >= 1` with `k * cell_size >= length`.
fn cells_to_cover(length_m: f64, cell_size_meters: f64) -> Result<u32> {
    let ratio = (length_m / cell_size_meters).ceil();
    if !ratio.is_finite() || ratio >= u32::MAX as f64 {
        return Err(AggregatorError::config(
            "grid.cell_size_meters",
            format!(
                "{}m cells are too small for a {:.3}m boundary span",
                cell_size_meters, length_m
            ),
        ));
    }

    let mut k = (ratio as u32).max(1);
    // ceil of a rounded quotient can land one short
    if (k as f64) * cell_size_meters < length_m {
        k += 1;
    }
    Ok(k)
}
