//! Cell addressing within a normalized grid.

use super::grid::GridGeometry;
use crate::types::CellIndex;
use geo::Point;

/// Maps points inside the normalized boundary to the cell containing them.
///
/// A cell's reference corner sits `lat_step` cell sizes north and `long_step`
/// cell sizes west of corner1; its opposite corner is one more step in each
/// direction. Points on an interior grid line belong to the cell whose
/// reference corner lies on that line. Points on the outer edge of the
/// normalized boundary belong to the last cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellLocator {
    origin_lat: f64,
    origin_long: f64,
    lat_step: f64,
    long_step: f64,
    lat_cells: u32,
    long_cells: u32,
}

impl CellLocator {
    pub fn new(geometry: &GridGeometry) -> Self {
        let (lat_cells, long_cells) = geometry.dimensions();
        let origin = geometry.normalized().corner1;
        Self {
            origin_lat: origin.y(),
            origin_long: origin.x(),
            lat_step: geometry.lat_step_degrees(),
            long_step: geometry.long_step_degrees(),
            lat_cells,
            long_cells,
        }
    }

    /// Locate by direct arithmetic.
    ///
    /// The caller has already checked the point lies within the normalized
    /// boundary.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fleetgrid::{Boundary, CellIndex};
    /// use fleetgrid::compute::spatial::{CellLocator, GridGeometry};
    ///
    /// let grid = GridGeometry::normalize(&Boundary::new(10.0, 20.0, 10.1, 19.9), 500.0)?;
    /// let locator = CellLocator::new(&grid);
    /// assert_eq!(locator.locate(10.0, 20.0), CellIndex::new(0, 0));
    /// assert_eq!(locator.locate(10.0001, 19.9999), CellIndex::new(0, 0));
    /// # Ok::<(), fleetgrid::AggregatorError>(())
    /// ```
    pub fn locate(&self, lat: f64, long: f64) -> CellIndex {
        let lat_steps = ((lat - self.origin_lat) / self.lat_step).floor();
        let long_steps = ((self.origin_long - long) / self.long_step).floor();
        CellIndex::new(
            clamp_steps(lat_steps, self.lat_cells),
            clamp_steps(long_steps, self.long_cells),
        )
    }

    /// Locate by walking from corner1 one cell at a time.
    ///
    /// Accumulates floating-point drift over long walks; kept as the reference
    /// for [`CellLocator::locate`].
    pub fn locate_by_stepping(&self, lat: f64, long: f64) -> CellIndex {
        let mut steps: i64 = 0;
        let mut cursor = self.origin_lat;
        while cursor < lat {
            cursor += self.lat_step;
            steps += 1;
        }
        if cursor > lat {
            steps -= 1;
        }
        let lat_steps = steps;

        steps = 0;
        cursor = self.origin_long;
        while cursor > long {
            cursor -= self.long_step;
            steps += 1;
        }
        if cursor < long {
            steps -= 1;
        }

        CellIndex::new(
            clamp_steps(lat_steps as f64, self.lat_cells),
            clamp_steps(steps as f64, self.long_cells),
        )
    }

    /// Anchor coordinate of the cell.
    pub fn reference_corner(&self, index: CellIndex) -> Point {
        Point::new(
            self.origin_long - index.long_step as f64 * self.long_step,
            self.origin_lat + index.lat_step as f64 * self.lat_step,
        )
    }

    /// The corner one step north and one step west of the reference corner.
    pub fn opposite_corner(&self, index: CellIndex) -> Point {
        let reference = self.reference_corner(index);
        Point::new(reference.x() - self.long_step, reference.y() + self.lat_step)
    }

    /// Grid dimensions this locator addresses.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.lat_cells, self.long_cells)
    }
}

fn clamp_steps(steps: f64, cells: u32) -> u32 {
    if steps <= 0.0 || steps.is_nan() {
        0
    } else {
        (steps as u32).min(cells.saturating_sub(1))
    }
}
