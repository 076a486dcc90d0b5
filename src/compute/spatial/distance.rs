//! Great-circle distance.

use geo::{Distance, HaversineMeasure, Point};

/// Earth radius used for every distance and scale computation in the crate.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine on a sphere of [`EARTH_RADIUS_KM`].
const SPHERE: HaversineMeasure = HaversineMeasure::new(EARTH_RADIUS_KM * 1000.0);

/// Haversine distance between two points in kilometers.
///
/// Points use x = longitude, y = latitude, in decimal degrees. Non-finite
/// input propagates as NaN.
///
/// # Examples
///
/// ```rust
/// use fleetgrid::Point;
/// use fleetgrid::compute::spatial::distance_km;
///
/// let a = Point::new(20.0, 10.0);
/// let b = Point::new(20.0, 10.1);
/// let d = distance_km(&a, &b);
/// assert!((d - 11.1195).abs() < 0.001);
/// ```
pub fn distance_km(p1: &Point, p2: &Point) -> f64 {
    distance_m(p1, p2) / 1000.0
}

/// Haversine distance in meters.
pub fn distance_m(p1: &Point, p2: &Point) -> f64 {
    SPHERE.distance(*p1, *p2)
}
