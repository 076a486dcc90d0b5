//! Validation for boundaries and run parameters.
//!
//! Everything here runs before classification starts, so a run either fails
//! up front or processes every row.

use crate::error::{AggregatorError, Result};
use crate::types::Boundary;

/// Validates that a corner has finite, in-range decimal degrees.
///
/// Longitude: [-180.0, 180.0], Latitude: [-90.0, 90.0]
///
/// # Examples
///
/// ```
/// use fleetgrid::compute::validation::validate_corner;
///
/// assert!(validate_corner("corner1", 10.0, 20.0).is_ok());
/// assert!(validate_corner("corner1", 95.0, 20.0).is_err());
/// assert!(validate_corner("corner2", 10.0, f64::NAN).is_err());
/// ```
pub fn validate_corner(name: &str, lat: f64, long: f64) -> Result<()> {
    if !lat.is_finite() {
        return Err(AggregatorError::boundary(format!(
            "{} latitude must be finite, got: {}",
            name, lat
        )));
    }

    if !long.is_finite() {
        return Err(AggregatorError::boundary(format!(
            "{} longitude must be finite, got: {}",
            name, long
        )));
    }

    if !(-90.0..=90.0).contains(&lat) {
        return Err(AggregatorError::boundary(format!(
            "{} latitude out of range [-90.0, 90.0]: {}",
            name, lat
        )));
    }

    if !(-180.0..=180.0).contains(&long) {
        return Err(AggregatorError::boundary(format!(
            "{} longitude out of range [-180.0, 180.0]: {}",
            name, long
        )));
    }

    Ok(())
}

/// Validates corner ordering: `lat1 < lat2` and `long1 > long2`.
///
/// corner1 must also sit strictly between the poles because the longitude
/// scale factor is taken at its latitude.
///
/// # Examples
///
/// ```
/// use fleetgrid::Boundary;
/// use fleetgrid::compute::validation::validate_boundary;
///
/// assert!(validate_boundary(&Boundary::new(10.0, 20.0, 10.1, 19.9)).is_ok());
/// // corner1 north of corner2
/// assert!(validate_boundary(&Boundary::new(10.1, 20.0, 10.0, 19.9)).is_err());
/// ```
pub fn validate_boundary(boundary: &Boundary) -> Result<()> {
    validate_corner("corner1", boundary.lat1(), boundary.long1())?;
    validate_corner("corner2", boundary.lat2(), boundary.long2())?;

    if boundary.lat1() >= boundary.lat2() {
        return Err(AggregatorError::boundary(format!(
            "corner1-lat ({}) >= corner2-lat ({})",
            boundary.lat1(),
            boundary.lat2()
        )));
    }

    if boundary.long1() <= boundary.long2() {
        return Err(AggregatorError::boundary(format!(
            "corner1-long ({}) <= corner2-long ({})",
            boundary.long1(),
            boundary.long2()
        )));
    }

    if boundary.lat1().abs() >= 90.0 {
        return Err(AggregatorError::boundary(format!(
            "corner1-lat ({}) must lie strictly between the poles",
            boundary.lat1()
        )));
    }

    Ok(())
}

pub fn validate_cell_size(cell_size_meters: f64) -> Result<()> {
    if !cell_size_meters.is_finite() || cell_size_meters <= 0.0 {
        return Err(AggregatorError::config(
            "grid.cell_size_meters",
            format!("must be a positive number of meters, got {}", cell_size_meters),
        ));
    }
    Ok(())
}

/// Zero disables motionless suppression; negative values are rejected.
pub fn validate_motionless_threshold(seconds: i64) -> Result<()> {
    if seconds < 0 {
        return Err(AggregatorError::config(
            "filters.motionless_max_seconds",
            format!("must be 0 (disabled) or a positive number of seconds, got {}", seconds),
        ));
    }
    Ok(())
}

pub fn validate_clients(clients: &[String]) -> Result<()> {
    if clients.is_empty() {
        return Err(AggregatorError::config("clients", "no client was defined"));
    }

    if let Some(idx) = clients.iter().position(|c| c.trim().is_empty()) {
        return Err(AggregatorError::config(
            "clients",
            format!("client at index {} is empty", idx),
        ));
    }

    Ok(())
}
