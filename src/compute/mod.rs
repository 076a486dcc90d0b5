//! Compute layer for the aggregation engine.
//!
//! This module separates the geometric and temporal computations from the
//! stateful classification pass and from storage concerns:
//! - `spatial`: distance, boundary normalization, cell addressing
//! - `temporal`: time window resolution
//! - `validation`: up-front checks on boundaries and run parameters

pub mod spatial;
pub mod temporal;
pub mod validation;

pub use spatial::{CellLocator, GridGeometry, ScaleFactors, distance_km, distance_m};
pub use temporal::{ResolvedWindow, TimeWindow};
