//! Run configuration.
//!
//! A `Config` is built once at startup, validated, and then moved into the
//! [`Aggregator`](crate::Aggregator). Nothing in the crate reads configuration
//! from global state.
use crate::compute::temporal::TimeWindow;
use crate::compute::validation::{
    validate_boundary, validate_cell_size, validate_clients, validate_motionless_threshold,
};
use crate::error::{AggregatorError, Result};
use crate::types::Boundary;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Corner coordinates in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub corner1_lat: f64,
    pub corner1_long: f64,
    pub corner2_lat: f64,
    pub corner2_long: f64,
}

impl BoundaryConfig {
    pub fn to_boundary(&self) -> Boundary {
        Boundary::new(
            self.corner1_lat,
            self.corner1_long,
            self.corner2_lat,
            self.corner2_long,
        )
    }
}

impl From<Boundary> for BoundaryConfig {
    fn from(boundary: Boundary) -> Self {
        Self {
            corner1_lat: boundary.lat1(),
            corner1_long: boundary.long1(),
            corner2_lat: boundary.lat2(),
            corner2_long: boundary.long2(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Edge length of a grid cell in meters
    #[serde(default = "GridConfig::default_cell_size")]
    pub cell_size_meters: f64,
}

impl GridConfig {
    const fn default_cell_size() -> f64 {
        10.0
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size_meters: Self::default_cell_size(),
        }
    }
}

/// Classifier filter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Seconds a client may sit at one position before its events are
    /// suppressed. 0 disables motionless suppression.
    #[serde(default = "FilterConfig::default_motionless_max_seconds")]
    pub motionless_max_seconds: i64,

    /// When false, LOCAL events reported while a client is offline are dropped.
    #[serde(default = "FilterConfig::default_pruning_inclusion")]
    pub pruning_inclusion: bool,

    /// Reset motionless and online state whenever the client id changes in
    /// the row stream. Off by default: state spans the whole fleet timeline.
    #[serde(default)]
    pub reset_state_per_client: bool,
}

impl FilterConfig {
    const fn default_motionless_max_seconds() -> i64 {
        10
    }

    const fn default_pruning_inclusion() -> bool {
        true
    }

    /// Threshold in seconds, `None` when suppression is disabled.
    pub fn motionless_threshold(&self) -> Option<u64> {
        (self.motionless_max_seconds > 0).then_some(self.motionless_max_seconds as u64)
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            motionless_max_seconds: Self::default_motionless_max_seconds(),
            pruning_inclusion: Self::default_pruning_inclusion(),
            reset_state_per_client: false,
        }
    }
}

/// Aggregation run configuration
///
/// # Example
///
/// ```rust
/// use fleetgrid::Config;
///
/// let json = r#"{
///     "boundary": {
///         "corner1_lat": 10.0, "corner1_long": 20.0,
///         "corner2_lat": 10.1, "corner2_long": 19.9
///     },
///     "grid": { "cell_size_meters": 500.0 },
///     "filters": { "motionless_max_seconds": 0, "pruning_inclusion": true },
///     "window": { "mode": "last_hours", "hours": 24 },
///     "clients": ["bus-1", "bus-2"]
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.grid.cell_size_meters, 500.0);
/// assert!(config.record_report);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub boundary: BoundaryConfig,

    #[serde(default)]
    pub grid: GridConfig,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub window: TimeWindow,

    /// Client ids whose events are aggregated
    #[serde(default = "Config::default_clients")]
    pub clients: Vec<String>,

    /// Persist the report and its parameters after a successful run
    #[serde(default = "Config::default_record_report")]
    pub record_report: bool,
}

impl Config {
    fn default_clients() -> Vec<String> {
        vec!["client".to_string()]
    }

    const fn default_record_report() -> bool {
        true
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary.into();
        self
    }

    pub fn with_cell_size(mut self, cell_size_meters: f64) -> Self {
        self.grid.cell_size_meters = cell_size_meters;
        self
    }

    pub fn with_motionless_max_seconds(mut self, seconds: i64) -> Self {
        self.filters.motionless_max_seconds = seconds;
        self
    }

    pub fn with_pruning_inclusion(mut self, include: bool) -> Self {
        self.filters.pruning_inclusion = include;
        self
    }

    pub fn with_reset_state_per_client(mut self, reset: bool) -> Self {
        self.filters.reset_state_per_client = reset;
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_clients<I, S>(mut self, clients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clients = clients.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_record_report(mut self, record: bool) -> Self {
        self.record_report = record;
        self
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary.to_boundary()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        validate_boundary(&self.boundary())?;
        validate_cell_size(self.grid.cell_size_meters)?;
        validate_motionless_threshold(self.filters.motionless_max_seconds)?;
        self.window.validate()?;
        validate_clients(&self.clients)?;
        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AggregatorError::Other(e.to_string()))
    }

    /// Load from a file, picking the format from the extension (`.json`, else TOML).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents),
            #[cfg(feature = "toml")]
            _ => Self::from_toml(&contents),
            #[cfg(not(feature = "toml"))]
            _ => Err(AggregatorError::Other(format!(
                "cannot read {}: TOML support is disabled",
                path.display()
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            boundary: BoundaryConfig::default(),
            grid: GridConfig::default(),
            filters: FilterConfig::default(),
            window: TimeWindow::default(),
            clients: Self::default_clients(),
            record_report: Self::default_record_report(),
        }
    }
}
