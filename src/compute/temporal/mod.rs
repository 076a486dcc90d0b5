//! Temporal computation: resolving the run's time window.

pub mod window;

pub use window::{
    ResolvedWindow, TimeWindow, WINDOW_TIME_FORMAT, format_window_time, parse_window_time,
};
