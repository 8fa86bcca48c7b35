//! Telemetry windows and derived throttle/torque metrics for F1 crash comparisons.
//!
//! The crate reads per-driver lap telemetry from an on-disk cache, cuts a
//! window around the corner of interest, and derives the series the chart
//! composer draws: throttle deltas, a torque proxy, its rolling baseline, and
//! the spike/recovery annotations placed on top of them.

pub mod comparison;
pub mod derive;
pub mod telemetry;
pub mod trace;
pub mod window;

use thiserror::Error;

pub use comparison::{
    key_comparisons, slugify, team_info, validate_comparisons, Comparison, DriverFocus, Emphasis,
    Outcome, Rgb, TeamInfo, CRASH_COLOR, PURPLE_COLOR, SAVE_COLOR, SUMMARY_STEM, WARNING_COLOR,
};
pub use derive::{
    amplify_flat_torque, compare_outcomes, compute_derived, compute_derived_columns,
    ComparisonFindings, DerivedInput, DerivedSeries, MetricSummary, TorqueModel,
};
pub use telemetry::{
    fetch_reference_lap, parse_driver_laps, CacheDirSource, DriverLaps, Lap, LapTelemetry,
    SessionKey, TelemetrySample, TelemetrySource,
};
pub use trace::{build_driver_trace, collect_comparison, ComparisonData, DriverFailure, DriverTrace};
pub use window::{extract_turn_window, local_speed_minima, TurnWindow, WINDOW_HALF_WIDTH_M};

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("telemetry unavailable: {0}")]
    DataUnavailable(String),
    #[error("telemetry input is empty")]
    EmptyInput,
    #[error("malformed telemetry: {0}")]
    MalformedInput(String),
    #[error("failed to parse telemetry CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read telemetry: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl InsightError {
    /// True for errors that a different season might resolve.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, InsightError::DataUnavailable(_))
    }
}
