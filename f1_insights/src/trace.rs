use serde::Serialize;
use tracing::{info, warn};

use crate::comparison::{Comparison, DriverFocus, Emphasis, Outcome};
use crate::derive::{
    amplify_flat_torque, compare_outcomes, compute_derived, ComparisonFindings, DerivedSeries,
    MetricSummary,
};
use crate::telemetry::{fetch_reference_lap, SessionKey, TelemetrySource};
use crate::window::{extract_turn_window, TurnWindow};
use crate::InsightError;

/// Everything the chart composer needs for one driver of a comparison.
#[derive(Clone, Debug)]
pub struct DriverTrace {
    pub focus: DriverFocus,
    pub session: SessionKey,
    pub lap_number: u32,
    pub window: TurnWindow,
    pub derived: DerivedSeries,
    pub summary: MetricSummary,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriverFailure {
    pub code: String,
    pub reason: String,
}

#[derive(Clone, Debug)]
pub struct ComparisonData {
    pub traces: Vec<DriverTrace>,
    pub failures: Vec<DriverFailure>,
    pub findings: ComparisonFindings,
}

impl ComparisonData {
    pub fn is_renderable(&self) -> bool {
        !self.traces.is_empty()
    }
}

/// Fetch, window and derive one driver's telemetry.
pub fn build_driver_trace<S>(
    source: &S,
    comparison: &Comparison,
    focus: &DriverFocus,
    fallback_seasons: &[u16],
) -> Result<DriverTrace, InsightError>
where
    S: TelemetrySource + ?Sized,
{
    info!("Extracting data for {} at Turn {}", focus.code, focus.turn);
    let lap = fetch_reference_lap(source, &comparison.session, fallback_seasons, &focus.code)?;
    let window = extract_turn_window(&lap.samples, focus.turn, crate::WINDOW_HALF_WIDTH_M)?;
    let mut derived = compute_derived(&window.samples)?;
    if comparison.emphasis == Emphasis::SingleVsMultiple
        && amplify_flat_torque(&mut derived, focus.outcome == Outcome::Crash)
    {
        info!("Enhancing torque visualization for {}", focus.code);
    }
    let summary = derived.summary();
    Ok(DriverTrace {
        focus: focus.clone(),
        session: lap.session,
        lap_number: lap.lap_number,
        window,
        derived,
        summary,
    })
}

/// Build every driver of `comparison`; a failing driver is recorded and skipped.
pub fn collect_comparison<S>(
    source: &S,
    comparison: &Comparison,
    fallback_seasons: &[u16],
) -> ComparisonData
where
    S: TelemetrySource + ?Sized,
{
    let mut traces = Vec::with_capacity(comparison.drivers.len());
    let mut failures = Vec::new();
    for focus in &comparison.drivers {
        match build_driver_trace(source, comparison, focus, fallback_seasons) {
            Ok(trace) => traces.push(trace),
            Err(err) => {
                warn!(
                    "Error getting turn data for {} at Turn {}: {}",
                    focus.code, focus.turn, err
                );
                failures.push(DriverFailure {
                    code: focus.code.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    let summaries = |outcome: Outcome| -> Vec<MetricSummary> {
        traces
            .iter()
            .filter(|t| t.focus.outcome == outcome)
            .map(|t| t.summary.clone())
            .collect()
    };
    let findings = compare_outcomes(&summaries(Outcome::Crash), &summaries(Outcome::Save));

    ComparisonData {
        traces,
        failures,
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::key_comparisons;
    use crate::telemetry::{DriverLaps, Lap, TelemetrySample};

    /// Serves one synthetic lap per driver code; any other code is unavailable.
    struct SyntheticSource {
        drivers: Vec<&'static str>,
    }

    fn corner_lap(aggressive: bool) -> Vec<TelemetrySample> {
        let speeds = [
            250.0, 220.0, 180.0, 140.0, 110.0, 95.0, 105.0, 130.0, 160.0, 190.0, 220.0, 240.0,
        ];
        let smooth = [100.0, 60.0, 20.0, 0.0, 0.0, 10.0, 20.0, 35.0, 50.0, 65.0, 80.0, 100.0];
        let sharp = [100.0, 60.0, 20.0, 0.0, 0.0, 5.0, 90.0, 30.0, 100.0, 100.0, 100.0, 100.0];
        let throttle = if aggressive { sharp } else { smooth };
        speeds
            .iter()
            .zip(throttle)
            .enumerate()
            .map(|(i, (&speed_kph, throttle))| TelemetrySample {
                time_s: i as f64 * 0.25,
                distance_m: i as f64 * 15.0,
                speed_kph,
                throttle: Some(throttle),
                brake: Some(throttle == 0.0),
                gear: Some(3),
                rpm: Some(7_000.0 + speed_kph * 20.0),
            })
            .collect()
    }

    impl TelemetrySource for SyntheticSource {
        fn driver_laps(
            &self,
            session: &SessionKey,
            driver: &str,
        ) -> Result<DriverLaps, InsightError> {
            if session.season != 2023 || !self.drivers.iter().any(|d| *d == driver) {
                return Err(InsightError::DataUnavailable(format!("{} {}", driver, session)));
            }
            Ok(DriverLaps {
                driver: driver.to_string(),
                session: session.clone(),
                laps: vec![Lap {
                    number: 12,
                    lap_time_s: Some(80.2),
                    samples: corner_lap(driver == "SAI"),
                }],
            })
        }
    }

    #[test]
    fn collects_all_drivers_from_fallback_season() {
        let session = SessionKey::new(2025, "Australia", "R");
        let comparison = &key_comparisons(&session)[0];
        let source = SyntheticSource {
            drivers: vec!["SAI", "PIA"],
        };
        let data = collect_comparison(&source, comparison, &[2023]);
        assert!(data.failures.is_empty());
        assert_eq!(data.traces.len(), 2);
        for trace in &data.traces {
            assert_eq!(trace.session.season, 2023);
            assert_eq!(trace.derived.len(), trace.window.len());
            assert!(trace.window.exact_turn || trace.focus.turn > 1);
        }
        let sai = &data.traces[0];
        let pia = &data.traces[1];
        assert!(sai.summary.mean_abs_throttle_delta > pia.summary.mean_abs_throttle_delta);
        assert!(data.findings.throttle_rate_ratio.unwrap() > 1.0);
    }

    #[test]
    fn missing_driver_is_isolated() {
        let session = SessionKey::new(2025, "Australia", "R");
        let comparison = &key_comparisons(&session)[2];
        let source = SyntheticSource {
            drivers: vec!["ALO", "DOO"],
        };
        let data = collect_comparison(&source, comparison, &[2023]);
        assert_eq!(data.traces.len(), 2);
        assert_eq!(data.failures.len(), 1);
        assert_eq!(data.failures[0].code, "SAI");
        assert!(data.is_renderable());
        assert_eq!(data.findings, ComparisonFindings::default());
    }

    #[test]
    fn no_data_is_not_renderable() {
        let session = SessionKey::new(2025, "Australia", "R");
        let comparison = &key_comparisons(&session)[1];
        let source = SyntheticSource { drivers: vec![] };
        let data = collect_comparison(&source, comparison, &[]);
        assert!(!data.is_renderable());
        assert_eq!(data.failures.len(), 2);
    }
}
