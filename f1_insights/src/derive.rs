//! Derived throttle and torque-proxy series.
//!
//! The torque proxy is a visualization heuristic that emphasizes abrupt
//! throttle application. It is not calibrated against real drivetrain
//! torque and must not be read as such.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::telemetry::TelemetrySample;
use crate::InsightError;

/// Number of preceding samples averaged into the rolling baseline.
pub const ROLLING_BASELINE_SAMPLES: usize = 5;
/// Torque-proxy excess over the rolling baseline that marks a spike.
pub const SPIKE_THRESHOLD: f64 = 150.0;
/// Below this RPM standard deviation the engine-speed channel is treated as flat.
pub const FLAT_RPM_STD: f64 = 100.0;
pub const UNSTABLE_THROTTLE_DELTA: f64 = 10.0;
pub const RECOVERY_PRIOR_DROP: f64 = -5.0;
pub const RECOVERY_RISE: f64 = 3.0;
/// Below this standard deviation a torque series is considered flat.
pub const FLAT_TORQUE_STD: f64 = 0.01;

const SYNTHETIC_RPM_PER_KPH: f64 = 50.0;
const SMOOTHING_WINDOW: usize = 5;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TorqueModel {
    /// Engine-speed channel present and varying.
    EngineSpeed,
    /// Engine speed synthesized from road speed, with a throttle-rate boost.
    SyntheticEngineSpeed,
}

/// Column view of a telemetry window. All present columns must share one length.
#[derive(Clone, Copy, Debug)]
pub struct DerivedInput<'a> {
    pub time_s: &'a [f64],
    pub speed_kph: &'a [f64],
    pub throttle: &'a [f64],
    pub rpm: Option<&'a [f64]>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DerivedSeries {
    pub time_s: Vec<f64>,
    pub throttle: Vec<f64>,
    pub throttle_delta: Vec<f64>,
    pub speed_delta: Vec<f64>,
    pub torque: Vec<f64>,
    pub baseline: Vec<f64>,
    /// Sample indices flagged as torque spikes, ascending.
    pub spikes: Vec<usize>,
    pub unstable: Vec<bool>,
    /// Sample indices where throttle is re-applied right after a lift.
    pub recoveries: Vec<usize>,
    pub model: TorqueModel,
    pub amplified: bool,
}

impl DerivedSeries {
    pub fn len(&self) -> usize {
        self.torque.len()
    }

    pub fn is_empty(&self) -> bool {
        self.torque.is_empty()
    }

    pub fn summary(&self) -> MetricSummary {
        let surge = self
            .torque
            .iter()
            .zip(&self.baseline)
            .map(|(t, b)| t - b)
            .fold(0.0_f64, f64::max);
        let abs_delta: Vec<f64> = self.throttle_delta.iter().map(|d| d.abs()).collect();
        let mean_abs = if abs_delta.len() > 1 {
            abs_delta[1..].iter().sum::<f64>() / (abs_delta.len() - 1) as f64
        } else {
            0.0
        };
        MetricSummary {
            samples: self.len(),
            peak_torque: self.torque.iter().copied().fold(f64::MIN, f64::max),
            peak_surge: surge,
            max_throttle_rise: self.throttle_delta.iter().copied().fold(0.0, f64::max),
            max_abs_throttle_delta: abs_delta.iter().copied().fold(0.0, f64::max),
            mean_abs_throttle_delta: mean_abs,
            spike_count: self.spikes.len(),
            unstable_count: self.unstable.iter().filter(|&&u| u).count(),
            recovery_count: self.recoveries.len(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricSummary {
    pub samples: usize,
    pub peak_torque: f64,
    pub peak_surge: f64,
    pub max_throttle_rise: f64,
    pub max_abs_throttle_delta: f64,
    /// Mean |throttle delta| over consecutive pairs: the throttle change rate.
    pub mean_abs_throttle_delta: f64,
    pub spike_count: usize,
    pub unstable_count: usize,
    pub recovery_count: usize,
}

/// Crash-over-save ratios for one comparison.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ComparisonFindings {
    pub surge_ratio: Option<f64>,
    pub throttle_rate_ratio: Option<f64>,
}

/// Derive all series for a window of samples. Every sample needs a throttle value.
pub fn compute_derived(samples: &[TelemetrySample]) -> Result<DerivedSeries, InsightError> {
    if samples.is_empty() {
        return Err(InsightError::EmptyInput);
    }
    let time_s: Vec<f64> = samples.iter().map(|s| s.time_s).collect();
    let speed_kph: Vec<f64> = samples.iter().map(|s| s.speed_kph).collect();
    let throttle = samples
        .iter()
        .enumerate()
        .map(|(i, s)| {
            s.throttle.ok_or_else(|| {
                InsightError::MalformedInput(format!("sample {} has no throttle value", i))
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    let rpm: Option<Vec<f64>> = samples.iter().map(|s| s.rpm).collect();

    compute_derived_columns(DerivedInput {
        time_s: &time_s,
        speed_kph: &speed_kph,
        throttle: &throttle,
        rpm: rpm.as_deref(),
    })
}

pub fn compute_derived_columns(input: DerivedInput<'_>) -> Result<DerivedSeries, InsightError> {
    let n = input.throttle.len();
    if n == 0 {
        return Err(InsightError::EmptyInput);
    }
    let mut columns = vec![("time", input.time_s.len()), ("speed", input.speed_kph.len())];
    if let Some(rpm) = input.rpm {
        columns.push(("rpm", rpm.len()));
    }
    for (name, len) in columns {
        if len != n {
            return Err(InsightError::MalformedInput(format!(
                "{} column has {} samples, throttle has {}",
                name, len, n
            )));
        }
    }
    let all_finite = input
        .throttle
        .iter()
        .chain(input.speed_kph)
        .chain(input.rpm.unwrap_or(&[]))
        .all(|v| v.is_finite());
    if !all_finite {
        return Err(InsightError::MalformedInput(
            "non-finite throttle, speed or rpm value".into(),
        ));
    }

    let throttle = Array1::from_vec(input.throttle.to_vec());
    let speed = Array1::from_vec(input.speed_kph.to_vec());
    let throttle_delta = first_difference(&throttle);
    let speed_delta = first_difference(&speed);

    let engine_rpm = input
        .rpm
        .filter(|rpm| sample_std(rpm).map_or(false, |std| std >= FLAT_RPM_STD));
    let (model, torque) = match engine_rpm {
        Some(rpm) => {
            let rpm = Array1::from_vec(rpm.to_vec());
            let power = &rpm * &throttle / 100.0;
            (TorqueModel::EngineSpeed, power / (&rpm + 1.0) * 1000.0)
        }
        None => {
            let rpm = &speed * SYNTHETIC_RPM_PER_KPH;
            let boost = throttle_delta.mapv(|d| 1.0 + d.abs() / 10.0);
            let power = &rpm * &throttle / 100.0 * &boost;
            let torque = power / (&rpm + 1.0) * 1000.0 + &throttle_delta * 0.01;
            (TorqueModel::SyntheticEngineSpeed, torque)
        }
    };

    let torque = torque.to_vec();
    let baseline = rolling_baseline(&torque, ROLLING_BASELINE_SAMPLES);
    let spikes = detect_spikes(&torque, &baseline, SPIKE_THRESHOLD);
    let throttle_delta = throttle_delta.to_vec();
    let unstable = throttle_delta
        .iter()
        .map(|d| d.abs() > UNSTABLE_THROTTLE_DELTA)
        .collect();
    let recoveries = detect_recoveries(&throttle_delta);

    Ok(DerivedSeries {
        time_s: input.time_s.to_vec(),
        throttle: input.throttle.to_vec(),
        throttle_delta,
        speed_delta: speed_delta.to_vec(),
        torque,
        baseline,
        spikes,
        unstable,
        recoveries,
        model,
        amplified: false,
    })
}

/// Re-shape a flat torque series so the throttle modulation becomes visible.
///
/// Returns false (and leaves the series untouched) when the torque already
/// varies. The replacement is scaled harder for crash drivers, whose large
/// throttle rises are also flagged as spikes.
pub fn amplify_flat_torque(series: &mut DerivedSeries, crash: bool) -> bool {
    let flat = sample_std(&series.torque).map_or(true, |std| std < FLAT_TORQUE_STD);
    if series.is_empty() || !flat {
        return false;
    }

    let mean = series.torque.iter().sum::<f64>() / series.len() as f64;
    let smoothed = centered_mean(&series.throttle_delta, SMOOTHING_WINDOW);
    let (delta_scale, speed_scale) = if crash { (0.008, 0.0005) } else { (0.005, 0.0002) };
    series.torque = smoothed
        .iter()
        .zip(&series.speed_delta)
        .map(|(s, v)| mean + s * delta_scale + v * speed_scale)
        .collect();
    series.baseline = rolling_baseline(&series.torque, ROLLING_BASELINE_SAMPLES);

    let mut spikes = detect_spikes(&series.torque, &series.baseline, SPIKE_THRESHOLD);
    if crash {
        spikes.extend(
            series
                .throttle_delta
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > UNSTABLE_THROTTLE_DELTA)
                .map(|(i, _)| i),
        );
        spikes.sort_unstable();
        spikes.dedup();
    }
    series.spikes = spikes;
    series.recoveries = detect_recoveries(&series.throttle_delta);
    series.amplified = true;
    true
}

/// Crash-over-save ratios of mean peak surge and mean throttle change rate.
pub fn compare_outcomes(crash: &[MetricSummary], save: &[MetricSummary]) -> ComparisonFindings {
    fn mean_of(rows: &[MetricSummary], f: fn(&MetricSummary) -> f64) -> Option<f64> {
        if rows.is_empty() {
            return None;
        }
        Some(rows.iter().map(f).sum::<f64>() / rows.len() as f64)
    }
    fn ratio(num: Option<f64>, den: Option<f64>) -> Option<f64> {
        match (num, den) {
            (Some(n), Some(d)) if d.abs() > f64::EPSILON => Some(n / d),
            _ => None,
        }
    }
    ComparisonFindings {
        surge_ratio: ratio(
            mean_of(crash, |m| m.peak_surge),
            mean_of(save, |m| m.peak_surge),
        ),
        throttle_rate_ratio: ratio(
            mean_of(crash, |m| m.mean_abs_throttle_delta),
            mean_of(save, |m| m.mean_abs_throttle_delta),
        ),
    }
}

fn first_difference(values: &Array1<f64>) -> Array1<f64> {
    let mut out = Array1::zeros(values.len());
    for i in 1..values.len() {
        out[i] = values[i] - values[i - 1];
    }
    out
}

fn rolling_baseline(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i == 0 {
                return values[0];
            }
            let prior = &values[i.saturating_sub(window)..i];
            prior.iter().sum::<f64>() / prior.len() as f64
        })
        .collect()
}

fn detect_spikes(torque: &[f64], baseline: &[f64], threshold: f64) -> Vec<usize> {
    torque
        .iter()
        .zip(baseline)
        .enumerate()
        .filter(|(_, (t, b))| *t - *b > threshold)
        .map(|(i, _)| i)
        .collect()
}

fn detect_recoveries(throttle_delta: &[f64]) -> Vec<usize> {
    (1..throttle_delta.len())
        .filter(|&i| throttle_delta[i - 1] < RECOVERY_PRIOR_DROP && throttle_delta[i] > RECOVERY_RISE)
        .collect()
}

/// Centered rolling mean; positions without a full window are zero.
fn centered_mean(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            if i < half || i + half >= values.len() {
                0.0
            } else {
                values[i - half..=i + half].iter().sum::<f64>() / window as f64
            }
        })
        .collect()
}

/// Sample standard deviation (n - 1); `None` below two values.
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    const THROTTLE: [f64; 5] = [0.0, 50.0, 100.0, 40.0, 100.0];
    const RPM: [f64; 5] = [10_000.0, 10_500.0, 11_000.0, 10_200.0, 11_000.0];

    fn samples(throttle: &[f64], rpm: Option<&[f64]>) -> Vec<TelemetrySample> {
        throttle
            .iter()
            .enumerate()
            .map(|(i, &t)| TelemetrySample {
                time_s: i as f64 * 0.1,
                distance_m: i as f64 * 5.0,
                speed_kph: 150.0 + i as f64,
                throttle: Some(t),
                brake: Some(false),
                gear: Some(4),
                rpm: rpm.map(|r| r[i]),
            })
            .collect()
    }

    #[test]
    fn series_lengths_match_input() {
        for len in 1..12 {
            let throttle: Vec<f64> = (0..len).map(|i| (i * 17 % 101) as f64).collect();
            let derived = compute_derived(&samples(&throttle, None)).unwrap();
            assert_eq!(derived.len(), len);
            assert_eq!(derived.throttle_delta.len(), len);
            assert_eq!(derived.baseline.len(), len);
            assert_eq!(derived.unstable.len(), len);
        }
    }

    #[test]
    fn throttle_delta_starts_at_zero_and_is_zero_for_repeats() {
        let derived = compute_derived(&samples(&[30.0, 30.0, 45.0], None)).unwrap();
        assert_eq!(derived.throttle_delta[0], 0.0);
        assert_eq!(derived.throttle_delta[1], 0.0);
        assert_eq!(derived.throttle_delta[2], 15.0);
    }

    #[test]
    fn reference_trace_is_deterministic() {
        let input = samples(&THROTTLE, Some(&RPM));
        let first = compute_derived(&input).unwrap();
        let second = compute_derived(&input).unwrap();
        assert_eq!(first.model, TorqueModel::EngineSpeed);
        assert_eq!(first.torque, second.torque);
        assert_eq!(first.spikes, second.spikes);
        assert_eq!(first.spikes, vec![1, 2, 4]);
        assert!(first.spikes.iter().all(|&i| i < input.len()));
        assert!((first.torque[2] - 999.909).abs() < 1e-3);
    }

    #[test]
    fn flat_rpm_uses_synthetic_engine_speed() {
        let flat = [10_000.0; 5];
        let derived = compute_derived(&samples(&THROTTLE, Some(&flat))).unwrap();
        assert_eq!(derived.model, TorqueModel::SyntheticEngineSpeed);
        let missing = compute_derived(&samples(&THROTTLE, None)).unwrap();
        assert_eq!(missing.torque, derived.torque);
    }

    #[test]
    fn torque_is_monotonic_in_throttle() {
        let low = compute_derived(&samples(&[20.0], None)).unwrap();
        let high = compute_derived(&samples(&[80.0], None)).unwrap();
        assert!(high.torque[0] > low.torque[0]);
    }

    #[test]
    fn missing_throttle_and_mismatched_columns_are_malformed() {
        let mut input = samples(&THROTTLE, None);
        input[3].throttle = None;
        assert!(matches!(
            compute_derived(&input),
            Err(InsightError::MalformedInput(_))
        ));

        let err = compute_derived_columns(DerivedInput {
            time_s: &[0.0, 0.1],
            speed_kph: &[100.0],
            throttle: &[10.0, 20.0],
            rpm: None,
        })
        .unwrap_err();
        assert!(matches!(err, InsightError::MalformedInput(_)));
        assert!(matches!(compute_derived(&[]), Err(InsightError::EmptyInput)));
    }

    #[test]
    fn recoveries_follow_a_lift() {
        let derived = compute_derived(&samples(&[80.0, 60.0, 65.0, 66.0], None)).unwrap();
        assert_eq!(derived.recoveries, vec![2]);
        assert_eq!(derived.unstable, vec![false, true, false, false]);
    }

    #[test]
    fn amplification_only_touches_flat_series() {
        let mut varied = compute_derived(&samples(&THROTTLE, Some(&RPM))).unwrap();
        assert!(!amplify_flat_torque(&mut varied, true));

        let mut flat = compute_derived(&samples(&[0.0; 8], None)).unwrap();
        flat.throttle_delta = vec![0.0, 12.0, -8.0, 4.0, 0.0, 15.0, 0.0, 0.0];
        assert!(amplify_flat_torque(&mut flat, true));
        assert!(flat.amplified);
        assert_eq!(flat.torque.len(), 8);
        assert_eq!(flat.spikes, vec![1, 5]);
        assert_eq!(flat.recoveries, vec![3]);
    }

    #[test]
    fn findings_ratios() {
        let crash = MetricSummary {
            peak_surge: 280.0,
            mean_abs_throttle_delta: 9.0,
            ..MetricSummary::default()
        };
        let save = MetricSummary {
            peak_surge: 100.0,
            mean_abs_throttle_delta: 3.0,
            ..MetricSummary::default()
        };
        let findings = compare_outcomes(&[crash.clone()], &[save]);
        assert!((findings.surge_ratio.unwrap() - 2.8).abs() < 1e-9);
        assert!((findings.throttle_rate_ratio.unwrap() - 3.0).abs() < 1e-9);
        assert_eq!(compare_outcomes(&[crash], &[]), ComparisonFindings::default());
    }
}
