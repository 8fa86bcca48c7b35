use ordered_float::OrderedFloat;
use serde::Serialize;
use tracing::warn;

use crate::telemetry::TelemetrySample;
use crate::InsightError;

/// Half-width of the distance window cut around a corner.
pub const WINDOW_HALF_WIDTH_M: f64 = 200.0;

#[derive(Clone, Debug, Serialize)]
pub struct TurnWindow {
    pub turn: u32,
    pub turn_distance_m: f64,
    /// False when the lap had fewer detectable corners than `turn` and the
    /// slowest point was used instead.
    pub exact_turn: bool,
    pub samples: Vec<TelemetrySample>,
    pub relative_distance_m: Vec<f64>,
}

impl TurnWindow {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Indices of strict local speed minima, slowest first.
pub fn local_speed_minima(samples: &[TelemetrySample]) -> Vec<usize> {
    if samples.len() < 3 {
        return Vec::new();
    }
    let mut minima: Vec<usize> = (1..samples.len() - 1)
        .filter(|&i| {
            let speed = samples[i].speed_kph;
            samples[i - 1].speed_kph > speed && samples[i + 1].speed_kph > speed
        })
        .collect();
    minima.sort_by_key(|&i| (OrderedFloat(samples[i].speed_kph), i));
    minima
}

/// Cut the samples within `half_width_m` of the `turn`-th slowest corner.
pub fn extract_turn_window(
    samples: &[TelemetrySample],
    turn: u32,
    half_width_m: f64,
) -> Result<TurnWindow, InsightError> {
    if samples.is_empty() {
        return Err(InsightError::EmptyInput);
    }
    if turn == 0 {
        return Err(InsightError::InvalidParameter(
            "turn numbers start at 1".into(),
        ));
    }
    if !(half_width_m > 0.0) {
        return Err(InsightError::InvalidParameter(format!(
            "window half-width must be positive, got {}",
            half_width_m
        )));
    }

    let minima = local_speed_minima(samples);
    let (turn_idx, exact_turn) = match minima.get(turn as usize - 1) {
        Some(&idx) => (idx, true),
        None => {
            warn!(
                "Could only identify {} turns, using lowest speed point for turn {}",
                minima.len(),
                turn
            );
            let slowest = (0..samples.len())
                .min_by_key(|&i| (OrderedFloat(samples[i].speed_kph), i))
                .unwrap_or(0);
            (slowest, false)
        }
    };

    let turn_distance_m = samples[turn_idx].distance_m;
    let lo = turn_distance_m - half_width_m;
    let hi = turn_distance_m + half_width_m;
    let window: Vec<TelemetrySample> = samples
        .iter()
        .filter(|s| s.distance_m >= lo && s.distance_m <= hi)
        .cloned()
        .collect();
    let relative_distance_m = window
        .iter()
        .map(|s| s.distance_m - turn_distance_m)
        .collect();

    Ok(TurnWindow {
        turn,
        turn_distance_m,
        exact_turn,
        samples: window,
        relative_distance_m,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(speeds: &[f64], spacing_m: f64) -> Vec<TelemetrySample> {
        speeds
            .iter()
            .enumerate()
            .map(|(i, &speed_kph)| TelemetrySample {
                time_s: i as f64 * 0.25,
                distance_m: i as f64 * spacing_m,
                speed_kph,
                throttle: Some(50.0),
                brake: None,
                gear: None,
                rpm: None,
            })
            .collect()
    }

    #[test]
    fn minima_are_sorted_slowest_first() {
        let samples = trace(&[200.0, 120.0, 210.0, 90.0, 220.0, 150.0, 230.0], 10.0);
        assert_eq!(local_speed_minima(&samples), vec![3, 1, 5]);
    }

    #[test]
    fn plateaus_are_not_minima() {
        let samples = trace(&[200.0, 100.0, 100.0, 200.0], 10.0);
        assert!(local_speed_minima(&samples).is_empty());
    }

    #[test]
    fn window_is_centered_on_requested_turn() {
        let samples = trace(&[200.0, 120.0, 210.0, 90.0, 220.0, 150.0, 230.0], 100.0);
        let window = extract_turn_window(&samples, 2, 150.0).unwrap();
        assert!(window.exact_turn);
        assert_eq!(window.turn_distance_m, 100.0);
        assert_eq!(window.len(), 3);
        assert_eq!(window.relative_distance_m, vec![-100.0, 0.0, 100.0]);
    }

    #[test]
    fn missing_turn_falls_back_to_slowest_point() {
        let samples = trace(&[200.0, 120.0, 210.0, 90.0, 220.0], 100.0);
        let window = extract_turn_window(&samples, 5, WINDOW_HALF_WIDTH_M).unwrap();
        assert!(!window.exact_turn);
        assert_eq!(window.turn_distance_m, 300.0);
        assert!(window.relative_distance_m.contains(&0.0));
    }

    #[test]
    fn rejects_empty_and_turn_zero() {
        assert!(matches!(
            extract_turn_window(&[], 1, WINDOW_HALF_WIDTH_M),
            Err(InsightError::EmptyInput)
        ));
        let samples = trace(&[100.0, 90.0, 100.0], 10.0);
        assert!(matches!(
            extract_turn_window(&samples, 0, WINDOW_HALF_WIDTH_M),
            Err(InsightError::InvalidParameter(_))
        ));
    }
}
