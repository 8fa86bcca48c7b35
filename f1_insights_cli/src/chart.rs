//! Two-panel comparison chart: speed and throttle through the corner on top,
//! the torque proxy with spike and recovery markers below.

use std::iter;
use std::panic;
use std::path::Path;

use anyhow::Result;
use f1_insights::{
    team_info, Comparison, ComparisonData, DerivedSeries, DriverTrace, Emphasis, Outcome, Rgb,
};
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontDesc, FontFamily, FontStyle, TextStyle};
use serde::Serialize;

use crate::font::GlyphFallback;

pub const CHART_SIZE: (u32, u32) = (1600, 900);

pub const BACKGROUND: RGBColor = RGBColor(0x12, 0x12, 0x12);
pub const PANEL: RGBColor = RGBColor(0x1E, 0x1E, 0x1E);
pub const GRID: RGBColor = RGBColor(0x33, 0x33, 0x33);
pub const AXIS: RGBColor = RGBColor(0x8E, 0x8E, 0x93);
pub const MUTED: RGBColor = RGBColor(0xAA, 0xAA, 0xAA);
pub const HIGHLIGHT: RGBColor = RGBColor(0xFF, 0xCC, 0x00);
pub const CRASH: RGBColor = rgb(f1_insights::CRASH_COLOR);
pub const SAVE: RGBColor = rgb(f1_insights::SAVE_COLOR);
pub const WARNING: RGBColor = rgb(f1_insights::WARNING_COLOR);

pub const CREDIT: &str = "Data: F1 live timing telemetry | Torque is a throttle-derived proxy";

/// Upper bound of the secondary throttle axis, in percent.
const THROTTLE_AXIS_MAX: f64 = 110.0;
const THROTTLE_MARKER_STRIDE: usize = 5;
/// Samples per dash (and per gap) of a dashed trace.
const DASH_SAMPLES: usize = 3;
/// Half-width in metres of the band shaded behind a torque spike.
const SPIKE_BAND_M: f64 = 15.0;

type Plane = Cartesian2d<RangedCoordf64, RangedCoordf64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Png,
    Svg,
}

impl ChartKind {
    pub fn extension(self) -> &'static str {
        match self {
            ChartKind::Png => "png",
            ChartKind::Svg => "svg",
        }
    }
}

pub const fn rgb(color: Rgb) -> RGBColor {
    RGBColor(color.0, color.1, color.2)
}

pub fn centered() -> Pos {
    Pos::new(HPos::Center, VPos::Center)
}

pub fn text_style(size: f64, style: FontStyle, color: &RGBColor) -> TextStyle<'static> {
    FontDesc::new(FontFamily::SansSerif, size, style).color(color)
}

/// Render one comparison chart, converting backend panics into errors.
pub fn render_comparison_guard(
    comparison: &Comparison,
    data: &ComparisonData,
    path: &Path,
    kind: ChartKind,
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_comparison(comparison, data, path, kind)
            .map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_comparison(
    comparison: &Comparison,
    data: &ComparisonData,
    path: &Path,
    kind: ChartKind,
) -> Result<()> {
    match kind {
        ChartKind::Png => {
            let backend = BitMapBackend::new(path, CHART_SIZE);
            let root = GlyphFallback::new(backend).into_drawing_area();
            draw_comparison(root, comparison, data)?;
        }
        ChartKind::Svg => {
            let backend = SVGBackend::new(path, CHART_SIZE);
            let root = GlyphFallback::new(backend).into_drawing_area();
            draw_comparison(root, comparison, data)?;
        }
    }
    Ok(())
}

fn draw_comparison<DB>(
    root: DrawingArea<DB, Shift>,
    comparison: &Comparison,
    data: &ComparisonData,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&BACKGROUND)?;
    let (title_band, rest) = root.split_vertically(130);
    let (speed_area, rest) = rest.split_vertically(300);
    let (legend_band, rest) = rest.split_vertically(80);
    let (torque_area, footer) = rest.split_vertically(320);

    let x_range = distance_range(&data.traces);
    draw_title_band(&title_band, comparison, &data.traces)?;
    draw_speed_panel(&speed_area, comparison, &data.traces, x_range)?;
    draw_legend_band(&legend_band, comparison, &data.traces)?;
    draw_torque_panel(&torque_area, comparison, &data.traces, x_range)?;
    draw_footer(&footer, comparison)?;

    root.present()?;
    Ok(())
}

fn draw_title_band<DB>(
    area: &DrawingArea<DB, Shift>,
    comparison: &Comparison,
    traces: &[DriverTrace],
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (width, _) = area.dim_in_pixel();
    let cx = width as i32 / 2;
    area.draw_text(
        &comparison.title,
        &text_style(30.0, FontStyle::Bold, &WHITE).pos(centered()),
        (cx, 32),
    )?;
    area.draw_text(
        &comparison.subtitle,
        &text_style(18.0, FontStyle::Italic, &HIGHLIGHT).pos(centered()),
        (cx, 70),
    )?;
    let sessions = sessions_label(traces).unwrap_or_else(|| comparison.session.to_string());
    area.draw_text(
        &format!("{} | {}", sessions, CREDIT),
        &text_style(13.0, FontStyle::Normal, &MUTED).pos(centered()),
        (cx, 104),
    )?;
    Ok(())
}

fn draw_speed_panel<DB>(
    area: &DrawingArea<DB, Shift>,
    comparison: &Comparison,
    traces: &[DriverTrace],
    (x_lo, x_hi): (f64, f64),
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let speed_hi = traces
        .iter()
        .flat_map(|t| t.window.samples.iter().map(|s| s.speed_kph))
        .fold(50.0_f64, f64::max)
        * 1.1;

    let mut chart = ChartBuilder::on(area)
        .margin_left(20)
        .margin_right(20)
        .margin_top(6)
        .caption("SPEED & THROTTLE PROFILES", text_style(18.0, FontStyle::Bold, &WHITE))
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Right, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x_lo..x_hi, 0.0..speed_hi)?
        .set_secondary_coord(x_lo..x_hi, 0.0..THROTTLE_AXIS_MAX);

    chart
        .configure_mesh()
        .bold_line_style(&GRID)
        .light_line_style(&TRANSPARENT)
        .axis_style(&AXIS)
        .label_style(text_style(13.0, FontStyle::Normal, &MUTED))
        .axis_desc_style(text_style(14.0, FontStyle::Bold, &WHITE))
        .x_desc("Distance from apex (m)")
        .y_desc("Speed (km/h)")
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .draw()?;
    chart
        .configure_secondary_axes()
        .axis_style(&AXIS)
        .label_style(text_style(13.0, FontStyle::Normal, &MUTED))
        .axis_desc_style(text_style(14.0, FontStyle::Bold, &WHITE))
        .y_desc("Throttle (%)")
        .y_label_formatter(&|v| format!("{:.0}", v))
        .draw()?;

    draw_apex_line(&mut *chart, speed_hi)?;

    for trace in traces {
        let color = rgb(trace.focus.color);
        let distance = &trace.window.relative_distance_m;
        let speed: Vec<(f64, f64)> = distance
            .iter()
            .copied()
            .zip(trace.window.samples.iter().map(|s| s.speed_kph))
            .collect();
        let style = color.stroke_width(3);
        chart.draw_series(
            stroke_segments(&speed, trace.focus.outcome == Outcome::Save)
                .into_iter()
                .map(|segment| PathElement::new(segment, style)),
        )?;

        let marker = color.mix(0.55).filled();
        chart.draw_secondary_series(
            distance
                .iter()
                .copied()
                .zip(trace.derived.throttle.iter().copied())
                .step_by(THROTTLE_MARKER_STRIDE)
                .map(|point| Circle::new(point, 4, marker)),
        )?;
    }

    if comparison.emphasis == Emphasis::SuddenVsGradual {
        for trace in traces {
            let (idx, label, offset) = match trace.focus.outcome {
                Outcome::Crash => (
                    steepest_rise(&trace.derived),
                    "SUDDEN THROTTLE -> CRASH",
                    (14, -46),
                ),
                Outcome::Save => (
                    gradual_point(&trace.derived),
                    "GRADUAL THROTTLE -> SAVE",
                    (14, 16),
                ),
            };
            if let Some(i) = idx {
                let at = (
                    trace.window.relative_distance_m[i],
                    trace.window.samples[i].speed_kph,
                );
                draw_callout(&mut *chart, at, label, rgb(trace.focus.color), offset)?;
            }
        }
    }

    Ok(())
}

fn draw_legend_band<DB>(
    area: &DrawingArea<DB, Shift>,
    comparison: &Comparison,
    traces: &[DriverTrace],
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    area.fill(&PANEL)?;
    let (width, _) = area.dim_in_pixel();
    let half = width as i32 / 2;
    let columns = [
        (Outcome::Crash, "CRASH CASES", CRASH),
        (Outcome::Save, "RECOVERY CASES", SAVE),
    ];
    let mut column = 0;
    for (outcome, heading, heading_color) in columns {
        let drivers: Vec<_> = comparison.drivers_with(outcome).collect();
        if drivers.is_empty() {
            continue;
        }
        let x0 = 40 + column * (half - 120);
        column += 1;
        area.draw_text(heading, &text_style(15.0, FontStyle::Bold, &heading_color), (x0, 10))?;
        for (slot, focus) in drivers.iter().enumerate() {
            let x = x0 + slot as i32 * 250;
            draw_team_badge(area, &focus.code, (x, 42))?;
            let loaded = traces.iter().any(|t| t.focus == **focus);
            let label = if loaded {
                focus.label.clone()
            } else {
                format!("{} (NO DATA)", focus.label)
            };
            area.draw_text(
                &label,
                &text_style(14.0, FontStyle::Bold, &rgb(focus.color)),
                (x + 64, 45),
            )?;
        }
    }

    let x = width as i32 - 300;
    area.draw(&Circle::new((x, 52), 4, MUTED.filled()))?;
    area.draw_text(
        "THROTTLE (every 5th sample)",
        &text_style(13.0, FontStyle::Normal, &MUTED),
        (x + 12, 45),
    )?;
    Ok(())
}

pub(crate) fn draw_team_badge<DB>(
    area: &DrawingArea<DB, Shift>,
    code: &str,
    (x, y): (i32, i32),
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let fill = team_info(code).map(|t| rgb(t.color)).unwrap_or(GRID);
    area.draw(&Rectangle::new([(x, y - 2), (x + 54, y + 20)], fill.filled()))?;
    area.draw(&Rectangle::new([(x, y - 2), (x + 54, y + 20)], WHITE.mix(0.6)))?;
    area.draw_text(
        code,
        &text_style(14.0, FontStyle::Bold, &WHITE).pos(centered()),
        (x + 27, y + 9),
    )?;
    Ok(())
}

fn draw_torque_panel<DB>(
    area: &DrawingArea<DB, Shift>,
    comparison: &Comparison,
    traces: &[DriverTrace],
    (x_lo, x_hi): (f64, f64),
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (t_lo, t_hi) = torque_range(traces);
    let decimals = if t_hi - t_lo < 10.0 { 2 } else { 0 };
    let tick = move |v: &f64| format!("{:.*}", decimals, v);
    let caption = if traces.iter().any(|t| t.derived.amplified) {
        "TORQUE DELIVERY (proxy, small variations amplified)"
    } else {
        "TORQUE DELIVERY (proxy)"
    };

    let mut chart = ChartBuilder::on(area)
        .margin_left(20)
        .margin_right(90)
        .margin_top(6)
        .caption(caption, text_style(18.0, FontStyle::Bold, &WHITE))
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x_lo..x_hi, t_lo..t_hi)?;

    chart
        .configure_mesh()
        .bold_line_style(&GRID)
        .light_line_style(&TRANSPARENT)
        .axis_style(&AXIS)
        .label_style(text_style(13.0, FontStyle::Normal, &MUTED))
        .axis_desc_style(text_style(14.0, FontStyle::Bold, &WHITE))
        .x_desc("Distance from apex (m)")
        .y_desc("Torque proxy")
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&tick)
        .draw()?;

    for trace in traces {
        let distance = &trace.window.relative_distance_m;
        let torque = &trace.derived.torque;
        chart.draw_series(trace.derived.spikes.iter().map(|&i| {
            Rectangle::new(
                [
                    (distance[i] - SPIKE_BAND_M, t_lo),
                    (distance[i] + SPIKE_BAND_M, torque[i]),
                ],
                WARNING.mix(0.18).filled(),
            )
        }))?;
    }

    draw_apex_line(&mut chart, t_hi)?;

    for trace in traces {
        let color = rgb(trace.focus.color);
        let distance = &trace.window.relative_distance_m;
        let torque = &trace.derived.torque;
        let points: Vec<(f64, f64)> = distance.iter().copied().zip(torque.iter().copied()).collect();
        let style = color.stroke_width(3);
        chart.draw_series(
            stroke_segments(&points, trace.focus.outcome == Outcome::Save)
                .into_iter()
                .map(|segment| PathElement::new(segment, style)),
        )?;

        chart.draw_series(
            trace
                .derived
                .spikes
                .iter()
                .map(|&i| TriangleMarker::new((distance[i], torque[i]), 9, WARNING.filled())),
        )?;
        if let Some(i) = strongest_spike(&trace.derived) {
            chart.draw_series(iter::once(
                EmptyElement::at((distance[i], torque[i]))
                    + Text::new(
                        "TORQUE SPIKE",
                        (-48, -30),
                        text_style(13.0, FontStyle::Bold, &WARNING),
                    ),
            ))?;
        }

        let recoveries = &trace.derived.recoveries;
        match trace.focus.outcome {
            Outcome::Save => {
                chart.draw_series(
                    recoveries
                        .iter()
                        .map(|&i| Circle::new((distance[i], torque[i]), 7, SAVE.filled())),
                )?;
            }
            Outcome::Crash => {
                chart.draw_series(
                    recoveries
                        .iter()
                        .map(|&i| Cross::new((distance[i], torque[i]), 7, CRASH.stroke_width(3))),
                )?;
            }
        }
        if let Some(&i) = recoveries.first() {
            let (label, color) = match trace.focus.outcome {
                Outcome::Save => ("RECOVERY", SAVE),
                Outcome::Crash => ("FAILED", CRASH),
            };
            chart.draw_series(iter::once(
                EmptyElement::at((distance[i], torque[i]))
                    + Text::new(label, (10, 10), text_style(13.0, FontStyle::Bold, &color)),
            ))?;
        }
    }

    if comparison.emphasis == Emphasis::SingleVsMultiple {
        for trace in traces {
            let (idx, label, offset) = match trace.focus.outcome {
                Outcome::Crash => (
                    largest_input(&trace.derived),
                    "SINGLE LARGE INPUT -> CRASH",
                    (14, -46),
                ),
                Outcome::Save => (
                    moderate_point(&trace.derived),
                    "MULTIPLE SMALL ADJUSTMENTS -> RECOVERY",
                    (14, 18),
                ),
            };
            if let Some(i) = idx {
                let at = (trace.window.relative_distance_m[i], trace.derived.torque[i]);
                draw_callout(&mut chart, at, label, rgb(trace.focus.color), offset)?;
            }
        }
    }

    Ok(())
}

fn draw_footer<DB>(area: &DrawingArea<DB, Shift>, comparison: &Comparison) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (width, height) = area.dim_in_pixel();
    let right = width as i32 - 560;
    area.draw(&Rectangle::new(
        [(40, 6), (right, height as i32 - 8)],
        HIGHLIGHT.mix(0.12).filled(),
    ))?;
    area.draw_text(
        "KEY INSIGHT:",
        &text_style(14.0, FontStyle::Bold, &HIGHLIGHT),
        (56, 14),
    )?;
    area.draw_text(
        &comparison.insight,
        &text_style(17.0, FontStyle::Normal, &WHITE),
        (56, 36),
    )?;

    let x = right + 40;
    let label = text_style(13.0, FontStyle::Bold, &MUTED);
    area.draw(&TriangleMarker::new((x, 20), 8, WARNING.filled()))?;
    area.draw_text("TORQUE SPIKE", &label, (x + 14, 13))?;
    area.draw(&Circle::new((x + 200, 20), 7, SAVE.filled()))?;
    area.draw_text("SUCCESSFUL RECOVERY", &label, (x + 214, 13))?;
    area.draw(&Cross::new((x, 48), 7, CRASH.stroke_width(3)))?;
    area.draw_text("FAILED RECOVERY", &label, (x + 14, 41))?;
    area.draw(&PathElement::new(
        vec![(x + 186, 48), (x + 206, 48)],
        WHITE.stroke_width(3),
    ))?;
    area.draw_text("CRASH (solid) / SAVE (dashed)", &label, (x + 214, 41))?;
    Ok(())
}

fn draw_apex_line<DB>(chart: &mut ChartContext<'_, DB, Plane>, y_hi: f64) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let y_lo = chart.y_range().start;
    chart.draw_series(iter::once(PathElement::new(
        vec![(0.0, y_lo), (0.0, y_hi)],
        WHITE.mix(0.35).stroke_width(2),
    )))?;
    chart.draw_series(iter::once(
        EmptyElement::at((0.0, y_hi))
            + Text::new("APEX", (6, 4), text_style(12.0, FontStyle::Bold, &MUTED)),
    ))?;
    Ok(())
}

/// Marker at `at` plus a boxed label offset by `offset` pixels.
fn draw_callout<DB>(
    chart: &mut ChartContext<'_, DB, Plane>,
    at: (f64, f64),
    label: &str,
    fill: RGBColor,
    (dx, dy): (i32, i32),
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let width = label.chars().count() as i32 * 8 + 14;
    chart.draw_series(iter::once(Circle::new(at, 6, WHITE.filled())))?;
    chart.draw_series(iter::once(
        EmptyElement::at(at)
            + Rectangle::new([(dx, dy), (dx + width, dy + 26)], fill.mix(0.85).filled())
            + Text::new(
                label.to_string(),
                (dx + 7, dy + 6),
                text_style(14.0, FontStyle::Bold, &WHITE),
            ),
    ))?;
    Ok(())
}

/// Polylines for one trace; dashed traces alternate `DASH_SAMPLES` drawn and skipped steps.
pub(crate) fn stroke_segments(points: &[(f64, f64)], dashed: bool) -> Vec<Vec<(f64, f64)>> {
    if points.len() < 2 {
        return Vec::new();
    }
    if !dashed {
        return vec![points.to_vec()];
    }
    (0..points.len() - 1)
        .step_by(2 * DASH_SAMPLES)
        .map(|start| points[start..(start + DASH_SAMPLES + 1).min(points.len())].to_vec())
        .collect()
}

pub(crate) fn distance_range(traces: &[DriverTrace]) -> (f64, f64) {
    let (lo, hi) = traces
        .iter()
        .flat_map(|t| t.window.relative_distance_m.iter().copied())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| (lo.min(d), hi.max(d)));
    if hi - lo < 1.0 {
        let half = f1_insights::WINDOW_HALF_WIDTH_M;
        return (-half, half);
    }
    (lo, hi)
}

/// Vertical torque extent with headroom for spike labels.
pub(crate) fn torque_range(traces: &[DriverTrace]) -> (f64, f64) {
    let (lo, hi) = traces
        .iter()
        .flat_map(|t| t.derived.torque.iter().copied())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return (0.0, 1.0);
    }
    let span = hi - lo;
    let pad = if span > 0.0 {
        span * 0.15
    } else {
        lo.abs() * 0.05 + 1.0
    };
    (lo - pad, hi + 2.0 * pad)
}

fn sessions_label(traces: &[DriverTrace]) -> Option<String> {
    let mut sessions: Vec<String> = Vec::new();
    for trace in traces {
        let label = trace.session.to_string();
        if !sessions.contains(&label) {
            sessions.push(label);
        }
    }
    if sessions.is_empty() {
        None
    } else {
        Some(sessions.join(", "))
    }
}

fn argmax_by(len: usize, key: impl Fn(usize) -> f64) -> Option<usize> {
    (0..len).max_by(|&a, &b| key(a).total_cmp(&key(b)).then(b.cmp(&a)))
}

/// Sample with the largest positive throttle change.
pub(crate) fn steepest_rise(series: &DerivedSeries) -> Option<usize> {
    argmax_by(series.len(), |i| series.throttle_delta[i]).filter(|&i| series.throttle_delta[i] > 0.0)
}

/// Middle sample of the part-throttle phase (30 to 70 %).
pub(crate) fn gradual_point(series: &DerivedSeries) -> Option<usize> {
    middle_of(series, |i| (30.0..=70.0).contains(&series.throttle[i]))
}

/// Sample with the largest throttle change in either direction.
pub(crate) fn largest_input(series: &DerivedSeries) -> Option<usize> {
    argmax_by(series.len(), |i| series.throttle_delta[i].abs())
        .filter(|&i| series.throttle_delta[i] != 0.0)
}

/// Middle sample among small corrections (2 to 8 % per step).
pub(crate) fn moderate_point(series: &DerivedSeries) -> Option<usize> {
    middle_of(series, |i| {
        let d = series.throttle_delta[i].abs();
        d > 2.0 && d < 8.0
    })
}

pub(crate) fn strongest_spike(series: &DerivedSeries) -> Option<usize> {
    series
        .spikes
        .iter()
        .copied()
        .max_by(|&a, &b| {
            let surge = |i: usize| series.torque[i] - series.baseline[i];
            surge(a).total_cmp(&surge(b)).then(b.cmp(&a))
        })
}

fn middle_of(series: &DerivedSeries, keep: impl Fn(usize) -> bool) -> Option<usize> {
    let hits: Vec<usize> = (0..series.len()).filter(|&i| keep(i)).collect();
    hits.get(hits.len() / 2).copied()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use f1_insights::{
        compute_derived, compute_derived_columns, extract_turn_window, key_comparisons,
        ComparisonFindings, DerivedInput, SessionKey, TelemetrySample,
    };

    fn series(throttle: &[f64]) -> DerivedSeries {
        let time: Vec<f64> = (0..throttle.len()).map(|i| i as f64 * 0.1).collect();
        let speed: Vec<f64> = (0..throttle.len()).map(|i| 100.0 + i as f64).collect();
        compute_derived_columns(DerivedInput {
            time_s: &time,
            speed_kph: &speed,
            throttle,
            rpm: None,
        })
        .unwrap()
    }

    pub(crate) fn sample_trace(comparison: &Comparison, driver: usize) -> DriverTrace {
        let focus = comparison.drivers[driver].clone();
        let aggressive = focus.outcome == Outcome::Crash;
        let samples: Vec<TelemetrySample> = (0..40)
            .map(|i| {
                let x = i as f64 - 20.0;
                let throttle = match (aggressive, i) {
                    (_, 0..=17) => 0.0,
                    (true, _) => 100.0,
                    (false, _) => ((i - 17) as f64 * 5.0).min(100.0),
                };
                TelemetrySample {
                    time_s: i as f64 * 0.2,
                    distance_m: 1000.0 + i as f64 * 10.0,
                    speed_kph: 90.0 + x * x * 0.3,
                    throttle: Some(throttle),
                    brake: Some(throttle == 0.0),
                    gear: Some(3),
                    rpm: Some(6000.0 + x * x * 8.0),
                }
            })
            .collect();
        let window = extract_turn_window(&samples, 1, 200.0).unwrap();
        let derived = compute_derived(&window.samples).unwrap();
        let summary = derived.summary();
        DriverTrace {
            focus,
            session: comparison.session.clone(),
            lap_number: 7,
            window,
            derived,
            summary,
        }
    }

    pub(crate) fn sample_data(comparison: &Comparison) -> ComparisonData {
        ComparisonData {
            traces: (0..comparison.drivers.len())
                .map(|i| sample_trace(comparison, i))
                .collect(),
            failures: Vec::new(),
            findings: ComparisonFindings::default(),
        }
    }

    #[test]
    fn dashed_segments_skip_gaps() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 0.0)).collect();
        let solid = stroke_segments(&points, false);
        assert_eq!(solid.len(), 1);
        assert_eq!(solid[0].len(), 10);

        let dashed = stroke_segments(&points, true);
        assert_eq!(dashed.len(), 2);
        assert_eq!(dashed[0].first(), Some(&(0.0, 0.0)));
        assert_eq!(dashed[0].last(), Some(&(3.0, 0.0)));
        assert_eq!(dashed[1].first(), Some(&(6.0, 0.0)));
        assert!(stroke_segments(&points[..1], true).is_empty());
    }

    #[test]
    fn annotation_points_follow_throttle_shape() {
        let sharp = series(&[0.0, 0.0, 5.0, 90.0, 100.0]);
        assert_eq!(steepest_rise(&sharp), Some(3));
        assert_eq!(largest_input(&sharp), Some(3));

        let smooth = series(&[0.0, 20.0, 35.0, 50.0, 65.0, 80.0]);
        assert_eq!(gradual_point(&smooth), Some(3));

        let flat = series(&[40.0, 40.0, 40.0]);
        assert_eq!(steepest_rise(&flat), None);
        assert_eq!(largest_input(&flat), None);
        assert_eq!(moderate_point(&flat), None);

        let fiddly = series(&[50.0, 53.0, 49.0, 55.0, 52.0]);
        assert_eq!(moderate_point(&fiddly), Some(3));
    }

    #[test]
    fn strongest_spike_picks_largest_surge() {
        let mut derived = series(&[0.0, 50.0, 100.0, 40.0, 100.0]);
        derived.spikes = vec![1, 3];
        derived.torque = vec![0.0, 400.0, 0.0, 900.0, 0.0];
        derived.baseline = vec![0.0, 100.0, 0.0, 100.0, 0.0];
        assert_eq!(strongest_spike(&derived), Some(3));
        derived.spikes.clear();
        assert_eq!(strongest_spike(&derived), None);
    }

    #[test]
    fn ranges_have_headroom() {
        assert_eq!(distance_range(&[]), (-200.0, 200.0));
        assert_eq!(torque_range(&[]), (0.0, 1.0));

        let session = SessionKey::new(2025, "Australia", "R");
        let comparison = &key_comparisons(&session)[0];
        let data = sample_data(comparison);
        let (lo, hi) = torque_range(&data.traces);
        let peak = data.traces[0].summary.peak_torque;
        assert!(hi > peak && lo < peak);
        let (d_lo, d_hi) = distance_range(&data.traces);
        assert!(d_lo <= -190.0 && d_hi >= 190.0);
    }

    #[test]
    fn renders_svg_for_every_emphasis() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionKey::new(2025, "Australia", "R");
        for comparison in key_comparisons(&session) {
            let data = sample_data(&comparison);
            let path = dir.path().join(format!("{}.svg", comparison.artifact_stem()));
            render_comparison_guard(&comparison, &data, &path, ChartKind::Svg).unwrap();
            let body = std::fs::read_to_string(&path).unwrap();
            assert!(body.contains("<svg"));
        }
    }

    #[test]
    fn unwritable_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionKey::new(2025, "Australia", "R");
        let comparison = &key_comparisons(&session)[0];
        let data = sample_data(comparison);
        let path = dir.path().join("missing").join("chart.png");
        assert!(render_comparison_guard(comparison, &data, &path, ChartKind::Png).is_err());
    }
}
