//! Key-findings summary image: one band per comparison with its insight,
//! measured ratios, a torque thumbnail and the driver roster.

use std::panic;
use std::path::Path;

use anyhow::Result;
use f1_insights::{team_info, Comparison, ComparisonData, ComparisonFindings, Outcome};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::FontStyle;

use crate::chart::{
    centered, distance_range, draw_team_badge, rgb, stroke_segments, text_style, torque_range,
    ChartKind, BACKGROUND, CHART_SIZE, CREDIT, HIGHLIGHT, MUTED, PANEL, WARNING,
};
use crate::font::GlyphFallback;

const TAKEAWAY: &str = "In wet conditions, smooth throttle modulation is the most vital skill";
const SECTIONS_TOP: i32 = 130;
const SECTIONS_BOTTOM: i32 = 720;
const CONTENT_INSET: i32 = 240;

/// One comparison as it appears in the summary.
pub struct SummarySection<'a> {
    pub comparison: &'a Comparison,
    pub data: &'a ComparisonData,
    /// File name of the rendered chart, when rendering succeeded.
    pub artifact: Option<String>,
}

pub fn render_summary_guard(
    sections: &[SummarySection<'_>],
    path: &Path,
    kind: ChartKind,
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_summary(sections, path, kind).map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_summary(sections: &[SummarySection<'_>], path: &Path, kind: ChartKind) -> Result<()> {
    match kind {
        ChartKind::Png => {
            let backend = BitMapBackend::new(path, CHART_SIZE);
            draw_summary(GlyphFallback::new(backend).into_drawing_area(), sections)?;
        }
        ChartKind::Svg => {
            let backend = SVGBackend::new(path, CHART_SIZE);
            draw_summary(GlyphFallback::new(backend).into_drawing_area(), sections)?;
        }
    }
    Ok(())
}

fn draw_summary<DB>(root: DrawingArea<DB, Shift>, sections: &[SummarySection<'_>]) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&BACKGROUND)?;
    let (width, height) = root.dim_in_pixel();
    let (width, height) = (width as i32, height as i32);
    let cx = width / 2;

    root.draw_text(
        "F1 CRASH ANALYSIS: KEY FINDINGS",
        &text_style(32.0, FontStyle::Bold, &WHITE).pos(centered()),
        (cx, 38),
    )?;
    root.draw_text(
        "How throttle application separated crashes from saves",
        &text_style(18.0, FontStyle::Italic, &HIGHLIGHT).pos(centered()),
        (cx, 78),
    )?;
    if let Some(first) = sections.first() {
        root.draw_text(
            &format!("{} | {}", first.comparison.session, CREDIT),
            &text_style(13.0, FontStyle::Normal, &MUTED).pos(centered()),
            (cx, 106),
        )?;
    }

    let band = (SECTIONS_BOTTOM - SECTIONS_TOP) / sections.len().max(1) as i32;
    for (i, section) in sections.iter().enumerate() {
        draw_section(&root, section, SECTIONS_TOP + i as i32 * band, band)?;
    }

    let findings: Vec<&ComparisonFindings> = sections
        .iter()
        .map(|s| &s.data.findings)
        .collect();
    let right = width - CONTENT_INSET;
    root.draw_text(
        "CRITICAL TAKEAWAY:",
        &text_style(18.0, FontStyle::Bold, &HIGHLIGHT).pos(centered()),
        (cx, 742),
    )?;
    root.draw(&Rectangle::new(
        [(CONTENT_INSET, 760), (right, 812)],
        HIGHLIGHT.mix(0.15).filled(),
    ))?;
    root.draw(&Rectangle::new(
        [(CONTENT_INSET, 760), (right, 812)],
        HIGHLIGHT.stroke_width(2),
    ))?;
    root.draw_text(
        TAKEAWAY,
        &text_style(20.0, FontStyle::Bold, &WHITE).pos(centered()),
        (cx, 786),
    )?;
    root.draw_text(
        &takeaway_line(&findings),
        &text_style(15.0, FontStyle::Normal, &MUTED).pos(centered()),
        (cx, 838),
    )?;
    root.draw_text(
        "F1 CRASH ANALYSIS TOOL",
        &text_style(12.0, FontStyle::Bold, &MUTED).pos(Pos::new(HPos::Right, VPos::Bottom)),
        (width - 20, height - 14),
    )?;

    root.present()?;
    Ok(())
}

fn draw_section<DB>(
    root: &DrawingArea<DB, Shift>,
    section: &SummarySection<'_>,
    top: i32,
    band: i32,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (width, _) = root.dim_in_pixel();
    let left = CONTENT_INSET;
    let right = width as i32 - CONTENT_INSET;
    let comparison = section.comparison;

    root.draw_text(
        &comparison.title,
        &text_style(19.0, FontStyle::Bold, &WHITE),
        (left, top + 4),
    )?;
    root.draw_text(
        &comparison.insight,
        &text_style(15.0, FontStyle::Italic, &HIGHLIGHT),
        (left, top + 30),
    )?;
    let mut status = if section.data.is_renderable() {
        findings_line(&section.data.findings)
    } else {
        "No telemetry loaded".to_string()
    };
    if let Some(artifact) = &section.artifact {
        status.push_str(&format!(" | chart: {}", artifact));
    }
    root.draw_text(&status, &text_style(13.0, FontStyle::Normal, &MUTED), (left, top + 52))?;

    let thumb_top = top + 72;
    let thumb_height = (band - 104).max(24);
    let thumb = root
        .clone()
        .shrink((left, thumb_top), ((right - left) as u32, thumb_height as u32));
    thumb.fill(&PANEL)?;
    let (tw, th) = thumb.dim_in_pixel();
    if section.data.is_renderable() && section.artifact.is_some() {
        draw_thumbnail(&thumb, section.data)?;
    } else {
        thumb.draw_text(
            &placeholder_text(section),
            &text_style(14.0, FontStyle::Bold, &MUTED).pos(centered()),
            (tw as i32 / 2, th as i32 / 2),
        )?;
    }
    thumb.draw(&Rectangle::new(
        [(0, 0), (tw as i32 - 1, th as i32 - 1)],
        WHITE.mix(0.5),
    ))?;

    let roster_y = thumb_top + thumb_height + 8;
    for (slot, focus) in comparison.drivers.iter().enumerate() {
        let x = left + slot as i32 * 300;
        draw_team_badge(root, &focus.code, (x, roster_y))?;
        let team = team_info(&focus.code).map_or("Unknown team", |t| t.team);
        root.draw_text(
            &format!("{}: {}", team, focus.outcome.label()),
            &text_style(13.0, FontStyle::Bold, &rgb(focus.color)),
            (x + 62, roster_y + 3),
        )?;
    }
    Ok(())
}

fn draw_thumbnail<DB>(area: &DrawingArea<DB, Shift>, data: &ComparisonData) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (x_lo, x_hi) = distance_range(&data.traces);
    let (t_lo, t_hi) = torque_range(&data.traces);
    let mut chart = ChartBuilder::on(area)
        .margin(6)
        .build_cartesian_2d(x_lo..x_hi, t_lo..t_hi)?;

    for trace in &data.traces {
        let distance = &trace.window.relative_distance_m;
        let torque = &trace.derived.torque;
        let points: Vec<(f64, f64)> = distance.iter().copied().zip(torque.iter().copied()).collect();
        let style = rgb(trace.focus.color).stroke_width(2);
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
                .map(|&i| TriangleMarker::new((distance[i], torque[i]), 5, WARNING.filled())),
        )?;
    }
    Ok(())
}

fn findings_line(findings: &ComparisonFindings) -> String {
    let ratio = |value: Option<f64>| match value {
        Some(v) => format!("{:.1}x", v),
        None => "n/a".to_string(),
    };
    if findings.surge_ratio.is_none() && findings.throttle_rate_ratio.is_none() {
        return "Crash/save ratios: no crash and save pair with usable data".to_string();
    }
    format!(
        "Crash vs save peak torque surge: {} | throttle change rate: {}",
        ratio(findings.surge_ratio),
        ratio(findings.throttle_rate_ratio)
    )
}

fn takeaway_line(findings: &[&ComparisonFindings]) -> String {
    let ratios: Vec<f64> = findings
        .iter()
        .filter_map(|f| f.throttle_rate_ratio)
        .filter(|r| r.is_finite())
        .collect();
    if ratios.is_empty() {
        return "Drivers who crashed showed 2-3x higher rates of throttle change than those who saved their cars"
            .to_string();
    }
    let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
    format!(
        "Drivers who crashed showed {:.1}x the throttle change rate of those who saved their cars",
        mean
    )
}

fn placeholder_text(section: &SummarySection<'_>) -> String {
    if section.data.is_renderable() {
        return "Chart could not be rendered".to_string();
    }
    let codes: Vec<&str> = section
        .comparison
        .drivers
        .iter()
        .map(|d| d.code.as_str())
        .collect();
    format!("Chart skipped: no telemetry for {}", codes.join(", "))
}
