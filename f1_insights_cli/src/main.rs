mod chart;
mod font;
mod manifest;
mod summary;

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueHint};
use f1_insights::{
    collect_comparison, compute_derived, extract_turn_window, fetch_reference_lap, key_comparisons,
    validate_comparisons, CacheDirSource, Comparison, ComparisonData, DriverFocus, InsightError,
    SessionKey, TelemetrySource, SUMMARY_STEM, WINDOW_HALF_WIDTH_M,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::chart::{render_comparison_guard, ChartKind};
use crate::manifest::{rendered_status, write_manifest, ArtifactRecord, ArtifactStatus, Manifest};
use crate::summary::{render_summary_guard, SummarySection};

#[derive(Parser, Debug)]
#[command(author, version, about = "Crash vs. save telemetry comparison charts", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every comparison chart, the summary image and manifest.json (default)
    Render(RenderArgs),
    /// Report what the telemetry cache holds for every configured driver
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
struct SessionArgs {
    /// Telemetry cache root laid out as `<season>/<event>/<session>/<DRIVER>.csv`
    #[arg(long, default_value = "cache", value_hint = ValueHint::DirPath)]
    cache_dir: PathBuf,

    /// Season to read first
    #[arg(long, default_value_t = 2025)]
    season: u16,

    /// Seasons tried in order when a driver has no samples in the primary season
    #[arg(long = "fallback-season", default_values_t = [2023u16])]
    fallback_seasons: Vec<u16>,

    /// Event name as used in the cache layout
    #[arg(long, default_value = "Australia")]
    event: String,

    /// Session code (R = race, Q = qualifying, ...)
    #[arg(long, default_value = "R")]
    session: String,
}

impl SessionArgs {
    fn session_key(&self) -> SessionKey {
        SessionKey::new(self.season, self.event.clone(), self.session.clone())
    }
}

#[derive(Args, Debug, Clone)]
struct RenderArgs {
    #[command(flatten)]
    source: SessionArgs,

    /// Directory receiving the charts, the summary image and manifest.json
    #[arg(
        long,
        default_value = "crash_analysis_plots/quick_insights",
        value_hint = ValueHint::DirPath
    )]
    output_dir: PathBuf,

    /// Write SVG instead of PNG
    #[arg(long)]
    svg: bool,

    /// TrueType font for chart text (defaults to a system sans-serif face)
    #[arg(long, value_hint = ValueHint::FilePath)]
    font: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Log per-stage timings
    #[arg(long)]
    profile: bool,
}

impl RenderArgs {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            cache_dir: self.source.cache_dir.clone(),
            output_dir: self.output_dir.clone(),
            session: self.source.session_key(),
            fallback_seasons: self.source.fallback_seasons.clone(),
            format: if self.svg { ChartKind::Svg } else { ChartKind::Png },
        }
    }
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[command(flatten)]
    source: SessionArgs,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

/// Resolved options of a render run, recorded in the manifest.
#[derive(Clone, Debug, Serialize)]
pub struct RunConfig {
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub session: SessionKey,
    pub fallback_seasons: Vec<u16>,
    pub format: ChartKind,
}

impl RunConfig {
    fn artifact_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", stem, self.format.extension()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Render(cli.render));
    let verbose = match &command {
        Command::Render(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match command {
        Command::Render(args) => handle_render(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn handle_render(args: RenderArgs) -> Result<()> {
    let started = Instant::now();
    let config = args.run_config();
    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.output_dir.display()
        )
    })?;
    font::register_chart_font(args.font.as_deref());

    let comparisons = key_comparisons(&config.session);
    validate_comparisons(&comparisons)?;
    let source = CacheDirSource::new(&config.cache_dir);
    info!(
        "Generating {} comparison charts for {} from {}",
        comparisons.len(),
        config.session,
        config.cache_dir.display()
    );

    let manifest = run_pipeline(&source, &comparisons, &config, args.profile);
    match write_manifest(&manifest, &config.output_dir) {
        Ok(path) => debug!("Wrote {}", path.display()),
        Err(err) => error!("{:#}", err),
    }

    info!(
        "Quick visualizations complete: {} of {} images written to '{}'",
        manifest.rendered_count(),
        manifest.artifacts.len(),
        config.output_dir.display()
    );
    if args.profile {
        info!("Total runtime {:.2?}", started.elapsed());
    }
    Ok(())
}

/// Render every comparison in order, then the summary. Failures are recorded
/// per artifact and never stop the run.
fn run_pipeline<S>(
    source: &S,
    comparisons: &[Comparison],
    config: &RunConfig,
    profile: bool,
) -> Manifest
where
    S: TelemetrySource + ?Sized,
{
    let mut manifest = Manifest::new(config.clone());
    let mut collected: Vec<(ComparisonData, Option<String>)> =
        Vec::with_capacity(comparisons.len());

    for comparison in comparisons {
        info!("Creating visualization: {}", comparison.title);
        let stem = comparison.artifact_stem();

        let stage = Instant::now();
        let data = collect_comparison(source, comparison, &config.fallback_seasons);
        if profile {
            info!("{}: telemetry and metrics in {:.2?}", stem, stage.elapsed());
        }

        let title = Some(comparison.title.clone());
        let status = if data.is_renderable() {
            let path = config.artifact_path(&stem);
            let stage = Instant::now();
            let rendered = render_comparison_guard(comparison, &data, &path, config.format);
            let status = finish_artifact(&path, rendered);
            if profile {
                info!("{}: rendered in {:.2?}", stem, stage.elapsed());
            }
            status
        } else {
            warn!("No data available for '{}', skipping chart", comparison.title);
            ArtifactStatus::Skipped {
                reason: "no telemetry for any driver".to_string(),
            }
        };

        let artifact = match &status {
            ArtifactStatus::Rendered { file, .. } => Some(file.clone()),
            _ => None,
        };
        manifest
            .artifacts
            .push(ArtifactRecord::new(stem, title, status).with_data(&data));
        collected.push((data, artifact));
    }

    let sections: Vec<SummarySection<'_>> = comparisons
        .iter()
        .zip(&collected)
        .map(|(comparison, (data, artifact))| SummarySection {
            comparison,
            data,
            artifact: artifact.clone(),
        })
        .collect();
    let path = config.artifact_path(SUMMARY_STEM);
    let stage = Instant::now();
    let rendered = render_summary_guard(&sections, &path, config.format);
    let status = finish_artifact(&path, rendered);
    if profile {
        info!("{}: rendered in {:.2?}", SUMMARY_STEM, stage.elapsed());
    }
    manifest
        .artifacts
        .push(ArtifactRecord::new(SUMMARY_STEM, None, status));

    manifest
}

fn finish_artifact(path: &Path, rendered: Result<(), String>) -> ArtifactStatus {
    match rendered.map_err(anyhow::Error::msg).and_then(|()| rendered_status(path)) {
        Ok(status) => {
            info!("Saved visualization to {}", path.display());
            status
        }
        Err(err) => {
            error!("Failed to write {}: {:#}", path.display(), err);
            ArtifactStatus::Failed {
                reason: format!("{:#}", err),
            }
        }
    }
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let session = args.source.session_key();
    let source = CacheDirSource::new(&args.source.cache_dir);
    let comparisons = key_comparisons(&session);
    let report = inspect_report(&source, &comparisons, &args.source.fallback_seasons);

    match args.output {
        Some(path) => {
            fs::write(&path, &report)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote cache report to {}", path.display());
        }
        None => io::stdout()
            .write_all(report.as_bytes())
            .context("failed to write report to stdout")?,
    }
    Ok(())
}

/// One line per driver and turn: the season and reference lap the render run
/// would use, and the torque model picked for that turn window.
fn inspect_report<S>(source: &S, comparisons: &[Comparison], fallback_seasons: &[u16]) -> String
where
    S: TelemetrySource + ?Sized,
{
    let mut out = String::new();
    let Some(primary) = comparisons.first().map(|c| &c.session) else {
        return out;
    };
    let _ = writeln!(out, "Telemetry cache report for {}", primary);

    let mut seen: Vec<(&str, u32)> = Vec::new();
    for comparison in comparisons {
        for focus in &comparison.drivers {
            if seen.contains(&(focus.code.as_str(), focus.turn)) {
                continue;
            }
            seen.push((focus.code.as_str(), focus.turn));
            let turn = format!("T{}", focus.turn);
            match inspect_driver(source, &comparison.session, fallback_seasons, focus) {
                Ok(line) => {
                    let _ = writeln!(out, "{:<4} {:<4} {}", focus.code, turn, line);
                }
                Err(err) => {
                    let _ = writeln!(
                        out,
                        "{:<4} {:<4} {:<18} {}",
                        focus.code,
                        turn,
                        comparison.session.to_string(),
                        err
                    );
                }
            }
        }
    }
    out
}

fn inspect_driver<S>(
    source: &S,
    primary: &SessionKey,
    fallback_seasons: &[u16],
    focus: &DriverFocus,
) -> Result<String, InsightError>
where
    S: TelemetrySource + ?Sized,
{
    let lap = fetch_reference_lap(source, primary, fallback_seasons, &focus.code)?;
    let laps = source.driver_laps(&lap.session, &focus.code)?;
    let samples: usize = laps.laps.iter().map(|l| l.samples.len()).sum();
    let window = extract_turn_window(&lap.samples, focus.turn, WINDOW_HALF_WIDTH_M)?;
    let derived = compute_derived(&window.samples)?;
    Ok(format!(
        "{:<18} {} laps, {} samples, reference lap {} ({}), {} window samples, torque model {:?}",
        lap.session.to_string(),
        laps.laps.len(),
        samples,
        lap.lap_number,
        if lap.fastest { "fastest" } else { "first" },
        window.len(),
        derived.model
    ))
}
