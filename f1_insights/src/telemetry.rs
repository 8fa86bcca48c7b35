use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::InsightError;

/// Identifies one session of one event, e.g. `2025 Australia R`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub season: u16,
    pub event: String,
    pub session: String,
}

impl SessionKey {
    pub fn new(season: u16, event: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            season,
            event: event.into(),
            session: session.into(),
        }
    }

    pub fn with_season(&self, season: u16) -> Self {
        Self {
            season,
            ..self.clone()
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.season, self.event, self.session)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySample {
    pub time_s: f64,
    pub distance_m: f64,
    pub speed_kph: f64,
    pub throttle: Option<f64>,
    pub brake: Option<bool>,
    pub gear: Option<u8>,
    pub rpm: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct Lap {
    pub number: u32,
    pub lap_time_s: Option<f64>,
    pub samples: Vec<TelemetrySample>,
}

#[derive(Clone, Debug)]
pub struct DriverLaps {
    pub driver: String,
    pub session: SessionKey,
    pub laps: Vec<Lap>,
}

impl DriverLaps {
    /// Fastest lap among those carrying a lap time.
    pub fn fastest_lap(&self) -> Option<&Lap> {
        self.laps
            .iter()
            .filter_map(|lap| lap.lap_time_s.map(|t| (t, lap)))
            .filter(|(t, _)| t.is_finite())
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, lap)| lap)
    }

    /// The lap used for comparisons: the fastest timed lap, else the first lap.
    pub fn reference_lap(&self) -> Option<(&Lap, bool)> {
        if let Some(lap) = self.fastest_lap() {
            return Some((lap, true));
        }
        let first = self.laps.first()?;
        debug!(
            "No timed lap for {} in {}, using lap {}",
            self.driver, self.session, first.number
        );
        Some((first, false))
    }
}

/// Reference-lap telemetry for one driver, tagged with the season it came from.
#[derive(Clone, Debug)]
pub struct LapTelemetry {
    pub driver: String,
    pub session: SessionKey,
    pub lap_number: u32,
    pub fastest: bool,
    pub samples: Vec<TelemetrySample>,
}

pub trait TelemetrySource {
    fn driver_laps(&self, session: &SessionKey, driver: &str) -> Result<DriverLaps, InsightError>;
}

/// Reads `<root>/<season>/<event>/<session>/<DRIVER>.csv` files populated by an
/// external fetcher.
#[derive(Clone, Debug)]
pub struct CacheDirSource {
    root: PathBuf,
}

impl CacheDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn driver_path(&self, session: &SessionKey, driver: &str) -> PathBuf {
        self.root
            .join(session.season.to_string())
            .join(&session.event)
            .join(&session.session)
            .join(format!("{}.csv", driver.to_ascii_uppercase()))
    }
}

impl TelemetrySource for CacheDirSource {
    fn driver_laps(&self, session: &SessionKey, driver: &str) -> Result<DriverLaps, InsightError> {
        let path = self.driver_path(session, driver);
        if !path.is_file() {
            return Err(InsightError::DataUnavailable(format!(
                "no cached telemetry for {} in {} ({})",
                driver,
                session,
                path.display()
            )));
        }
        let file = File::open(&path)?;
        let laps = parse_driver_laps(file, driver, session)?;
        if laps.laps.is_empty() {
            return Err(InsightError::DataUnavailable(format!(
                "{} has no laps in {}",
                driver, session
            )));
        }
        Ok(laps)
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    lap: u32,
    #[serde(default)]
    lap_time_s: Option<f64>,
    time_s: f64,
    distance_m: f64,
    speed_kph: f64,
    #[serde(default)]
    throttle: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_brake")]
    brake: Option<bool>,
    #[serde(default)]
    gear: Option<u8>,
    #[serde(default)]
    rpm: Option<f64>,
}

fn deserialize_brake<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "true" | "1" | "1.0" => Ok(Some(true)),
        "false" | "0" | "0.0" => Ok(Some(false)),
        other => Err(serde::de::Error::custom(format!(
            "invalid brake value '{}'",
            other
        ))),
    }
}

/// Parse one driver's telemetry CSV, grouping samples by lap.
///
/// Samples inside a lap are ordered by time; laps are ordered by number.
pub fn parse_driver_laps<R: Read>(
    reader: R,
    driver: &str,
    session: &SessionKey,
) -> Result<DriverLaps, InsightError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut laps: BTreeMap<u32, Lap> = BTreeMap::new();
    for (row_idx, row) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        if !row.time_s.is_finite() || !row.distance_m.is_finite() || !row.speed_kph.is_finite() {
            return Err(InsightError::MalformedInput(format!(
                "{} row {}: non-finite time/distance/speed",
                driver,
                row_idx + 1
            )));
        }
        let lap = laps.entry(row.lap).or_insert_with(|| Lap {
            number: row.lap,
            lap_time_s: None,
            samples: Vec::new(),
        });
        if lap.lap_time_s.is_none() {
            lap.lap_time_s = row.lap_time_s.filter(|t| t.is_finite() && *t > 0.0);
        }
        lap.samples.push(TelemetrySample {
            time_s: row.time_s,
            distance_m: row.distance_m,
            speed_kph: row.speed_kph,
            throttle: row.throttle,
            brake: row.brake,
            gear: row.gear,
            rpm: row.rpm,
        });
    }

    let mut laps: Vec<Lap> = laps.into_values().collect();
    for lap in &mut laps {
        lap.samples.sort_by(|a, b| a.time_s.total_cmp(&b.time_s));
    }

    Ok(DriverLaps {
        driver: driver.to_ascii_uppercase(),
        session: session.clone(),
        laps,
    })
}

/// Fetch a driver's reference lap, trying `primary` first and then each
/// fallback season in order. Only missing data triggers the fallback; parse
/// errors abort immediately.
pub fn fetch_reference_lap<S>(
    source: &S,
    primary: &SessionKey,
    fallback_seasons: &[u16],
    driver: &str,
) -> Result<LapTelemetry, InsightError>
where
    S: TelemetrySource + ?Sized,
{
    let mut seasons = vec![primary.season];
    for &season in fallback_seasons {
        if !seasons.contains(&season) {
            seasons.push(season);
        }
    }

    let mut attempts = Vec::with_capacity(seasons.len());
    for season in seasons {
        let session = primary.with_season(season);
        let laps = match source.driver_laps(&session, driver) {
            Ok(laps) => laps,
            Err(err) if err.is_unavailable() => {
                warn!("{}; trying next season", err);
                attempts.push(season.to_string());
                continue;
            }
            Err(err) => return Err(err),
        };
        match laps.reference_lap() {
            Some((lap, fastest)) if !lap.samples.is_empty() => {
                if season != primary.season {
                    warn!(
                        "Using {} data for {} as a fallback for {}",
                        session, driver, primary
                    );
                }
                return Ok(LapTelemetry {
                    driver: laps.driver.clone(),
                    session,
                    lap_number: lap.number,
                    fastest,
                    samples: lap.samples.clone(),
                });
            }
            _ => {
                warn!("{} has no samples in {}; trying next season", driver, session);
                attempts.push(season.to_string());
            }
        }
    }

    Err(InsightError::DataUnavailable(format!(
        "no samples for {} in {} {} (seasons tried: {})",
        driver,
        primary.event,
        primary.session,
        attempts.join(", ")
    )))
}
