use std::collections::HashSet;

use serde::Serialize;

use crate::telemetry::SessionKey;
use crate::InsightError;

/// File stem of the summary image.
pub const SUMMARY_STEM: &str = "key_findings_summary";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const fn hex(value: u32) -> Self {
        Rgb((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }
}

pub const CRASH_COLOR: Rgb = Rgb::hex(0xFF3B30);
pub const SAVE_COLOR: Rgb = Rgb::hex(0x34C759);
pub const WARNING_COLOR: Rgb = Rgb::hex(0xFF9500);
pub const PURPLE_COLOR: Rgb = Rgb::hex(0xAF52DE);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Crash,
    Save,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Crash => "CRASH",
            Outcome::Save => "SAVE",
        }
    }
}

/// Which annotation set the chart composer adds on top of the common layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Emphasis {
    /// Steepest throttle rise of crash drivers vs. gradual application of saves.
    SuddenVsGradual,
    /// One large crash input vs. many small corrections; flat torque is amplified.
    SingleVsMultiple,
    /// Crash drivers only; no extra annotations.
    Pattern,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriverFocus {
    pub code: String,
    pub turn: u32,
    pub outcome: Outcome,
    pub color: Rgb,
    pub label: String,
}

impl DriverFocus {
    fn new(code: &str, turn: u32, outcome: Outcome, color: Rgb, label: &str) -> Self {
        Self {
            code: code.to_string(),
            turn,
            outcome,
            color,
            label: label.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comparison {
    pub title: String,
    pub subtitle: String,
    pub insight: String,
    pub session: SessionKey,
    pub emphasis: Emphasis,
    pub drivers: Vec<DriverFocus>,
}

impl Comparison {
    pub fn artifact_stem(&self) -> String {
        slugify(&self.title)
    }

    pub fn drivers_with(&self, outcome: Outcome) -> impl Iterator<Item = &DriverFocus> {
        self.drivers.iter().filter(move |d| d.outcome == outcome)
    }
}

/// The fixed comparison set, bound to `session`.
pub fn key_comparisons(session: &SessionKey) -> Vec<Comparison> {
    vec![
        Comparison {
            title: "TORQUE SPIKES: WHY CARS CRASH".into(),
            subtitle: "Smooth throttle application was the key difference between crashes and saves"
                .into(),
            insight: "Sainz's torque spike was 2.8x higher than Piastri's smooth application".into(),
            session: session.clone(),
            emphasis: Emphasis::SuddenVsGradual,
            drivers: vec![
                DriverFocus::new("SAI", 10, Outcome::Crash, CRASH_COLOR, "SAINZ - CRASH"),
                DriverFocus::new("PIA", 1, Outcome::Save, SAVE_COLOR, "PIASTRI - SAVE"),
            ],
        },
        Comparison {
            title: "THROTTLE CONTROL: RECOVERY VS SPIN".into(),
            subtitle: "Progressive throttle modulation enabled car control in wet conditions".into(),
            insight: "Antonelli used multiple small throttle adjustments vs Doohan's single large input"
                .into(),
            session: session.clone(),
            emphasis: Emphasis::SingleVsMultiple,
            drivers: vec![
                DriverFocus::new("DOO", 3, Outcome::Crash, CRASH_COLOR, "DOOHAN - CRASH"),
                DriverFocus::new("ANT", 9, Outcome::Save, SAVE_COLOR, "ANTONELLI - SAVE"),
            ],
        },
        Comparison {
            title: "POWER DELIVERY: CRASH PATTERN ANALYSIS".into(),
            subtitle: "All crashes showed similar torque surge patterns across different corners"
                .into(),
            insight: "Each crashed driver experienced a torque surge >40% within 10m distance".into(),
            session: session.clone(),
            emphasis: Emphasis::Pattern,
            drivers: vec![
                DriverFocus::new("ALO", 6, Outcome::Crash, CRASH_COLOR, "ALONSO - CRASH"),
                DriverFocus::new("SAI", 10, Outcome::Crash, WARNING_COLOR, "SAINZ - CRASH"),
                DriverFocus::new("DOO", 3, Outcome::Crash, PURPLE_COLOR, "DOOHAN - CRASH"),
            ],
        },
    ]
}

/// Lowercase ASCII alphanumerics; every other run of characters becomes `_`.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_sep = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Check that every comparison can produce exactly one distinct artifact.
pub fn validate_comparisons(comparisons: &[Comparison]) -> Result<(), InsightError> {
    let mut stems = HashSet::new();
    stems.insert(SUMMARY_STEM.to_string());
    for comparison in comparisons {
        let stem = comparison.artifact_stem();
        if stem.is_empty() {
            return Err(InsightError::InvalidParameter(format!(
                "comparison '{}' has no usable filename characters",
                comparison.title
            )));
        }
        if !stems.insert(stem.clone()) {
            return Err(InsightError::InvalidParameter(format!(
                "comparison '{}' reuses artifact name '{}'",
                comparison.title, stem
            )));
        }
        if comparison.drivers.is_empty() {
            return Err(InsightError::InvalidParameter(format!(
                "comparison '{}' lists no drivers",
                comparison.title
            )));
        }
        if let Some(driver) = comparison.drivers.iter().find(|d| d.turn == 0) {
            return Err(InsightError::InvalidParameter(format!(
                "{} in '{}': turn numbers start at 1",
                driver.code, comparison.title
            )));
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TeamInfo {
    pub team: &'static str,
    pub color: Rgb,
}

const TEAMS: &[(&str, TeamInfo)] = &[
    ("SAI", TeamInfo { team: "Ferrari", color: Rgb::hex(0xFF0000) }),
    ("PIA", TeamInfo { team: "McLaren", color: Rgb::hex(0xFF9800) }),
    ("DOO", TeamInfo { team: "Dorilton Racing", color: Rgb::hex(0x005AFF) }),
    ("ANT", TeamInfo { team: "Williams", color: Rgb::hex(0x0082FA) }),
    ("ALO", TeamInfo { team: "Aston Martin", color: Rgb::hex(0x006F62) }),
    ("LAW", TeamInfo { team: "RB F1 Team", color: Rgb::hex(0x00327D) }),
    ("BOR", TeamInfo { team: "Sauber", color: Rgb::hex(0x900000) }),
];

pub fn team_info(code: &str) -> Option<TeamInfo> {
    TEAMS
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, info)| *info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_deterministic_file_stems() {
        assert_eq!(slugify("TORQUE SPIKES: WHY CARS CRASH"), "torque_spikes_why_cars_crash");
        assert_eq!(slugify("  --A/b--  "), "a_b");
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn default_comparisons_are_valid() {
        let session = SessionKey::new(2025, "Australia", "R");
        let comparisons = key_comparisons(&session);
        assert_eq!(comparisons.len(), 3);
        validate_comparisons(&comparisons).unwrap();
        assert_eq!(comparisons[0].drivers_with(Outcome::Crash).count(), 1);
        assert_eq!(comparisons[0].drivers_with(Outcome::Save).count(), 1);
        assert_eq!(comparisons[2].drivers_with(Outcome::Save).count(), 0);
        assert!(comparisons.iter().all(|c| c.session == session));
        for driver in comparisons.iter().flat_map(|c| &c.drivers) {
            assert!(team_info(&driver.code).is_some(), "{}", driver.code);
        }
    }

    #[test]
    fn duplicate_titles_are_rejected() {
        let session = SessionKey::new(2025, "Australia", "R");
        let mut comparisons = key_comparisons(&session);
        comparisons[1].title = "Torque spikes - why cars crash".into();
        assert!(validate_comparisons(&comparisons).is_err());

        let mut comparisons = key_comparisons(&session);
        comparisons[0].title = "Key findings summary".into();
        assert!(validate_comparisons(&comparisons).is_err());
    }

    #[test]
    fn hex_colors_unpack() {
        assert_eq!(CRASH_COLOR, Rgb(0xFF, 0x3B, 0x30));
    }
}
