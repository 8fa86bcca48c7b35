//! `manifest.json`: what each run produced, with content digests so two runs
//! over the same cache can be compared byte for byte.

use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use f1_insights::{
    ComparisonData, ComparisonFindings, DriverFailure, DriverTrace, MetricSummary, Outcome,
    TorqueModel,
};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::RunConfig;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    Rendered {
        file: String,
        bytes: u64,
        sha256: String,
    },
    Skipped {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DriverRecord {
    pub code: String,
    pub outcome: Outcome,
    pub turn: u32,
    pub exact_turn: bool,
    pub season: u16,
    pub lap: u32,
    pub torque_model: TorqueModel,
    pub amplified: bool,
    pub metrics: MetricSummary,
}

impl From<&DriverTrace> for DriverRecord {
    fn from(trace: &DriverTrace) -> Self {
        Self {
            code: trace.focus.code.clone(),
            outcome: trace.focus.outcome,
            turn: trace.focus.turn,
            exact_turn: trace.window.exact_turn,
            season: trace.session.season,
            lap: trace.lap_number,
            torque_model: trace.derived.model,
            amplified: trace.derived.amplified,
            metrics: trace.summary.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArtifactRecord {
    pub stem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub status: ArtifactStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub drivers: Vec<DriverRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DriverFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<ComparisonFindings>,
}

impl ArtifactRecord {
    pub fn new(stem: impl Into<String>, title: Option<String>, status: ArtifactStatus) -> Self {
        Self {
            stem: stem.into(),
            title,
            status,
            drivers: Vec::new(),
            failures: Vec::new(),
            findings: None,
        }
    }

    pub fn with_data(mut self, data: &ComparisonData) -> Self {
        self.drivers = data.traces.iter().map(DriverRecord::from).collect();
        self.failures = data.failures.clone();
        self.findings = Some(data.findings.clone());
        self
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self.status, ArtifactStatus::Rendered { .. })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Manifest {
    pub tool: &'static str,
    pub version: &'static str,
    pub config: RunConfig,
    pub artifacts: Vec<ArtifactRecord>,
}

impl Manifest {
    pub fn new(config: RunConfig) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            config,
            artifacts: Vec::new(),
        }
    }

    pub fn rendered_count(&self) -> usize {
        self.artifacts.iter().filter(|a| a.is_rendered()).count()
    }
}

/// Status for a file that was just written: its name, size and SHA-256.
pub fn rendered_status(path: &Path) -> Result<ArtifactStatus> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read artifact {}", path.display()))?;
    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ArtifactStatus::Rendered {
        file,
        bytes: bytes.len() as u64,
        sha256: sha256_hex(&bytes),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub fn write_manifest(manifest: &Manifest, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(MANIFEST_FILE);
    let mut body = serde_json::to_string_pretty(manifest).context("failed to encode manifest")?;
    body.push('\n');
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
