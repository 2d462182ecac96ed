use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ReconError;
use crate::model::RunMode;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub changeset: ChangesetConfig,
    pub boundary: BoundaryConfig,
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Distances in meters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Update relocates a node only when it is further than this from the
    /// registry position.
    pub move_threshold_m: f64,
    /// Link phase candidate radius.
    pub merge_radius_m: f64,
    /// Creation is skipped when any feature lies within this radius.
    pub nearby_radius_m: f64,
    /// Planned deletes / managed nodes above this aborts the run.
    pub max_delete_fraction: f64,
    /// Positions closer than this are the same position.
    pub location_epsilon_m: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            move_threshold_m: 10.0,
            merge_radius_m: 15.0,
            nearby_radius_m: 20.0,
            max_delete_fraction: 0.1,
            location_epsilon_m: 0.01,
        }
    }
}

// ---------------------------------------------------------------------------
// Output + Changeset + Boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub osc_path: PathBuf,
    pub geojson_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            osc_path: PathBuf::from("dry-run-changes.osc"),
            geojson_path: PathBuf::from("dry-run-changes.geojson"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChangesetConfig {
    /// Object of the generated comment ("Added and Modified <subject>").
    pub comment_subject: String,
    /// Extra changeset tags (`created_by`, `source`, `bot`, ...).
    pub tags: BTreeMap<String, String>,
}

impl Default for ChangesetConfig {
    fn default() -> Self {
        let tags = [
            ("created_by", concat!("aedsync ", env!("CARGO_PKG_VERSION"))),
            ("source", "hjertestarterregister"),
            ("bot", "yes"),
        ];
        Self {
            comment_subject: "AED locations".into(),
            tags: tags
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryConfig {
    /// GeoJSON polygon file. Relative paths are resolved by the caller.
    pub file: PathBuf,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("move_threshold_m", t.move_threshold_m),
            ("merge_radius_m", t.merge_radius_m),
            ("nearby_radius_m", t.nearby_radius_m),
            ("location_epsilon_m", t.location_epsilon_m),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ReconError::ConfigValidation(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        if t.merge_radius_m > t.nearby_radius_m {
            return Err(ReconError::ConfigValidation(format!(
                "merge_radius_m ({}) must not exceed nearby_radius_m ({})",
                t.merge_radius_m, t.nearby_radius_m
            )));
        }

        if t.location_epsilon_m >= t.move_threshold_m {
            return Err(ReconError::ConfigValidation(format!(
                "location_epsilon_m ({}) must be below move_threshold_m ({})",
                t.location_epsilon_m, t.move_threshold_m
            )));
        }

        if !(t.max_delete_fraction > 0.0 && t.max_delete_fraction <= 1.0) {
            return Err(ReconError::ConfigValidation(format!(
                "max_delete_fraction must be in (0, 1], got {}",
                t.max_delete_fraction
            )));
        }

        if self.output.osc_path.as_os_str().is_empty() || self.output.geojson_path.as_os_str().is_empty() {
            return Err(ReconError::ConfigValidation(
                "output paths must not be empty".into(),
            ));
        }

        if self.changeset.comment_subject.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "changeset.comment_subject must not be empty".into(),
            ));
        }

        if self.boundary.file.as_os_str().is_empty() {
            return Err(ReconError::ConfigValidation(
                "boundary.file must not be empty".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
