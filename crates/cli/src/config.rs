//! Config file loading: the engine's `ReconConfig` plus the service
//! sections only the binary cares about.

use std::path::{Path, PathBuf};

use aedsync_clients::{OsmConfig, OverpassConfig, RegistryConfig};
use aedsync_recon::{Boundary, ReconConfig};
use serde::Deserialize;

use crate::exit_codes::{EXIT_BOUNDARY, EXIT_INVALID_CONFIG, EXIT_USAGE};
use crate::CliError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one JSON record per run.
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("runs"),
        }
    }
}

/// Sections parsed in a second pass over the same TOML. The engine config
/// ignores them and they ignore the engine's keys.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceSections {
    pub overpass: OverpassConfig,
    pub registry: RegistryConfig,
    pub osm: OsmConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub recon: ReconConfig,
    pub services: ServiceSections,
}

impl AppConfig {
    pub fn from_toml(input: &str) -> Result<Self, CliError> {
        let recon = ReconConfig::from_toml(input).map_err(|e| CliError {
            code: EXIT_INVALID_CONFIG,
            message: e.to_string(),
            hint: None,
        })?;
        let services: ServiceSections = toml::from_str(input).map_err(|e| CliError {
            code: EXIT_INVALID_CONFIG,
            message: format!("config parse error: {e}"),
            hint: None,
        })?;
        if services.overpass.request_timeout_secs <= services.overpass.query_timeout_secs {
            return Err(CliError {
                code: EXIT_INVALID_CONFIG,
                message: format!(
                    "overpass.request_timeout_secs ({}) must exceed query_timeout_secs ({})",
                    services.overpass.request_timeout_secs, services.overpass.query_timeout_secs
                ),
                hint: None,
            });
        }
        if services.registry.max_rows == 0 {
            return Err(CliError {
                code: EXIT_INVALID_CONFIG,
                message: "registry.max_rows must be at least 1".into(),
                hint: None,
            });
        }
        Ok(Self { recon, services })
    }

    /// Read, parse and validate a config file. Relative paths inside it are
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let input = std::fs::read_to_string(path).map_err(|e| CliError {
            code: EXIT_USAGE,
            message: format!("cannot read config {}: {e}", path.display()),
            hint: None,
        })?;
        let mut config = Self::from_toml(&input)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base_dir);
        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        let recon = &mut self.recon;
        for path in [
            &mut recon.boundary.file,
            &mut recon.output.osc_path,
            &mut recon.output.geojson_path,
            &mut self.services.store.dir,
        ] {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
    }

    pub fn load_boundary(&self) -> Result<Boundary, CliError> {
        let path = &self.recon.boundary.file;
        let input = std::fs::read_to_string(path).map_err(|e| CliError {
            code: EXIT_BOUNDARY,
            message: format!("cannot read boundary {}: {e}", path.display()),
            hint: Some("boundary.file is resolved relative to the config file".into()),
        })?;
        Boundary::from_geojson(&input).map_err(|e| CliError {
            code: EXIT_BOUNDARY,
            message: format!("{}: {e}", path.display()),
            hint: None,
        })
    }
}
