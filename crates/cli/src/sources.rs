//! Offline inputs: saved Overpass and registry responses.

use std::path::{Path, PathBuf};

use aedsync_recon::collab::SnapshotNodes;
use aedsync_recon::{MapElement, MapQuery, ReconError, RegistryAsset, RegistrySource};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Overpass response saved to disk. Accepts the full response document
/// or a bare `elements` array. Loaded eagerly so the same snapshot also
/// answers node lookups.
pub struct MapSnapshotFile {
    elements: Vec<MapElement>,
}

impl MapSnapshotFile {
    pub fn load(path: &Path) -> Result<Self, ReconError> {
        Ok(Self {
            elements: read_array(path, "elements", "map-snapshot")?,
        })
    }

    pub fn node_source(&self) -> SnapshotNodes {
        SnapshotNodes::from_elements(&self.elements)
    }
}

impl MapQuery for MapSnapshotFile {
    fn search_aeds(&self) -> Result<Vec<MapElement>, ReconError> {
        Ok(self.elements.clone())
    }
}

/// Registry search response saved to disk. Accepts `{"ASSETS": [...]}` or
/// a bare array.
pub struct RegistrySnapshotFile {
    path: PathBuf,
}

impl RegistrySnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RegistrySource for RegistrySnapshotFile {
    fn search_assets(&self) -> Result<Vec<RegistryAsset>, ReconError> {
        read_array(&self.path, "ASSETS", "registry-snapshot")
    }
}

fn read_array<T: DeserializeOwned>(path: &Path, key: &str, service: &'static str) -> Result<Vec<T>, ReconError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ReconError::collaborator(service, format!("cannot read {}: {e}", path.display())))?;
    let doc: Value = serde_json::from_str(&raw)
        .map_err(|e| ReconError::collaborator(service, format!("{}: {e}", path.display())))?;
    let items = match doc {
        Value::Array(_) => doc,
        Value::Object(mut map) => map.remove(key).ok_or_else(|| {
            ReconError::collaborator(service, format!("{} has no {key} array", path.display()))
        })?,
        _ => {
            return Err(ReconError::collaborator(
                service,
                format!("{}: expected an object or array", path.display()),
            ))
        }
    };
    serde_json::from_value(items)
        .map_err(|e| ReconError::collaborator(service, format!("{}: {e}", path.display())))
}
