use std::collections::BTreeMap;

use serde_json::json;

use crate::geo::Boundary;
use crate::issue::{Issue, IssueType};
use crate::model::{RegisterAed, RegistryAsset};

/// Validated, geofenced registry assets keyed by GUID.
#[derive(Debug, Clone, Default)]
pub struct RegistryIndex {
    by_guid: BTreeMap<String, RegisterAed>,
}

impl RegistryIndex {
    pub fn get(&self, guid: &str) -> Option<&RegisterAed> {
        self.by_guid.get(guid)
    }

    pub fn contains(&self, guid: &str) -> bool {
        self.by_guid.contains_key(guid)
    }

    pub fn len(&self) -> usize {
        self.by_guid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_guid.is_empty()
    }

    /// In GUID order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisterAed> {
        self.by_guid.values()
    }
}

#[derive(Debug)]
pub struct RegistryLoad {
    pub index: RegistryIndex,
    pub issues: Vec<Issue>,
}

/// Validate required fields, geofence, and index by GUID. Rejected assets
/// only show up as issues.
pub fn load_registry(assets: &[RegistryAsset], boundary: &Boundary) -> RegistryLoad {
    let mut index = RegistryIndex::default();
    let mut issues = Vec::new();

    for asset in assets {
        let Some(aed) = RegisterAed::from_asset(asset) else {
            let guid = asset.asset_guid.as_deref().map(str::trim).unwrap_or_default();
            let mut issue = Issue::warning(
                IssueType::RegistryMissingRequiredData,
                "registry asset is missing a GUID or valid coordinates",
            )
            .with_details(json!({
                "guid": asset.asset_guid,
                "latitude": asset.site_latitude,
                "longitude": asset.site_longitude,
            }));
            if !guid.is_empty() {
                issue = issue.with_register_ref(guid);
            }
            issues.push(issue);
            continue;
        };

        if !boundary.contains(aed.coordinate) {
            issues.push(
                Issue::warning(
                    IssueType::RegistryOutsideBoundary,
                    format!("registry asset {} lies outside the boundary", aed.guid),
                )
                .with_register_ref(aed.guid.as_str())
                .with_details(json!({ "lat": aed.coordinate.lat, "lon": aed.coordinate.lon })),
            );
            continue;
        }

        if index.contains(&aed.guid) {
            issues.push(
                Issue::warning(
                    IssueType::RegistryDuplicateRegisterRef,
                    format!("registry lists {} more than once; keeping the first", aed.guid),
                )
                .with_register_ref(aed.guid.as_str()),
            );
            continue;
        }
        index.by_guid.insert(aed.guid.clone(), aed);
    }

    log::info!(
        "loaded {} registry AEDs ({} rejected)",
        index.len(),
        assets.len() - index.len()
    );
    RegistryLoad { index, issues }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary() -> Boundary {
        Boundary::from_geojson(
            r#"{"type":"Polygon","coordinates":[[[10,59],[11,59],[11,60],[10,60],[10,59]]]}"#,
        )
        .unwrap()
    }

    fn asset(guid: &str, lat: f64, lon: f64) -> RegistryAsset {
        RegistryAsset {
            asset_guid: Some(guid.into()),
            site_latitude: Some(lat),
            site_longitude: Some(lon),
            ..Default::default()
        }
    }

    #[test]
    fn indexes_valid_assets() {
        let load = load_registry(&[asset("b", 59.5, 10.5), asset("a", 59.6, 10.6)], &boundary());
        assert!(load.issues.is_empty());
        let guids: Vec<&str> = load.index.iter().map(|a| a.guid.as_str()).collect();
        assert_eq!(guids, vec!["a", "b"]);
    }

    #[test]
    fn outside_boundary_is_rejected_once() {
        let load = load_registry(&[asset("out", 58.0, 10.5)], &boundary());
        assert!(load.index.is_empty());
        assert_eq!(load.issues.len(), 1);
        assert_eq!(load.issues[0].kind, IssueType::RegistryOutsideBoundary);
        assert_eq!(load.issues[0].register_ref.as_deref(), Some("out"));
    }

    #[test]
    fn missing_data_is_reported() {
        let mut no_coords = asset("x", 0.0, 0.0);
        no_coords.site_latitude = None;
        let no_guid = asset("", 59.5, 10.5);
        let load = load_registry(&[no_coords, no_guid], &boundary());
        assert!(load.index.is_empty());
        assert!(load
            .issues
            .iter()
            .all(|i| i.kind == IssueType::RegistryMissingRequiredData));
        assert_eq!(load.issues[0].register_ref.as_deref(), Some("x"));
        assert_eq!(load.issues[1].register_ref, None);
    }

    #[test]
    fn duplicate_guid_keeps_first() {
        let load = load_registry(&[asset("a", 59.5, 10.5), asset("a", 59.7, 10.7)], &boundary());
        assert_eq!(load.index.len(), 1);
        assert_eq!(load.index.get("a").unwrap().coordinate.lat, 59.5);
        assert_eq!(load.issues[0].kind, IssueType::RegistryDuplicateRegisterRef);
    }
}
