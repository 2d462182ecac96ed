use serde::{Deserialize, Serialize};

use crate::geo::{Coordinate, Located};
use crate::tags::Tags;

/// OSM node id. Negative ids are placeholders for not-yet-created nodes.
pub type NodeId = i64;

// ---------------------------------------------------------------------------
// Map features
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
    #[serde(other)]
    Other,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
            Self::Other => "other",
        }
    }
}

/// One element as returned by the map query (`out geom`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geometry: Vec<Coordinate>,
}

impl MapElement {
    /// The element as a point feature: a node with finite coordinates.
    pub fn as_node(&self) -> Option<MapNode> {
        if self.kind != ElementKind::Node {
            return None;
        }
        let coordinate = Coordinate::new(self.lat?, self.lon?);
        if !coordinate.is_finite() {
            return None;
        }
        Some(MapNode {
            id: self.id,
            lat: coordinate.lat,
            lon: coordinate.lon,
            version: self.version,
            tags: self.tags.clone(),
        })
    }
}

impl Located for MapElement {
    fn positions(&self) -> Vec<Coordinate> {
        if self.kind == ElementKind::Node {
            return match (self.lat, self.lon) {
                (Some(lat), Some(lon)) => vec![Coordinate::new(lat, lon)],
                _ => Vec::new(),
            };
        }
        let mut positions = self.geometry.clone();
        positions.extend(self.center);
        positions
    }
}

/// A point feature with finite coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapNode {
    pub id: NodeId,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub tags: Tags,
}

impl MapNode {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    pub fn register_ref(&self) -> Option<&str> {
        self.tags.register_ref()
    }

    pub fn to_element(&self) -> MapElement {
        MapElement {
            kind: ElementKind::Node,
            id: self.id,
            lat: Some(self.lat),
            lon: Some(self.lon),
            version: self.version,
            tags: self.tags.clone(),
            center: None,
            geometry: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Raw registry asset. Fields that fail to parse become `None` so a single
/// malformed row surfaces as a data issue instead of failing the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RegistryAsset {
    #[serde(default, deserialize_with = "lenient::string")]
    pub asset_guid: Option<String>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub site_latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub site_longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub site_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub site_address: Option<String>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub site_floor_number: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub site_description: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub site_access_info: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub manufacturer_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub asset_type_name: Option<String>,
    /// `"Y"` when the site has limited hours; `"N"` when always open.
    #[serde(default, deserialize_with = "lenient::string")]
    pub opening_hours_limited: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub opening_hours_closed_holidays: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_mon_from: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_mon_to: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_tue_from: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_tue_to: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_wed_from: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_wed_to: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_thu_from: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_thu_to: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_fri_from: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_fri_to: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_sat_from: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_sat_to: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_sun_from: Option<i64>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub opening_hours_sun_to: Option<i64>,
}

impl RegistryAsset {
    pub fn weekly_hours(&self) -> WeeklyHours {
        let day = |open: Option<i64>, close: Option<i64>| DayHours { open, close };
        WeeklyHours {
            days: [
                day(self.opening_hours_mon_from, self.opening_hours_mon_to),
                day(self.opening_hours_tue_from, self.opening_hours_tue_to),
                day(self.opening_hours_wed_from, self.opening_hours_wed_to),
                day(self.opening_hours_thu_from, self.opening_hours_thu_to),
                day(self.opening_hours_fri_from, self.opening_hours_fri_to),
                day(self.opening_hours_sat_from, self.opening_hours_sat_to),
                day(self.opening_hours_sun_from, self.opening_hours_sun_to),
            ],
        }
    }
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn float<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }
}

/// Opening and closing time for one weekday, as `HHMM` integers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayHours {
    pub open: Option<i64>,
    pub close: Option<i64>,
}

/// Monday first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeeklyHours {
    pub days: [DayHours; 7],
}

/// A registry asset that passed required-field validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterAed {
    pub guid: String,
    pub coordinate: Coordinate,
    pub site_name: Option<String>,
    pub floor: Option<f64>,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub hours: WeeklyHours,
    /// `Some(false)` means the site is always accessible.
    pub hours_limited: Option<bool>,
    pub closed_on_holidays: Option<bool>,
}

impl RegisterAed {
    pub fn from_asset(asset: &RegistryAsset) -> Option<Self> {
        let guid = asset
            .asset_guid
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())?
            .to_string();
        let coordinate = Coordinate::new(asset.site_latitude?, asset.site_longitude?);
        if !coordinate.is_finite() {
            return None;
        }
        Some(Self {
            guid,
            coordinate,
            site_name: asset.site_name.clone(),
            floor: asset.site_floor_number.filter(|f| f.is_finite()),
            description: asset.site_description.clone(),
            manufacturer: asset.manufacturer_name.clone(),
            model: asset.asset_type_name.clone(),
            hours: asset.weekly_hours(),
            hours_limited: yes_no(asset.opening_hours_limited.as_deref()),
            closed_on_holidays: yes_no(asset.opening_hours_closed_holidays.as_deref()),
        })
    }
}

fn yes_no(flag: Option<&str>) -> Option<bool> {
    match flag.map(str::trim) {
        Some(f) if f.eq_ignore_ascii_case("y") => Some(true),
        Some(f) if f.eq_ignore_ascii_case("n") => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    DryRun,
    Live,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DryRun => "dry-run",
            Self::Live => "live",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

/// Per-phase operation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub linked: usize,
    pub skipped_create_nearby: usize,
    pub skipped_delete_not_aed_only: usize,
}

/// Counters persisted with a run record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub registry_aeds: usize,
    pub osm_aeds: usize,
    pub linked_aeds: usize,
    pub updated: usize,
    pub created: usize,
    pub deleted: usize,
    pub skipped_create_nearby: usize,
    pub skipped_delete_not_aed_only: usize,
    pub unchanged: usize,
}

impl RunMetrics {
    pub fn absorb(&mut self, summary: &ReconSummary) {
        self.updated = summary.updated;
        self.created = summary.created;
        self.deleted = summary.deleted;
        self.skipped_create_nearby = summary.skipped_create_nearby;
        self.skipped_delete_not_aed_only = summary.skipped_delete_not_aed_only;
        self.unchanged = summary.unchanged;
    }
}
