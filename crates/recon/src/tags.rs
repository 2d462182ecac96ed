//! Tag maps, the AED tag vocabulary, and the predicates the phases use to
//! decide what a map feature is.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tag carrying the registry GUID on managed nodes.
pub const REGISTER_REF_TAG: &str = "ref:hjertestarterregister";

/// A mapper-written `note` opts the node out of automated edits.
pub const OPT_OUT_TAG: &str = "note";

/// Keys that mark a node as representing something other than the AED.
pub const PRIMARY_FEATURE_KEYS: &[&str] = &[
    "amenity", "leisure", "tourism", "shop", "office", "craft", "club",
];

/// `emergency=*` values that identify an AED.
const AED_EMERGENCY_VALUES: &[&str] = &["defibrillator", "aed"];

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Every key the synthesizer may write. Nothing outside this set is
/// ever added, changed, or removed by a modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AedTagKey {
    Emergency,
    RegisterRef,
    Name,
    Level,
    Indoor,
    Access,
    Locked,
    Phone,
    Email,
    EmergencyPhone,
    OpeningHours,
    Description,
    Location,
    Code,
    Manufacturer,
    Model,
    Cabinet,
    CabinetManufacturer,
    CabinetColour,
}

impl AedTagKey {
    pub const ALL: [AedTagKey; 19] = [
        Self::Emergency,
        Self::RegisterRef,
        Self::Name,
        Self::Level,
        Self::Indoor,
        Self::Access,
        Self::Locked,
        Self::Phone,
        Self::Email,
        Self::EmergencyPhone,
        Self::OpeningHours,
        Self::Description,
        Self::Location,
        Self::Code,
        Self::Manufacturer,
        Self::Model,
        Self::Cabinet,
        Self::CabinetManufacturer,
        Self::CabinetColour,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::RegisterRef => REGISTER_REF_TAG,
            Self::Name => "name",
            Self::Level => "level",
            Self::Indoor => "indoor",
            Self::Access => "access",
            Self::Locked => "locked",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::EmergencyPhone => "emergency:phone",
            Self::OpeningHours => "opening_hours",
            Self::Description => "description",
            Self::Location => "defibrillator:location",
            Self::Code => "defibrillator:code",
            Self::Manufacturer => "manufacturer",
            Self::Model => "model",
            Self::Cabinet => "defibrillator:cabinet",
            Self::CabinetManufacturer => "defibrillator:cabinet:manufacturer",
            Self::CabinetColour => "defibrillator:cabinet:colour",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// Keys removed from a mixed-use node when its AED moves to a new node.
    /// Generic keys (`name`, `phone`, `opening_hours`...) stay with the
    /// host feature.
    pub fn is_aed_specific(self) -> bool {
        matches!(
            self,
            Self::Emergency
                | Self::RegisterRef
                | Self::EmergencyPhone
                | Self::Location
                | Self::Code
                | Self::Cabinet
                | Self::CabinetManufacturer
                | Self::CabinetColour
        )
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Key -> value tag map. Ordered so rendering and diffs are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn set(&mut self, key: AedTagKey, value: impl Into<String>) {
        self.insert(key.as_str(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Trimmed, non-empty registry reference.
    pub fn register_ref(&self) -> Option<&str> {
        self.get(REGISTER_REF_TAG)
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    pub fn is_opted_out(&self) -> bool {
        self.contains_key(OPT_OUT_TAG)
    }

    /// Updates that bring every key of `desired` to its desired value.
    /// Keys absent from `desired` are left alone.
    pub fn updates_toward(&self, desired: &Tags) -> TagUpdates {
        let mut updates = TagUpdates::default();
        for (key, value) in desired.iter() {
            if self.get(key) != Some(value) {
                updates.set(key, value);
            }
        }
        updates
    }

    pub fn with_updates(&self, updates: &TagUpdates) -> Tags {
        let mut next = self.clone();
        for (key, value) in updates.iter() {
            match value {
                Some(v) => next.insert(key, v),
                None => {
                    next.remove(key);
                }
            }
        }
        next
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Tag edits for one modify. `None` removes the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagUpdates(BTreeMap<String, Option<String>>);

impl TagUpdates {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), Some(value.into()));
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), None);
    }

    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.0.get(key).map(|v| v.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

pub fn is_aed(tags: &Tags) -> bool {
    tags.get("emergency")
        .is_some_and(|v| AED_EMERGENCY_VALUES.contains(&v))
}

/// An AED whose every key is AED vocabulary. Only these are safe to delete.
pub fn is_aed_only(tags: &Tags) -> bool {
    is_aed(tags) && tags.keys().all(|k| AedTagKey::parse(k).is_some())
}

/// Primary-feature keys present on the node, in key order.
pub fn primary_feature_keys(tags: &Tags) -> Vec<String> {
    tags.keys()
        .filter(|k| PRIMARY_FEATURE_KEYS.contains(k))
        .map(str::to_string)
        .collect()
}

pub fn has_primary_feature(tags: &Tags) -> bool {
    tags.keys().any(|k| PRIMARY_FEATURE_KEYS.contains(&k))
}

/// Removals for every AED-specific key present on a mixed-use node.
pub fn strip_aed_updates(tags: &Tags) -> TagUpdates {
    let mut updates = TagUpdates::default();
    for key in tags.keys() {
        if AedTagKey::parse(key).is_some_and(AedTagKey::is_aed_specific) {
            updates.remove(key);
        }
    }
    updates
}
