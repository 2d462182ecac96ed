use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::NodeId;

/// Data-quality and guard findings recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    OsmNodeMissingRef,
    OsmDuplicateRegisterRef,
    OsmNodeNoteOptOut,
    OsmUnsupportedElement,
    RegistryMissingRequiredData,
    RegistryOutsideBoundary,
    RegistryDuplicateRegisterRef,
    SkippedCreateNearby,
    SkippedDeleteNotAedOnly,
    ManagedNodeLocationWithinTolerance,
    AedSplitNonStandaloneNode,
    TagValueTooLong,
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OsmNodeMissingRef => "osm_node_missing_ref",
            Self::OsmDuplicateRegisterRef => "osm_duplicate_register_ref",
            Self::OsmNodeNoteOptOut => "osm_node_note_opt_out",
            Self::OsmUnsupportedElement => "osm_unsupported_element",
            Self::RegistryMissingRequiredData => "registry_missing_required_data",
            Self::RegistryOutsideBoundary => "registry_outside_boundary",
            Self::RegistryDuplicateRegisterRef => "registry_duplicate_register_ref",
            Self::SkippedCreateNearby => "skipped_create_nearby",
            Self::SkippedDeleteNotAedOnly => "skipped_delete_not_aed_only",
            Self::ManagedNodeLocationWithinTolerance => "managed_node_location_within_tolerance",
            Self::AedSplitNonStandaloneNode => "aed_split_non_standalone_node",
            Self::TagValueTooLong => "tag_value_too_long",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueType,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osm_node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl Issue {
    pub fn warning(kind: IssueType, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, message)
    }

    pub fn error(kind: IssueType, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, message)
    }

    fn new(kind: IssueType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            register_ref: None,
            osm_node_id: None,
            details: Value::Null,
        }
    }

    pub fn with_register_ref(mut self, register_ref: impl Into<String>) -> Self {
        self.register_ref = Some(register_ref.into());
        self
    }

    pub fn with_node(mut self, id: NodeId) -> Self {
        self.osm_node_id = Some(id);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialized_type_matches_as_str() {
        let issue = Issue::warning(IssueType::ManagedNodeLocationWithinTolerance, "m");
        let v = serde_json::to_value(&issue).unwrap();
        assert_eq!(v["type"], IssueType::ManagedNodeLocationWithinTolerance.as_str());
        assert_eq!(v["severity"], "warning");
        assert!(v.get("details").is_none());
        assert!(v.get("register_ref").is_none());
    }

    #[test]
    fn builder_fills_optional_fields() {
        let issue = Issue::error(IssueType::RegistryMissingRequiredData, "missing")
            .with_register_ref("g-1")
            .with_node(42)
            .with_details(json!({"field": "SITE_LATITUDE"}));
        assert_eq!(issue.severity, Severity::Error);
        assert_eq!(issue.register_ref.as_deref(), Some("g-1"));
        assert_eq!(issue.osm_node_id, Some(42));
        assert_eq!(issue.details["field"], "SITE_LATITUDE");
    }
}
