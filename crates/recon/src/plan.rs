use serde::Serialize;

use crate::model::{MapElement, MapNode, NodeId};
use crate::tags::{TagUpdates, Tags};

/// A node as it will be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedNode {
    pub id: NodeId,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub tags: Tags,
}

impl PlannedNode {
    pub fn to_element(&self) -> MapElement {
        MapNode::from(self.clone()).to_element()
    }
}

impl From<&MapNode> for PlannedNode {
    fn from(node: &MapNode) -> Self {
        Self {
            id: node.id,
            lat: node.lat,
            lon: node.lon,
            version: node.version,
            tags: node.tags.clone(),
        }
    }
}

impl From<PlannedNode> for MapNode {
    fn from(node: PlannedNode) -> Self {
        Self {
            id: node.id,
            lat: node.lat,
            lon: node.lon,
            version: node.version,
            tags: node.tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedCreate {
    pub register_ref: String,
    pub node: PlannedNode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedModify {
    pub register_ref: String,
    pub before: PlannedNode,
    pub after: PlannedNode,
    pub tag_updates: TagUpdates,
}

impl PlannedModify {
    pub fn moves(&self) -> bool {
        self.before.lat != self.after.lat || self.before.lon != self.after.lon
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedDelete {
    pub register_ref: String,
    pub node: PlannedNode,
}

/// Everything the run intends to write, in phase order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangePlan {
    pub create: Vec<PlannedCreate>,
    pub modify: Vec<PlannedModify>,
    pub delete: Vec<PlannedDelete>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationCounts {
    pub create: usize,
    pub modify: usize,
    pub delete: usize,
}

impl OperationCounts {
    pub fn total(&self) -> usize {
        self.create + self.modify + self.delete
    }
}

impl ChangePlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.modify.is_empty() && self.delete.is_empty()
    }

    pub fn counts(&self) -> OperationCounts {
        OperationCounts {
            create: self.create.len(),
            modify: self.modify.len(),
            delete: self.delete.len(),
        }
    }

    /// Next placeholder id: -1, -2, ... in creation order.
    pub fn next_placeholder_id(&self) -> NodeId {
        -(self.create.len() as NodeId) - 1
    }

    pub fn deletes_node(&self, id: NodeId) -> bool {
        self.delete.iter().any(|d| d.node.id == id)
    }
}
