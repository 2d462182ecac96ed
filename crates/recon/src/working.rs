//! The mutable feature list later phases check proximity against.
//!
//! Mutations:
//! - duplicate resolution and removal prune deleted nodes;
//! - update and link replace a node with its re-tagged / moved version;
//! - a split replaces the mixed node with the new AED node.

use std::collections::{HashMap, HashSet};

use crate::geo::{nearest_within, Coordinate, Nearest};
use crate::model::{ElementKind, MapElement, NodeId};

#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    elements: Vec<MapElement>,
    node_index: HashMap<NodeId, usize>,
}

impl WorkingSet {
    pub fn new(elements: Vec<MapElement>) -> Self {
        let mut set = Self {
            elements,
            node_index: HashMap::new(),
        };
        set.reindex();
        set
    }

    fn reindex(&mut self) {
        self.node_index = self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == ElementKind::Node)
            .map(|(i, e)| (e.id, i))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapElement> {
        self.elements.iter()
    }

    pub fn node(&self, id: NodeId) -> Option<&MapElement> {
        self.node_index.get(&id).map(|&i| &self.elements[i])
    }

    pub fn prune_nodes(&mut self, ids: &HashSet<NodeId>) {
        if ids.is_empty() {
            return;
        }
        let before = self.elements.len();
        self.elements
            .retain(|e| !(e.kind == ElementKind::Node && ids.contains(&e.id)));
        if self.elements.len() != before {
            self.reindex();
        }
    }

    /// Replace node `id` in place. An unknown id appends the replacement.
    pub fn replace_node(&mut self, id: NodeId, replacement: MapElement) {
        match self.node_index.get(&id).copied() {
            Some(i) => {
                self.node_index.remove(&id);
                self.node_index.insert(replacement.id, i);
                self.elements[i] = replacement;
            }
            None => {
                self.node_index
                    .insert(replacement.id, self.elements.len());
                self.elements.push(replacement);
            }
        }
    }

    pub fn nearest_within(&self, origin: Coordinate, max_m: f64) -> Option<Nearest<'_, MapElement>> {
        nearest_within(origin, &self.elements, max_m)
    }
}
