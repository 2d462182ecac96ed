use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;

use crate::error::ReconError;
use crate::issue::{Issue, IssueType};
use crate::model::{MapElement, MapNode};

/// Two or more managed nodes carrying the same registry reference.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateRefGroup {
    pub register_ref: String,
    /// Sorted by node id.
    pub nodes: Vec<MapNode>,
}

/// The map snapshot partitioned for diffing. Built once, never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagedOsmSnapshot {
    /// Every node with a reference, duplicates included.
    pub managed_nodes: Vec<MapNode>,
    pub unmanaged_nodes: Vec<MapNode>,
    /// References found on opted-out nodes; creation treats them as satisfied.
    pub opted_out_refs: BTreeSet<String>,
    pub duplicate_ref_groups: Vec<DuplicateRefGroup>,
    /// Point features seen, opted-out nodes included.
    pub aed_node_count: usize,
}

impl ManagedOsmSnapshot {
    pub fn is_duplicate_ref(&self, register_ref: &str) -> bool {
        self.duplicate_ref_groups
            .iter()
            .any(|g| g.register_ref == register_ref)
    }
}

#[derive(Debug)]
pub struct Classification {
    pub snapshot: ManagedOsmSnapshot,
    pub issues: Vec<Issue>,
}

/// Partition raw map elements into managed / unmanaged / opted-out nodes
/// and duplicate-reference groups.
///
/// Fails when there is no point feature at all: an empty answer from the
/// map query must never turn into a wave of creations.
pub fn classify_elements(elements: &[MapElement]) -> Result<Classification, ReconError> {
    let mut snapshot = ManagedOsmSnapshot::default();
    let mut issues = Vec::new();
    let mut by_ref: BTreeMap<String, Vec<MapNode>> = BTreeMap::new();

    for element in elements {
        let Some(node) = element.as_node() else {
            issues.push(
                Issue::warning(
                    IssueType::OsmUnsupportedElement,
                    format!(
                        "{} {} is not a point feature; kept only for proximity checks",
                        element.kind.as_str(),
                        element.id
                    ),
                )
                .with_details(json!({ "type": element.kind.as_str(), "id": element.id })),
            );
            continue;
        };
        snapshot.aed_node_count += 1;

        if node.tags.is_opted_out() {
            let register_ref = node.register_ref().map(str::to_string);
            let mut issue = Issue::warning(
                IssueType::OsmNodeNoteOptOut,
                format!("node {} has a note and is excluded from automated edits", node.id),
            )
            .with_node(node.id)
            .with_details(json!({ "tags": node.tags }));
            if let Some(r) = register_ref {
                issue = issue.with_register_ref(r.as_str());
                snapshot.opted_out_refs.insert(r);
            }
            issues.push(issue);
            continue;
        }

        match node.register_ref() {
            Some(r) => {
                by_ref.entry(r.to_string()).or_default().push(node.clone());
                snapshot.managed_nodes.push(node);
            }
            None => snapshot.unmanaged_nodes.push(node),
        }
    }

    if snapshot.aed_node_count == 0 {
        return Err(ReconError::EmptyMapSnapshot);
    }

    for (register_ref, mut nodes) in by_ref {
        if nodes.len() < 2 {
            continue;
        }
        nodes.sort_by_key(|n| n.id);
        let ids: Vec<i64> = nodes.iter().map(|n| n.id).collect();
        issues.push(
            Issue::error(
                IssueType::OsmDuplicateRegisterRef,
                format!("{} nodes share reference {register_ref}", nodes.len()),
            )
            .with_register_ref(register_ref.as_str())
            .with_details(json!({ "node_ids": ids })),
        );
        snapshot
            .duplicate_ref_groups
            .push(DuplicateRefGroup { register_ref, nodes });
    }

    log::info!(
        "classified {} AED nodes: {} managed, {} unmanaged, {} opted out, {} duplicate refs",
        snapshot.aed_node_count,
        snapshot.managed_nodes.len(),
        snapshot.unmanaged_nodes.len(),
        snapshot.opted_out_refs.len(),
        snapshot.duplicate_ref_groups.len(),
    );

    Ok(Classification { snapshot, issues })
}
