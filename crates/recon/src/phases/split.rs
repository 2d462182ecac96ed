//! Mixed-feature splitter.
//!
//! A node that is both an AED and a shop/office/etc. loses its AED tags and
//! a dedicated AED node is created at the same coordinate. The strip and
//! the create are always queued together.
//!
//! Working-set mutation: the new AED node replaces the mixed node.

use serde_json::json;

use super::PlanState;
use crate::issue::{Issue, IssueType};
use crate::model::{MapNode, RegisterAed};
use crate::plan::{PlannedCreate, PlannedModify, PlannedNode};
use crate::tags::{primary_feature_keys, strip_aed_updates, Tags};

pub(crate) fn split_mixed_feature(state: &mut PlanState, live: &MapNode, aed: &RegisterAed, canonical: Tags) {
    let strip = strip_aed_updates(&live.tags);
    let stripped = PlannedModify {
        register_ref: aed.guid.clone(),
        before: PlannedNode::from(live),
        after: PlannedNode {
            tags: live.tags.with_updates(&strip),
            ..PlannedNode::from(live)
        },
        tag_updates: strip,
    };

    let aed_node = PlannedNode {
        id: state.plan.next_placeholder_id(),
        lat: live.lat,
        lon: live.lon,
        version: None,
        tags: canonical,
    };

    let conflict_keys = primary_feature_keys(&live.tags);
    log::info!(
        "splitting AED {} off node {} (conflicting keys: {})",
        aed.guid,
        live.id,
        conflict_keys.join(", ")
    );
    state.issues.push(
        Issue::warning(
            IssueType::AedSplitNonStandaloneNode,
            format!("node {} mixes AED and other features; AED moved to a new node", live.id),
        )
        .with_register_ref(aed.guid.as_str())
        .with_node(live.id)
        .with_details(json!({
            "conflict_tag_keys": conflict_keys,
            "new_node_id": aed_node.id,
        })),
    );

    state.working.replace_node(live.id, aed_node.to_element());
    state.plan.modify.push(stripped);
    state.plan.create.push(PlannedCreate {
        register_ref: aed.guid.clone(),
        node: aed_node,
    });
    state.summary.updated += 1;
    state.summary.created += 1;
}
