//! Update phase: managed nodes whose reference is still in the registry.
//!
//! Working-set mutation: a re-tagged or moved node replaces its old copy.

use serde_json::json;

use super::{merge_into_node, MergeOutcome, PhaseContext, PlanState};
use crate::error::ReconError;
use crate::geo::distance_m;
use crate::issue::{Issue, IssueType};
use crate::model::{MapNode, RegisterAed};
use crate::plan::{PlannedModify, PlannedNode};
use crate::tags::Tags;

pub fn plan_updates(
    ctx: &PhaseContext<'_>,
    state: &mut PlanState,
    managed: &[MapNode],
) -> Result<(), ReconError> {
    for node in managed {
        let Some(register_ref) = node.register_ref() else {
            continue;
        };
        let Some(aed) = ctx.registry.get(register_ref) else {
            continue;
        };
        state.matched.claim(register_ref);
        merge_into_node(ctx, state, node, aed)?;
    }
    Ok(())
}

/// Diff tags and position of `node` against the registry asset and queue a
/// modify when either changed.
pub(crate) fn update_in_place(
    ctx: &PhaseContext<'_>,
    state: &mut PlanState,
    node: &MapNode,
    aed: &RegisterAed,
    canonical: &Tags,
) -> MergeOutcome {
    let thresholds = ctx.thresholds;
    let tag_updates = node.tags.updates_toward(canonical);
    let distance = distance_m(node.coordinate(), aed.coordinate);
    let moves = distance > thresholds.move_threshold_m;

    if distance > thresholds.location_epsilon_m && !moves {
        state.issues.push(
            Issue::warning(
                IssueType::ManagedNodeLocationWithinTolerance,
                format!(
                    "node {} is {distance:.1} m from the registry position; keeping existing location",
                    node.id
                ),
            )
            .with_register_ref(aed.guid.as_str())
            .with_node(node.id)
            .with_details(json!({
                "distance_m": distance,
                "threshold_m": thresholds.move_threshold_m,
            })),
        );
    }

    if tag_updates.is_empty() && !moves {
        state.summary.unchanged += 1;
        return MergeOutcome::Unchanged;
    }

    let target = if moves { aed.coordinate } else { node.coordinate() };
    let after = PlannedNode {
        id: node.id,
        lat: target.lat,
        lon: target.lon,
        version: node.version,
        tags: node.tags.with_updates(&tag_updates),
    };
    log::debug!(
        "modify node {} ({} tag changes, moved: {moves})",
        node.id,
        tag_updates.len()
    );
    state.working.replace_node(node.id, after.to_element());
    state.plan.modify.push(PlannedModify {
        register_ref: aed.guid.clone(),
        before: PlannedNode::from(node),
        after,
        tag_updates,
    });
    state.summary.updated += 1;
    MergeOutcome::Updated
}
