//! Duplicate-reference resolution.
//!
//! Working-set mutation: deleted duplicates are pruned.

use std::collections::HashSet;

use super::{queue_guarded_delete, DeleteReason, PhaseContext, PlanState};
use crate::classify::ManagedOsmSnapshot;
use crate::error::ReconError;
use crate::geo::distance_m;
use crate::model::MapNode;
use crate::tags::has_primary_feature;

/// Keep one node per duplicated reference and queue the rest for deletion.
/// Returns the deduplicated managed node list.
pub fn resolve_duplicates(
    ctx: &PhaseContext<'_>,
    state: &mut PlanState,
    snapshot: &ManagedOsmSnapshot,
) -> Result<Vec<MapNode>, ReconError> {
    let mut deduplicated: Vec<MapNode> = snapshot
        .managed_nodes
        .iter()
        .filter(|n| n.register_ref().is_some_and(|r| !snapshot.is_duplicate_ref(r)))
        .cloned()
        .collect();
    let mut pruned = HashSet::new();

    for group in &snapshot.duplicate_ref_groups {
        // AED-only members rank ahead of mixed features.
        let mut ranked = group.nodes.clone();
        match ctx.registry.get(&group.register_ref) {
            Some(aed) => ranked.sort_by(|a, b| {
                let da = distance_m(a.coordinate(), aed.coordinate);
                let db = distance_m(b.coordinate(), aed.coordinate);
                has_primary_feature(&a.tags)
                    .cmp(&has_primary_feature(&b.tags))
                    .then(da.total_cmp(&db))
                    .then(a.id.cmp(&b.id))
            }),
            None => ranked.sort_by_key(|n| (has_primary_feature(&n.tags), n.id)),
        }

        let mut members = ranked.into_iter();
        let Some(keeper) = members.next() else {
            continue;
        };
        log::info!(
            "reference {}: keeping node {} of {}",
            group.register_ref,
            keeper.id,
            group.nodes.len()
        );
        for extra in members {
            if let Some(id) = queue_guarded_delete(
                ctx,
                state,
                &extra,
                &group.register_ref,
                DeleteReason::DuplicateRef,
            )? {
                pruned.insert(id);
            }
        }
        deduplicated.push(keeper);
    }

    state.working.prune_nodes(&pruned);
    Ok(deduplicated)
}
