//! Creation phase: every registry asset still unmatched becomes a new
//! node, unless some feature already sits within the nearby radius.
//!
//! Does not touch the working set.

use serde_json::json;

use super::{PhaseContext, PlanState};
use crate::issue::{Issue, IssueType};
use crate::plan::{PlannedCreate, PlannedNode};
use crate::synth::canonical_tags;

pub fn plan_creations(ctx: &PhaseContext<'_>, state: &mut PlanState) {
    let radius = ctx.thresholds.nearby_radius_m;
    for aed in ctx.registry.iter() {
        if state.matched.is_claimed(&aed.guid) {
            continue;
        }

        if let Some(hit) = state.working.nearest_within(aed.coordinate, radius) {
            log::warn!(
                "not creating {}: {} {} is {:.1} m away",
                aed.guid,
                hit.item.kind.as_str(),
                hit.item.id,
                hit.distance_m
            );
            let issue = Issue::warning(
                IssueType::SkippedCreateNearby,
                format!(
                    "{} {} lies {:.1} m from registry asset {}",
                    hit.item.kind.as_str(),
                    hit.item.id,
                    hit.distance_m,
                    aed.guid
                ),
            )
            .with_register_ref(aed.guid.as_str())
            .with_details(json!({
                "element_type": hit.item.kind.as_str(),
                "element_id": hit.item.id,
                "distance_m": hit.distance_m,
            }));
            state.issues.push(issue);
            state.summary.skipped_create_nearby += 1;
            continue;
        }

        let synthesis = canonical_tags(aed);
        state.issues.extend(synthesis.issues);
        let node = PlannedNode {
            id: state.plan.next_placeholder_id(),
            lat: aed.coordinate.lat,
            lon: aed.coordinate.lon,
            version: None,
            tags: synthesis.tags,
        };
        log::debug!("create node {} for {}", node.id, aed.guid);
        state.plan.create.push(PlannedCreate {
            register_ref: aed.guid.clone(),
            node,
        });
        state.summary.created += 1;
    }
}
