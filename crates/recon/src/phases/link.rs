//! Link phase: attach unmanaged AED nodes to nearby unmatched registry
//! assets.
//!
//! Greedy nearest-first assignment over all (node, asset) pairs within the
//! merge radius. Deterministic, not globally optimal.
//!
//! Working-set mutation: as for update and split.

use std::collections::HashSet;

use super::{merge_into_node, PhaseContext, PlanState};
use crate::error::ReconError;
use crate::geo::distance_m;
use crate::issue::{Issue, IssueType};
use crate::model::{MapNode, NodeId};

struct Candidate<'a> {
    node: &'a MapNode,
    guid: &'a str,
    distance_m: f64,
}

pub fn plan_links(
    ctx: &PhaseContext<'_>,
    state: &mut PlanState,
    unmanaged: &[MapNode],
) -> Result<(), ReconError> {
    let radius = ctx.thresholds.merge_radius_m;
    let mut candidates: Vec<Candidate<'_>> = Vec::new();
    for node in unmanaged {
        for aed in ctx.registry.iter() {
            if state.matched.is_claimed(&aed.guid) {
                continue;
            }
            let d = distance_m(node.coordinate(), aed.coordinate);
            if d <= radius {
                candidates.push(Candidate {
                    node,
                    guid: aed.guid.as_str(),
                    distance_m: d,
                });
            }
        }
    }
    candidates.sort_by(|a, b| {
        a.distance_m
            .total_cmp(&b.distance_m)
            .then(a.node.id.cmp(&b.node.id))
            .then(a.guid.cmp(b.guid))
    });

    let mut linked: HashSet<NodeId> = HashSet::new();
    for candidate in candidates {
        if linked.contains(&candidate.node.id) || state.matched.is_claimed(candidate.guid) {
            continue;
        }
        let Some(aed) = ctx.registry.get(candidate.guid) else {
            continue;
        };
        log::debug!(
            "link node {} to {} ({:.1} m)",
            candidate.node.id,
            aed.guid,
            candidate.distance_m
        );
        state.matched.claim(&aed.guid);
        linked.insert(candidate.node.id);
        state.summary.linked += 1;
        merge_into_node(ctx, state, candidate.node, aed)?;
    }

    for node in unmanaged.iter().filter(|n| !linked.contains(&n.id)) {
        state.issues.push(
            Issue::warning(
                IssueType::OsmNodeMissingRef,
                format!("AED node {} has no registry reference and no registry match nearby", node.id),
            )
            .with_node(node.id),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::config::Thresholds;
    use crate::tags::REGISTER_REF_TAG;

    fn run(unmanaged: &[MapNode], aeds: &[(&str, f64, f64)], pre_claimed: &[&str]) -> PlanState {
        let fake = FakeNodes::with(unmanaged);
        let registry = registry(aeds);
        let thresholds = Thresholds::default();
        let ctx = PhaseContext {
            thresholds: &thresholds,
            registry: &registry,
            nodes: &fake,
        };
        let mut state = state_with(unmanaged);
        for r in pre_claimed {
            state.matched.claim(r);
        }
        plan_links(&ctx, &mut state, unmanaged).unwrap();
        state
    }

    fn bare(id: i64, lat: f64) -> MapNode {
        node(id, lat, 10.0, &[("emergency", "defibrillator")])
    }

    #[test]
    fn links_nearby_asset_and_writes_ref() {
        let state = run(&[bare(1, 59.0)], &[("a", 59.00005, 10.0)], &[]);
        assert_eq!(state.summary.linked, 1);
        assert!(state.matched.is_claimed("a"));
        let modify = &state.plan.modify[0];
        assert_eq!(modify.after.tags.get(REGISTER_REF_TAG), Some("a"));
        assert!(!modify.moves());
    }

    #[test]
    fn greedy_assigns_closest_pair_first() {
        // Node 1 sits between both assets but is closest to b; node 2 is
        // near a only. Greedy gives 1<->b, then 2<->a.
        let nodes = [bare(1, 59.0), bare(2, 59.0001)];
        let state = run(&nodes, &[("a", 59.00008, 10.0), ("b", 58.99999, 10.0)], &[]);
        assert_eq!(state.summary.linked, 2);
        let pairs: Vec<(i64, &str)> = state
            .plan
            .modify
            .iter()
            .map(|m| (m.before.id, m.register_ref.as_str()))
            .collect();
        assert_eq!(pairs, vec![(1, "b"), (2, "a")]);
    }

    #[test]
    fn one_asset_links_only_one_node() {
        let nodes = [bare(1, 59.0), bare(2, 59.00001)];
        let state = run(&nodes, &[("a", 59.0, 10.0)], &[]);
        assert_eq!(state.summary.linked, 1);
        assert_eq!(state.plan.modify[0].before.id, 1);
        let missing: Vec<_> = state
            .issues
            .iter()
            .filter(|i| i.kind == IssueType::OsmNodeMissingRef)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].osm_node_id, Some(2));
    }

    #[test]
    fn claimed_and_distant_assets_are_ignored() {
        let state = run(
            &[bare(1, 59.0)],
            &[("claimed", 59.0, 10.0), ("far", 59.01, 10.0)],
            &["claimed"],
        );
        assert_eq!(state.summary.linked, 0);
        assert!(state.plan.is_empty());
        assert_eq!(state.issues[0].kind, IssueType::OsmNodeMissingRef);
    }

    #[test]
    fn mixed_unmanaged_node_is_split() {
        let n = node(1, 59.0, 10.0, &[("emergency", "defibrillator"), ("shop", "supermarket")]);
        let state = run(&[n], &[("a", 59.0, 10.0)], &[]);
        assert_eq!(state.summary.linked, 1);
        assert_eq!(state.plan.create.len(), 1);
        assert_eq!(state.plan.modify.len(), 1);
        assert_eq!(state.plan.modify[0].after.tags.get("shop"), Some("supermarket"));
    }
}
