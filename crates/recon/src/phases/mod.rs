//! The ordered diff phases. Each phase reads [`PhaseContext`] and mutates
//! [`PlanState`]; the orchestrator runs them strictly in order:
//! duplicates -> remove -> update -> link -> create.

pub mod create;
pub mod duplicates;
pub mod link;
pub mod remove;
pub mod split;
pub mod update;

use std::collections::HashSet;

use serde_json::json;

use crate::collab::NodeSource;
use crate::config::Thresholds;
use crate::error::ReconError;
use crate::issue::{Issue, IssueType};
use crate::model::{MapNode, NodeId, RegisterAed, ReconSummary};
use crate::plan::{ChangePlan, PlannedDelete, PlannedNode};
use crate::registry::RegistryIndex;
use crate::tags::is_aed_only;
use crate::working::WorkingSet;

/// Read-only inputs shared by every phase.
pub struct PhaseContext<'a> {
    pub thresholds: &'a Thresholds,
    pub registry: &'a RegistryIndex,
    pub nodes: &'a dyn NodeSource,
}

impl PhaseContext<'_> {
    /// Fresh copy of the node, falling back to the snapshot copy when the
    /// node has vanished upstream.
    pub(crate) fn refresh(&self, node: &MapNode) -> Result<MapNode, ReconError> {
        Ok(self.nodes.get_node(node.id)?.unwrap_or_else(|| node.clone()))
    }
}

/// Registry references already satisfied. Grows monotonically; creation
/// consults it before every create.
#[derive(Debug, Default)]
pub struct MatchedRefs {
    matched: HashSet<String>,
    opted_out: HashSet<String>,
}

impl MatchedRefs {
    pub fn with_opted_out<I: IntoIterator<Item = String>>(refs: I) -> Self {
        Self {
            matched: HashSet::new(),
            opted_out: refs.into_iter().collect(),
        }
    }

    /// Claim `register_ref` for a map node. False when already claimed.
    pub fn claim(&mut self, register_ref: &str) -> bool {
        if self.is_claimed(register_ref) {
            return false;
        }
        self.matched.insert(register_ref.to_string())
    }

    pub fn is_claimed(&self, register_ref: &str) -> bool {
        self.matched.contains(register_ref) || self.opted_out.contains(register_ref)
    }

    /// References matched to a node this run (opted-out refs excluded).
    pub fn linked_count(&self) -> usize {
        self.matched.len()
    }
}

/// Everything the phases mutate.
#[derive(Debug, Default)]
pub struct PlanState {
    pub working: WorkingSet,
    pub plan: ChangePlan,
    pub summary: ReconSummary,
    pub issues: Vec<Issue>,
    pub matched: MatchedRefs,
}

impl PlanState {
    pub fn new(working: WorkingSet, matched: MatchedRefs) -> Self {
        Self {
            working,
            matched,
            ..Default::default()
        }
    }
}

/// Why a managed node is being deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReason {
    DuplicateRef,
    MissingFromRegistry,
}

impl DeleteReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateRef => "duplicate_ref_resolution",
            Self::MissingFromRegistry => "missing_from_registry",
        }
    }
}

/// Re-fetch the node and queue its deletion only if it is still AED-only.
/// Returns the id when a delete was queued.
pub(crate) fn queue_guarded_delete(
    ctx: &PhaseContext<'_>,
    state: &mut PlanState,
    node: &MapNode,
    register_ref: &str,
    reason: DeleteReason,
) -> Result<Option<NodeId>, ReconError> {
    let Some(live) = ctx.nodes.get_node(node.id)? else {
        log::info!("node {} already gone upstream; nothing to delete", node.id);
        return Ok(None);
    };

    if !is_aed_only(&live.tags) {
        log::warn!(
            "not deleting node {} ({}): no longer AED-only",
            live.id,
            reason.as_str()
        );
        state.summary.skipped_delete_not_aed_only += 1;
        state.issues.push(
            Issue::warning(
                IssueType::SkippedDeleteNotAedOnly,
                format!("node {} carries non-AED tags and was not deleted", live.id),
            )
            .with_register_ref(register_ref)
            .with_node(live.id)
            .with_details(json!({ "reason": reason.as_str(), "tags": live.tags })),
        );
        return Ok(None);
    }

    log::debug!("delete node {} ({})", live.id, reason.as_str());
    state.plan.delete.push(PlannedDelete {
        register_ref: register_ref.to_string(),
        node: PlannedNode::from(&live),
    });
    state.summary.deleted += 1;
    Ok(Some(live.id))
}

/// Outcome of merging a registry asset into an existing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Unchanged,
    Updated,
    Split,
}

/// Shared by update and link: split a mixed feature, otherwise diff tags
/// and position in place.
pub(crate) fn merge_into_node(
    ctx: &PhaseContext<'_>,
    state: &mut PlanState,
    node: &MapNode,
    aed: &RegisterAed,
) -> Result<MergeOutcome, ReconError> {
    let synthesis = crate::synth::canonical_tags(aed);
    state.issues.extend(synthesis.issues);

    if crate::tags::has_primary_feature(&node.tags) {
        let live = ctx.refresh(node)?;
        if crate::tags::has_primary_feature(&live.tags) {
            split::split_mixed_feature(state, &live, aed, synthesis.tags);
            return Ok(MergeOutcome::Split);
        }
        return Ok(update::update_in_place(ctx, state, &live, aed, &synthesis.tags));
    }

    Ok(update::update_in_place(ctx, state, node, aed, &synthesis.tags))
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::config::Thresholds;

    #[test]
    fn matched_refs_respect_opt_outs() {
        let mut m = MatchedRefs::with_opted_out(["x".to_string()]);
        assert!(m.is_claimed("x"));
        assert!(!m.claim("x"));
        assert!(m.claim("a"));
        assert!(!m.claim("a"));
        assert_eq!(m.linked_count(), 1);
    }

    #[test]
    fn guarded_delete_uses_live_tags() {
        let snapshot = managed(1, 59.0, 10.0, "a");
        let mut live = snapshot.clone();
        live.tags.insert("shop", "kiosk");
        live.version = Some(7);
        let nodes = FakeNodes::with(&[live]);
        let registry = registry(&[]);
        let thresholds = Thresholds::default();
        let ctx = PhaseContext {
            thresholds: &thresholds,
            registry: &registry,
            nodes: &nodes,
        };
        let mut state = state_with(&[snapshot.clone()]);

        let queued = queue_guarded_delete(&ctx, &mut state, &snapshot, "a", DeleteReason::MissingFromRegistry).unwrap();
        assert_eq!(queued, None);
        assert!(state.plan.delete.is_empty());
        assert_eq!(state.summary.skipped_delete_not_aed_only, 1);
        assert_eq!(state.issues[0].kind, IssueType::SkippedDeleteNotAedOnly);
        assert_eq!(state.issues[0].details["reason"], "missing_from_registry");
    }

    #[test]
    fn guarded_delete_takes_live_version() {
        let snapshot = managed(1, 59.0, 10.0, "a");
        let mut live = snapshot.clone();
        live.version = Some(9);
        let nodes = FakeNodes::with(&[live]);
        let registry = registry(&[]);
        let thresholds = Thresholds::default();
        let ctx = PhaseContext {
            thresholds: &thresholds,
            registry: &registry,
            nodes: &nodes,
        };
        let mut state = state_with(&[snapshot.clone()]);

        let queued = queue_guarded_delete(&ctx, &mut state, &snapshot, "a", DeleteReason::DuplicateRef).unwrap();
        assert_eq!(queued, Some(1));
        assert_eq!(state.plan.delete[0].node.version, Some(9));
        assert_eq!(state.summary.deleted, 1);
    }

    #[test]
    fn vanished_node_is_not_deleted() {
        let snapshot = managed(1, 59.0, 10.0, "a");
        let nodes = FakeNodes::default();
        let registry = registry(&[]);
        let thresholds = Thresholds::default();
        let ctx = PhaseContext {
            thresholds: &thresholds,
            registry: &registry,
            nodes: &nodes,
        };
        let mut state = state_with(&[snapshot.clone()]);
        let queued = queue_guarded_delete(&ctx, &mut state, &snapshot, "a", DeleteReason::DuplicateRef).unwrap();
        assert_eq!(queued, None);
        assert!(state.issues.is_empty());
        assert_eq!(state.summary, ReconSummary::default());
    }
}
