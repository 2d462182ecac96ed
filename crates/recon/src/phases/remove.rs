//! Removal phase: managed nodes whose reference left the registry.
//!
//! Working-set mutation: deleted nodes are pruned.

use std::collections::HashSet;

use super::{queue_guarded_delete, DeleteReason, PhaseContext, PlanState};
use crate::error::ReconError;
use crate::model::MapNode;

pub fn plan_removals(
    ctx: &PhaseContext<'_>,
    state: &mut PlanState,
    managed: &[MapNode],
) -> Result<(), ReconError> {
    let mut pruned = HashSet::new();
    for node in managed {
        let Some(register_ref) = node.register_ref() else {
            continue;
        };
        if ctx.registry.contains(register_ref) {
            continue;
        }
        if let Some(id) = queue_guarded_delete(
            ctx,
            state,
            node,
            register_ref,
            DeleteReason::MissingFromRegistry,
        )? {
            pruned.insert(id);
        }
    }
    state.working.prune_nodes(&pruned);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::config::Thresholds;

    #[test]
    fn deletes_only_refs_missing_from_registry() {
        let nodes = vec![managed(1, 59.0, 10.0, "a"), managed(2, 59.1, 10.0, "gone")];
        let fake = FakeNodes::with(&nodes);
        let registry = registry(&[("a", 59.0, 10.0)]);
        let thresholds = Thresholds::default();
        let ctx = PhaseContext {
            thresholds: &thresholds,
            registry: &registry,
            nodes: &fake,
        };
        let mut state = state_with(&nodes);

        plan_removals(&ctx, &mut state, &nodes).unwrap();

        assert_eq!(state.plan.delete.len(), 1);
        assert_eq!(state.plan.delete[0].node.id, 2);
        assert_eq!(state.plan.delete[0].register_ref, "gone");
        assert!(state.working.node(2).is_none());
        assert!(state.working.node(1).is_some());
        assert_eq!(*fake.lookups.borrow(), vec![2]);
    }
}
