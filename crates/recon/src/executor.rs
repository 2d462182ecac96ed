use crate::collab::{AppliedCounts, ChangesetWriter, NodeSource};
use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::model::RunMode;
use crate::plan::{ChangePlan, PlannedNode};
use crate::render::{write_review_files, ReviewFiles};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub review_files: ReviewFiles,
    /// Present only when a live submission happened.
    pub applied: Option<AppliedCounts>,
}

/// Point every modify and delete at the node's current upstream version.
/// Modifies keep their planned position and re-apply their tag updates on
/// top of the live tags.
pub fn rebase_on_live(plan: &ChangePlan, nodes: &dyn NodeSource) -> Result<ChangePlan, ReconError> {
    let mut rebased = plan.clone();
    for m in &mut rebased.modify {
        let live = nodes
            .get_node(m.after.id)?
            .ok_or(ReconError::NodeNotFound(m.after.id))?;
        m.after = PlannedNode {
            id: live.id,
            lat: m.after.lat,
            lon: m.after.lon,
            version: live.version,
            tags: live.tags.with_updates(&m.tag_updates),
        };
    }
    for d in &mut rebased.delete {
        let live = nodes
            .get_node(d.node.id)?
            .ok_or(ReconError::NodeNotFound(d.node.id))?;
        d.node = PlannedNode::from(&live);
    }
    Ok(rebased)
}

/// Write the review files, then in live mode submit the plan as one
/// changeset.
pub fn execute_plan(
    config: &ReconConfig,
    plan: &ChangePlan,
    nodes: &dyn NodeSource,
    writer: Option<&dyn ChangesetWriter>,
) -> Result<ExecutionReport, ReconError> {
    let review_files = write_review_files(plan, &config.output)?;

    if config.mode == RunMode::DryRun {
        return Ok(ExecutionReport {
            review_files,
            applied: None,
        });
    }
    if plan.is_empty() {
        log::info!("live mode: nothing to submit");
        return Ok(ExecutionReport {
            review_files,
            applied: Some(AppliedCounts::default()),
        });
    }

    let writer = writer.ok_or_else(|| {
        ReconError::ConfigValidation("live mode requires a changeset writer".into())
    })?;
    let rebased = rebase_on_live(plan, nodes)?;
    let applied = writer.apply_changes(&rebased, &config.changeset.comment_subject)?;
    log::info!(
        "changeset {:?}: {} created, {} modified, {} deleted",
        applied.changeset_id,
        applied.created,
        applied.modified,
        applied.deleted
    );
    Ok(ExecutionReport {
        review_files,
        applied: Some(applied),
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::collab::SnapshotNodes;
    use crate::model::MapNode;
    use crate::plan::{PlannedDelete, PlannedModify};
    use crate::tags::{TagUpdates, Tags};

    struct RecordingWriter {
        seen: RefCell<Vec<ChangePlan>>,
    }

    impl ChangesetWriter for RecordingWriter {
        fn apply_changes(&self, plan: &ChangePlan, _subject: &str) -> Result<AppliedCounts, ReconError> {
            self.seen.borrow_mut().push(plan.clone());
            Ok(AppliedCounts {
                changeset_id: Some(1),
                created: plan.create.len(),
                modified: plan.modify.len(),
                deleted: plan.delete.len(),
            })
        }
    }

    fn config(dir: &std::path::Path, mode: RunMode) -> ReconConfig {
        let mut config = ReconConfig::from_toml("[boundary]\nfile = \"b.geojson\"").unwrap();
        config.mode = mode;
        config.output.osc_path = dir.join("out.osc");
        config.output.geojson_path = dir.join("out.geojson");
        config
    }

    fn live_node(id: i64, version: u64, tags: &[(&str, &str)]) -> MapNode {
        MapNode {
            id,
            lat: 59.0,
            lon: 10.0,
            version: Some(version),
            tags: tags.iter().copied().collect::<Tags>(),
        }
    }

    fn plan() -> ChangePlan {
        let stale = PlannedNode::from(&live_node(1, 2, &[("emergency", "defibrillator")]));
        let mut updates = TagUpdates::default();
        updates.set("name", "Hall");
        let mut after = stale.clone();
        after.lat = 59.001;
        after.tags.insert("name", "Hall");
        ChangePlan {
            create: Vec::new(),
            modify: vec![PlannedModify {
                register_ref: "a".into(),
                before: stale,
                after,
                tag_updates: updates,
            }],
            delete: vec![PlannedDelete {
                register_ref: "b".into(),
                node: PlannedNode::from(&live_node(2, 1, &[("emergency", "defibrillator")])),
            }],
        }
    }

    #[test]
    fn rebase_applies_updates_to_live_tags() {
        let live = vec![
            live_node(1, 5, &[("emergency", "defibrillator"), ("indoor", "yes")]).to_element(),
            live_node(2, 3, &[("emergency", "defibrillator")]).to_element(),
        ];
        let rebased = rebase_on_live(&plan(), &SnapshotNodes::from_elements(&live)).unwrap();
        let m = &rebased.modify[0];
        assert_eq!(m.after.version, Some(5));
        assert_eq!(m.after.lat, 59.001);
        assert_eq!(m.after.tags.get("indoor"), Some("yes"));
        assert_eq!(m.after.tags.get("name"), Some("Hall"));
        assert_eq!(rebased.delete[0].node.version, Some(3));
    }

    #[test]
    fn rebase_fails_when_node_vanished() {
        let err = rebase_on_live(&plan(), &SnapshotNodes::default()).unwrap_err();
        assert!(matches!(err, ReconError::NodeNotFound(1)));
    }

    #[test]
    fn dry_run_never_submits() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter {
            seen: RefCell::new(Vec::new()),
        };
        let report = execute_plan(
            &config(dir.path(), RunMode::DryRun),
            &plan(),
            &SnapshotNodes::default(),
            Some(&writer as &dyn ChangesetWriter),
        )
        .unwrap();
        assert!(report.applied.is_none());
        assert!(writer.seen.borrow().is_empty());
        assert!(report.review_files.osc.exists());
    }

    #[test]
    fn live_submits_rebased_plan() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter {
            seen: RefCell::new(Vec::new()),
        };
        let live = vec![
            live_node(1, 5, &[("emergency", "defibrillator")]).to_element(),
            live_node(2, 3, &[("emergency", "defibrillator")]).to_element(),
        ];
        let report = execute_plan(
            &config(dir.path(), RunMode::Live),
            &plan(),
            &SnapshotNodes::from_elements(&live),
            Some(&writer as &dyn ChangesetWriter),
        )
        .unwrap();
        let applied = report.applied.unwrap();
        assert_eq!((applied.modified, applied.deleted), (1, 1));
        assert_eq!(writer.seen.borrow()[0].modify[0].after.version, Some(5));
    }

    #[test]
    fn live_without_writer_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = execute_plan(
            &config(dir.path(), RunMode::Live),
            &plan(),
            &SnapshotNodes::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ReconError::ConfigValidation(_)));
    }
}
