use serde::Serialize;

use crate::classify::classify_elements;
use crate::collab::{AppliedCounts, ChangesetWriter, MapQuery, NodeSource, RegistrySource, RunStore};
use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::executor::execute_plan;
use crate::geo::Boundary;
use crate::guard::check_mass_deletion;
use crate::issue::Issue;
use crate::model::{MapElement, ReconSummary, RegistryAsset, RunMetrics, RunMode, RunStatus};
use crate::phases::{self, MatchedRefs, PhaseContext, PlanState};
use crate::plan::{ChangePlan, OperationCounts};
use crate::registry::load_registry;
use crate::working::WorkingSet;

/// Issues and metrics gathered so far. Survives a failed run so partial
/// diagnostics can still be persisted.
#[derive(Debug, Default)]
pub struct RunLedger {
    pub issues: Vec<Issue>,
    pub metrics: RunMetrics,
}

#[derive(Debug)]
pub struct PlannedRun {
    pub plan: ChangePlan,
    pub summary: ReconSummary,
    /// Managed nodes seen in the snapshot, duplicates included.
    pub managed_count: usize,
}

/// Classify, load, and run every phase. Nothing is written.
pub fn plan_changes(
    config: &ReconConfig,
    boundary: &Boundary,
    elements: Vec<MapElement>,
    assets: &[RegistryAsset],
    nodes: &dyn NodeSource,
    ledger: &mut RunLedger,
) -> Result<PlannedRun, ReconError> {
    let classification = classify_elements(&elements)?;
    ledger.issues.extend(classification.issues);
    let snapshot = classification.snapshot;
    ledger.metrics.osm_aeds = snapshot.aed_node_count;

    let registry = load_registry(assets, boundary);
    ledger.issues.extend(registry.issues);
    let registry = registry.index;
    ledger.metrics.registry_aeds = registry.len();

    let ctx = PhaseContext {
        thresholds: &config.thresholds,
        registry: &registry,
        nodes,
    };
    let mut state = PlanState::new(
        WorkingSet::new(elements),
        MatchedRefs::with_opted_out(snapshot.opted_out_refs.iter().cloned()),
    );

    let result = run_phases(&ctx, &mut state, &snapshot);
    ledger.issues.append(&mut state.issues);
    ledger.metrics.linked_aeds = state.matched.linked_count();
    ledger.metrics.absorb(&state.summary);
    result?;

    Ok(PlannedRun {
        plan: state.plan,
        summary: state.summary,
        managed_count: snapshot.managed_nodes.len(),
    })
}

fn run_phases(
    ctx: &PhaseContext<'_>,
    state: &mut PlanState,
    snapshot: &crate::classify::ManagedOsmSnapshot,
) -> Result<(), ReconError> {
    let managed = phases::duplicates::resolve_duplicates(ctx, state, snapshot)?;
    log::info!("duplicates: {} deletes queued", state.plan.delete.len());

    phases::remove::plan_removals(ctx, state, &managed)?;
    log::info!("removal: {} deletes queued", state.plan.delete.len());

    phases::update::plan_updates(ctx, state, &managed)?;
    log::info!(
        "update: {} updated, {} unchanged",
        state.summary.updated,
        state.summary.unchanged
    );

    phases::link::plan_links(ctx, state, &snapshot.unmanaged_nodes)?;
    log::info!("link: {} linked", state.summary.linked);

    phases::create::plan_creations(ctx, state);
    log::info!(
        "create: {} created, {} skipped nearby",
        state.summary.created,
        state.summary.skipped_create_nearby
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

/// The collaborators a run talks to.
pub struct Sources<'a> {
    pub map: &'a dyn MapQuery,
    pub registry: &'a dyn RegistrySource,
    pub nodes: &'a dyn NodeSource,
    pub writer: Option<&'a dyn ChangesetWriter>,
    pub store: &'a dyn RunStore,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub mode: RunMode,
    pub started_at: String,
    pub finished_at: String,
    pub summary: ReconSummary,
    pub metrics: RunMetrics,
    pub planned: OperationCounts,
    pub applied: Option<AppliedCounts>,
    pub osc_path: String,
    pub geojson_path: String,
    pub issue_count: usize,
}

/// Run one reconciliation end to end and record it in the run store.
///
/// On failure the accumulated issues are flushed best-effort and the run is
/// marked failed before the error is returned.
pub fn run(config: &ReconConfig, boundary: &Boundary, sources: &Sources<'_>) -> Result<RunReport, ReconError> {
    let started_at = chrono::Utc::now().to_rfc3339();
    let run_id = sources.store.start_run(config.mode)?;
    log::info!("run {run_id} started ({})", config.mode.as_str());

    let mut ledger = RunLedger::default();
    match execute_run(config, boundary, sources, &run_id, &mut ledger) {
        Ok((summary, planned, execution)) => Ok(RunReport {
            run_id,
            mode: config.mode,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            summary,
            metrics: ledger.metrics,
            planned,
            applied: execution.applied,
            osc_path: execution.review_files.osc.display().to_string(),
            geojson_path: execution.review_files.geojson.display().to_string(),
            issue_count: ledger.issues.len(),
        }),
        Err(err) => {
            log::error!("run {run_id} failed: {err}");
            if let Err(e) = sources.store.replace_issues(&run_id, &ledger.issues) {
                log::error!("could not persist issues for failed run {run_id}: {e}");
            }
            let message = err.to_string();
            if let Err(e) =
                sources
                    .store
                    .complete_run(&run_id, RunStatus::Failed, Some(message.as_str()), &ledger.metrics)
            {
                log::error!("could not mark run {run_id} failed: {e}");
            }
            Err(err)
        }
    }
}

fn execute_run(
    config: &ReconConfig,
    boundary: &Boundary,
    sources: &Sources<'_>,
    run_id: &str,
    ledger: &mut RunLedger,
) -> Result<(ReconSummary, OperationCounts, crate::executor::ExecutionReport), ReconError> {
    let elements = sources.map.search_aeds()?;
    log::info!("map query returned {} elements", elements.len());
    let assets = sources.registry.search_assets()?;
    log::info!("registry returned {} assets", assets.len());

    let planned = plan_changes(config, boundary, elements, &assets, sources.nodes, ledger)?;
    check_mass_deletion(
        &planned.plan,
        planned.managed_count,
        config.thresholds.max_delete_fraction,
    )?;

    let execution = execute_plan(config, &planned.plan, sources.nodes, sources.writer)?;

    sources.store.replace_issues(run_id, &ledger.issues)?;
    sources
        .store
        .complete_run(run_id, RunStatus::Success, None, &ledger.metrics)?;
    Ok((planned.summary, planned.plan.counts(), execution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MemoryRunStore, SnapshotNodes};
    use crate::issue::IssueType;
    use crate::model::ElementKind;
    use crate::tags::{Tags, REGISTER_REF_TAG};

    struct StaticMap(Vec<MapElement>);

    impl MapQuery for StaticMap {
        fn search_aeds(&self) -> Result<Vec<MapElement>, ReconError> {
            Ok(self.0.clone())
        }
    }

    struct StaticRegistry(Vec<RegistryAsset>);

    impl RegistrySource for StaticRegistry {
        fn search_assets(&self) -> Result<Vec<RegistryAsset>, ReconError> {
            Ok(self.0.clone())
        }
    }

    struct FailingRegistry;

    impl RegistrySource for FailingRegistry {
        fn search_assets(&self) -> Result<Vec<RegistryAsset>, ReconError> {
            Err(ReconError::collaborator("registry", "HTTP 503 after 3 retries"))
        }
    }

    fn boundary() -> Boundary {
        Boundary::from_geojson(
            r#"{"type":"Polygon","coordinates":[[[10,59],[11,59],[11,60],[10,60],[10,59]]]}"#,
        )
        .unwrap()
    }

    fn managed(id: i64, lat: f64, register_ref: &str) -> MapElement {
        MapElement {
            kind: ElementKind::Node,
            id,
            lat: Some(lat),
            lon: Some(10.5),
            version: Some(1),
            tags: [("emergency", "defibrillator"), (REGISTER_REF_TAG, register_ref)]
                .into_iter()
                .collect::<Tags>(),
            center: None,
            geometry: Vec::new(),
        }
    }

    fn asset(guid: &str, lat: f64) -> RegistryAsset {
        RegistryAsset {
            asset_guid: Some(guid.into()),
            site_latitude: Some(lat),
            site_longitude: Some(10.5),
            ..Default::default()
        }
    }

    fn config(dir: &std::path::Path) -> ReconConfig {
        let mut config = ReconConfig::from_toml("[boundary]\nfile = \"b.geojson\"").unwrap();
        config.output.osc_path = dir.join("out.osc");
        config.output.geojson_path = dir.join("out.geojson");
        config
    }

    #[test]
    fn successful_run_records_metrics_and_issues() {
        let dir = tempfile::tempdir().unwrap();
        let elements = vec![managed(1, 59.5, "a"), managed(2, 59.6, "gone")];
        let map = StaticMap(elements.clone());
        let registry = StaticRegistry(vec![asset("a", 59.5), asset("new", 59.7), asset("out", 61.0)]);
        let nodes = SnapshotNodes::from_elements(&elements);
        let store = MemoryRunStore::default();
        let mut config = config(dir.path());
        config.thresholds.max_delete_fraction = 0.5;
        let sources = Sources {
            map: &map,
            registry: &registry,
            nodes: &nodes,
            writer: None,
            store: &store,
        };

        let report = run(&config, &boundary(), &sources).unwrap();

        assert_eq!(report.planned.create, 1);
        assert_eq!(report.planned.modify, 1);
        assert_eq!(report.planned.delete, 1);
        assert_eq!(report.metrics.registry_aeds, 2);
        assert_eq!(report.metrics.osm_aeds, 2);
        assert_eq!(report.metrics.linked_aeds, 1);

        let runs = store.runs();
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].metrics, report.metrics);
        assert!(runs[0]
            .issues
            .iter()
            .any(|i| i.kind == IssueType::RegistryOutsideBoundary));
    }

    #[test]
    fn mass_deletion_aborts_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let elements = vec![managed(1, 59.5, "x"), managed(2, 59.6, "y")];
        let map = StaticMap(elements.clone());
        let registry = StaticRegistry(vec![asset("z", 59.7)]);
        let nodes = SnapshotNodes::from_elements(&elements);
        let store = MemoryRunStore::default();
        let config = config(dir.path());
        let sources = Sources {
            map: &map,
            registry: &registry,
            nodes: &nodes,
            writer: None,
            store: &store,
        };

        let err = run(&config, &boundary(), &sources).unwrap_err();

        assert!(matches!(err, ReconError::MassDeletion { planned: 2, managed: 2, .. }));
        assert!(!config.output.osc_path.exists());
        assert!(!config.output.geojson_path.exists());
        let runs = store.runs();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].error_message.as_deref().unwrap().contains("delete fraction"));
    }

    struct FailingNodes;

    impl NodeSource for FailingNodes {
        fn get_node(&self, id: i64) -> Result<Option<crate::model::MapNode>, ReconError> {
            Err(ReconError::collaborator("osm", format!("GET node/{id}: HTTP 502")))
        }
    }

    #[test]
    fn failure_mid_plan_flushes_partial_issues() {
        let dir = tempfile::tempdir().unwrap();
        let mut opted_out = managed(3, 59.8, "kept");
        opted_out.tags.insert("note", "maintained by hand");
        let map = StaticMap(vec![managed(1, 59.5, "gone"), opted_out]);
        let registry = StaticRegistry(Vec::new());
        let store = MemoryRunStore::default();
        let sources = Sources {
            map: &map,
            registry: &registry,
            nodes: &FailingNodes,
            writer: None,
            store: &store,
        };

        let err = run(&config(dir.path()), &boundary(), &sources).unwrap_err();

        assert!(matches!(err, ReconError::Collaborator { service: "osm", .. }));
        let runs = store.runs();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0]
            .issues
            .iter()
            .any(|i| i.kind == IssueType::OsmNodeNoteOptOut));
        assert_eq!(runs[0].metrics.osm_aeds, 2);
    }

    #[test]
    fn collaborator_failure_marks_run_failed() {
        let dir = tempfile::tempdir().unwrap();
        let map = StaticMap(vec![managed(1, 59.5, "a")]);
        let nodes = SnapshotNodes::default();
        let store = MemoryRunStore::default();
        let sources = Sources {
            map: &map,
            registry: &FailingRegistry,
            nodes: &nodes,
            writer: None,
            store: &store,
        };

        let err = run(&config(dir.path()), &boundary(), &sources).unwrap_err();

        assert!(matches!(err, ReconError::Collaborator { service: "registry", .. }));
        let runs = store.runs();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].error_message.as_deref().unwrap().contains("HTTP 503"));
    }

    #[test]
    fn mixed_duplicate_never_yields_create_and_delete_for_one_ref() {
        let dir = tempfile::tempdir().unwrap();
        let mut pharmacy = managed(1, 59.5, "a");
        pharmacy.tags.insert("amenity", "pharmacy");
        let elements = vec![pharmacy, managed(2, 59.5005, "a")];
        let nodes = SnapshotNodes::from_elements(&elements);
        let mut ledger = RunLedger::default();

        let planned = plan_changes(
            &config(dir.path()),
            &boundary(),
            elements.clone(),
            &[asset("a", 59.5)],
            &nodes,
            &mut ledger,
        )
        .unwrap();

        let plan = &planned.plan;
        assert!(plan
            .create
            .iter()
            .all(|c| plan.delete.iter().all(|d| d.register_ref != c.register_ref)));
        assert!(plan.create.is_empty());
        assert!(plan.delete.is_empty());
        assert!(plan.modify.iter().all(|m| m.before.id == 2));
        assert_eq!(planned.summary.skipped_delete_not_aed_only, 1);
    }

    #[test]
    fn empty_map_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let map = StaticMap(Vec::new());
        let registry = StaticRegistry(vec![asset("a", 59.5)]);
        let nodes = SnapshotNodes::default();
        let store = MemoryRunStore::default();
        let sources = Sources {
            map: &map,
            registry: &registry,
            nodes: &nodes,
            writer: None,
            store: &store,
        };
        let err = run(&config(dir.path()), &boundary(), &sources).unwrap_err();
        assert!(matches!(err, ReconError::EmptyMapSnapshot));
        assert_eq!(store.runs()[0].status, RunStatus::Failed);
    }
}
