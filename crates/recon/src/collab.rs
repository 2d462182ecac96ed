//! Seams to the outside world. HTTP implementations live in
//! `aedsync-clients`; the snapshot-backed ones here serve offline runs
//! and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::error::ReconError;
use crate::issue::Issue;
use crate::model::{MapElement, MapNode, NodeId, RegistryAsset, RunMetrics, RunMode, RunStatus};
use crate::plan::ChangePlan;

/// Map query: every AED-tagged element inside the region.
pub trait MapQuery {
    fn search_aeds(&self) -> Result<Vec<MapElement>, ReconError>;
}

/// Registry search.
pub trait RegistrySource {
    fn search_assets(&self) -> Result<Vec<RegistryAsset>, ReconError>;
}

/// Authoritative current state of a single node. `Ok(None)` when the node
/// no longer exists.
pub trait NodeSource {
    fn get_node(&self, id: NodeId) -> Result<Option<MapNode>, ReconError>;
}

/// Applied operation counts returned by a changeset write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppliedCounts {
    pub changeset_id: Option<u64>,
    pub created: usize,
    pub modified: usize,
    pub deleted: usize,
}

/// Submits a whole plan as one changeset.
pub trait ChangesetWriter {
    fn apply_changes(&self, plan: &ChangePlan, comment_subject: &str) -> Result<AppliedCounts, ReconError>;
}

/// Persisted run history.
pub trait RunStore {
    fn start_run(&self, mode: RunMode) -> Result<String, ReconError>;
    fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        error_message: Option<&str>,
        metrics: &RunMetrics,
    ) -> Result<(), ReconError>;
    /// Replaces every issue stored for the run.
    fn replace_issues(&self, run_id: &str, issues: &[Issue]) -> Result<(), ReconError>;
}

// ---------------------------------------------------------------------------
// Snapshot-backed implementations
// ---------------------------------------------------------------------------

/// Serves node lookups from an already-fetched map snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotNodes {
    nodes: HashMap<NodeId, MapNode>,
}

impl SnapshotNodes {
    pub fn from_elements(elements: &[MapElement]) -> Self {
        Self {
            nodes: elements
                .iter()
                .filter_map(MapElement::as_node)
                .map(|n| (n.id, n))
                .collect(),
        }
    }
}

impl NodeSource for SnapshotNodes {
    fn get_node(&self, id: NodeId) -> Result<Option<MapNode>, ReconError> {
        Ok(self.nodes.get(&id).cloned())
    }
}

/// One run as held by [`MemoryRunStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub id: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub metrics: RunMetrics,
    pub issues: Vec<Issue>,
}

/// In-process run store.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<Vec<StoredRun>>,
}

impl MemoryRunStore {
    pub fn runs(&self) -> Vec<StoredRun> {
        self.runs.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn with_run<T>(&self, run_id: &str, f: impl FnOnce(&mut StoredRun) -> T) -> Result<T, ReconError> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| ReconError::collaborator("run-store", "lock poisoned"))?;
        let run = runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| ReconError::collaborator("run-store", format!("unknown run {run_id}")))?;
        Ok(f(run))
    }
}

impl RunStore for MemoryRunStore {
    fn start_run(&self, mode: RunMode) -> Result<String, ReconError> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| ReconError::collaborator("run-store", "lock poisoned"))?;
        let id = format!("run-{}", runs.len() + 1);
        runs.push(StoredRun {
            id: id.clone(),
            mode,
            status: RunStatus::Running,
            error_message: None,
            metrics: RunMetrics::default(),
            issues: Vec::new(),
        });
        Ok(id)
    }

    fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        error_message: Option<&str>,
        metrics: &RunMetrics,
    ) -> Result<(), ReconError> {
        self.with_run(run_id, |run| {
            run.status = status;
            run.error_message = error_message.map(str::to_string);
            run.metrics = metrics.clone();
        })
    }

    fn replace_issues(&self, run_id: &str, issues: &[Issue]) -> Result<(), ReconError> {
        self.with_run(run_id, |run| run.issues = issues.to_vec())
    }
}
