//! JSON-file run history: one `<run-id>.json` record per run.

use std::fs;
use std::path::{Path, PathBuf};

use aedsync_recon::{Issue, ReconError, RunMetrics, RunMode, RunStatus, RunStore};
use serde::{Deserialize, Serialize};

const SERVICE: &str = "run-store";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub started_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metrics: RunMetrics,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone)]
pub struct JsonRunStore {
    dir: PathBuf,
}

impl JsonRunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    pub fn read(&self, run_id: &str) -> Result<RunRecord, ReconError> {
        let path = self.record_path(run_id);
        let raw = fs::read_to_string(&path)
            .map_err(|e| ReconError::collaborator(SERVICE, format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| ReconError::collaborator(SERVICE, format!("corrupt record {}: {e}", path.display())))
    }

    fn write(&self, record: &RunRecord) -> Result<(), ReconError> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| ReconError::collaborator(SERVICE, format!("cannot encode run {}: {e}", record.id)))?;
        write_atomic(&self.record_path(&record.id), json.as_bytes())
            .map_err(|e| ReconError::collaborator(SERVICE, format!("cannot write run {}: {e}", record.id)))
    }

    fn update(&self, run_id: &str, f: impl FnOnce(&mut RunRecord)) -> Result<(), ReconError> {
        let mut record = self.read(run_id)?;
        f(&mut record);
        self.write(&record)
    }
}

impl RunStore for JsonRunStore {
    fn start_run(&self, mode: RunMode) -> Result<String, ReconError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ReconError::collaborator(SERVICE, format!("cannot create {}: {e}", self.dir.display()))
        })?;
        let record = RunRecord {
            id: uuid::Uuid::new_v4().to_string(),
            mode,
            status: RunStatus::Running,
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            error_message: None,
            metrics: RunMetrics::default(),
            issues: Vec::new(),
        };
        self.write(&record)?;
        Ok(record.id)
    }

    fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        error_message: Option<&str>,
        metrics: &RunMetrics,
    ) -> Result<(), ReconError> {
        self.update(run_id, |record| {
            record.status = status;
            record.error_message = error_message.map(str::to_string);
            record.metrics = metrics.clone();
            record.finished_at = Some(chrono::Utc::now().to_rfc3339());
        })
    }

    fn replace_issues(&self, run_id: &str, issues: &[Issue]) -> Result<(), ReconError> {
        self.update(run_id, |record| record.issues = issues.to_vec())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use aedsync_recon::IssueType;

    use super::*;

    #[test]
    fn run_lifecycle_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRunStore::new(dir.path().join("runs"));

        let id = store.start_run(RunMode::Live).unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        let started = store.read(&id).unwrap();
        assert_eq!(started.status, RunStatus::Running);
        assert!(started.finished_at.is_none());

        let metrics = RunMetrics {
            registry_aeds: 12,
            created: 2,
            ..Default::default()
        };
        store.complete_run(&id, RunStatus::Success, None, &metrics).unwrap();

        let done = store.read(&id).unwrap();
        assert_eq!(done.status, RunStatus::Success);
        assert_eq!(done.mode, RunMode::Live);
        assert_eq!(done.metrics, metrics);
        assert!(done.finished_at.is_some());
        assert!(!dir.path().join("runs").join(format!("{id}.json.tmp")).exists());
    }

    #[test]
    fn issues_are_replaced_not_appended() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRunStore::new(dir.path());
        let id = store.start_run(RunMode::DryRun).unwrap();

        let a = Issue::warning(IssueType::OsmNodeMissingRef, "first");
        let b = Issue::error(IssueType::OsmDuplicateRegisterRef, "second");
        store.replace_issues(&id, &[a.clone(), b]).unwrap();
        store.replace_issues(&id, &[a.clone()]).unwrap();

        assert_eq!(store.read(&id).unwrap().issues, vec![a]);
    }

    #[test]
    fn failure_message_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRunStore::new(dir.path());
        let id = store.start_run(RunMode::DryRun).unwrap();
        store
            .complete_run(&id, RunStatus::Failed, Some("overpass failed: HTTP 504"), &RunMetrics::default())
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join(format!("{id}.json"))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["mode"], "dry-run");
        assert_eq!(value["error_message"], "overpass failed: HTTP 504");
    }

    #[test]
    fn unknown_run_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRunStore::new(dir.path());
        let err = store.replace_issues("missing", &[]).unwrap_err();
        assert!(matches!(err, ReconError::Collaborator { service: "run-store", .. }));
    }
}
