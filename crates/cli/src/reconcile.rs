//! `aedsync run` and `aedsync validate`.

use std::path::{Path, PathBuf};

use aedsync_clients::{OsmApiClient, OverpassClient, RegistryClient};
use aedsync_recon::{
    ChangesetWriter, MapQuery, NodeSource, ReconError, RegistrySource, RunMode, RunReport, Sources,
};

use crate::config::AppConfig;
use crate::exit_codes::*;
use crate::run_store::JsonRunStore;
use crate::sources::{MapSnapshotFile, RegistrySnapshotFile};
use crate::CliError;

/// Options for `aedsync run` after clap has resolved them.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: PathBuf,
    /// `Some` when `--live` or `--dry-run` overrides the file.
    pub mode: Option<RunMode>,
    pub map_snapshot: Option<PathBuf>,
    pub registry_snapshot: Option<PathBuf>,
    pub json: bool,
    pub output: Option<PathBuf>,
}

fn cli_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

/// Exit code and hint for a failed run.
pub fn run_error(err: ReconError) -> CliError {
    let (code, hint) = match &err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => (EXIT_INVALID_CONFIG, None),
        ReconError::Boundary(_) => (EXIT_BOUNDARY, None),
        ReconError::EmptyMapSnapshot => (
            EXIT_EMPTY_SNAPSHOT,
            Some("check the Overpass area id; nothing was written"),
        ),
        ReconError::MassDeletion { .. } => (
            EXIT_MASS_DELETION,
            Some("review the map data, then raise thresholds.max_delete_fraction if the deletes are intended"),
        ),
        ReconError::NodeNotFound(_) => (
            EXIT_NODE_VANISHED,
            Some("the map changed since the query; run again"),
        ),
        ReconError::Io(_) | ReconError::Serialize(_) => (EXIT_OUTPUT, None),
        ReconError::Collaborator { service, .. } => match *service {
            "overpass" | "map-snapshot" => (EXIT_UPSTREAM_MAP, None),
            "registry" | "registry-snapshot" => (EXIT_UPSTREAM_REGISTRY, None),
            "osm" => (EXIT_UPSTREAM_OSM, None),
            "run-store" => (EXIT_RUN_STORE, None),
            _ => (EXIT_ERROR, None),
        },
    };
    CliError {
        code,
        message: err.to_string(),
        hint: hint.map(str::to_string),
    }
}

// ── run ─────────────────────────────────────────────────────────────

pub fn cmd_run(opts: RunOptions) -> Result<(), CliError> {
    let mut config = AppConfig::load(&opts.config)?;
    if let Some(mode) = opts.mode {
        config.recon.mode = mode;
    }
    let mode = config.recon.mode;
    let boundary = config.load_boundary()?;
    let services = &config.services;

    // Map query and, offline, the node lookups it backs.
    let map_file = opts
        .map_snapshot
        .as_deref()
        .map(MapSnapshotFile::load)
        .transpose()
        .map_err(run_error)?;
    let overpass;
    let map: &dyn MapQuery = match &map_file {
        Some(file) => file,
        None => {
            overpass = OverpassClient::new(services.overpass.clone());
            &overpass
        }
    };

    let registry_file;
    let registry_client;
    let registry: &dyn RegistrySource = match &opts.registry_snapshot {
        Some(path) => {
            registry_file = RegistrySnapshotFile::new(path);
            &registry_file
        }
        None => {
            registry_client = RegistryClient::from_env(services.registry.clone()).map_err(|e| CliError {
                code: EXIT_MISSING_SECRET,
                message: e.to_string(),
                hint: Some(format!(
                    "export {} and {}, or pass --registry-snapshot",
                    services.registry.client_id_env, services.registry.client_secret_env
                )),
            })?;
            &registry_client
        }
    };

    let osm = OsmApiClient::from_env(&services.osm, config.recon.changeset.tags.clone());
    if mode == RunMode::Live && !osm.can_write() {
        return Err(CliError {
            code: EXIT_MISSING_SECRET,
            message: format!("{} is not set; live runs need an OSM bearer token", services.osm.token_env),
            hint: Some("use --dry-run to write review files only".into()),
        });
    }

    let snapshot_nodes = map_file.as_ref().map(MapSnapshotFile::node_source);
    let nodes: &dyn NodeSource = match (&snapshot_nodes, mode) {
        (Some(snapshot), RunMode::DryRun) => snapshot,
        _ => &osm,
    };
    if mode == RunMode::Live && map_file.is_some() {
        log::warn!("live run planned from a map snapshot; node state is re-read from the OSM API");
    }
    let writer: Option<&dyn ChangesetWriter> = match mode {
        RunMode::Live => Some(&osm as &dyn ChangesetWriter),
        RunMode::DryRun => None,
    };

    let store = JsonRunStore::new(services.store.dir.clone());
    let sources = Sources {
        map,
        registry,
        nodes,
        writer,
        store: &store,
    };

    let report = aedsync_recon::run(&config.recon, &boundary, &sources).map_err(run_error)?;

    let json_str = serde_json::to_string_pretty(&report)
        .map_err(|e| cli_err(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
    if let Some(ref path) = opts.output {
        std::fs::write(path, &json_str)
            .map_err(|e| cli_err(EXIT_OUTPUT, format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }
    if opts.json {
        println!("{json_str}");
    }

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &RunReport) {
    let s = &report.summary;
    let m = &report.metrics;
    eprintln!(
        "run {} ({}): {} registry AEDs, {} OSM AEDs, {} linked",
        report.run_id,
        report.mode.as_str(),
        m.registry_aeds,
        m.osm_aeds,
        m.linked_aeds,
    );
    eprintln!(
        "plan: {} created, {} updated, {} deleted, {} unchanged, {} linked",
        s.created, s.updated, s.deleted, s.unchanged, s.linked,
    );
    if s.skipped_create_nearby > 0 || s.skipped_delete_not_aed_only > 0 {
        eprintln!(
            "skipped: {} creates near an existing feature, {} deletes of multi-purpose nodes",
            s.skipped_create_nearby, s.skipped_delete_not_aed_only,
        );
    }
    eprintln!("issues: {}", report.issue_count);
    eprintln!("review files: {}, {}", report.osc_path, report.geojson_path);

    match (&report.applied, report.mode) {
        (Some(applied), RunMode::Live) => match applied.changeset_id {
            Some(id) => eprintln!(
                "changeset {id}: {} created, {} modified, {} deleted",
                applied.created, applied.modified, applied.deleted,
            ),
            None => eprintln!("nothing to submit"),
        },
        _ => eprintln!("dry run: no changes submitted"),
    }
}

// ── validate ────────────────────────────────────────────────────────

pub fn cmd_validate(config_path: &Path) -> Result<(), CliError> {
    let config = AppConfig::load(config_path)?;
    let boundary = config.load_boundary()?;
    let t = &config.recon.thresholds;
    eprintln!(
        "valid: {} run, boundary with {} polygon(s), move {} m, merge {} m, nearby {} m, max delete {:.1}%",
        config.recon.mode.as_str(),
        boundary.polygons().len(),
        t.move_threshold_m,
        t.merge_radius_m,
        t.nearby_radius_m,
        t.max_delete_fraction * 100.0,
    );
    eprintln!(
        "overpass area {}; run store {}",
        config.services.overpass.area_id,
        config.services.store.dir.display(),
    );
    Ok(())
}
