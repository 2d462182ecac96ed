//! `aedsync-recon`: AED registry to OpenStreetMap reconciliation engine.
//!
//! Pure engine crate: takes a map snapshot, registry records and a boundary,
//! plans creates/modifies/deletes, and hands the plan to collaborators.
//! No HTTP or CLI dependencies.

pub mod classify;
pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod geo;
pub mod guard;
pub mod issue;
pub mod model;
pub mod phases;
pub mod plan;
pub mod registry;
pub mod render;
pub mod synth;
pub mod tags;
pub mod working;

pub use collab::{AppliedCounts, ChangesetWriter, MapQuery, NodeSource, RegistrySource, RunStore};
pub use config::ReconConfig;
pub use engine::{plan_changes, run, RunReport, Sources};
pub use error::ReconError;
pub use geo::Boundary;
pub use issue::{Issue, IssueType, Severity};
pub use model::{MapElement, MapNode, RegistryAsset, RunMetrics, RunMode, RunStatus};
pub use plan::ChangePlan;
