//! OpenStreetMap API 0.6: live node reads and single-changeset uploads.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use aedsync_recon::model::NodeId;
use aedsync_recon::plan::OperationCounts;
use aedsync_recon::render::render_osc;
use aedsync_recon::{AppliedCounts, ChangePlan, ChangesetWriter, MapElement, MapNode, NodeSource, ReconError};
use quick_xml::escape::escape;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::ClientError;
use crate::http::{build_client, ensure_success, send_with_retry, RetryPolicy};

const SERVICE: &str = "osm";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OsmConfig {
    pub api_url: String,
    /// Environment variable holding the OAuth2 bearer token for writes.
    pub token_env: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for OsmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openstreetmap.org".into(),
            token_env: "OSM_ACCESS_TOKEN".into(),
            request_timeout_secs: 120,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodeResponse {
    #[serde(default)]
    elements: Vec<MapElement>,
}

pub struct OsmApiClient {
    http: Client,
    api_url: String,
    token: Option<String>,
    changeset_tags: BTreeMap<String, String>,
    read_policy: RetryPolicy,
}

impl OsmApiClient {
    /// `token` is only needed for writes; reads are anonymous.
    pub fn new(config: &OsmConfig, token: Option<String>, changeset_tags: BTreeMap<String, String>) -> Self {
        Self {
            http: build_client(Duration::from_secs(config.request_timeout_secs)),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            changeset_tags,
            read_policy: RetryPolicy::default().with_max_retries(config.max_retries),
        }
    }

    /// Read the token from the environment variable named in `config`,
    /// if it is set.
    pub fn from_env(config: &OsmConfig, changeset_tags: BTreeMap<String, String>) -> Self {
        Self::new(config, std::env::var(&config.token_env).ok(), changeset_tags)
    }

    /// Whether a non-empty token was supplied.
    pub fn can_write(&self) -> bool {
        self.token.is_some()
    }

    pub fn with_read_policy(mut self, policy: RetryPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/0.6/{path}", self.api_url)
    }

    fn write_token(&self) -> Result<&str, ClientError> {
        self.token
            .as_deref()
            .ok_or_else(|| ClientError::Config("OSM writes need a bearer token".into()))
    }

    /// `Ok(None)` when the node is gone (404 or 410).
    pub fn fetch_node(&self, id: NodeId) -> Result<Option<MapNode>, ClientError> {
        let url = self.url(&format!("node/{id}.json"));
        let resp = send_with_retry(SERVICE, &self.read_policy, || {
            self.http.get(&url).header(reqwest::header::ACCEPT, "application/json")
        })?;
        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            log::debug!("node {id} no longer exists ({})", resp.status().as_u16());
            return Ok(None);
        }
        let body: NodeResponse = ensure_success(resp)?
            .json()
            .map_err(|e| ClientError::Parse(format!("node {id} JSON: {e}")))?;
        Ok(body.elements.iter().find(|e| e.id == id).and_then(MapElement::as_node))
    }

    pub fn open_changeset(&self, comment: &str) -> Result<u64, ClientError> {
        let token = self.write_token()?;
        let body = changeset_document(comment, &self.changeset_tags);
        let url = self.url("changeset/create");
        let resp = send_with_retry(SERVICE, &RetryPolicy::NONE, || {
            self.http
                .put(&url)
                .bearer_auth(token)
                .header(reqwest::header::CONTENT_TYPE, "text/xml")
                .body(body.clone())
        })?;
        let text = ensure_success(resp)?
            .text()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        text.trim()
            .parse()
            .map_err(|_| ClientError::Parse(format!("changeset id {:?}", text.trim())))
    }

    pub fn upload(&self, changeset: u64, osc: String) -> Result<(), ClientError> {
        let token = self.write_token()?;
        let url = self.url(&format!("changeset/{changeset}/upload"));
        let resp = send_with_retry(SERVICE, &RetryPolicy::NONE, || {
            self.http
                .post(&url)
                .bearer_auth(token)
                .header(reqwest::header::CONTENT_TYPE, "text/xml")
                .body(osc.clone())
        })?;
        ensure_success(resp)?;
        Ok(())
    }

    pub fn close_changeset(&self, changeset: u64) -> Result<(), ClientError> {
        let token = self.write_token()?;
        let url = self.url(&format!("changeset/{changeset}/close"));
        let resp = send_with_retry(SERVICE, &self.read_policy, || self.http.put(&url).bearer_auth(token))?;
        // A changeset that is already closed answers 409.
        if resp.status() == StatusCode::CONFLICT {
            log::warn!("changeset {changeset} was already closed");
            return Ok(());
        }
        ensure_success(resp)?;
        Ok(())
    }

    /// Open a changeset, upload the whole plan as one diff, close it.
    pub fn submit(&self, plan: &ChangePlan, comment_subject: &str) -> Result<AppliedCounts, ClientError> {
        let counts = plan.counts();
        let comment = changeset_comment(&counts, comment_subject);
        let changeset = self.open_changeset(&comment)?;
        log::info!("opened changeset {changeset}: {comment}");

        if let Err(err) = self.upload(changeset, render_osc(plan, Some(changeset))) {
            if let Err(close_err) = self.close_changeset(changeset) {
                log::error!("could not close changeset {changeset} after failed upload: {close_err}");
            }
            return Err(err);
        }
        self.close_changeset(changeset)?;

        Ok(AppliedCounts {
            changeset_id: Some(changeset),
            created: counts.create,
            modified: counts.modify,
            deleted: counts.delete,
        })
    }
}

impl NodeSource for OsmApiClient {
    fn get_node(&self, id: NodeId) -> Result<Option<MapNode>, ReconError> {
        self.fetch_node(id).map_err(|e| e.into_recon(SERVICE))
    }
}

impl ChangesetWriter for OsmApiClient {
    fn apply_changes(&self, plan: &ChangePlan, comment_subject: &str) -> Result<AppliedCounts, ReconError> {
        self.submit(plan, comment_subject).map_err(|e| e.into_recon(SERVICE))
    }
}

/// "Added, Modified, and Deleted <subject>", naming only the kinds present.
pub fn changeset_comment(counts: &OperationCounts, subject: &str) -> String {
    let mut labels = Vec::new();
    if counts.create > 0 {
        labels.push("Added");
    }
    if counts.modify > 0 {
        labels.push("Modified");
    }
    if counts.delete > 0 {
        labels.push("Deleted");
    }
    let action = match labels.as_slice() {
        [] => "Updated".to_string(),
        [one] => one.to_string(),
        [a, b] => format!("{a} and {b}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    };
    format!("{action} {subject}")
}

fn changeset_document(comment: &str, tags: &BTreeMap<String, String>) -> String {
    let mut out = String::from("<osm>\n  <changeset>\n");
    for (k, v) in tags.iter().filter(|(k, _)| k.as_str() != "comment") {
        writeln!(out, r#"    <tag k="{}" v="{}"/>"#, escape(k.as_str()), escape(v.as_str())).ok();
    }
    writeln!(out, r#"    <tag k="comment" v="{}"/>"#, escape(comment)).ok();
    out.push_str("  </changeset>\n</osm>\n");
    out
}
