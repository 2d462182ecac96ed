//! Overpass map query: every `emergency=defibrillator` element in an area.

use std::time::Duration;

use aedsync_recon::{MapElement, MapQuery, ReconError};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::error::ClientError;
use crate::http::{build_client, ensure_success, send_with_retry, RetryPolicy};

const SERVICE: &str = "overpass";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OverpassConfig {
    pub url: String,
    /// Overpass area id (3600000000 + relation id). Default: Norway.
    pub area_id: u64,
    /// Server-side `[timeout:N]` in seconds.
    pub query_timeout_secs: u64,
    /// Client request timeout; must exceed the query timeout.
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            url: "https://overpass-api.de/api/interpreter".into(),
            area_id: 3_602_978_650,
            query_timeout_secs: 60,
            request_timeout_secs: 90,
            max_retries: 6,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<MapElement>,
    #[serde(default)]
    remark: Option<String>,
}

pub struct OverpassClient {
    http: Client,
    config: OverpassConfig,
    policy: RetryPolicy,
}

impl OverpassClient {
    pub fn new(config: OverpassConfig) -> Self {
        let http = build_client(Duration::from_secs(config.request_timeout_secs));
        let policy = RetryPolicy::default().with_max_retries(config.max_retries);
        Self { http, config, policy }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn query(&self) -> String {
        format!(
            "[out:json][timeout:{}];\n\
             area(id:{})->.searchArea;\n\
             (\n  nwr[\"emergency\"=\"defibrillator\"](area.searchArea);\n);\n\
             out geom;",
            self.config.query_timeout_secs, self.config.area_id
        )
    }

    pub fn fetch_elements(&self) -> Result<Vec<MapElement>, ClientError> {
        let query = self.query();
        let resp = send_with_retry(SERVICE, &self.policy, || {
            self.http
                .post(&self.config.url)
                .header(reqwest::header::ACCEPT, "application/json")
                .form(&[("data", query.as_str())])
        })?;
        let body = ensure_success(resp)?
            .text()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let parsed: OverpassResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::Parse(format!("overpass JSON: {e}")))?;

        // Overpass reports query timeouts and memory exhaustion as a 200
        // with a remark and a truncated element list.
        if let Some(remark) = parsed.remark.as_deref() {
            if remark.contains("runtime error") {
                return Err(ClientError::Parse(format!("overpass remark: {remark}")));
            }
            log::warn!("overpass remark: {remark}");
        }
        Ok(parsed.elements)
    }
}

impl MapQuery for OverpassClient {
    fn search_aeds(&self) -> Result<Vec<MapElement>, ReconError> {
        self.fetch_elements().map_err(|e| e.into_recon(SERVICE))
    }
}
