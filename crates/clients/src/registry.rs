//! Hjertestarterregister API client (OAuth client credentials).
//!
//! Token acquisition is single-flight: the cache mutex is held across the
//! token request, so concurrent callers wait for one acquisition and then
//! share its token.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use aedsync_recon::{RegistryAsset, RegistrySource, ReconError};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ClientError;
use crate::http::{build_client, ensure_success, send_with_retry, trim_body, RetryPolicy};

const SERVICE: &str = "registry";

/// Refresh this long before the token actually expires.
const TOKEN_SAFETY_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub base_url: String,
    pub token_url: String,
    /// Environment variable holding the OAuth client id.
    pub client_id_env: String,
    /// Environment variable holding the OAuth client secret.
    pub client_secret_env: String,
    /// Row cap sent with the search. A response that fills it is refused.
    pub max_rows: u32,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://hjertestarterregister.113.no/ords/api/v1/".into(),
            token_url: "https://hjertestarterregister.113.no/ords/api/oauth/token".into(),
            client_id_env: "HJERTESTARTERREGISTER_CLIENT_ID".into(),
            client_secret_env: "HJERTESTARTERREGISTER_CLIENT_SECRET".into(),
            max_rows: 50_000,
            request_timeout_secs: 60,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_SAFETY_WINDOW < self.expires_at
    }
}

pub struct RegistryClient {
    http: Client,
    config: RegistryConfig,
    credentials: Credentials,
    policy: RetryPolicy,
    token: Mutex<Option<CachedToken>>,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig, credentials: Credentials) -> Self {
        let http = build_client(Duration::from_secs(config.request_timeout_secs));
        let policy = RetryPolicy::default().with_max_retries(config.max_retries);
        Self {
            http,
            config,
            credentials,
            policy,
            token: Mutex::new(None),
        }
    }

    /// Resolve the credentials from the environment variables named in
    /// `config`.
    pub fn from_env(config: RegistryConfig) -> Result<Self, ClientError> {
        let client_id = env_secret(&config.client_id_env)?;
        let client_secret = env_secret(&config.client_secret_env)?;
        Ok(Self::new(
            config,
            Credentials {
                client_id,
                client_secret,
            },
        ))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn access_token(&self) -> Result<String, ClientError> {
        let mut cached = self
            .token
            .lock()
            .map_err(|_| ClientError::Auth("token cache lock poisoned".into()))?;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }

        let token = self.request_token()?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    fn request_token(&self) -> Result<CachedToken, ClientError> {
        log::debug!("requesting registry access token");
        let resp = send_with_retry(SERVICE, &self.policy, || {
            self.http
                .post(&self.config.token_url)
                .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
                .header(reqwest::header::ACCEPT, "application/json")
                .form(&[("grant_type", "client_credentials")])
        })?;
        let status = resp.status();
        let body = resp.text().map_err(|e| ClientError::Network(e.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| api_error_message(&v))
                .unwrap_or_else(|| trim_body(&body));
            return Err(ClientError::Auth(format!(
                "token request failed ({}): {message}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::Auth(format!("malformed token response: {e}")))?;
        if let Some(kind) = token.token_type.as_deref() {
            if !kind.eq_ignore_ascii_case("bearer") {
                log::warn!("registry issued a {kind} token; sending it as bearer");
            }
        }
        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    pub fn fetch_assets(&self) -> Result<Vec<RegistryAsset>, ClientError> {
        let token = self.access_token()?;
        let url = format!("{}assets/search/", normalize_base(&self.config.base_url));
        let max_rows = self.config.max_rows.to_string();
        let resp = send_with_retry(SERVICE, &self.policy, || {
            self.http
                .get(&url)
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&[("max_rows", max_rows.as_str())])
        })?;
        let payload: Value = ensure_success(resp)?
            .json()
            .map_err(|e| ClientError::Parse(format!("registry JSON: {e}")))?;

        // The API reports some failures inside a 200 body.
        if let Some(message) = payload.get("API_ERROR").and_then(Value::as_str) {
            return Err(ClientError::Http(200, message.to_string()));
        }
        let assets = payload
            .get("ASSETS")
            .cloned()
            .ok_or_else(|| ClientError::Parse("registry response has no ASSETS array".into()))?;
        let assets: Vec<RegistryAsset> =
            serde_json::from_value(assets).map_err(|e| ClientError::Parse(format!("registry ASSETS: {e}")))?;
        if assets.len() >= self.config.max_rows as usize {
            log::error!("registry search filled the max_rows cap of {}", self.config.max_rows);
            return Err(ClientError::Config(format!(
                "registry returned {} assets, the max_rows cap; raise registry.max_rows",
                assets.len()
            )));
        }
        log::info!("registry search returned {} assets", assets.len());
        Ok(assets)
    }
}

impl RegistrySource for RegistryClient {
    fn search_assets(&self) -> Result<Vec<RegistryAsset>, ReconError> {
        self.fetch_assets().map_err(|e| e.into_recon(SERVICE))
    }
}

fn api_error_message(payload: &Value) -> Option<String> {
    ["API_ERROR", "error_description", "error", "API_MESSAGE"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn normalize_base(base: &str) -> String {
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    }
}

fn env_secret(var: &str) -> Result<String, ClientError> {
    let value = std::env::var(var)
        .map_err(|_| ClientError::Config(format!("environment variable {var} not set")))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ClientError::Config(format!("environment variable {var} is empty")));
    }
    Ok(value.to_string())
}
