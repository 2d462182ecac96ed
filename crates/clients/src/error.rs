use std::fmt;

use aedsync_recon::ReconError;

/// Error type for HTTP collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Transport failure (connect, timeout, reset)
    Network(String),
    /// Non-success HTTP status with a trimmed body
    Http(u16, String),
    /// Rejected credentials or token acquisition failure
    Auth(String),
    /// Unexpected or unparseable payload
    Parse(String),
    /// Missing or invalid client configuration
    Config(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Network(msg) => write!(f, "network error: {msg}"),
            ClientError::Http(code, msg) => write!(f, "HTTP {code}: {msg}"),
            ClientError::Auth(msg) => write!(f, "authentication failed: {msg}"),
            ClientError::Parse(msg) => write!(f, "unexpected response: {msg}"),
            ClientError::Config(msg) => write!(f, "client misconfigured: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl ClientError {
    /// Wrap as a run-fatal collaborator failure of `service`.
    pub fn into_recon(self, service: &'static str) -> ReconError {
        ReconError::collaborator(service, self.to_string())
    }
}
