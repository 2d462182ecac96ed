use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad threshold, empty output path, etc.).
    ConfigValidation(String),
    /// Boundary polygon could not be read or parsed.
    Boundary(String),
    /// The map query returned no AED point features at all.
    EmptyMapSnapshot,
    /// Planned deletions exceed the configured fraction of managed nodes.
    MassDeletion {
        planned: usize,
        managed: usize,
        ceiling: f64,
    },
    /// An external collaborator (map query, registry, map write, run store) failed.
    Collaborator {
        service: &'static str,
        message: String,
    },
    /// A node required for submission no longer exists upstream.
    NodeNotFound(i64),
    /// IO error (boundary file, review files, etc.).
    Io(String),
    /// Serialization of a review document failed.
    Serialize(String),
}

impl ReconError {
    pub fn collaborator(service: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service,
            message: message.into(),
        }
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Boundary(msg) => write!(f, "boundary error: {msg}"),
            Self::EmptyMapSnapshot => {
                write!(f, "map query returned no AED nodes; aborting to prevent bad changes")
            }
            Self::MassDeletion {
                planned,
                managed,
                ceiling,
            } => {
                let fraction = if *managed == 0 {
                    0.0
                } else {
                    *planned as f64 / *managed as f64
                };
                write!(
                    f,
                    "delete fraction {:.1}% ({planned}/{managed}) exceeds max allowed {:.1}%; aborting run",
                    fraction * 100.0,
                    ceiling * 100.0,
                )
            }
            Self::Collaborator { service, message } => write!(f, "{service} failed: {message}"),
            Self::NodeNotFound(id) => write!(f, "OSM node {id} not found"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Serialize(msg) => write!(f, "serialization error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
