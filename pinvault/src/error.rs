use pinvault_core::{ContentId, ContentIdError};
use std::fmt;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Node startup or backend registration failed. The store is unusable.
    #[error("asset store failed to initialize: {0}")]
    Initialization(String),

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("content {0} not found")]
    NotFound(ContentId),

    #[error("invalid content identifier '{input}': {source}")]
    InvalidIdentifier {
        input: String,
        #[source]
        source: ContentIdError,
    },

    #[error(transparent)]
    Backend(BackendFailure),

    /// One or more backends failed during a fan-out pin.
    #[error("pinning failed on {} service(s): {}", .0.len(), join_failures(.0))]
    Aggregate(Vec<BackendFailure>),

    #[error("content is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Node(#[from] anyhow::Error),
}

/// A single pinning backend's query or pin request failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("pinning service '{service}': {reason}")]
pub struct BackendFailure {
    pub service: String,
    pub reason: String,
}

impl BackendFailure {
    pub fn new(service: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            service: service.into(),
            reason: reason.to_string(),
        }
    }
}

fn join_failures(failures: &[BackendFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Services that failed, for `Backend` and `Aggregate` errors.
    pub fn failed_services(&self) -> Vec<&str> {
        match self {
            Error::Backend(f) => vec![f.service.as_str()],
            Error::Aggregate(fs) => fs.iter().map(|f| f.service.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}
