//! Platform client errors

use thiserror::Error;

/// Errors that can occur when talking to the orchestration platform API
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Kubernetes API or transport error not covered by a more specific variant
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Create was rejected because the object already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Update rejected because the submitted object was stale
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Object is missing a field the operation needs (e.g. metadata.name)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Server reported a version we could not parse
    #[error("Invalid server version: {0}")]
    InvalidVersion(#[from] crate::version::VersionParseError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlatformError {
    /// True for the "already exists" response to a create
    pub fn is_already_exists(&self) -> bool {
        matches!(self, PlatformError::AlreadyExists(_))
    }

    /// True for the "not found" response to a get or delete
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }

    /// Classifies a raw kube error by HTTP status, so callers can treat
    /// idempotence responses as success without inspecting API bodies.
    pub(crate) fn from_kube(err: kube::Error, what: &str) -> Self {
        let (code, reason) = match &err {
            kube::Error::Api(status) => (status.code, status.reason.clone()),
            _ => (0, String::new()),
        };
        match (code, reason.as_str()) {
            (409, "AlreadyExists") => PlatformError::AlreadyExists(what.to_string()),
            (409, _) => PlatformError::Conflict(what.to_string()),
            (404, _) => PlatformError::NotFound(what.to_string()),
            _ => PlatformError::Kube(err),
        }
    }
}
