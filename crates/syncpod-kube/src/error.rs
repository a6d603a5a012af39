//! Error types for syncpod-kube

use std::fmt;

use syncpod_core::CoreError;
use syncpod_engine::EngineError;
use thiserror::Error;

/// Result type for syncpod-kube operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Category of a remote API failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ApiErrorKind {
    NotFound,
    AlreadyExists,
    Conflict,
    Forbidden,
    Invalid,
    Other,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::Invalid => "invalid",
            Self::Other => "error",
        };
        f.write_str(s)
    }
}

/// Typed error returned by a [`crate::ClusterApi`] call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

/// Messages the API server uses when an update touches an immutable field
const IMMUTABLE_FIELD_MARKERS: &[&str] = &["updates to parameters are forbidden", "field is immutable"];

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NotFound, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ApiErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == ApiErrorKind::AlreadyExists
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ApiErrorKind::Conflict
    }

    /// True when an update was rejected because it changes an immutable field
    pub fn is_immutable_field(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Invalid | ApiErrorKind::Other)
            && IMMUTABLE_FIELD_MARKERS
                .iter()
                .any(|marker| self.message.contains(marker))
    }
}

/// Why the reconciler went around its retry loop again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// The server rejected a write because the object changed since it was read
    Conflict,
    /// Create lost a race against another writer; the next attempt must update
    CreateRaced,
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => f.write_str("write conflict"),
            Self::CreateRaced => f.write_str("object created concurrently"),
        }
    }
}

/// Errors that can occur during a sync pass
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Asset could not be read or decoded
    #[error("failed to load asset '{asset}': {source}")]
    Load {
        asset: String,
        #[source]
        source: CoreError,
    },

    /// Template substitution failed
    #[error("template error: {0}")]
    Template(#[from] EngineError),

    /// A loader worker panicked or was cancelled
    #[error("loader worker failed: {0}")]
    Worker(String),

    /// Discovery endpoint unreachable or malformed
    #[error("API discovery failed: {0}")]
    Discovery(#[source] ApiError),

    /// API group not present in discovery
    #[error("couldn't find group '{group}' for {key}")]
    GroupNotFound { group: String, key: String },

    /// Kind not served by the group/version
    #[error("couldn't find kind '{kind}' in '{api_version}' for {key}")]
    KindNotFound {
        kind: String,
        api_version: String,
        key: String,
    },

    /// Object of a namespaced kind without `metadata.namespace`
    #[error("{key} is namespaced but sets no metadata.namespace")]
    MissingNamespace { key: String },

    /// A remote call for one object failed
    #[error("{operation} {key} failed: {source}")]
    Api {
        operation: &'static str,
        key: String,
        #[source]
        source: ApiError,
    },

    /// Conflicts persisted through every attempt
    #[error("{key}: giving up after {attempts} attempt(s), last failure: {reason} ({source})")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        reason: RetryReason,
        #[source]
        source: ApiError,
    },

    /// Listing or deleting during orphan collection failed
    #[error("orphan collection failed for {kind}: {source}")]
    Orphan {
        kind: String,
        #[source]
        source: ApiError,
    },

    /// Kubernetes client construction error
    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<CoreError> for SyncError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidConfig { message } => SyncError::InvalidConfig(message),
            other => SyncError::Load {
                asset: String::new(),
                source: other,
            },
        }
    }
}

impl SyncError {
    pub(crate) fn api(operation: &'static str, key: impl ToString, source: ApiError) -> Self {
        SyncError::Api {
            operation,
            key: key.to_string(),
            source,
        }
    }

    /// Check if this error wraps a remote not-found
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Api { source, .. } if source.is_not_found())
    }

    /// Check if this error is an unresolved conflict
    pub fn is_conflict(&self) -> bool {
        match self {
            SyncError::Api { source, .. } => source.is_conflict(),
            SyncError::RetriesExhausted { .. } => true,
            _ => false,
        }
    }
}
