//! CLI error types with exit code handling
//!
//! Every failure the commands report is mapped onto one [`CliError`]
//! variant, which decides the process exit code.

use miette::Diagnostic;
use syncpod_core::CoreError;
use syncpod_engine::EngineError;
use syncpod_kube::SyncError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(syncpod::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Template substitution failed
    #[error("Template error: {message}")]
    #[diagnostic(code(syncpod::cli::template))]
    Template {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Asset could not be read or decoded
    #[error("Asset error: {message}")]
    #[diagnostic(code(syncpod::cli::asset))]
    Asset { message: String },

    /// Remote API failure
    #[error("Cluster error: {message}")]
    #[diagnostic(code(syncpod::cli::cluster))]
    Cluster {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(syncpod::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(syncpod::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Asset { .. } => exit_codes::ASSET_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a configuration error with help text
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a cluster error with help text
    pub fn cluster_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Cluster {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            CoreError::InvalidConfig { message } => CliError::Config {
                message,
                help: None,
            },
            other => CliError::Asset {
                message: other.to_string(),
            },
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Template(e) => CliError::Template {
                message: e.to_string(),
                help: e.suggestion.clone(),
            },
            other => CliError::Template {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<SyncError> for CliError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Template(e) => e.into(),
            SyncError::InvalidConfig(message) => CliError::Config {
                message,
                help: None,
            },
            SyncError::Load { .. } | SyncError::MissingNamespace { .. } => CliError::Asset {
                message: err.to_string(),
            },
            SyncError::Worker(message) => CliError::Internal { message },
            SyncError::GroupNotFound { .. } | SyncError::KindNotFound { .. } => {
                CliError::cluster_with_help(
                    err.to_string(),
                    "the API server does not serve this kind; check the apiVersion or install its CRD in the catalog",
                )
            }
            SyncError::Kube(_) => CliError::cluster_with_help(
                err.to_string(),
                "check KUBECONFIG or the in-cluster service account",
            ),
            other => CliError::Cluster {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
