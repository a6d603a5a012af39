//! Engine error types

use miette::Diagnostic;
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    InvalidOperation,
    Other,
}

impl TemplateErrorKind {
    /// Convert to a code string for diagnostics
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::UndefinedVariable => "undefined_variable",
            Self::UnknownFilter => "unknown_filter",
            Self::UnknownFunction => "unknown_function",
            Self::SyntaxError => "syntax",
            Self::InvalidOperation => "invalid_operation",
            Self::Other => "render",
        }
    }

    fn from_minijinja(kind: minijinja::ErrorKind) -> Self {
        match kind {
            minijinja::ErrorKind::UndefinedError => Self::UndefinedVariable,
            minijinja::ErrorKind::UnknownFilter => Self::UnknownFilter,
            minijinja::ErrorKind::UnknownFunction => Self::UnknownFunction,
            minijinja::ErrorKind::SyntaxError => Self::SyntaxError,
            minijinja::ErrorKind::InvalidOperation => Self::InvalidOperation,
            _ => Self::Other,
        }
    }
}

/// Substitution failure in one field of one asset
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{asset}: {path}: {message}")]
#[diagnostic(code(syncpod::template::render))]
pub struct TemplateError {
    /// Asset the object came from
    pub asset: String,

    /// Field path inside the object, e.g. `spec.containers[0].image`
    pub path: String,

    /// Error message
    pub message: String,

    /// Error kind for categorization
    pub kind: TemplateErrorKind,

    /// Suggestion for fixing the error
    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Create a template error from a MiniJinja error
    pub fn from_minijinja(err: &minijinja::Error, asset: &str, path: &str) -> Self {
        let kind = TemplateErrorKind::from_minijinja(err.kind());
        let message = match err.detail() {
            Some(detail) => format!("{}: {}", err.kind(), detail),
            None => err.kind().to_string(),
        };

        let suggestion = match kind {
            TemplateErrorKind::UndefinedVariable => Some(
                "available roots are `config`, `values` and `platform`; check the key spelling in the configuration"
                    .to_string(),
            ),
            TemplateErrorKind::UnknownFilter => Some(format!(
                "available filters: {}",
                crate::filters::AVAILABLE_FILTERS.join(", ")
            )),
            _ => None,
        };

        Self {
            asset: asset.to_string(),
            path: path.to_string(),
            message,
            kind,
            suggestion,
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
