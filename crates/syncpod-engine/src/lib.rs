//! syncpod Engine - template substitution for catalog assets
//!
//! This crate provides a MiniJinja-based engine that renders the string
//! fields of decoded assets against the runtime configuration, with:
//! - Helm-compatible filters (b64encode, toyaml, required, ...)
//! - Errors that name the asset and the field path that failed

pub mod engine;
pub mod error;
pub mod filters;

pub use engine::{Engine, EngineBuilder, TemplateContext, contains_template_syntax};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use filters::AVAILABLE_FILTERS;
