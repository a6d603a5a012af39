//! syncpod Core - shared types for the syncpod reconciliation engine
//!
//! This crate provides the foundational types used throughout syncpod:
//! - `Configuration`: Runtime configuration supplied by the control loop
//! - `Object`: Dynamically-typed remote object with integer/float fidelity
//! - `ObjectKey`: Identity of an object (group, kind, namespace, name)
//! - `AssetProvider`: Source of raw manifest bytes
//! - `normalize`: Server-default normalization used before comparison

pub mod assets;
pub mod config;
pub mod error;
pub mod normalize;
pub mod object;

pub use assets::{AssetProvider, DirAssets, EmbeddedAssets};
pub use config::{
    Configuration, IdentityConfig, KindPolicy, LabelKeys, LoaderConfig, RetryConfig,
    DEFAULT_SYNC_INTERVAL,
};
pub use error::{CoreError, Result};
pub use object::{GroupKind, GroupVersionKind, Object, ObjectKey, decode_documents};
