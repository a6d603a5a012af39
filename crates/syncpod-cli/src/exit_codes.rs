//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - unreadable or invalid configuration file
pub const CONFIG_ERROR: i32 = 2;

/// Template error - substitution failed in an asset
pub const TEMPLATE_ERROR: i32 = 3;

/// Asset error - an asset could not be read or decoded
pub const ASSET_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Cluster error - discovery, resolution or an API call failed
pub const CLUSTER_ERROR: i32 = 6;
