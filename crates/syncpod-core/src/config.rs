//! Runtime configuration
//!
//! The configuration is supplied by the control loop when the engine is
//! built and again whenever it changes. It is usually read from a YAML file:
//!
//! ```yaml
//! platform: gcp
//! syncInterval: 5m
//! config:
//!   identityName: corp-sso
//!   identityURL: https://sso.example.com
//! values:
//!   replicas: 2
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::object::GroupKind;

/// Interval between periodic passes when `syncInterval` is not set
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Target platform identifier (e.g. "aws", "gcp")
    pub platform: String,

    /// Identity provider and cluster settings used by templates
    #[serde(default)]
    pub config: IdentityConfig,

    /// Arbitrary templating data, exposed to templates as `values`
    #[serde(default = "empty_values")]
    pub values: JsonValue,

    /// Interval between periodic passes
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub sync_interval: Option<Duration>,

    #[serde(default)]
    pub labels: LabelKeys,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub kinds: KindPolicy,

    #[serde(default)]
    pub loader: LoaderConfig,
}

fn empty_values() -> JsonValue {
    JsonValue::Object(serde_json::Map::new())
}

impl Configuration {
    /// Minimal configuration for a platform, everything else defaulted
    pub fn for_platform(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            config: IdentityConfig::default(),
            values: empty_values(),
            sync_interval: None,
            labels: LabelKeys::default(),
            retry: RetryConfig::default(),
            kinds: KindPolicy::default(),
            loader: LoaderConfig::default(),
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.platform.trim().is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "platform must not be empty".to_string(),
            });
        }
        if self.retry.attempts == 0 {
            return Err(CoreError::InvalidConfig {
                message: "retry.attempts must be at least 1".to_string(),
            });
        }
        if !self.values.is_object() && !self.values.is_null() {
            return Err(CoreError::InvalidConfig {
                message: "values must be a mapping".to_string(),
            });
        }
        Ok(())
    }

    /// Effective interval between periodic passes
    pub fn interval(&self) -> Duration {
        self.sync_interval.unwrap_or(DEFAULT_SYNC_INTERVAL)
    }
}

/// Identity provider and per-cluster settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityConfig {
    #[serde(rename = "telemeterServerURL")]
    pub telemeter_server_url: String,

    pub identity_attr_email: String,
    #[serde(rename = "identityAttrID")]
    pub identity_attr_id: String,
    pub identity_attr_name: String,
    pub identity_attr_preferred_username: String,
    pub identity_bind_name: String,
    #[serde(rename = "identityURL")]
    pub identity_url: String,
    pub identity_name: String,
    pub identity_mapping_method: String,

    #[serde(rename = "osdLdapCA")]
    pub osd_ldap_ca: String,
    /// Spelled `valeroOperatorImage` in existing configuration files
    #[serde(rename = "valeroOperatorImage")]
    pub velero_operator_image: String,
}

/// Label keys the engine reads and writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelKeys {
    /// Mandatory provenance label on every asset
    pub managed: String,
    /// Optional platform eligibility label
    pub platform: String,
    /// Ownership marker stamped on every written object
    pub owned: String,
}

impl Default for LabelKeys {
    fn default() -> Self {
        Self {
            managed: "api.openshift.com/managed".to_string(),
            platform: "hive.openshift.io/cluster-platform".to_string(),
            owned: "syncpod.io/owned".to_string(),
        }
    }
}

/// Bounded retry on optimistic-concurrency conflicts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Fixed pause between attempts
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(10),
        }
    }
}

/// Kind-specific special cases of one API ecosystem
///
/// None of these lists is assumed exhaustive; they are data so other API
/// surfaces can supply their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KindPolicy {
    /// Kinds that alias another kind served under a different group
    pub duplicates: Vec<GroupKind>,
    /// Kinds whose objects are projections of another kind
    pub derived: Vec<GroupKind>,
    /// `group/plural` resources that are never write targets
    pub virtual_resources: Vec<String>,
    /// Kinds whose contents are never compared in logs
    pub sensitive: Vec<GroupKind>,
}

impl Default for KindPolicy {
    fn default() -> Self {
        let aliases = [
            ("authorization.openshift.io", "ClusterRole"),
            ("authorization.openshift.io", "ClusterRoleBinding"),
            ("authorization.openshift.io", "Role"),
            ("authorization.openshift.io", "RoleBinding"),
            ("extensions", "DaemonSet"),
            ("extensions", "Deployment"),
            ("image.openshift.io", "ImageStreamTag"),
            ("extensions", "ReplicaSet"),
            ("project.openshift.io", "Project"),
            ("", "SecurityContextConstraints"),
        ];

        Self {
            duplicates: aliases
                .iter()
                .map(|(group, kind)| GroupKind::new(*group, *kind))
                .collect(),
            derived: vec![GroupKind::core("Endpoints")],
            virtual_resources: vec!["template.openshift.io/processedtemplates".to_string()],
            sensitive: vec![GroupKind::core("Secret")],
        }
    }
}

impl KindPolicy {
    pub fn is_duplicate(&self, gk: &GroupKind) -> bool {
        self.duplicates.contains(gk)
    }

    pub fn is_derived(&self, gk: &GroupKind) -> bool {
        self.derived.contains(gk)
    }

    pub fn is_virtual(&self, group: &str, plural: &str) -> bool {
        self.virtual_resources
            .iter()
            .any(|r| r.rsplit_once('/').unwrap_or(("", r.as_str())) == (group, plural))
    }

    pub fn is_sensitive(&self, gk: &GroupKind) -> bool {
        self.sensitive.contains(gk)
    }
}

/// Catalog loader tuning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderConfig {
    /// Concurrent asset workers; `None` uses the available parallelism
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl LoaderConfig {
    pub fn effective_workers(&self) -> usize {
        self.workers
            .filter(|w| *w > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(4)
    }
}
