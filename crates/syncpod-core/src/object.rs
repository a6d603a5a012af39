//! Generic object model for remote API objects
//!
//! Objects are kept as a `serde_json::Value` with insertion-ordered maps.
//! Numbers keep their integer or floating-point identity from the source
//! document, so an integer field never round-trips through `f64`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{CoreError, Result};

/// API group and kind, without version
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKind {
    /// API group ("" for the core group)
    #[serde(default)]
    pub group: String,
    /// Object kind
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }

    /// Core-group kind such as `Namespace` or `ConfigMap`
    pub fn core(kind: impl Into<String>) -> Self {
        Self::new("", kind)
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Group-Version-Kind triple
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Split an apiVersion into group and version
    ///
    /// - "apps/v1" -> group="apps", version="v1"
    /// - "v1" -> group="", version="v1" (core API)
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.rsplit_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group.clone(), self.kind.clone())
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Identity of an object in the desired store
///
/// Unique per (GroupKind, namespace, name). Cluster-scoped objects have an
/// empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub group_kind: GroupKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(group_kind: GroupKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group_kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.group_kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.group_kind, self.namespace, self.name)
        }
    }
}

/// A dynamically-typed API object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object(Value);

impl Object {
    /// Wrap a decoded value, checking the fields every object must carry
    pub fn from_value(value: Value, source_name: &str) -> Result<Self> {
        let invalid = |message: &str| CoreError::InvalidObject {
            source_name: source_name.to_string(),
            message: message.to_string(),
        };

        let map = value
            .as_object()
            .ok_or_else(|| invalid("document is not a mapping"))?;
        if !map.get("apiVersion").is_some_and(Value::is_string) {
            return Err(invalid("missing apiVersion"));
        }
        if !map.get("kind").is_some_and(Value::is_string) {
            return Err(invalid("missing kind"));
        }
        let has_name = map
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .is_some_and(|n| !n.is_empty());
        if !has_name {
            return Err(invalid("missing metadata.name"));
        }

        Ok(Self(value))
    }

    /// Parse a single JSON or YAML document
    pub fn from_yaml(yaml: &str, source_name: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value, source_name)
    }

    pub fn api_version(&self) -> &str {
        self.0.get("apiVersion").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.0.get("kind").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::from_api_version(self.api_version(), self.kind())
    }

    pub fn group_kind(&self) -> GroupKind {
        self.gvk().group_kind()
    }

    pub fn name(&self) -> &str {
        self.metadata()
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Namespace, or `None` for cluster-scoped objects
    pub fn namespace(&self) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(
            self.group_kind(),
            self.namespace().unwrap_or_default(),
            self.name(),
        )
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get("labels"))
            .and_then(|l| l.get(key))
            .and_then(Value::as_str)
    }

    /// True when the label is present with a non-empty value
    pub fn has_label(&self, key: &str) -> bool {
        self.label(key).is_some_and(|v| !v.is_empty())
    }

    pub fn set_label(&mut self, key: &str, value: &str) {
        let labels = self
            .metadata_mut()
            .entry("labels")
            .or_insert_with(|| Value::Object(Map::new()));
        if !labels.is_object() {
            *labels = Value::Object(Map::new());
        }
        if let Some(labels) = labels.as_object_mut() {
            labels.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get("resourceVersion"))
            .and_then(Value::as_str)
            .filter(|rv| !rv.is_empty())
    }

    /// Set or clear `metadata.resourceVersion`
    pub fn set_resource_version(&mut self, rv: Option<&str>) {
        let metadata = self.metadata_mut();
        match rv {
            Some(rv) => {
                metadata.insert("resourceVersion".to_string(), Value::String(rv.to_string()));
            }
            None => {
                metadata.remove("resourceVersion");
            }
        }
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("metadata").and_then(Value::as_object)
    }

    /// Mutable `metadata`, created when absent
    pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let root = self.root_mut();
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        match metadata {
            Value::Object(map) => map,
            _ => unreachable!("metadata was just replaced by a mapping"),
        }
    }

    fn root_mut(&mut self) -> &mut Map<String, Value> {
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }
        match &mut self.0 {
            Value::Object(map) => map,
            _ => unreachable!("root was just replaced by a mapping"),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn as_value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Render as a YAML document (without the leading `---`)
    pub fn to_yaml(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(&self.0)?;
        Ok(yaml.trim_start_matches("---\n").to_string())
    }
}

/// Decode every document of a YAML or JSON asset
///
/// Empty documents (a bare `---` or comments only) are skipped.
pub fn decode_documents(bytes: &[u8], source_name: &str) -> Result<Vec<Object>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(bytes) {
        let value = Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        objects.push(Object::from_value(value, source_name)?);
    }
    Ok(objects)
}
