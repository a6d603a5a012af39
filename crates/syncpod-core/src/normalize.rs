//! Normalization applied before desired and live objects are compared
//!
//! - [`apply_defaults`] fills in the values the API server would default,
//!   so a freshly loaded asset looks like what the server returns.
//! - [`strip_server_fields`] removes the fields only the server writes
//!   (timestamps, uids, managed fields, status) from a live object.
//!
//! Both operations are idempotent.

use base64::Engine as _;
use serde_json::{Map, Value, json};

use crate::object::Object;

/// Metadata fields owned by the API server
const SERVER_METADATA_FIELDS: &[&str] = &[
    "creationTimestamp",
    "deletionGracePeriodSeconds",
    "deletionTimestamp",
    "generation",
    "managedFields",
    "resourceVersion",
    "selfLink",
    "uid",
];

/// Client-side bookkeeping annotation written by kubectl
const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Remove server-owned fields from a live object
pub fn strip_server_fields(obj: &mut Object) {
    let metadata = obj.metadata_mut();
    for field in SERVER_METADATA_FIELDS {
        metadata.remove(*field);
    }

    let drop_annotations = match metadata.get_mut("annotations") {
        Some(Value::Object(annotations)) => {
            annotations.remove(LAST_APPLIED_ANNOTATION);
            annotations.is_empty()
        }
        Some(Value::Null) => true,
        _ => false,
    };
    if drop_annotations {
        metadata.remove("annotations");
    }

    if let Some(root) = obj.as_value_mut().as_object_mut() {
        root.remove("status");
    }
}

/// Apply API-server defaults for the kinds the catalog commonly carries
pub fn apply_defaults(obj: &mut Object) {
    let gvk = obj.gvk();
    let Some(root) = obj.as_value_mut().as_object_mut() else {
        return;
    };

    match (gvk.group.as_str(), gvk.kind.as_str()) {
        ("", "Secret") => default_secret(root),
        ("", "Service") => {
            if let Some(spec) = child_map(root, "spec") {
                default_service_spec(spec);
            }
        }
        ("", "Pod") => {
            if let Some(spec) = child_map(root, "spec") {
                default_pod_spec(spec);
            }
        }
        ("apps", "Deployment") => {
            if let Some(spec) = child_map(root, "spec") {
                set_default(spec, "replicas", json!(1));
                set_default(spec, "revisionHistoryLimit", json!(10));
                set_default(spec, "progressDeadlineSeconds", json!(600));
                set_default(
                    spec,
                    "strategy",
                    json!({
                        "type": "RollingUpdate",
                        "rollingUpdate": {"maxSurge": "25%", "maxUnavailable": "25%"}
                    }),
                );
                default_pod_template(spec);
            }
        }
        ("apps", "DaemonSet") => {
            if let Some(spec) = child_map(root, "spec") {
                set_default(spec, "revisionHistoryLimit", json!(10));
                set_default(
                    spec,
                    "updateStrategy",
                    json!({
                        "type": "RollingUpdate",
                        "rollingUpdate": {"maxSurge": 0, "maxUnavailable": 1}
                    }),
                );
                default_pod_template(spec);
            }
        }
        ("apps", "StatefulSet") => {
            if let Some(spec) = child_map(root, "spec") {
                set_default(spec, "replicas", json!(1));
                set_default(spec, "revisionHistoryLimit", json!(10));
                set_default(spec, "podManagementPolicy", json!("OrderedReady"));
                set_default(
                    spec,
                    "updateStrategy",
                    json!({"type": "RollingUpdate", "rollingUpdate": {"partition": 0}}),
                );
                default_pod_template(spec);
            }
        }
        ("batch", "Job") => {
            if let Some(spec) = child_map(root, "spec") {
                set_default(spec, "backoffLimit", json!(6));
                default_pod_template(spec);
            }
        }
        ("batch", "CronJob") => {
            if let Some(spec) = child_map(root, "spec") {
                set_default(spec, "concurrencyPolicy", json!("Allow"));
                set_default(spec, "suspend", json!(false));
                set_default(spec, "successfulJobsHistoryLimit", json!(3));
                set_default(spec, "failedJobsHistoryLimit", json!(1));
                if let Some(job_spec) =
                    child_map(spec, "jobTemplate").and_then(|t| child_map(t, "spec"))
                {
                    set_default(job_spec, "backoffLimit", json!(6));
                    default_pod_template(job_spec);
                }
            }
        }
        ("storage.k8s.io", "StorageClass") => {
            set_default(root, "reclaimPolicy", json!("Delete"));
            set_default(root, "volumeBindingMode", json!("Immediate"));
        }
        _ => {}
    }
}

/// Live Secrets never carry `stringData`; fold it into base64 `data`
fn default_secret(root: &mut Map<String, Value>) {
    set_default(root, "type", json!("Opaque"));

    let Some(Value::Object(string_data)) = root.remove("stringData") else {
        return;
    };
    let data = root
        .entry("data")
        .or_insert_with(|| Value::Object(Map::new()));
    if !data.is_object() {
        *data = Value::Object(Map::new());
    }
    if let Value::Object(data) = data {
        for (key, value) in string_data {
            let plain = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            let encoded = base64::engine::general_purpose::STANDARD.encode(plain.as_bytes());
            data.insert(key, Value::String(encoded));
        }
    }
}

fn default_service_spec(spec: &mut Map<String, Value>) {
    set_default(spec, "type", json!("ClusterIP"));
    set_default(spec, "sessionAffinity", json!("None"));

    if let Some(Value::Array(ports)) = spec.get_mut("ports") {
        for port in ports.iter_mut().filter_map(Value::as_object_mut) {
            set_default(port, "protocol", json!("TCP"));
            if let Some(number) = port.get("port").cloned() {
                set_default(port, "targetPort", number);
            }
        }
    }
}

fn default_pod_template(spec: &mut Map<String, Value>) {
    if let Some(pod_spec) = child_map(spec, "template").and_then(|t| child_map(t, "spec")) {
        default_pod_spec(pod_spec);
    }
}

fn default_pod_spec(spec: &mut Map<String, Value>) {
    set_default(spec, "restartPolicy", json!("Always"));
    set_default(spec, "dnsPolicy", json!("ClusterFirst"));
    set_default(spec, "schedulerName", json!("default-scheduler"));
    set_default(spec, "securityContext", json!({}));
    set_default(spec, "terminationGracePeriodSeconds", json!(30));

    for list in ["initContainers", "containers"] {
        if let Some(Value::Array(containers)) = spec.get_mut(list) {
            for container in containers.iter_mut().filter_map(Value::as_object_mut) {
                default_container(container);
            }
        }
    }
}

fn default_container(container: &mut Map<String, Value>) {
    set_default(container, "terminationMessagePath", json!("/dev/termination-log"));
    set_default(container, "terminationMessagePolicy", json!("File"));
    set_default(container, "resources", json!({}));

    let pull_policy = container
        .get("image")
        .and_then(Value::as_str)
        .map(default_pull_policy);
    if let Some(policy) = pull_policy {
        set_default(container, "imagePullPolicy", json!(policy));
    }

    if let Some(Value::Array(ports)) = container.get_mut("ports") {
        for port in ports.iter_mut().filter_map(Value::as_object_mut) {
            set_default(port, "protocol", json!("TCP"));
        }
    }
}

/// `Always` for untagged or `:latest` images, `IfNotPresent` otherwise
fn default_pull_policy(image: &str) -> &'static str {
    if image.contains('@') {
        return "IfNotPresent";
    }
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    match last_segment.rsplit_once(':') {
        Some((_, "latest")) | None => "Always",
        Some(_) => "IfNotPresent",
    }
}

fn child_map<'a>(map: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    map.get_mut(key).and_then(Value::as_object_mut)
}

fn set_default(map: &mut Map<String, Value>, key: &str, value: Value) {
    if !map.contains_key(key) {
        map.insert(key.to_string(), value);
    }
}
