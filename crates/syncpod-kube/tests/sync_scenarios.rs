//! End-to-end sync passes against the in-memory cluster

use std::sync::Arc;
use std::time::Duration;

use syncpod_core::{Configuration, EmbeddedAssets, GroupKind, Object, ObjectKey};
use syncpod_kube::{ApiErrorKind, FaultVerb, MockCluster, RetryReason, SyncEngine, SyncError};

const NAMESPACE: &[u8] = b"apiVersion: v1
kind: Namespace
metadata:
  name: ns-a
  labels:
    api.openshift.com/managed: \"true\"
";

const CONFIGMAP: &[u8] = b"apiVersion: v1
kind: ConfigMap
metadata:
  name: cm-1
  namespace: ns-a
  labels:
    api.openshift.com/managed: \"true\"
data:
  issuer: \"{{ config.identityURL }}\"
";

const AWS_ONLY: &[u8] = b"apiVersion: v1
kind: ConfigMap
metadata:
  name: aws-settings
  namespace: ns-a
  labels:
    api.openshift.com/managed: \"true\"
    hive.openshift.io/cluster-platform: aws
data:
  region: us-east-1
";

const CRD: &[u8] = b"apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: widgets.example.com
  labels:
    api.openshift.com/managed: \"true\"
spec:
  group: example.com
  scope: Namespaced
  names:
    kind: Widget
    plural: widgets
  versions:
    - name: v1
      served: true
      storage: true
";

const WIDGET: &[u8] = b"apiVersion: example.com/v1
kind: Widget
metadata:
  name: gadget
  namespace: ns-a
  labels:
    api.openshift.com/managed: \"true\"
spec:
  size: 3
";

fn config() -> Configuration {
    let mut config = Configuration::from_yaml(
        r#"
platform: gcp
config:
  identityURL: https://sso.example.com
"#,
    )
    .expect("valid configuration");
    config.retry.backoff = Duration::from_millis(1);
    config
}

fn assets(entries: &[(&str, &'static [u8])]) -> Arc<EmbeddedAssets> {
    Arc::new(EmbeddedAssets::new(entries))
}

fn ns_key(name: &str) -> ObjectKey {
    ObjectKey::new(GroupKind::core("Namespace"), "", name)
}

fn cm_key(name: &str) -> ObjectKey {
    ObjectKey::new(GroupKind::core("ConfigMap"), "ns-a", name)
}

fn owned_configmap(name: &str, owned: bool) -> Object {
    let mut labels = String::from("    api.openshift.com/managed: \"true\"\n");
    if owned {
        labels.push_str("    syncpod.io/owned: \"true\"\n");
    }
    Object::from_yaml(
        &format!(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\n  namespace: ns-a\n  labels:\n{}data:\n  stale: \"yes\"\n",
            name, labels
        ),
        "seed",
    )
    .expect("valid seed object")
}

async fn engine(cluster: &MockCluster, entries: &[(&str, &'static [u8])]) -> SyncEngine<MockCluster> {
    SyncEngine::new(config(), cluster.clone(), assets(entries))
        .await
        .expect("engine builds")
}

mod first_pass {
    use super::*;

    #[tokio::test]
    async fn test_namespace_created_before_its_configmap() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("cm.yaml", CONFIGMAP), ("ns.yaml", NAMESPACE)]).await;

        let outcome = engine.sync().await.unwrap();

        assert_eq!(outcome.created, vec![ns_key("ns-a"), cm_key("cm-1")]);
        let ns_at = cluster.position(FaultVerb::Create, &ns_key("ns-a")).unwrap();
        let cm_at = cluster.position(FaultVerb::Create, &cm_key("cm-1")).unwrap();
        assert!(ns_at < cm_at);

        let cm = cluster.get_object(&cm_key("cm-1")).unwrap();
        assert_eq!(cm.as_value()["data"]["issuer"], "https://sso.example.com");
        assert_eq!(cm.label("syncpod.io/owned"), Some("true"));
    }

    #[tokio::test]
    async fn test_crd_applied_before_its_instances() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("widget.yaml", WIDGET), ("crd.yaml", CRD), ("ns.yaml", NAMESPACE)]).await;
        assert!(!engine.surface().has_group("example.com"));

        let outcome = engine.sync().await.unwrap();

        let widget = ObjectKey::new(GroupKind::new("example.com", "Widget"), "ns-a", "gadget");
        assert!(outcome.created.contains(&widget));
        assert!(engine.surface().has_group("example.com"));
        let crd = ObjectKey::new(
            GroupKind::new("apiextensions.k8s.io", "CustomResourceDefinition"),
            "",
            "widgets.example.com",
        );
        assert!(
            cluster.position(FaultVerb::Create, &crd).unwrap()
                < cluster.position(FaultVerb::Create, &widget).unwrap()
        );
        assert_eq!(
            cluster.get_object(&widget).unwrap().as_value()["spec"]["size"],
            3
        );
    }

    #[tokio::test]
    async fn test_platform_excluded_asset_never_written() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("aws.yaml", AWS_ONLY)]).await;

        let outcome = engine.sync().await.unwrap();

        assert_eq!(outcome.created, vec![ns_key("ns-a")]);
        assert!(!cluster.contains(&cm_key("aws-settings")));
        assert!(cluster.position(FaultVerb::Create, &cm_key("aws-settings")).is_none());
    }

    #[tokio::test]
    async fn test_unknown_kind_aborts_pass() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("widget.yaml", WIDGET)]).await;

        let err = engine.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::GroupNotFound { .. }));
        // Earlier phases were still applied
        assert!(cluster.contains(&ns_key("ns-a")));
    }
}

mod steady_state {
    use super::*;

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("cm.yaml", CONFIGMAP), ("crd.yaml", CRD), ("widget.yaml", WIDGET)]).await;
        engine.sync().await.unwrap();
        cluster.reset_counts();

        let outcome = engine.sync().await.unwrap();

        assert_eq!(cluster.operation_counts().writes(), 0);
        assert!(!outcome.has_changes());
        assert_eq!(outcome.unchanged.len(), 4);
        assert_eq!(outcome.summary(), "No changes");
    }

    #[tokio::test]
    async fn test_server_namespace_label_is_not_drift() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE)]).await;
        engine.sync().await.unwrap();
        let live = cluster.get_object(&ns_key("ns-a")).unwrap();
        assert_eq!(live.label("kubernetes.io/metadata.name"), Some("ns-a"));
        cluster.reset_counts();

        let outcome = engine.sync().await.unwrap();

        assert_eq!(outcome.unchanged, vec![ns_key("ns-a")]);
        assert_eq!(cluster.operation_counts().writes(), 0);
    }

    #[tokio::test]
    async fn test_drift_is_reverted() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("cm.yaml", CONFIGMAP)]).await;
        engine.sync().await.unwrap();

        let mut drifted = cluster.get_object(&cm_key("cm-1")).unwrap();
        drifted.as_value_mut()["data"]["issuer"] = serde_json::json!("https://evil.example.com");
        cluster.seed(drifted);

        let outcome = engine.sync().await.unwrap();
        assert_eq!(outcome.updated, vec![cm_key("cm-1")]);
        assert_eq!(
            cluster.get_object(&cm_key("cm-1")).unwrap().as_value()["data"]["issuer"],
            "https://sso.example.com"
        );
    }

    #[tokio::test]
    async fn test_reload_changes_desired_state() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("cm.yaml", CONFIGMAP)]).await;
        engine.sync().await.unwrap();

        let mut next = config();
        next.config.identity_url = "https://sso2.example.com".to_string();
        engine.reload(next).await.unwrap();

        let outcome = engine.sync().await.unwrap();
        assert_eq!(outcome.updated, vec![cm_key("cm-1")]);
        assert_eq!(outcome.summary(), "1 updated");
    }
}

mod orphans {
    use super::*;

    #[tokio::test]
    async fn test_owned_orphan_deleted_foreign_kept() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("cm.yaml", CONFIGMAP)]).await;
        engine.sync().await.unwrap();

        cluster.seed(owned_configmap("cm-2", true));
        cluster.seed(owned_configmap("someone-elses", false));

        let outcome = engine.sync().await.unwrap();

        assert_eq!(outcome.deleted, vec![cm_key("cm-2")]);
        assert!(!cluster.contains(&cm_key("cm-2")));
        assert!(cluster.contains(&cm_key("someone-elses")));
        assert!(cluster.contains(&cm_key("cm-1")));
    }

    #[tokio::test]
    async fn test_platform_switch_collects_excluded_objects() {
        let cluster = MockCluster::with_core_resources();
        let mut on_aws = config();
        on_aws.platform = "aws".to_string();
        let engine = SyncEngine::new(
            on_aws,
            cluster.clone(),
            assets(&[("ns.yaml", NAMESPACE), ("aws.yaml", AWS_ONLY)]),
        )
        .await
        .unwrap();
        engine.sync().await.unwrap();
        assert!(cluster.contains(&cm_key("aws-settings")));

        engine.reload(config()).await.unwrap();
        let outcome = engine.sync().await.unwrap();

        assert_eq!(outcome.deleted, vec![cm_key("aws-settings")]);
        assert!(outcome.created.is_empty());
        assert!(cluster.contains(&ns_key("ns-a")));
    }
}

mod scope {
    use super::*;

    const NAMESPACED_ROLE: &[u8] = b"apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: reader
  namespace: ns-a
  labels:
    api.openshift.com/managed: \"true\"
rules: []
";

    const UNSCOPED_CONFIGMAP: &[u8] = b"apiVersion: v1
kind: ConfigMap
metadata:
  name: floating
  labels:
    api.openshift.com/managed: \"true\"
";

    fn role_key() -> ObjectKey {
        ObjectKey::new(GroupKind::new("rbac.authorization.k8s.io", "ClusterRole"), "", "reader")
    }

    #[tokio::test]
    async fn test_cluster_scoped_object_with_namespace_settles() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("role.yaml", NAMESPACED_ROLE)]).await;

        let first = engine.sync().await.unwrap();
        assert_eq!(first.created, vec![ns_key("ns-a"), role_key()]);
        assert!(first.deleted.is_empty());

        for _ in 0..2 {
            cluster.reset_counts();
            let outcome = engine.sync().await.unwrap();
            assert!(outcome.deleted.is_empty());
            assert!(!outcome.has_changes());
            assert_eq!(cluster.operation_counts().writes(), 0);
        }
        assert!(cluster.contains(&role_key()));
    }

    #[tokio::test]
    async fn test_namespaced_object_without_namespace_rejected() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("cm.yaml", UNSCOPED_CONFIGMAP)]).await;

        let err = engine.sync().await.unwrap_err();

        assert!(matches!(err, SyncError::MissingNamespace { .. }));
        assert_eq!(cluster.operation_counts().creates, 1);
        assert_eq!(cluster.operation_counts().deletes, 0);
    }
}

mod periodic {
    use super::*;

    #[tokio::test]
    async fn test_discovery_failure_fails_pass() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE)]).await;
        cluster.inject(FaultVerb::Discover, ApiErrorKind::Other, 1);

        let err = engine.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::Discovery(_)));

        let outcome = engine.sync().await.unwrap();
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.unchanged, vec![ns_key("ns-a")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_failed_ticks() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("crd.yaml", CRD), ("widget.yaml", WIDGET)]).await;
        cluster.inject(FaultVerb::Discover, ApiErrorKind::Other, 2);
        cluster.reset_counts();

        // Ticks at 0s, 10s, 20s and 30s
        let ran = tokio::time::timeout(Duration::from_secs(35), engine.sync_periodic(Duration::from_secs(10))).await;
        assert!(ran.is_err(), "periodic loop never returns");

        let widget = ObjectKey::new(GroupKind::new("example.com", "Widget"), "ns-a", "gadget");
        assert!(cluster.contains(&widget));
        assert_eq!(cluster.operation_counts().discovers, 4);
        assert_eq!(cluster.operation_counts().creates, 3);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn test_conflicts_within_budget_converge() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("cm.yaml", CONFIGMAP)]).await;
        engine.sync().await.unwrap();
        cluster.seed(owned_configmap("cm-1", true));
        cluster.inject(FaultVerb::Update, ApiErrorKind::Conflict, 4);

        let outcome = engine.sync().await.unwrap();
        assert_eq!(outcome.updated, vec![cm_key("cm-1")]);
        assert_eq!(cluster.operation_counts().updates, 5);
    }

    #[tokio::test]
    async fn test_persistent_conflict_fails_pass() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("cm.yaml", CONFIGMAP)]).await;
        engine.sync().await.unwrap();
        cluster.seed(owned_configmap("cm-1", true));
        cluster.inject(FaultVerb::Update, ApiErrorKind::Conflict, 100);

        let err = engine.sync().await.unwrap_err();
        match err {
            SyncError::RetriesExhausted { attempts, reason, .. } => {
                assert_eq!(attempts, 5);
                assert_eq!(reason, RetryReason::Conflict);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_race_recovers() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("cm.yaml", CONFIGMAP)]).await;
        cluster.race_create(owned_configmap("cm-1", false));

        let outcome = engine.sync().await.unwrap();
        assert_eq!(outcome.updated, vec![cm_key("cm-1")]);
        assert_eq!(
            cluster.get_object(&cm_key("cm-1")).unwrap().label("syncpod.io/owned"),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_overlapping_passes_serialize() {
        let cluster = MockCluster::with_core_resources();
        let engine = engine(&cluster, &[("ns.yaml", NAMESPACE), ("cm.yaml", CONFIGMAP)]).await;

        let (a, b) = tokio::join!(engine.sync(), engine.sync());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.writes() + b.writes(), 2);
        assert_eq!(cluster.operation_counts().creates, 2);
    }
}

mod immutable {
    use super::*;

    const CLASS_V1: &[u8] = b"apiVersion: storage.k8s.io/v1
kind: StorageClass
metadata:
  name: fast
  labels:
    api.openshift.com/managed: \"true\"
provisioner: kubernetes.io/gce-pd
parameters:
  type: pd-standard
";

    const CLASS_V2: &[u8] = b"apiVersion: storage.k8s.io/v1
kind: StorageClass
metadata:
  name: fast
  labels:
    api.openshift.com/managed: \"true\"
provisioner: kubernetes.io/gce-pd
parameters:
  type: pd-ssd
";

    #[tokio::test]
    async fn test_immutable_change_recreates() {
        let cluster = MockCluster::with_core_resources();
        cluster.mark_immutable(GroupKind::new("storage.k8s.io", "StorageClass"), "parameters");

        let first = engine(&cluster, &[("sc.yaml", CLASS_V1)]).await;
        first.sync().await.unwrap();

        let second = engine(&cluster, &[("sc.yaml", CLASS_V2)]).await;
        let outcome = second.sync().await.unwrap();

        let key = ObjectKey::new(GroupKind::new("storage.k8s.io", "StorageClass"), "", "fast");
        assert_eq!(outcome.recreated, vec![key.clone()]);
        assert_eq!(
            cluster.get_object(&key).unwrap().as_value()["parameters"]["type"],
            "pd-ssd"
        );
    }
}
