//! Fixed apply order
//!
//! The desired store is partitioned into phases that are applied one after
//! another. Every object belongs to exactly one phase; whatever no earlier
//! phase claims falls into [`Phase::Everything`].

use std::fmt;

use syncpod_core::{GroupKind, ObjectKey};

use crate::loader::DesiredStore;

/// One step of the apply sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// CustomResourceDefinition - new kinds must exist before their instances
    SchemaDefinitions = 0,
    /// Namespace - created before namespace-scoped objects
    Namespaces = 1,
    /// ServiceAccount
    ServiceAccounts = 2,
    /// ConfigMap, Secret
    Configuration = 3,
    /// StorageClass
    StorageClasses = 4,
    /// Everything else
    Everything = 5,
}

impl Phase {
    /// Application order
    pub const ORDER: [Phase; 6] = [
        Phase::SchemaDefinitions,
        Phase::Namespaces,
        Phase::ServiceAccounts,
        Phase::Configuration,
        Phase::StorageClasses,
        Phase::Everything,
    ];

    /// Phase an object of this kind belongs to
    pub fn of(gk: &GroupKind) -> Self {
        match (gk.group.as_str(), gk.kind.as_str()) {
            ("apiextensions.k8s.io", "CustomResourceDefinition") => Self::SchemaDefinitions,
            ("", "Namespace") => Self::Namespaces,
            ("", "ServiceAccount") => Self::ServiceAccounts,
            ("", "ConfigMap") | ("", "Secret") => Self::Configuration,
            ("storage.k8s.io", "StorageClass") => Self::StorageClasses,
            _ => Self::Everything,
        }
    }

    pub fn matches(&self, key: &ObjectKey) -> bool {
        Self::of(&key.group_kind) == *self
    }

    /// Whether discovery must be re-run before this phase starts
    ///
    /// Objects in the catch-all phase may be instances of kinds that an
    /// earlier phase just defined.
    pub fn refreshes_surface_before(&self) -> bool {
        matches!(self, Self::Everything)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SchemaDefinitions => "schema-definitions",
            Self::Namespaces => "namespaces",
            Self::ServiceAccounts => "service-accounts",
            Self::Configuration => "configuration",
            Self::StorageClasses => "storage-classes",
            Self::Everything => "everything",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Keys a pass would apply, grouped by phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhasePlan {
    pub phases: Vec<(Phase, Vec<ObjectKey>)>,
}

impl PhasePlan {
    /// Keys in application order
    pub fn keys(&self) -> impl Iterator<Item = &ObjectKey> {
        self.phases.iter().flat_map(|(_, keys)| keys.iter())
    }

    pub fn len(&self) -> usize {
        self.phases.iter().map(|(_, keys)| keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition the store into phases, in application order
///
/// Within a phase, keys keep the store's order.
pub fn plan(store: &DesiredStore) -> PhasePlan {
    PhasePlan {
        phases: Phase::ORDER
            .iter()
            .map(|phase| {
                let keys = store.keys().filter(|key| phase.matches(key)).cloned().collect();
                (*phase, keys)
            })
            .collect(),
    }
}
