//! Child object types shared by the router and the reconciler
//!
//! Watch payloads are reduced to an [`ObservedChild`] once, at the router
//! boundary. Nothing downstream looks at the raw Kubernetes object again.

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::fmt;

/// `namespace/name` identifier of an ECSDeployment
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of any namespaced object. Objects without a namespace land in
    /// `default`.
    pub fn from_resource<K: Resource>(obj: &K) -> Self {
        Self::new(
            obj.namespace().unwrap_or_else(|| "default".to_string()),
            obj.name_any(),
        )
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kinds of child objects the operator manages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildKind {
    /// ReplicaSet running the task's containers
    Workload,
    /// LoadBalancer Service exposing the task
    Service,
}

impl ChildKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildKind::Workload => "ReplicaSet",
            ChildKind::Service => "Service",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A translated child ready to be created
#[derive(Clone, Debug, PartialEq)]
pub enum ChildObject {
    Workload(ReplicaSet),
    Service(Service),
}

impl ChildObject {
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildObject::Workload(_) => ChildKind::Workload,
            ChildObject::Service(_) => ChildKind::Service,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ChildObject::Workload(rs) => &rs.metadata,
            ChildObject::Service(svc) => &svc.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }
}

/// What the router knows about a changed child object
#[derive(Clone, Debug, PartialEq)]
pub struct ObservedChild {
    pub kind: ChildKind,
    pub namespace: String,
    pub name: String,
    pub owner_references: Vec<OwnerReference>,
}

impl ObservedChild {
    pub fn from_resource<K: Resource>(kind: ChildKind, obj: &K) -> Self {
        Self {
            kind,
            namespace: obj.namespace().unwrap_or_else(|| "default".to_string()),
            name: obj.name_any(),
            owner_references: obj.owner_references().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_display() {
        let key = ObjectKey::new("ns", "orders");
        assert_eq!(key.to_string(), "ns/orders");
    }

    #[test]
    fn test_object_key_defaults_namespace() {
        let rs = ReplicaSet {
            metadata: ObjectMeta {
                name: Some("orders".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(ObjectKey::from_resource(&rs), ObjectKey::new("default", "orders"));
    }

    #[test]
    fn test_observed_child_from_resource() {
        let svc = Service {
            metadata: ObjectMeta {
                name: Some("orders".to_string()),
                namespace: Some("ns".to_string()),
                owner_references: Some(vec![OwnerReference {
                    kind: "ECSDeployment".to_string(),
                    name: "orders".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            ..Default::default()
        };

        let observed = ObservedChild::from_resource(ChildKind::Service, &svc);
        assert_eq!(observed.kind, ChildKind::Service);
        assert_eq!(observed.namespace, "ns");
        assert_eq!(observed.name, "orders");
        assert_eq!(observed.owner_references.len(), 1);
    }

    #[test]
    fn test_child_object_accessors() {
        let rs = ReplicaSet {
            metadata: ObjectMeta {
                name: Some("orders".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let child = ChildObject::Workload(rs);
        assert_eq!(child.kind(), ChildKind::Workload);
        assert_eq!(child.name(), "orders");
        assert_eq!(ChildKind::Workload.to_string(), "ReplicaSet");
    }
}
