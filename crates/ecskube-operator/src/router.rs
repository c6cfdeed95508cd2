//! Event routing
//!
//! Maps ReplicaSet and Service watch events to the ECSDeployment that owns
//! them, so the controller reconciles the parent. ECSDeployment events are
//! the controller's own watch and need no mapping. Children without a valid
//! owner produce no work.

use crate::child::{ChildKind, ObjectKey, ObservedChild};
use crate::controller::{ChildBinding, OwnerResolver};
use crate::crd::ECSDeployment;
use kube::runtime::reflector::ObjectRef;
use kube::Resource;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Dispatches child events to the owning ECSDeployment
pub struct EventRouter {
    resolvers: HashMap<ChildKind, OwnerResolver>,
}

impl EventRouter {
    pub fn new(bindings: &[ChildBinding]) -> Self {
        Self {
            resolvers: bindings
                .iter()
                .map(|binding| (binding.kind, binding.resolve_owner))
                .collect(),
        }
    }

    /// Key of the ECSDeployment to reconcile for a changed child, if any
    pub fn route(&self, child: &ObservedChild) -> Option<ObjectKey> {
        let Some(resolve) = self.resolvers.get(&child.kind) else {
            debug!(kind = %child.kind, "No binding registered for child kind");
            return None;
        };

        let key = resolve(child);
        if key.is_none() {
            trace!(
                kind = %child.kind,
                namespace = %child.namespace,
                name = %child.name,
                "Ignoring child without an ECSDeployment owner"
            );
        }
        key
    }

    /// Watch mapper for one child kind, as taken by `Controller::watches`.
    ///
    /// The raw object is reduced to an [`ObservedChild`] here and nowhere
    /// else.
    pub fn mapper<K>(
        self: &Arc<Self>,
        kind: ChildKind,
    ) -> impl Fn(K) -> Option<ObjectRef<ECSDeployment>> + Send + Sync + 'static
    where
        K: Resource + 'static,
    {
        let router = Arc::clone(self);
        move |obj: K| {
            router
                .route(&ObservedChild::from_resource(kind, &obj))
                .map(|key| deployment_ref(&key))
        }
    }
}

/// Controller runtime reference of the ECSDeployment behind `key`
pub fn deployment_ref(key: &ObjectKey) -> ObjectRef<ECSDeployment> {
    ObjectRef::new(&key.name).within(&key.namespace)
}
