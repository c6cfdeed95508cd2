//! Read-only access to ECSDeployment objects
//!
//! The reconciler only ever reads ECSDeployments. In the running operator
//! they come from the reflector cache fed by the ECSDeployment watch.

use crate::child::ObjectKey;
use crate::crd::ECSDeployment;
use crate::error::Result;
use kube::runtime::reflector::{ObjectRef, Store};
use std::sync::Arc;

/// Namespace-scoped lookup of ECSDeployments by name
pub trait DeploymentLister: Send + Sync {
    /// `Ok(None)` means the ECSDeployment does not exist (anymore)
    fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Arc<ECSDeployment>>>;
}

impl DeploymentLister for Store<ECSDeployment> {
    fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Arc<ECSDeployment>>> {
        let reference = ObjectRef::new(&key.name).within(&key.namespace);
        Ok(self.get(&reference))
    }
}
