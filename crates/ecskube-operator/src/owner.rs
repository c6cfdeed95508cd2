//! Owner linkage
//!
//! Maps a changed child object back to the ECSDeployment that owns it, so
//! child events can be turned into reconcile requests for the parent.

use crate::child::{ObjectKey, ObservedChild};
use crate::crd::{OWNER_API_VERSION, OWNER_KIND};

/// Resolve the ECSDeployment owning `child`.
///
/// Returns `None` for children with zero or several owner references, or an
/// owner of another kind or API version. Such children are not ours and
/// their events are dropped.
pub fn resolve_owner(child: &ObservedChild) -> Option<ObjectKey> {
    match child.owner_references.as_slice() {
        [owner] if owner.kind == OWNER_KIND && owner.api_version == OWNER_API_VERSION => {
            Some(ObjectKey::new(child.namespace.clone(), owner.name.clone()))
        }
        _ => None,
    }
}
