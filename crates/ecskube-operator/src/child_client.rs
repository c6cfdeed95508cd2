//! Child Object Client
//!
//! This module provides the list and create calls the reconciler issues
//! against the Kubernetes API for managed ReplicaSets and Services. It wraps
//! `kube::Api` with operator-specific timeouts and error classification.

use crate::child::{ChildKind, ChildObject};
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Default timeout for a single list or create call
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Field manager recorded on created objects
pub const FIELD_MANAGER: &str = "ecskube-operator";

/// List and create access to one kind of child object
#[async_trait]
pub trait ChildClient: Send + Sync {
    /// Names of the children in `namespace` matching `selector`
    async fn list_labelled(&self, namespace: &str, selector: &str) -> Result<Vec<String>>;

    /// Create `child` in `namespace`.
    ///
    /// Fails with [`OperatorError::AlreadyExists`] if an object with the same
    /// name is already there, and with [`OperatorError::Rejected`] if the API
    /// server refuses the object as invalid.
    async fn create(&self, namespace: &str, child: &ChildObject) -> Result<()>;
}

/// Configuration for child clients
#[derive(Debug, Clone)]
pub struct ChildClientConfig {
    /// Timeout applied to each API call
    pub operation_timeout: Duration,
}

impl Default for ChildClientConfig {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// [`ChildClient`] backed by the Kubernetes API
pub struct KubeChildClient {
    client: Client,
    kind: ChildKind,
    config: ChildClientConfig,
}

impl KubeChildClient {
    /// Create a new child client with default configuration
    pub fn new(client: Client, kind: ChildKind) -> Self {
        Self::with_config(client, kind, ChildClientConfig::default())
    }

    /// Create a new child client with custom configuration
    pub fn with_config(client: Client, kind: ChildKind, config: ChildClientConfig) -> Self {
        Self {
            client,
            kind,
            config,
        }
    }

    async fn list_names<K>(&self, namespace: &str, selector: &str) -> Result<Vec<String>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug
            + Send
            + Sync
            + 'static,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(selector);

        let list = timeout(self.config.operation_timeout, api.list_metadata(&lp))
            .await
            .map_err(|_| {
                OperatorError::Timeout(format!(
                    "listing {} in {} timed out",
                    K::kind(&()),
                    namespace
                ))
            })??;

        Ok(list
            .items
            .into_iter()
            .filter_map(|obj| obj.metadata.name)
            .collect())
    }

    async fn create_object<K>(&self, namespace: &str, obj: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug
            + Send
            + Sync
            + 'static,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let name = obj.meta().name.clone().unwrap_or_default();
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        debug!(kind = %K::kind(&()), name = %name, namespace = %namespace, "Creating child");

        match timeout(self.config.operation_timeout, api.create(&pp, obj)).await {
            Err(_) => Err(OperatorError::Timeout(format!(
                "creating {} {}/{} timed out",
                K::kind(&()),
                namespace,
                name
            ))),
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(classify_create_error(e, &K::kind(&()), namespace, &name)),
        }
    }
}

/// Sort a failed create into "already there", "refused for good" and
/// transport errors
pub fn classify_create_error(
    error: kube::Error,
    kind: &str,
    namespace: &str,
    name: &str,
) -> OperatorError {
    match error {
        kube::Error::Api(ae) if ae.code == 409 => OperatorError::AlreadyExists {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        },
        kube::Error::Api(ae) if ae.code == 400 || ae.code == 422 => OperatorError::Rejected {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            reason: ae.message,
        },
        e => OperatorError::from(e),
    }
}

#[async_trait]
impl ChildClient for KubeChildClient {
    async fn list_labelled(&self, namespace: &str, selector: &str) -> Result<Vec<String>> {
        match self.kind {
            ChildKind::Workload => self.list_names::<ReplicaSet>(namespace, selector).await,
            ChildKind::Service => self.list_names::<Service>(namespace, selector).await,
        }
    }

    async fn create(&self, namespace: &str, child: &ChildObject) -> Result<()> {
        if child.kind() != self.kind {
            return Err(OperatorError::InvalidConfig(format!(
                "{} client cannot create a {}",
                self.kind,
                child.kind()
            )));
        }

        match child {
            ChildObject::Workload(rs) => self.create_object(namespace, rs).await,
            ChildObject::Service(svc) => self.create_object(namespace, svc).await,
        }
    }
}
