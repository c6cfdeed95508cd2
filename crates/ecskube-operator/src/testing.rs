//! In-memory stand-ins for the lister and the API server, used by unit tests

use crate::child::{ChildKind, ChildObject, ObjectKey};
use crate::child_client::ChildClient;
use crate::crd::{
    ContainerDefinition, ECSDeployment, ECSDeploymentSpec, KeyValuePair, LoadBalancer,
    PortMapping, ServiceDefinition, TaskDefinition, TaskProperties,
};
use crate::error::{OperatorError, Result};
use crate::store::DeploymentLister;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// `namespace/name` ECSDeployment with one nginx container and one load
/// balancer binding
pub fn deployment(namespace: &str, name: &str) -> ECSDeployment {
    let mut deployment = ECSDeployment::new(
        name,
        ECSDeploymentSpec {
            task: TaskDefinition {
                r#type: Some("AWS::ECS::TaskDefinition".to_string()),
                properties: TaskProperties {
                    cpu: None,
                    memory: None,
                    container_definitions: vec![ContainerDefinition {
                        name: "web".to_string(),
                        image: "nginx".to_string(),
                        port_mappings: vec![PortMapping {
                            container_port: 80,
                            host_port: None,
                            protocol: Some("tcp".to_string()),
                        }],
                        environment: vec![KeyValuePair {
                            name: "MODE".to_string(),
                            value: "prod".to_string(),
                        }],
                        cpu: Some(100),
                        memory: Some(128),
                        ..Default::default()
                    }],
                },
            },
            service: ServiceDefinition {
                desired_count: 1,
                load_balancers: vec![LoadBalancer {
                    container_name: "web".to_string(),
                    container_port: 80,
                    ..Default::default()
                }],
            },
        },
    );
    deployment.metadata.namespace = Some(namespace.to_string());
    deployment.metadata.uid = Some(format!("{}-{}-uid", namespace, name));
    deployment
}

#[derive(Default)]
pub struct InMemoryLister {
    deployments: Mutex<HashMap<ObjectKey, Arc<ECSDeployment>>>,
    lookups: AtomicUsize,
}

impl InMemoryLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, deployment: ECSDeployment) {
        let key = ObjectKey::from_resource(&deployment);
        self.deployments.lock().insert(key, Arc::new(deployment));
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl DeploymentLister for InMemoryLister {
    fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Arc<ECSDeployment>>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.deployments.lock().get(key).cloned())
    }
}

/// Fake API server for one child kind
pub struct InMemoryChildClient {
    kind: ChildKind,
    objects: Mutex<Vec<ChildObject>>,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
    fail_list: AtomicBool,
    fail_create: AtomicBool,
    conflict_on_create: AtomicBool,
    reject_create: AtomicBool,
}

impl InMemoryChildClient {
    pub fn new(kind: ChildKind) -> Self {
        Self {
            kind,
            objects: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            fail_list: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            conflict_on_create: AtomicBool::new(false),
            reject_create: AtomicBool::new(false),
        }
    }

    pub fn objects(&self) -> Vec<ChildObject> {
        self.objects.lock().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Answer creates with "already exists" without storing anything, like a
    /// concurrent creator winning the race
    pub fn conflict_on_create(&self, conflict: bool) {
        self.conflict_on_create.store(conflict, Ordering::SeqCst);
    }

    /// Answer creates with a validation failure, like a 422 from the API
    /// server
    pub fn reject_create(&self, reject: bool) {
        self.reject_create.store(reject, Ordering::SeqCst);
    }
}

fn matches_selector(obj: &ChildObject, selector: &str) -> bool {
    let labels = obj.metadata().labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl ChildClient for InMemoryChildClient {
    async fn list_labelled(&self, namespace: &str, selector: &str) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(OperatorError::Timeout(format!("listing {} failed", self.kind)));
        }
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|obj| obj.metadata().namespace.as_deref() == Some(namespace))
            .filter(|obj| matches_selector(obj, selector))
            .map(|obj| obj.name().to_string())
            .collect())
    }

    async fn create(&self, namespace: &str, child: &ChildObject) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(OperatorError::Timeout(format!("creating {} failed", self.kind)));
        }
        if self.reject_create.load(Ordering::SeqCst) {
            return Err(OperatorError::Rejected {
                kind: self.kind.to_string(),
                name: child.name().to_string(),
                namespace: namespace.to_string(),
                reason: "Invalid value".to_string(),
            });
        }
        let mut objects = self.objects.lock();
        let exists = objects.iter().any(|obj| {
            obj.metadata().namespace.as_deref() == Some(namespace) && obj.name() == child.name()
        });
        if exists || self.conflict_on_create.load(Ordering::SeqCst) {
            return Err(OperatorError::AlreadyExists {
                kind: self.kind.to_string(),
                name: child.name().to_string(),
                namespace: namespace.to_string(),
            });
        }
        objects.push(child.clone());
        Ok(())
    }
}
