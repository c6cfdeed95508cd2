//! Kubernetes Resource Builders
//!
//! This module translates an ECSDeployment into the Kubernetes objects that
//! realize it: a ReplicaSet running the task's containers and a
//! LoadBalancer Service exposing the bound container port.
//!
//! Translation is pure. Nothing here talks to the API server.

use crate::crd::{
    ContainerDefinition, ECSDeployment, PortMapping, MARKER_LABEL, OWNER_API_VERSION, OWNER_KIND,
};
use crate::error::{OperatorError, Result};
use k8s_openapi::api::apps::v1::{ReplicaSet, ReplicaSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use tracing::warn;
use validator::Validate;

/// Annotation carrying the ECS target group of the load balancer binding
pub const TARGET_GROUP_ANNOTATION: &str = "ecskube.io/target-group-arn";

/// Annotation carrying the ECS load balancer name of the binding
pub const LOAD_BALANCER_NAME_ANNOTATION: &str = "ecskube.io/load-balancer-name";

/// Task-level cpu: a plain number of units, or `N vCPU` (`N * 1024` units)
static TASK_CPU_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([0-9]+)\s*(vcpu)?\s*$").expect("task cpu regex is valid")
});

/// Task-level memory: a plain number of MiB, or `N GB` (`N * 1024` MiB)
static TASK_MEMORY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([0-9]+)\s*(gb)?\s*$").expect("task memory regex is valid")
});

const DEFAULT_PROTOCOL: &str = "TCP";

/// Builder for generating Kubernetes resources from an ECSDeployment
pub struct ResourceBuilder<'a> {
    deployment: &'a ECSDeployment,
    name: String,
    namespace: String,
}

impl<'a> ResourceBuilder<'a> {
    /// Create a new resource builder
    pub fn new(deployment: &'a ECSDeployment) -> Result<Self> {
        let name = deployment.metadata.name.clone().ok_or_else(|| {
            OperatorError::InvalidConfig("ECSDeployment name is required".to_string())
        })?;

        let namespace = deployment
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());

        Ok(Self {
            deployment,
            name,
            namespace,
        })
    }

    /// Parent labels plus the marker label. Shared by every child and used
    /// as the pod selector.
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.deployment.metadata.labels.clone().unwrap_or_default();
        labels.insert(MARKER_LABEL.to_string(), self.name.clone());
        labels
    }

    /// Get owner reference for managed resources
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: OWNER_API_VERSION.to_string(),
            kind: OWNER_KIND.to_string(),
            name: self.name.clone(),
            uid: self.deployment.metadata.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn child_metadata(&self, annotations: Option<BTreeMap<String, String>>) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels()),
            annotations,
            owner_references: Some(vec![self.owner_reference()]),
            ..Default::default()
        }
    }

    /// Build the ReplicaSet running the task's containers
    pub fn build_replica_set(&self) -> Result<ReplicaSet> {
        let spec = &self.deployment.spec;
        let labels = self.labels();
        let definitions = &spec.task.properties.container_definitions;

        if definitions.is_empty() {
            return Err(OperatorError::InvalidConfig(format!(
                "{} has no container definitions",
                self.name
            )));
        }

        let mut seen = HashSet::with_capacity(definitions.len());
        if let Some(duplicate) = definitions.iter().find(|c| !seen.insert(c.name.as_str())) {
            return Err(OperatorError::InvalidConfig(format!(
                "container name '{}' is used more than once",
                duplicate.name
            )));
        }

        let containers = definitions
            .iter()
            .map(|c| self.build_container(c))
            .collect::<Result<Vec<_>>>()?;

        Ok(ReplicaSet {
            metadata: self.child_metadata(None),
            spec: Some(ReplicaSetSpec {
                replicas: Some(spec.service.desired_count),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: Some(PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers,
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn build_container(&self, definition: &ContainerDefinition) -> Result<Container> {
        if let Err(errors) = definition.validate() {
            return Err(OperatorError::InvalidConfig(format!(
                "container '{}': {}",
                definition.name, errors
            )));
        }

        let ports: Vec<ContainerPort> = definition
            .port_mappings
            .iter()
            .map(|mapping| ContainerPort {
                container_port: mapping.container_port,
                protocol: Some(protocol_for(mapping, &definition.name)),
                ..Default::default()
            })
            .collect();

        let env: Vec<EnvVar> = definition
            .environment
            .iter()
            .map(|pair| EnvVar {
                name: pair.name.clone(),
                value: Some(pair.value.clone()),
                ..Default::default()
            })
            .collect();

        Ok(Container {
            name: definition.name.clone(),
            image: Some(definition.image.clone()),
            command: non_empty(definition.entry_point.clone()),
            args: non_empty(definition.command.clone()),
            ports: non_empty(ports),
            env: non_empty(env),
            resources: self.build_resources(definition)?,
            ..Default::default()
        })
    }

    /// cpu/memory as identical requests and limits. Containers without their
    /// own sizing inherit the task-level values.
    fn build_resources(
        &self,
        definition: &ContainerDefinition,
    ) -> Result<Option<ResourceRequirements>> {
        let properties = &self.deployment.spec.task.properties;

        let cpu = match definition.cpu {
            Some(units) => Some(units),
            None => properties
                .cpu
                .as_deref()
                .map(|raw| parse_task_units(&TASK_CPU_REGEX, "Cpu", raw))
                .transpose()?,
        };
        let memory = match definition.memory {
            Some(units) => Some(units),
            None => properties
                .memory
                .as_deref()
                .map(|raw| parse_task_units(&TASK_MEMORY_REGEX, "Memory", raw))
                .transpose()?,
        };

        let mut quantities = BTreeMap::new();
        if let Some(cpu) = cpu {
            quantities.insert(
                "cpu".to_string(),
                quantity(&definition.name, "cpu", cpu, "m")?,
            );
        }
        if let Some(memory) = memory {
            quantities.insert(
                "memory".to_string(),
                quantity(&definition.name, "memory", memory, "M")?,
            );
        }

        if quantities.is_empty() {
            return Ok(None);
        }

        Ok(Some(ResourceRequirements {
            requests: Some(quantities.clone()),
            limits: Some(quantities),
            ..Default::default()
        }))
    }

    /// Build the LoadBalancer Service. Exactly one load balancer binding is
    /// supported.
    pub fn build_service(&self) -> Result<Service> {
        let spec = &self.deployment.spec;
        let bindings = &spec.service.load_balancers;

        if bindings.len() != 1 {
            return Err(OperatorError::UnsupportedConfiguration(format!(
                "exactly one load balancer is supported, {} has {}",
                self.name,
                bindings.len()
            )));
        }

        let mut annotations = BTreeMap::new();
        let ports: Vec<ServicePort> = bindings
            .iter()
            .map(|binding| {
                if let Some(ref arn) = binding.target_group_arn {
                    annotations.insert(TARGET_GROUP_ANNOTATION.to_string(), arn.clone());
                }
                if let Some(ref lb_name) = binding.load_balancer_name {
                    annotations.insert(LOAD_BALANCER_NAME_ANNOTATION.to_string(), lb_name.clone());
                }

                let mapping = spec
                    .task
                    .properties
                    .container_definitions
                    .iter()
                    .find(|c| c.name == binding.container_name)
                    .and_then(|c| {
                        c.port_mappings
                            .iter()
                            .find(|m| m.container_port == binding.container_port)
                    });

                let port = mapping
                    .and_then(|m| m.host_port)
                    .filter(|p| *p > 0)
                    .unwrap_or(binding.container_port);

                ServicePort {
                    port,
                    target_port: Some(IntOrString::Int(binding.container_port)),
                    protocol: Some(
                        mapping
                            .map(|m| protocol_for(m, &binding.container_name))
                            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
                    ),
                    ..Default::default()
                }
            })
            .collect();

        let annotations = if annotations.is_empty() {
            None
        } else {
            Some(annotations)
        };

        Ok(Service {
            metadata: self.child_metadata(annotations),
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".to_string()),
                selector: Some(self.labels()),
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

/// Kubernetes protocol for a port mapping. Unknown protocols fall back to TCP.
fn protocol_for(mapping: &PortMapping, container: &str) -> String {
    match mapping.protocol.as_deref() {
        None => DEFAULT_PROTOCOL.to_string(),
        Some(raw) => match raw.to_ascii_uppercase().as_str() {
            p @ ("TCP" | "UDP" | "SCTP") => p.to_string(),
            _ => {
                warn!(
                    container = %container,
                    protocol = %raw,
                    port = mapping.container_port,
                    "Unrecognized port protocol, using TCP"
                );
                DEFAULT_PROTOCOL.to_string()
            }
        },
    }
}

fn parse_task_units(pattern: &Regex, field: &str, raw: &str) -> Result<i64> {
    let captures = pattern.captures(raw).ok_or_else(|| {
        OperatorError::ResourceQuantity(format!("task {} '{}' is not a valid amount", field, raw))
    })?;

    let value: i64 = captures[1].parse().map_err(|_| {
        OperatorError::ResourceQuantity(format!("task {} '{}' is out of range", field, raw))
    })?;

    match captures.get(2) {
        Some(_) => value.checked_mul(1024).ok_or_else(|| {
            OperatorError::ResourceQuantity(format!("task {} '{}' is out of range", field, raw))
        }),
        None => Ok(value),
    }
}

fn quantity(container: &str, resource: &str, value: i64, suffix: &str) -> Result<Quantity> {
    if value < 0 {
        return Err(OperatorError::ResourceQuantity(format!(
            "container '{}' {} must not be negative, got {}",
            container, resource, value
        )));
    }
    Ok(Quantity(format!("{}{}", value, suffix)))
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
