//! Custom Resource Definition for the ECSDeployment operator
//!
//! `ECSDeployment` carries an ECS-style task definition and service
//! definition. Field names inside the spec are PascalCase so that task
//! definitions copied out of ECS or CloudFormation can be pasted in as-is.

use kube::CustomResource;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

/// Regex for Kubernetes container names (RFC 1123 label)
static CONTAINER_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

/// API group of the ECSDeployment resource
pub const API_GROUP: &str = "ecskube.io";

/// API version of the ECSDeployment resource
pub const API_VERSION: &str = "v1alpha1";

/// Kind recorded on owner references of every managed child
pub const OWNER_KIND: &str = "ECSDeployment";

/// `apiVersion` recorded on owner references of every managed child
pub const OWNER_API_VERSION: &str = "ecskube.io/v1alpha1";

/// Label that marks a child object with the name of its ECSDeployment
pub const MARKER_LABEL: &str = "ecsDeployment";

/// Validate environment variable names (POSIX-ish, non-empty)
fn validate_env_name(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.len() > 256 {
        return Err(ValidationError::new("invalid_env_name")
            .with_message("environment variable name must be 1-256 characters".into()));
    }
    if value.contains('=') {
        return Err(ValidationError::new("invalid_env_name")
            .with_message(format!("'{}' must not contain '='", value).into()));
    }
    Ok(())
}

/// Validate a container name. ECS accepts names Kubernetes rejects, such as
/// `Web` or `my_app`.
fn validate_container_name(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.len() > 63 {
        return Err(ValidationError::new("invalid_container_name")
            .with_message("container name must be 1-63 characters".into()));
    }
    if !CONTAINER_NAME_REGEX.is_match(value) {
        return Err(ValidationError::new("invalid_container_name").with_message(
            format!("'{}' is not a valid Kubernetes container name (RFC 1123)", value).into(),
        ));
    }
    Ok(())
}

/// Validate a container port number
fn validate_port(port: i32) -> Result<(), ValidationError> {
    if (1..=65535).contains(&port) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_port")
            .with_message(format!("port {} is outside 1-65535", port).into()))
    }
}

/// ECSDeployment custom resource definition
///
/// The operator creates a ReplicaSet and a Service for every ECSDeployment
/// and leaves them alone afterwards.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ecskube.io",
    version = "v1alpha1",
    kind = "ECSDeployment",
    plural = "ecsdeployments",
    shortname = "ecsd",
    namespaced,
    status = "ECSDeploymentStatus",
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".spec.Service.DesiredCount"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "PascalCase")]
pub struct ECSDeploymentSpec {
    /// ECS task definition
    pub task: TaskDefinition,

    /// ECS service definition
    #[serde(default)]
    pub service: ServiceDefinition,
}

/// `AWS::ECS::TaskDefinition` shaped block
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct TaskDefinition {
    /// Resource type, usually `AWS::ECS::TaskDefinition`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    pub properties: TaskProperties,
}

/// Task-level properties
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct TaskProperties {
    /// Task-wide cpu units, used for containers that set none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Task-wide memory, used for containers that set none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(default)]
    pub container_definitions: Vec<ContainerDefinition>,
}

/// A single ECS container definition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerDefinition {
    /// Container name, unique within the task
    #[validate(custom(function = "validate_container_name"))]
    pub name: String,

    /// Container image reference
    #[validate(length(min = 1, max = 255, message = "image must be 1-255 characters"))]
    pub image: String,

    #[serde(default)]
    #[validate(nested)]
    pub port_mappings: Vec<PortMapping>,

    #[serde(default)]
    #[validate(nested)]
    pub environment: Vec<KeyValuePair>,

    /// CPU units; translated 1:1 into millicores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<i64>,

    /// Memory; translated 1:1 into `M` units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,

    /// Overrides the image entrypoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_point: Vec<String>,

    /// Arguments passed to the entrypoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

/// Port mapping of a container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "PascalCase")]
pub struct PortMapping {
    #[validate(custom(function = "validate_port"))]
    pub container_port: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<i32>,

    /// `tcp` or `udp`; anything else is treated as tcp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Environment variable pair
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, Validate)]
#[serde(rename_all = "PascalCase")]
pub struct KeyValuePair {
    #[validate(custom(function = "validate_env_name"))]
    pub name: String,

    #[serde(default)]
    pub value: String,
}

/// `AWS::ECS::Service` shaped block
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDefinition {
    #[serde(default)]
    pub desired_count: i32,

    #[serde(default)]
    pub load_balancers: Vec<LoadBalancer>,
}

/// Binds a container port to a load balancer
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancer {
    pub container_name: String,

    pub container_port: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group_arn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_name: Option<String>,
}

/// Observed state. Not written by the operator yet.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ECSDeploymentStatus {
    #[serde(default)]
    pub state: String,
}
