//! # ECSDeployment Kubernetes Operator
//!
//! Runs ECS task and service definitions on Kubernetes.
//!
//! An `ECSDeployment` custom resource carries an ECS-shaped task definition
//! and service definition. The operator turns each one into a `ReplicaSet`
//! running the task's containers and a `LoadBalancer` `Service` exposing the
//! bound container port, then keeps those children in existence.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ecskube_operator::prelude::*;
//! use kube::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::try_default().await?;
//!     run_controller(client, ControllerConfig::default()).await
//! }
//! ```
//!
//! ## Architecture
//!
//! 1. **Watch**: ECSDeployments, and ReplicaSets/Services carrying the
//!    `ecsDeployment` marker label, are watched by a `kube::runtime`
//!    `Controller`. Child events are mapped to their owning ECSDeployment
//!    through the owner reference.
//! 2. **Schedule**: the controller runtime deduplicates pending
//!    ECSDeployments and reconciles up to `workers` of them at once.
//! 3. **Reconcile**: the engine looks up the ECSDeployment, lists its
//!    children by marker label and creates whatever is missing.
//!
//! Children are created once and never updated. Deleting an ECSDeployment
//! removes its children through Kubernetes garbage collection.
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: ecskube.io/v1alpha1
//! kind: ECSDeployment
//! metadata:
//!   name: orders
//!   labels:
//!     team: payments
//! spec:
//!   Task:
//!     Type: AWS::ECS::TaskDefinition
//!     Properties:
//!       ContainerDefinitions:
//!         - Name: web
//!           Image: nginx
//!           Cpu: 100
//!           Memory: 128
//!           PortMappings:
//!             - ContainerPort: 80
//!           Environment:
//!             - Name: MODE
//!               Value: prod
//!   Service:
//!     DesiredCount: 2
//!     LoadBalancers:
//!       - ContainerName: web
//!         ContainerPort: 80
//! ```
//!
//! ## Modules
//!
//! - [`crd`] - ECSDeployment custom resource
//! - [`resources`] - ReplicaSet and Service translation
//! - [`owner`] - owner reference resolution
//! - [`router`] - child event to owner routing
//! - [`controller`] - reconciliation engine and controller setup
//! - [`store`], [`child_client`] - read and write access to the cluster
//! - [`error`] - Error types for operator operations

pub mod child;
pub mod child_client;
pub mod controller;
pub mod crd;
pub mod error;
pub mod owner;
pub mod resources;
pub mod router;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude {
    //! Re-exports for convenient usage
    pub use crate::child::{ChildKind, ChildObject, ObjectKey, ObservedChild};
    pub use crate::child_client::{
        classify_create_error, ChildClient, ChildClientConfig, KubeChildClient,
    };
    pub use crate::controller::{
        run_controller, ChildBinding, ChildState, ControllerConfig,
        ControllerMetrics, ReconcileOutcome, Reconciler,
    };
    pub use crate::crd::{
        ContainerDefinition, ECSDeployment, ECSDeploymentSpec, ECSDeploymentStatus,
        KeyValuePair, LoadBalancer, PortMapping, ServiceDefinition, TaskDefinition,
        TaskProperties,
    };
    pub use crate::error::{OperatorError, Result};
    pub use crate::owner::resolve_owner;
    pub use crate::resources::ResourceBuilder;
    pub use crate::router::EventRouter;
    pub use crate::store::DeploymentLister;
}
