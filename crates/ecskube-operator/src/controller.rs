//! ECSDeployment Controller
//!
//! This module implements the reconciliation engine. For every
//! ECSDeployment key scheduled by the controller runtime it looks up the
//! desired state, lists the existing children by marker label and creates
//! the children that are missing. Existing children are never updated.

use crate::child::{ChildKind, ChildObject, ObjectKey, ObservedChild};
use crate::child_client::{ChildClient, KubeChildClient};
use crate::crd::{ECSDeployment, MARKER_LABEL};
use crate::error::{OperatorError, Result};
use crate::owner;
use crate::resources::ResourceBuilder;
use crate::router::EventRouter;
use crate::store::DeploymentLister;
use dashmap::DashMap;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher::Config;
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Requeue interval for error cases (base for exponential backoff)
const ERROR_REQUEUE_SECONDS: u64 = 30;

/// Maximum requeue delay for error backoff
const MAX_ERROR_REQUEUE_SECONDS: u64 = 600;

/// Default number of concurrent reconciles
pub const DEFAULT_WORKERS: u16 = 2;

/// Translates an ECSDeployment into one child object
pub type Translator = fn(&ECSDeployment) -> Result<ChildObject>;

/// Maps a changed child to the ECSDeployment that owns it
pub type OwnerResolver = fn(&ObservedChild) -> Option<ObjectKey>;

/// Everything the engine needs to manage one kind of child
#[derive(Clone)]
pub struct ChildBinding {
    pub kind: ChildKind,
    pub client: Arc<dyn ChildClient>,
    pub translate: Translator,
    pub resolve_owner: OwnerResolver,
}

impl ChildBinding {
    /// ReplicaSet binding
    pub fn workload(client: Arc<dyn ChildClient>) -> Self {
        Self {
            kind: ChildKind::Workload,
            client,
            translate: translate_workload,
            resolve_owner: owner::resolve_owner,
        }
    }

    /// LoadBalancer Service binding
    pub fn service(client: Arc<dyn ChildClient>) -> Self {
        Self {
            kind: ChildKind::Service,
            client,
            translate: translate_service,
            resolve_owner: owner::resolve_owner,
        }
    }
}

/// Translate an ECSDeployment into its ReplicaSet
pub fn translate_workload(deployment: &ECSDeployment) -> Result<ChildObject> {
    ResourceBuilder::new(deployment)?
        .build_replica_set()
        .map(ChildObject::Workload)
}

/// Translate an ECSDeployment into its Service
pub fn translate_service(deployment: &ECSDeployment) -> Result<ChildObject> {
    ResourceBuilder::new(deployment)?
        .build_service()
        .map(ChildObject::Service)
}

/// Metrics for the controller
#[derive(Clone)]
pub struct ControllerMetrics {
    /// Counter for reconciliation attempts
    pub reconciliations: metrics::Counter,
    /// Counter for reconciliation errors
    pub errors: metrics::Counter,
    /// Histogram for reconciliation duration
    pub duration: metrics::Histogram,
    /// Counter for children created
    pub children_created: metrics::Counter,
    /// Counter for children skipped because translation failed
    pub translation_failures: metrics::Counter,
}

impl ControllerMetrics {
    /// Create new controller metrics
    pub fn new() -> Self {
        Self {
            reconciliations: metrics::counter!("ecskube_operator_reconciliations_total"),
            errors: metrics::counter!("ecskube_operator_reconciliation_errors_total"),
            duration: metrics::histogram!("ecskube_operator_reconciliation_duration_seconds"),
            children_created: metrics::counter!("ecskube_operator_children_created_total"),
            translation_failures: metrics::counter!(
                "ecskube_operator_translation_failures_total"
            ),
        }
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to one kind of child during a reconcile
#[derive(Clone, Debug, PartialEq)]
pub enum ChildState {
    /// At least one child carrying the marker label was already there
    Present,
    /// The child was missing and has been created
    Created,
    /// Translation failed or the API server refused the object; nothing was
    /// created for this kind
    Skipped(String),
}

/// Result of reconciling one ECSDeployment key
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileOutcome {
    pub key: ObjectKey,
    /// `false` when the ECSDeployment no longer exists
    pub found: bool,
    pub children: Vec<(ChildKind, ChildState)>,
}

impl ReconcileOutcome {
    fn not_found(key: &ObjectKey) -> Self {
        Self {
            key: key.clone(),
            found: false,
            children: Vec::new(),
        }
    }

    /// Number of children created by this reconcile
    pub fn created(&self) -> usize {
        self.children
            .iter()
            .filter(|(_, state)| *state == ChildState::Created)
            .count()
    }

    pub fn state_of(&self, kind: ChildKind) -> Option<&ChildState> {
        self.children
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, state)| state)
    }
}

/// The reconciliation engine
pub struct Reconciler {
    deployments: Arc<dyn DeploymentLister>,
    bindings: Vec<ChildBinding>,
    metrics: Option<ControllerMetrics>,
    /// Per-key error retry counts for exponential backoff
    error_counts: DashMap<ObjectKey, u32>,
}

impl Reconciler {
    pub fn new(deployments: Arc<dyn DeploymentLister>, bindings: Vec<ChildBinding>) -> Self {
        Self {
            deployments,
            bindings,
            metrics: None,
            error_counts: DashMap::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: ControllerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn bindings(&self) -> &[ChildBinding] {
        &self.bindings
    }

    /// Converge the children of one ECSDeployment.
    ///
    /// Safe to call any number of times for the same key. Returns the first
    /// API failure after every child kind has been attempted.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let start = Instant::now();

        if let Some(ref metrics) = self.metrics {
            metrics.reconciliations.increment(1);
        }

        let result = self.reconcile_children(key).await;

        if let Some(ref metrics) = self.metrics {
            metrics.duration.record(start.elapsed().as_secs_f64());
            if result.is_err() {
                metrics.errors.increment(1);
            }
        }

        result
    }

    async fn reconcile_children(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        let Some(deployment) = self.deployments.get_deployment(key)? else {
            debug!("ECSDeployment not found, nothing to do");
            return Ok(ReconcileOutcome::not_found(key));
        };

        info!(namespace = %key.namespace, name = %key.name, "Reconciling ECSDeployment");

        let selector = format!("{}={}", MARKER_LABEL, key.name);
        let mut outcome = ReconcileOutcome {
            key: key.clone(),
            found: true,
            children: Vec::with_capacity(self.bindings.len()),
        };
        let mut first_error = None;

        for binding in &self.bindings {
            match self
                .ensure_child(binding, &deployment, &key.namespace, &selector)
                .await
            {
                Ok(state) => outcome.children.push((binding.kind, state)),
                Err(e) => {
                    warn!(kind = %binding.kind, error = %e, "Failed to reconcile child");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(created = outcome.created(), "Reconciliation complete");
                Ok(outcome)
            }
        }
    }

    async fn ensure_child(
        &self,
        binding: &ChildBinding,
        deployment: &ECSDeployment,
        namespace: &str,
        selector: &str,
    ) -> Result<ChildState> {
        let existing = binding.client.list_labelled(namespace, selector).await?;
        if !existing.is_empty() {
            debug!(kind = %binding.kind, existing = ?existing, "Child already present");
            return Ok(ChildState::Present);
        }

        let child = match (binding.translate)(deployment) {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    kind = %binding.kind,
                    error = %e,
                    "Cannot translate ECSDeployment, skipping child"
                );
                if let Some(ref metrics) = self.metrics {
                    metrics.translation_failures.increment(1);
                }
                return Ok(ChildState::Skipped(e.to_string()));
            }
        };

        match binding.client.create(namespace, &child).await {
            Ok(()) => {
                info!(kind = %binding.kind, name = %child.name(), "Created child");
                if let Some(ref metrics) = self.metrics {
                    metrics.children_created.increment(1);
                }
                Ok(ChildState::Created)
            }
            Err(OperatorError::AlreadyExists { .. }) => {
                debug!(
                    kind = %binding.kind,
                    name = %child.name(),
                    "Child was created concurrently"
                );
                Ok(ChildState::Present)
            }
            Err(e) if e.is_configuration_error() => {
                warn!(
                    kind = %binding.kind,
                    name = %child.name(),
                    error = %e,
                    "API server refused child, skipping"
                );
                if let Some(ref metrics) = self.metrics {
                    metrics.translation_failures.increment(1);
                }
                Ok(ChildState::Skipped(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Error policy: exponential backoff for retryable errors, no retry
    /// for configuration errors.
    pub fn error_policy(&self, key: &ObjectKey, error: &OperatorError) -> Option<Duration> {
        if !error.is_retryable() {
            warn!(error = %error, "Reconciliation error for '{}', not retrying", key);
            return None;
        }

        let retries = {
            let mut entry = self.error_counts.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        // 30s → 60s → 120s → 240s → 480s → 600s (capped)
        let base = Duration::from_secs(ERROR_REQUEUE_SECONDS);
        let delay = (base * 2u32.saturating_pow((retries - 1).min(5)))
            .min(Duration::from_secs(MAX_ERROR_REQUEUE_SECONDS));

        warn!(
            error = %error,
            retry = retries,
            delay_secs = delay.as_secs(),
            "Reconciliation error for '{}', will retry",
            key
        );

        Some(delay)
    }

    fn reset_backoff(&self, key: &ObjectKey) {
        self.error_counts.remove(key);
    }
}

/// Reconcile entry point driven by the controller runtime
async fn reconcile(deployment: Arc<ECSDeployment>, reconciler: Arc<Reconciler>) -> Result<Action> {
    let key = ObjectKey::from_resource(deployment.as_ref());
    let outcome = reconciler.reconcile(&key).await?;

    reconciler.reset_backoff(&key);
    debug!(
        key = %key,
        found = outcome.found,
        created = outcome.created(),
        "Reconciliation completed"
    );

    Ok(Action::await_change())
}

/// Requeue retryable failures after the backoff delay. Anything else waits
/// for the next change to the ECSDeployment or one of its children.
fn error_policy(
    deployment: Arc<ECSDeployment>,
    error: &OperatorError,
    reconciler: Arc<Reconciler>,
) -> Action {
    let key = ObjectKey::from_resource(deployment.as_ref());
    match reconciler.error_policy(&key, error) {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}

/// Runtime settings of the controller
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Namespace to watch, `None` for all namespaces
    pub namespace: Option<String>,
    /// Number of ECSDeployments reconciled concurrently
    pub workers: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            workers: DEFAULT_WORKERS,
        }
    }
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Start the ECSDeployment controller
pub async fn run_controller(client: Client, config: ControllerConfig) -> Result<()> {
    let namespace = config.namespace.as_deref();

    info!(
        namespace = namespace.unwrap_or("all"),
        workers = config.workers,
        "Starting ECSDeployment controller"
    );

    let bindings = vec![
        ChildBinding::workload(Arc::new(KubeChildClient::new(
            client.clone(),
            ChildKind::Workload,
        ))),
        ChildBinding::service(Arc::new(KubeChildClient::new(
            client.clone(),
            ChildKind::Service,
        ))),
    ];

    let deployments = scoped_api::<ECSDeployment>(&client, namespace);
    let controller = Controller::new(deployments, Config::default())
        .with_config(controller::Config::default().concurrency(config.workers.max(1)));

    let reconciler = Arc::new(
        Reconciler::new(Arc::new(controller.store()), bindings)
            .with_metrics(ControllerMetrics::new()),
    );
    let router = Arc::new(EventRouter::new(reconciler.bindings()));

    // Children are watched by marker label so unrelated ReplicaSets and
    // Services never reach the router.
    let child_config = Config::default().labels(MARKER_LABEL);

    controller
        .watches(
            scoped_api::<ReplicaSet>(&client, namespace),
            child_config.clone(),
            router.mapper(ChildKind::Workload),
        )
        .watches(
            scoped_api::<Service>(&client, namespace),
            child_config,
            router.mapper(ChildKind::Service),
        )
        .run(reconcile, error_policy, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!(
                        name = obj.name,
                        namespace = obj.namespace,
                        ?action,
                        "Reconciliation completed"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation failed");
                }
            }
        })
        .await;

    Ok(())
}
