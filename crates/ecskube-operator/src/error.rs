//! Error types for the ECSDeployment operator

use thiserror::Error;

/// Errors that can occur during operator operations
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Create was rejected because the object already exists
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        name: String,
        namespace: String,
    },

    /// The API server refused the translated object as invalid
    #[error("{kind} {namespace}/{name} was rejected: {reason}")]
    Rejected {
        kind: String,
        name: String,
        namespace: String,
        reason: String,
    },

    /// The resource uses a shape the translator does not support
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// cpu or memory could not be turned into a resource quantity
    #[error("Invalid resource quantity: {0}")]
    ResourceQuantity(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Reconciliation failed
    #[error("Reconciliation failed: {0}")]
    ReconcileFailed(String),
}

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OperatorError::KubeError(_)
                | OperatorError::Timeout(_)
                | OperatorError::ReconcileFailed(_)
        )
    }

    /// Errors that only go away when the ECSDeployment itself is changed
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            OperatorError::Rejected { .. }
                | OperatorError::UnsupportedConfiguration(_)
                | OperatorError::ResourceQuantity(_)
                | OperatorError::InvalidConfig(_)
        )
    }

    /// Get a suggested requeue delay for retryable errors
    pub fn requeue_delay(&self) -> Option<std::time::Duration> {
        if self.is_retryable() {
            Some(std::time::Duration::from_secs(30))
        } else {
            None
        }
    }
}
