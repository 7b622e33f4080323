//! Error types for planning and reconciliation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error(
        "plan conflict on \"{resource}\": {field} is \"{observed}\" but the configuration wants \"{desired}\"\nhint: this field cannot change in place; tear the resource down and provision again"
    )]
    PlanConflict {
        resource: String,
        field: String,
        observed: String,
        desired: String,
    },

    #[error("\"{resource}\" depends on \"{dependency}\", which is not declared")]
    UnknownDependency { resource: String, dependency: String },

    #[error("dependency cycle involving: {0}")]
    DependencyCycle(String),

    #[error("provisioning failed at {operation} after {attempts} attempt(s): {cause}")]
    ProvisionFailed {
        operation: String,
        attempts: u32,
        cause: String,
    },

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error(
        "provider quota exceeded: {0}\nhint: request a quota increase or pick a smaller machine type"
    )]
    QuotaExceeded(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid resource definition: {0}")]
    InvalidResource(String),

    #[error("inventory error: {0}")]
    InventoryError(String),

    #[error("lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
