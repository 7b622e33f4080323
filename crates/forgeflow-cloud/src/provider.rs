//! Provider client trait
//!
//! The planner and executor only ever see this trait, so any provider (or
//! an in-memory fake in tests) can sit behind them.

use crate::error::Result;
use crate::resource::{ResourceKind, ResourceSpec, ResourceState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Typed interface to one cloud provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider name, e.g. "gcp".
    fn name(&self) -> &str;

    /// Check that credentials are present and usable.
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Observe every forge-scoped resource the provider knows about.
    async fn list_resources(&self) -> Result<Vec<ResourceState>>;

    /// Observe one resource. `Ok(None)` means it does not exist.
    async fn get_resource_state(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ResourceState>>;

    /// Create a resource and return its state as first reported.
    async fn create_resource(&self, spec: &ResourceSpec) -> Result<ResourceState>;

    /// Replace the labels on a resource in place.
    async fn update_labels(
        &self,
        kind: ResourceKind,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Delete a resource. Deleting a resource that is already gone is an
    /// error (`ResourceNotFound`); the executor tolerates it.
    async fn delete_resource(&self, kind: ResourceKind, name: &str) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Retry configuration for transient provider failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, first try included.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Ceiling for the backoff.
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retrying after `attempt` failed tries.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}
