//! Reconciliation executor
//!
//! Applies a plan against a provider, one operation at a time. Creates are
//! re-checked against live state first, so an interrupted earlier pass (or
//! an out-of-band creation) short-circuits instead of failing. Transient
//! provider errors retry with exponential backoff; anything else aborts the
//! pass. There is no rollback: completed work stays.

use crate::error::{CloudError, Result};
use crate::plan::{OpKind, Operation, Plan};
use crate::provider::{ProviderClient, RetryConfig};
use crate::resource::{ResourceKind, ResourceSet, ResourceSpec, ResourceState, ResourceStatus};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Polling cadence for resources that come up asynchronously.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Pause between state fetches.
    pub interval: Duration,

    /// Upper bound on the wait for one resource.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Applies plans against one provider.
pub struct Executor<'a> {
    client: &'a dyn ProviderClient,
    retry: RetryConfig,
    poll: PollConfig,
}

impl<'a> Executor<'a> {
    pub fn new(client: &'a dyn ProviderClient) -> Self {
        Self {
            client,
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Apply every operation in plan order, then report the instances the
    /// desired set ends up with.
    pub async fn apply(&self, plan: &Plan, desired: &ResourceSet) -> Result<ApplyOutcome> {
        let started = Instant::now();
        let mut outcome = ApplyOutcome::new();

        for op in &plan.operations {
            let op_started = Instant::now();
            debug!(operation = %op.description, "Applying");

            let message = match op.kind {
                OpKind::Delete => self.run_delete(op).await?,
                OpKind::Create => self.run_create(self.spec_for(op, desired)?).await?,
                OpKind::Update => self.run_update(self.spec_for(op, desired)?).await?,
            };

            info!(operation = %op.description, %message, "Applied");
            outcome.notes.push(OperationNote {
                operation: op.description.clone(),
                message,
                duration_ms: op_started.elapsed().as_millis() as u64,
            });
        }

        for spec in desired.iter().filter(|s| s.kind == ResourceKind::Instance) {
            let state = self.poll_until_ready(spec).await?;
            outcome.instances.push(ProvisionedInstance {
                name: spec.name.clone(),
                role: spec.labels.get("role").cloned(),
                address: state.external_address().unwrap_or_default(),
                provider_id: state.provider_id,
            });
        }

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        Ok(outcome)
    }

    fn spec_for<'b>(&self, op: &Operation, desired: &'b ResourceSet) -> Result<&'b ResourceSpec> {
        desired
            .get(&op.name)
            .ok_or_else(|| CloudError::ResourceNotFound(op.name.clone()))
    }

    async fn run_create(&self, spec: &ResourceSpec) -> Result<String> {
        // Re-check live state so an out-of-band or interrupted create is
        // picked up instead of colliding.
        let existing = self
            .call_with_retry(&format!("observe {} \"{}\"", spec.kind, spec.name), || {
                self.client.get_resource_state(spec.kind, &spec.name)
            })
            .await?;

        if let Some(state) = existing.filter(|s| s.status != ResourceStatus::Gone) {
            if let Some(observed_shape) = &state.shape
                && let Some((field, desired_value, observed_value)) =
                    spec.shape.diverging_field(observed_shape)
            {
                return Err(CloudError::PlanConflict {
                    resource: spec.name.clone(),
                    field,
                    observed: observed_value,
                    desired: desired_value,
                });
            }

            if !spec.labels_satisfied_by(&state.labels) {
                self.call_with_retry(&format!("label {} \"{}\"", spec.kind, spec.name), || {
                    self.client.update_labels(spec.kind, &spec.name, &spec.labels)
                })
                .await?;
                if spec.kind == ResourceKind::Instance && !state.is_ready() {
                    self.poll_until_ready(spec).await?;
                }
                return Ok("already existed, labels refreshed".to_string());
            }

            if spec.kind == ResourceKind::Instance && !state.is_ready() {
                self.poll_until_ready(spec).await?;
            }
            return Ok("already exists".to_string());
        }

        self.call_with_retry(&format!("create {} \"{}\"", spec.kind, spec.name), || {
            self.client.create_resource(spec)
        })
        .await?;

        if spec.kind == ResourceKind::Instance {
            let state = self.poll_until_ready(spec).await?;
            return Ok(format!(
                "created, ready at {}",
                state.external_address().unwrap_or_default()
            ));
        }
        Ok("created".to_string())
    }

    async fn run_update(&self, spec: &ResourceSpec) -> Result<String> {
        self.call_with_retry(&format!("label {} \"{}\"", spec.kind, spec.name), || {
            self.client.update_labels(spec.kind, &spec.name, &spec.labels)
        })
        .await?;
        Ok("labels updated".to_string())
    }

    async fn run_delete(&self, op: &Operation) -> Result<String> {
        let result = self
            .call_with_retry(&op.description, || {
                self.client.delete_resource(op.resource_kind, &op.name)
            })
            .await;

        match result {
            Ok(()) => Ok("deleted".to_string()),
            Err(CloudError::ResourceNotFound(_)) => {
                debug!(resource = %op.name, "Already gone");
                Ok("already gone".to_string())
            }
            Err(e) => Err(e),
        }
    }

    /// Poll a resource until it is usable. For instances that means running
    /// with an external address assigned.
    async fn poll_until_ready(&self, spec: &ResourceSpec) -> Result<ResourceState> {
        let deadline = Instant::now() + self.poll.timeout;

        loop {
            let state = self
                .call_with_retry(&format!("observe {} \"{}\"", spec.kind, spec.name), || {
                    self.client.get_resource_state(spec.kind, &spec.name)
                })
                .await?;

            match state {
                Some(state) if state.is_ready() => return Ok(state),
                Some(state) if state.status == ResourceStatus::Error => {
                    return Err(CloudError::ProvisionFailed {
                        operation: format!("create {} \"{}\"", spec.kind, spec.name),
                        attempts: 1,
                        cause: "provider reports the resource in an error state".to_string(),
                    });
                }
                Some(state) if state.status == ResourceStatus::Stopped => {
                    return Err(CloudError::CommandFailed(format!(
                        "instance \"{}\" exists but is stopped; start it or tear it down",
                        spec.name
                    )));
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(CloudError::Timeout(format!(
                    "{} \"{}\" did not become ready within {}s",
                    spec.kind,
                    spec.name,
                    self.poll.timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    /// Run a provider call, retrying transient failures with backoff.
    /// Exhaustion surfaces as `ProvisionFailed` naming the operation.
    async fn call_with_retry<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Err(CloudError::Transient(cause)) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(CloudError::ProvisionFailed {
                            operation: what.to_string(),
                            attempts: attempt,
                            cause,
                        });
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        operation = %what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %cause,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

/// What an apply pass accomplished.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// One note per executed operation.
    pub notes: Vec<OperationNote>,

    /// Every desired instance, ready and addressed.
    pub instances: Vec<ProvisionedInstance>,

    /// Total execution time in milliseconds.
    pub duration_ms: u64,
}

impl ApplyOutcome {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Record of one executed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationNote {
    pub operation: String,
    pub message: String,
    pub duration_ms: u64,
}

/// An instance the apply pass left ready.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedInstance {
    pub name: String,

    /// Value of the `role` label, when present.
    pub role: Option<String>,

    pub address: String,

    pub provider_id: Option<String>,
}
