//! End-to-end planner + executor tests against an in-memory provider

use async_trait::async_trait;
use forgeflow_cloud::{
    CloudError, Executor, PlanMode, PollConfig, ProviderClient, Result, RetryConfig, plan,
};
use forgeflow_cloud::{
    AuthStatus, ResourceKind, ResourceSet, ResourceShape, ResourceSpec, ResourceState,
    ResourceStatus,
};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// In-memory provider. Scripted failures and readiness delays make the
/// executor's retry and polling paths observable.
#[derive(Default)]
struct FakeProvider {
    resources: Mutex<BTreeMap<(ResourceKind, String), ResourceState>>,
    calls: Mutex<Vec<String>>,
    transient_failures: Mutex<BTreeMap<String, u32>>,
    ready_after_polls: Mutex<BTreeMap<String, u32>>,
    next_address: Mutex<u8>,
}

impl FakeProvider {
    fn new() -> Self {
        Self::default()
    }

    fn seed(&self, state: ResourceState) {
        self.resources
            .lock()
            .unwrap()
            .insert((state.kind, state.name.clone()), state);
    }

    /// Make the next `count` calls matching `key` fail transiently.
    /// Keys look like "create:acme-forge-ci".
    fn fail_transient(&self, key: &str, count: u32) {
        self.transient_failures
            .lock()
            .unwrap()
            .insert(key.to_string(), count);
    }

    /// Leave an instance in Provisioning for the first `polls` state reads.
    fn ready_after(&self, name: &str, polls: u32) {
        self.ready_after_polls
            .lock()
            .unwrap()
            .insert(name.to_string(), polls);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count_calls(&self, key: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == key).count()
    }

    fn record(&self, key: String) -> Result<()> {
        self.calls.lock().unwrap().push(key.clone());
        let mut failures = self.transient_failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&key)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(CloudError::Transient(format!("scripted failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("fake@test"))
    }

    async fn list_resources(&self) -> Result<Vec<ResourceState>> {
        self.record("list".to_string())?;
        Ok(self.resources.lock().unwrap().values().cloned().collect())
    }

    async fn get_resource_state(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<ResourceState>> {
        self.record(format!("get:{name}"))?;

        // Readiness delays only apply once the resource has been created.
        let created = self
            .resources
            .lock()
            .unwrap()
            .contains_key(&(kind, name.to_string()));
        if created {
            let mut delays = self.ready_after_polls.lock().unwrap();
            if let Some(remaining) = delays.get_mut(name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(Some(
                        ResourceState::new(kind, name).with_status(ResourceStatus::Provisioning),
                    ));
                }
                delays.remove(name);
                let mut resources = self.resources.lock().unwrap();
                let state = resources
                    .get_mut(&(kind, name.to_string()))
                    .ok_or_else(|| CloudError::ResourceNotFound(name.to_string()))?;
                state.status = ResourceStatus::Ready;
                if kind == ResourceKind::Instance && state.external_address().is_none() {
                    state
                        .attributes
                        .insert("external_ip".to_string(), serde_json::json!("198.51.100.99"));
                }
                return Ok(Some(state.clone()));
            }
        }

        Ok(self
            .resources
            .lock()
            .unwrap()
            .get(&(kind, name.to_string()))
            .cloned())
    }

    async fn create_resource(&self, spec: &ResourceSpec) -> Result<ResourceState> {
        self.record(format!("create:{}", spec.name))?;

        let pending = self
            .ready_after_polls
            .lock()
            .unwrap()
            .contains_key(&spec.name);

        let mut state = ResourceState::new(spec.kind, spec.name.clone())
            .with_provider_id(format!("id-{}", spec.name))
            .with_shape(spec.shape.clone());
        state.labels = spec.labels.clone();

        if pending {
            state.status = ResourceStatus::Provisioning;
        } else {
            state.status = ResourceStatus::Ready;
            if spec.kind == ResourceKind::Instance {
                let octet = {
                    let mut next = self.next_address.lock().unwrap();
                    *next += 1;
                    *next
                };
                state.attributes.insert(
                    "external_ip".to_string(),
                    serde_json::json!(format!("198.51.100.{octet}")),
                );
            }
        }

        self.resources
            .lock()
            .unwrap()
            .insert((spec.kind, spec.name.clone()), state.clone());
        Ok(state)
    }

    async fn update_labels(
        &self,
        kind: ResourceKind,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.record(format!("labels:{name}"))?;
        let mut resources = self.resources.lock().unwrap();
        let state = resources
            .get_mut(&(kind, name.to_string()))
            .ok_or_else(|| CloudError::ResourceNotFound(name.to_string()))?;
        state.labels.extend(labels.clone());
        Ok(())
    }

    async fn delete_resource(&self, kind: ResourceKind, name: &str) -> Result<()> {
        self.record(format!("delete:{name}"))?;
        self.resources
            .lock()
            .unwrap()
            .remove(&(kind, name.to_string()))
            .map(|_| ())
            .ok_or_else(|| CloudError::ResourceNotFound(name.to_string()))
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        backoff_multiplier: 2.0,
    }
}

fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
    }
}

fn forge_desired() -> ResourceSet {
    let mut desired = ResourceSet::new();
    desired
        .add(ResourceSpec::new(
            ResourceKind::Network,
            "acme-net",
            ResourceShape::Network { auto_subnets: true },
        ))
        .unwrap();
    desired
        .add(
            ResourceSpec::new(
                ResourceKind::FirewallRule,
                "acme-allow-web",
                ResourceShape::FirewallRule {
                    network: "acme-net".to_string(),
                    allowed_ports: vec![80, 443],
                    source_ranges: vec!["0.0.0.0/0".to_string()],
                },
            )
            .depends_on("acme-net"),
        )
        .unwrap();
    desired
        .add(instance("acme-ci").depends_on("acme-net"))
        .unwrap();
    desired
        .add(instance("acme-quality").depends_on("acme-net"))
        .unwrap();
    desired
}

fn instance(name: &str) -> ResourceSpec {
    ResourceSpec::new(
        ResourceKind::Instance,
        name,
        ResourceShape::Instance {
            network: "acme-net".to_string(),
            machine_type: "e2-standard-4".to_string(),
            boot_disk_size_gb: 60,
            image_family: "ubuntu-2204-lts".to_string(),
            zone: "europe-west1-b".to_string(),
        },
    )
    .with_label("role", name.trim_start_matches("acme-"))
    .with_label("forge", "acme")
}

#[tokio::test]
async fn test_provision_from_scratch_in_dependency_order() {
    let provider = FakeProvider::new();
    let desired = forge_desired();

    let the_plan = plan(&desired, &[], PlanMode::Provision).unwrap();
    assert_eq!(the_plan.operations.len(), 4);

    let executor = Executor::new(&provider)
        .with_retry(fast_retry())
        .with_poll(fast_poll());
    let outcome = executor.apply(&the_plan, &desired).await.unwrap();

    let creates: Vec<String> = provider
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("create:"))
        .collect();
    assert_eq!(
        creates,
        vec![
            "create:acme-net",
            "create:acme-allow-web",
            "create:acme-ci",
            "create:acme-quality",
        ]
    );

    assert_eq!(outcome.instances.len(), 2);
    for instance in &outcome.instances {
        assert!(instance.address.starts_with("198.51.100."));
        assert!(instance.role.is_some());
    }
    assert_eq!(outcome.notes.len(), 4);
}

#[tokio::test]
async fn test_replan_after_apply_is_empty() {
    let provider = FakeProvider::new();
    let desired = forge_desired();

    let first = plan(&desired, &[], PlanMode::Provision).unwrap();
    let executor = Executor::new(&provider)
        .with_retry(fast_retry())
        .with_poll(fast_poll());
    executor.apply(&first, &desired).await.unwrap();

    let observed = provider.list_resources().await.unwrap();
    let second = plan(&desired, &observed, PlanMode::Reconcile).unwrap();
    assert!(!second.has_changes());
    assert_eq!(second.unchanged.len(), 4);
}

#[tokio::test]
async fn test_create_short_circuits_on_out_of_band_resource() {
    let provider = FakeProvider::new();
    let desired = forge_desired();

    // The network appeared between planning and applying.
    let network_spec = desired.get("acme-net").unwrap();
    provider.seed(
        ResourceState::new(ResourceKind::Network, "acme-net")
            .with_status(ResourceStatus::Ready)
            .with_shape(network_spec.shape.clone()),
    );

    let the_plan = plan(&desired, &[], PlanMode::Provision).unwrap();
    let executor = Executor::new(&provider)
        .with_retry(fast_retry())
        .with_poll(fast_poll());
    let outcome = executor.apply(&the_plan, &desired).await.unwrap();

    assert_eq!(provider.count_calls("create:acme-net"), 0);
    assert_eq!(provider.count_calls("create:acme-ci"), 1);
    assert!(
        outcome
            .notes
            .iter()
            .any(|n| n.operation.contains("acme-net") && n.message.contains("already"))
    );
}

#[tokio::test]
async fn test_conflict_detected_at_recheck() {
    let provider = FakeProvider::new();
    let desired = forge_desired();

    // Same name, diverging machine type: the re-check must refuse to touch it.
    provider.seed(
        ResourceState::new(ResourceKind::Instance, "acme-ci")
            .with_status(ResourceStatus::Ready)
            .with_shape(ResourceShape::Instance {
                network: "acme-net".to_string(),
                machine_type: "n1-standard-1".to_string(),
                boot_disk_size_gb: 60,
                image_family: "ubuntu-2204-lts".to_string(),
                zone: "europe-west1-b".to_string(),
            })
            .with_attribute("external_ip", serde_json::json!("198.51.100.50")),
    );

    let the_plan = plan(&desired, &[], PlanMode::Provision).unwrap();
    let executor = Executor::new(&provider)
        .with_retry(fast_retry())
        .with_poll(fast_poll());
    let err = executor.apply(&the_plan, &desired).await.unwrap_err();

    match err {
        CloudError::PlanConflict {
            resource, field, ..
        } => {
            assert_eq!(resource, "acme-ci");
            assert_eq!(field, "machine-type");
        }
        other => panic!("expected PlanConflict, got {other:?}"),
    }
    assert_eq!(provider.count_calls("create:acme-ci"), 0);
}

#[tokio::test]
async fn test_transient_errors_retry_until_success() {
    let provider = FakeProvider::new();
    let desired = forge_desired();
    provider.fail_transient("create:acme-ci", 2);

    let the_plan = plan(&desired, &[], PlanMode::Provision).unwrap();
    let executor = Executor::new(&provider)
        .with_retry(fast_retry())
        .with_poll(fast_poll());
    executor.apply(&the_plan, &desired).await.unwrap();

    assert_eq!(provider.count_calls("create:acme-ci"), 3);
}

#[tokio::test]
async fn test_retry_exhaustion_aborts_remaining_plan() {
    let provider = FakeProvider::new();
    let desired = forge_desired();
    provider.fail_transient("create:acme-ci", 10);

    let the_plan = plan(&desired, &[], PlanMode::Provision).unwrap();
    let executor = Executor::new(&provider)
        .with_retry(fast_retry())
        .with_poll(fast_poll());
    let err = executor.apply(&the_plan, &desired).await.unwrap_err();

    match err {
        CloudError::ProvisionFailed {
            operation,
            attempts,
            ..
        } => {
            assert!(operation.contains("acme-ci"));
            assert_eq!(attempts, 3);
        }
        other => panic!("expected ProvisionFailed, got {other:?}"),
    }

    // acme-ci orders before acme-quality, so the latter must never start.
    assert_eq!(provider.count_calls("create:acme-quality"), 0);
    // Earlier operations are not rolled back.
    assert_eq!(provider.count_calls("create:acme-net"), 1);
    assert!(
        provider
            .resources
            .lock()
            .unwrap()
            .contains_key(&(ResourceKind::Network, "acme-net".to_string()))
    );
}

#[tokio::test]
async fn test_teardown_deletes_in_reverse_order() {
    let provider = FakeProvider::new();
    let desired = forge_desired();

    let up = plan(&desired, &[], PlanMode::Provision).unwrap();
    let executor = Executor::new(&provider)
        .with_retry(fast_retry())
        .with_poll(fast_poll());
    executor.apply(&up, &desired).await.unwrap();

    let observed = provider.list_resources().await.unwrap();
    let down = plan(&ResourceSet::new(), &observed, PlanMode::Reconcile).unwrap();
    executor.apply(&down, &ResourceSet::new()).await.unwrap();

    let deletes: Vec<String> = provider
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("delete:"))
        .collect();
    assert_eq!(
        deletes,
        vec![
            "delete:acme-ci",
            "delete:acme-quality",
            "delete:acme-allow-web",
            "delete:acme-net",
        ]
    );
    assert!(provider.resources.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_tolerates_already_gone() {
    let provider = FakeProvider::new();

    let observed = vec![
        ResourceState::new(ResourceKind::Instance, "acme-ci").with_status(ResourceStatus::Ready),
    ];
    let down = plan(&ResourceSet::new(), &observed, PlanMode::Reconcile).unwrap();

    // Nothing seeded: the provider will answer ResourceNotFound.
    let executor = Executor::new(&provider)
        .with_retry(fast_retry())
        .with_poll(fast_poll());
    let outcome = executor.apply(&down, &ResourceSet::new()).await.unwrap();

    assert_eq!(outcome.notes.len(), 1);
    assert!(outcome.notes[0].message.contains("already gone"));
}

#[tokio::test]
async fn test_instance_polls_until_ready() {
    let provider = FakeProvider::new();
    let mut desired = ResourceSet::new();
    desired.add(instance("acme-ci")).unwrap();
    provider.ready_after("acme-ci", 3);

    let the_plan = plan(&desired, &[], PlanMode::Provision).unwrap();
    let executor = Executor::new(&provider)
        .with_retry(fast_retry())
        .with_poll(fast_poll());
    let outcome = executor.apply(&the_plan, &desired).await.unwrap();

    assert!(provider.count_calls("get:acme-ci") >= 3);
    assert_eq!(outcome.instances[0].address, "198.51.100.99");
}

#[tokio::test]
async fn test_poll_timeout_is_fatal() {
    let provider = FakeProvider::new();
    let mut desired = ResourceSet::new();
    desired.add(instance("acme-ci")).unwrap();
    provider.ready_after("acme-ci", 1_000_000);

    let the_plan = plan(&desired, &[], PlanMode::Provision).unwrap();
    let executor = Executor::new(&provider)
        .with_retry(fast_retry())
        .with_poll(PollConfig {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
        });
    let err = executor.apply(&the_plan, &desired).await.unwrap_err();

    assert!(matches!(err, CloudError::Timeout(_)));
}
