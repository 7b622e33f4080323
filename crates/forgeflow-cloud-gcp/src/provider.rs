//! ProviderClient implementation backed by the gcloud CLI

use crate::error::GcpError;
use crate::gcloud::{CreateInstanceConfig, FirewallInfo, Gcloud, InstanceInfo, NetworkInfo};
use async_trait::async_trait;
use forgeflow_cloud::{
    AuthStatus, CloudError, ProviderClient, ResourceKind, ResourceShape, ResourceSpec,
    ResourceState, ResourceStatus,
};
use std::collections::BTreeMap;

/// SSH key material injected into instance metadata at create time.
#[derive(Debug, Clone)]
pub struct SshKeyEntry {
    pub user: String,
    pub public_key: String,
}

/// Google Cloud provider.
pub struct GcpProvider {
    gcloud: Gcloud,
    name_prefix: String,
    ssh_key: Option<SshKeyEntry>,
}

impl GcpProvider {
    /// `name_prefix` scopes listing to forge-managed resources, e.g.
    /// "acme-forge-".
    pub fn new(
        project: impl Into<String>,
        zone: impl Into<String>,
        name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            gcloud: Gcloud::new(project, zone),
            name_prefix: name_prefix.into(),
            ssh_key: None,
        }
    }

    pub fn with_ssh_key(mut self, user: impl Into<String>, public_key: impl Into<String>) -> Self {
        self.ssh_key = Some(SshKeyEntry {
            user: user.into(),
            public_key: public_key.into(),
        });
        self
    }

    pub fn zone(&self) -> &str {
        self.gcloud.zone()
    }
}

#[async_trait]
impl ProviderClient for GcpProvider {
    fn name(&self) -> &str {
        "gcp"
    }

    async fn check_auth(&self) -> forgeflow_cloud::Result<AuthStatus> {
        match self.gcloud.check_auth().await {
            Ok(status) => Ok(status),
            Err(err @ GcpError::GcloudNotFound) => Ok(AuthStatus::failed(err.to_string())),
            Err(GcpError::AuthenticationFailed(message)) => Ok(AuthStatus::failed(message)),
            Err(err) => Err(cloud_err(err)),
        }
    }

    async fn list_resources(&self) -> forgeflow_cloud::Result<Vec<ResourceState>> {
        let mut states = Vec::new();
        for info in self
            .gcloud
            .list_networks(&self.name_prefix)
            .await
            .map_err(cloud_err)?
        {
            states.push(network_state(info));
        }
        for info in self
            .gcloud
            .list_firewall_rules(&self.name_prefix)
            .await
            .map_err(cloud_err)?
        {
            states.push(firewall_state(info));
        }
        for info in self
            .gcloud
            .list_instances(&self.name_prefix)
            .await
            .map_err(cloud_err)?
        {
            states.push(instance_state(info));
        }
        Ok(states)
    }

    async fn get_resource_state(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> forgeflow_cloud::Result<Option<ResourceState>> {
        let state = match kind {
            ResourceKind::Network => self
                .gcloud
                .describe_network(name)
                .await
                .map_err(cloud_err)?
                .map(network_state),
            ResourceKind::FirewallRule => self
                .gcloud
                .describe_firewall_rule(name)
                .await
                .map_err(cloud_err)?
                .map(firewall_state),
            ResourceKind::Instance => self
                .gcloud
                .describe_instance(name)
                .await
                .map_err(cloud_err)?
                .map(instance_state),
        };
        Ok(state)
    }

    async fn create_resource(&self, spec: &ResourceSpec) -> forgeflow_cloud::Result<ResourceState> {
        match &spec.shape {
            ResourceShape::Network { auto_subnets } => {
                let info = self
                    .gcloud
                    .create_network(&spec.name, *auto_subnets)
                    .await
                    .map_err(cloud_err)?;
                Ok(network_state(info))
            }
            ResourceShape::FirewallRule {
                network,
                allowed_ports,
                source_ranges,
            } => {
                let info = self
                    .gcloud
                    .create_firewall_rule(&spec.name, network, allowed_ports, source_ranges)
                    .await
                    .map_err(cloud_err)?;
                Ok(firewall_state(info))
            }
            ResourceShape::Instance {
                network,
                machine_type,
                boot_disk_size_gb,
                image_family,
                zone,
            } => {
                let config = CreateInstanceConfig {
                    machine_type: machine_type.clone(),
                    zone: zone.clone(),
                    network: network.clone(),
                    image_family: image_family.clone(),
                    boot_disk_size_gb: *boot_disk_size_gb,
                    labels: spec.labels.clone(),
                    ssh_user: self.ssh_key.as_ref().map(|key| key.user.clone()),
                    ssh_public_key: self.ssh_key.as_ref().map(|key| key.public_key.clone()),
                };
                let info = self
                    .gcloud
                    .create_instance(&spec.name, &config)
                    .await
                    .map_err(cloud_err)?;
                Ok(instance_state(info))
            }
        }
    }

    async fn update_labels(
        &self,
        kind: ResourceKind,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> forgeflow_cloud::Result<()> {
        match kind {
            ResourceKind::Instance => self
                .gcloud
                .update_instance_labels(name, labels)
                .await
                .map_err(cloud_err),
            other => Err(CloudError::CommandFailed(format!(
                "{} \"{}\" does not carry labels on gcp",
                other, name
            ))),
        }
    }

    async fn delete_resource(&self, kind: ResourceKind, name: &str) -> forgeflow_cloud::Result<()> {
        let result = match kind {
            ResourceKind::Network => self.gcloud.delete_network(name).await,
            ResourceKind::FirewallRule => self.gcloud.delete_firewall_rule(name).await,
            ResourceKind::Instance => self.gcloud.delete_instance(name).await,
        };
        result.map_err(cloud_err)
    }
}

fn cloud_err(err: GcpError) -> CloudError {
    match err {
        GcpError::CloudError(e) => e,
        GcpError::NotFound(message) => CloudError::ResourceNotFound(message),
        GcpError::AuthenticationFailed(message) => CloudError::AuthenticationFailed(message),
        GcpError::QuotaExceeded(message) => CloudError::QuotaExceeded(message),
        GcpError::Transient(message) => CloudError::Transient(message),
        GcpError::JsonError(e) => CloudError::Json(e),
        GcpError::IoError(e) => CloudError::Io(e),
        other => CloudError::CommandFailed(other.to_string()),
    }
}

fn network_state(info: NetworkInfo) -> ResourceState {
    let NetworkInfo {
        id,
        name,
        auto_create_subnetworks,
        self_link,
    } = info;

    let mut state = ResourceState::new(ResourceKind::Network, name)
        .with_status(ResourceStatus::Ready)
        .with_shape(ResourceShape::Network {
            auto_subnets: auto_create_subnetworks,
        });
    if !id.is_empty() {
        state = state.with_provider_id(id);
    }
    if let Some(link) = self_link {
        state = state.with_attribute("self_link", serde_json::Value::String(link));
    }
    state
}

fn firewall_state(info: FirewallInfo) -> ResourceState {
    let network = info.network_name().to_string();
    let allowed_ports = info.tcp_ports();
    let shape = ResourceShape::FirewallRule {
        network,
        allowed_ports,
        source_ranges: info.source_ranges,
    };

    let mut state = ResourceState::new(ResourceKind::FirewallRule, info.name)
        .with_status(ResourceStatus::Ready)
        .with_shape(shape);
    if !info.id.is_empty() {
        state = state.with_provider_id(info.id);
    }
    if let Some(link) = info.self_link {
        state = state.with_attribute("self_link", serde_json::Value::String(link));
    }
    state
}

fn instance_state(info: InstanceInfo) -> ResourceState {
    let shape = instance_shape(&info);
    let status = map_instance_status(&info.status);
    let external_ip = info.external_ip().map(str::to_string);
    let internal_ip = info.internal_ip().map(str::to_string);

    let mut state = ResourceState::new(ResourceKind::Instance, info.name).with_status(status);
    if let Some(shape) = shape {
        state = state.with_shape(shape);
    }
    if !info.id.is_empty() {
        state = state.with_provider_id(info.id);
    }
    for (key, value) in info.labels {
        state = state.with_label(key, value);
    }
    if let Some(ip) = external_ip {
        state = state.with_attribute("external_ip", serde_json::Value::String(ip));
    }
    if let Some(ip) = internal_ip {
        state = state.with_attribute("internal_ip", serde_json::Value::String(ip));
    }
    if let Some(link) = info.self_link {
        state = state.with_attribute("self_link", serde_json::Value::String(link));
    }
    state
}

/// Shape recovered from a describe. `None` when gcloud did not report
/// enough to compare against a desired shape.
fn instance_shape(info: &InstanceInfo) -> Option<ResourceShape> {
    if info.machine_type.is_empty() || info.zone.is_empty() {
        return None;
    }
    let network = info.network_name()?;
    let boot_disk_size_gb = info.boot_disk_size_gb()?;
    let image_family = info.image_family()?;

    Some(ResourceShape::Instance {
        network: network.to_string(),
        machine_type: info.machine_type_name().to_string(),
        boot_disk_size_gb,
        image_family: image_family.to_string(),
        zone: info.zone_name().to_string(),
    })
}

fn map_instance_status(status: &str) -> ResourceStatus {
    match status {
        "PROVISIONING" | "STAGING" => ResourceStatus::Provisioning,
        "RUNNING" => ResourceStatus::Ready,
        "STOPPING" | "SUSPENDING" => ResourceStatus::Terminating,
        "TERMINATED" | "SUSPENDED" | "STOPPED" => ResourceStatus::Stopped,
        "REPAIRING" => ResourceStatus::Error,
        _ => ResourceStatus::Unknown,
    }
}
