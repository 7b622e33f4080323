//! Deployment-wide settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::HostConfig;

/// A complete forge deployment.
///
/// The deployment name prefixes every cloud resource, so two forges can
/// coexist in one project without touching each other's resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Deployment name, e.g. "acme-forge".
    pub name: String,

    /// Contact address registered with the certificate authority.
    pub admin_email: Option<String>,

    /// Cloud provider selection and placement.
    pub provider: ProviderConfig,

    /// Compute shape shared by every instance.
    pub machine: MachineConfig,

    /// SSH access settings applied to every instance.
    pub ssh: SshConfig,

    /// Managed hosts, in declaration order.
    pub hosts: Vec<HostConfig>,
}

impl ForgeConfig {
    /// Look up a host by role.
    pub fn host(&self, role: &str) -> Option<&HostConfig> {
        self.hosts.iter().find(|h| h.role == role)
    }

    /// Role names in declaration order.
    pub fn roles(&self) -> Vec<&str> {
        self.hosts.iter().map(|h| h.role.as_str()).collect()
    }
}

/// Cloud provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name. "gcp" is the only provider currently shipped.
    pub name: String,

    /// Project identifier the resources live under.
    pub project: String,

    /// Region, e.g. "europe-west1".
    pub region: Option<String>,

    /// Zone compute instances are placed in, e.g. "europe-west1-b".
    pub zone: String,
}

/// Compute shape shared by every instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Machine type, e.g. "e2-standard-4".
    pub machine_type: String,

    /// Boot disk size in GB.
    pub boot_disk_size_gb: u32,

    /// OS image family for new boot disks, e.g. "ubuntu-2204-lts".
    pub image_family: String,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            machine_type: "e2-standard-2".to_string(),
            boot_disk_size_gb: 50,
            image_family: "ubuntu-2204-lts".to_string(),
        }
    }
}

/// SSH access settings applied to every instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshConfig {
    /// Login user created on the instances.
    pub user: String,

    /// Public key injected into instance metadata.
    /// A leading `~` expands to the home directory at parse time.
    pub public_key_file: Option<PathBuf>,
}
