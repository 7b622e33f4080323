//! Per-host model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One managed host and the service it runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Role name, e.g. "ci", "quality", "artifact". Also used as the
    /// instance name suffix and the `role` label value.
    pub role: String,

    /// Public domain the reverse proxy answers on.
    pub domain: String,

    /// The Docker service this host runs.
    pub service: ServiceConfig,
}

/// Docker service definition for a host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Container image reference, e.g. "jenkins/jenkins:lts-jdk17".
    pub image: String,

    /// Port the service listens on; the reverse proxy forwards to it.
    pub port: u16,

    /// Named volumes mounted into the container.
    pub volumes: Vec<VolumeMount>,

    /// Environment variables passed to the container.
    pub env: BTreeMap<String, String>,

    /// Path inside the container holding the generated admin password.
    pub admin_password_file: Option<String>,
}

/// A named Docker volume mounted into the service container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Volume name, e.g. "ci-home".
    pub name: String,

    /// Mount path inside the container, e.g. "/var/jenkins_home".
    pub path: String,
}
