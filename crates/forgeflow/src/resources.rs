//! Desired-state assembly
//!
//! Maps the parsed `forge.kdl` model onto the resource set the planner
//! consumes: one network, a firewall rule for SSH, one for web traffic,
//! and one instance per host. Only instances carry labels; GCP networks
//! and firewall rules have none to reconcile.

use forgeflow_cloud::{ResourceKind, ResourceSet, ResourceShape, ResourceSpec};
use forgeflow_core::ForgeConfig;

pub fn network_name(config: &ForgeConfig) -> String {
    format!("{}-net", config.name)
}

pub fn instance_name(config: &ForgeConfig, role: &str) -> String {
    format!("{}-{}", config.name, role)
}

/// Every resource the forge should own, dependency-linked.
pub fn desired_resources(config: &ForgeConfig) -> forgeflow_cloud::Result<ResourceSet> {
    let network = network_name(config);
    let mut set = ResourceSet::new();

    set.add(ResourceSpec::new(
        ResourceKind::Network,
        network.clone(),
        ResourceShape::Network { auto_subnets: true },
    ))?;

    set.add(
        ResourceSpec::new(
            ResourceKind::FirewallRule,
            format!("{}-allow-ssh", config.name),
            ResourceShape::FirewallRule {
                network: network.clone(),
                allowed_ports: vec![22],
                source_ranges: vec!["0.0.0.0/0".to_string()],
            },
        )
        .depends_on(&network),
    )?;

    // Services themselves listen on loopback; only nginx is exposed.
    set.add(
        ResourceSpec::new(
            ResourceKind::FirewallRule,
            format!("{}-allow-web", config.name),
            ResourceShape::FirewallRule {
                network: network.clone(),
                allowed_ports: vec![80, 443],
                source_ranges: vec!["0.0.0.0/0".to_string()],
            },
        )
        .depends_on(&network),
    )?;

    for host in &config.hosts {
        set.add(
            ResourceSpec::new(
                ResourceKind::Instance,
                instance_name(config, &host.role),
                ResourceShape::Instance {
                    network: network.clone(),
                    machine_type: config.machine.machine_type.clone(),
                    boot_disk_size_gb: config.machine.boot_disk_size_gb,
                    image_family: config.machine.image_family.clone(),
                    zone: config.provider.zone.clone(),
                },
            )
            .depends_on(&network)
            .with_label("forge", &config.name)
            .with_label("role", &host.role),
        )?;
    }

    Ok(set)
}
