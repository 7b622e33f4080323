//! Parsing of host nodes and their service blocks

use crate::error::{ConfigError, Result};
use crate::model::{HostConfig, ServiceConfig, VolumeMount};
use kdl::KdlNode;

/// Parse a `host` node: role argument, domain, and one `service` block.
pub fn parse_host(node: &KdlNode) -> Result<HostConfig> {
    let role = node
        .entries()
        .first()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| ConfigError::InvalidConfig("host requires a role name".to_string()))?
        .to_string();

    let mut host = HostConfig {
        role: role.clone(),
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "domain" => {
                    host.domain = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_string())
                        .unwrap_or("")
                        .to_string();
                }
                "service" => {
                    host.service = parse_service(&role, child)?;
                }
                other => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "unknown setting in host \"{}\": \"{}\"",
                        role, other
                    )));
                }
            }
        }
    }

    Ok(host)
}

/// Parse the `service` block inside a host.
fn parse_service(role: &str, node: &KdlNode) -> Result<ServiceConfig> {
    let mut service = ServiceConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "image" => {
                    service.image = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_string())
                        .unwrap_or("")
                        .to_string();
                }
                "port" => {
                    service.port = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_integer())
                        .map(|v| v as u16)
                        .unwrap_or(0);
                }
                // volume "name" "/mount/path"
                "volume" => {
                    let args: Vec<&str> = child
                        .entries()
                        .iter()
                        .filter_map(|e| e.value().as_string())
                        .collect();
                    if args.len() != 2 {
                        return Err(ConfigError::InvalidConfig(format!(
                            "volume in host \"{}\" needs a name and a mount path",
                            role
                        )));
                    }
                    service.volumes.push(VolumeMount {
                        name: args[0].to_string(),
                        path: args[1].to_string(),
                    });
                }
                // env { KEY "value" ... }
                "env" => {
                    if let Some(env_children) = child.children() {
                        for env_child in env_children.nodes() {
                            let key = env_child.name().value().to_string();
                            if let Some(value) = env_child
                                .entries()
                                .first()
                                .and_then(|e| e.value().as_string())
                            {
                                service.env.insert(key, value.to_string());
                            }
                        }
                    }
                }
                "admin_password_file" | "admin-password-file" => {
                    service.admin_password_file = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_string())
                        .map(|s| s.to_string());
                }
                other => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "unknown setting in service of host \"{}\": \"{}\"",
                        role, other
                    )));
                }
            }
        }
    }

    Ok(service)
}
