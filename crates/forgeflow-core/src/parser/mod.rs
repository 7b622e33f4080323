//! KDL parser for `forge.kdl`
//!
//! Node names accept both kebab-case and snake_case spellings. Parsing is
//! strict: unknown nodes are rejected with the offending name so typos
//! surface at `forge validate` time instead of provisioning time.

mod forge;
mod host;

use crate::error::{ConfigError, Result};
use crate::model::ForgeConfig;
use kdl::KdlDocument;
use std::collections::HashSet;
use std::path::Path;

/// Parse and validate a complete `forge.kdl` document.
pub fn parse_config(content: &str) -> Result<ForgeConfig> {
    let doc: KdlDocument = content.parse()?;

    let mut config = ForgeConfig::default();
    let mut seen_forge = false;

    for node in doc.nodes() {
        match node.name().value() {
            "forge" => {
                let (name, admin_email) = forge::parse_forge(node)?;
                config.name = name;
                config.admin_email = admin_email;
                seen_forge = true;
            }
            "provider" => {
                config.provider = forge::parse_provider(node)?;
            }
            "machine" => {
                config.machine = forge::parse_machine(node)?;
            }
            "ssh" => {
                config.ssh = forge::parse_ssh(node)?;
            }
            "host" => {
                config.hosts.push(host::parse_host(node)?);
            }
            other => {
                return Err(ConfigError::InvalidConfig(format!(
                    "unknown top-level node: \"{}\"",
                    other
                )));
            }
        }
    }

    if !seen_forge {
        return Err(ConfigError::InvalidConfig(
            "missing \"forge\" node (the deployment needs a name)".to_string(),
        ));
    }

    validate(&config)?;
    Ok(config)
}

/// Read, parse and validate `forge.kdl` from a path.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ForgeConfig> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse_config(&content)
}

/// Structural validation beyond what parsing enforces.
fn validate(config: &ForgeConfig) -> Result<()> {
    if !is_resource_name(&config.name) {
        return Err(ConfigError::InvalidConfig(format!(
            "forge name \"{}\" must be lowercase letters, digits and dashes, starting with a letter",
            config.name
        )));
    }

    if config.provider.name != "gcp" {
        return Err(ConfigError::InvalidConfig(format!(
            "unsupported provider \"{}\" (supported: gcp)",
            config.provider.name
        )));
    }
    if config.provider.project.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "provider requires a \"project\"".to_string(),
        ));
    }
    if config.provider.zone.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "provider requires a \"zone\"".to_string(),
        ));
    }

    if config.ssh.user.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "ssh requires a \"user\"".to_string(),
        ));
    }

    if config.hosts.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "at least one \"host\" is required".to_string(),
        ));
    }

    let mut roles = HashSet::new();
    let mut domains = HashSet::new();
    for host in &config.hosts {
        if !is_resource_name(&host.role) {
            return Err(ConfigError::InvalidConfig(format!(
                "host role \"{}\" must be lowercase letters, digits and dashes, starting with a letter",
                host.role
            )));
        }
        if !roles.insert(host.role.as_str()) {
            return Err(ConfigError::DuplicateRole(host.role.clone()));
        }
        if host.domain.is_empty() {
            return Err(ConfigError::MissingSetting {
                host: host.role.clone(),
                setting: "domain".to_string(),
            });
        }
        if !domains.insert(host.domain.as_str()) {
            return Err(ConfigError::DuplicateDomain(host.domain.clone()));
        }
        if host.service.image.is_empty() {
            return Err(ConfigError::MissingSetting {
                host: host.role.clone(),
                setting: "service image".to_string(),
            });
        }
        if host.service.port == 0 {
            return Err(ConfigError::MissingSetting {
                host: host.role.clone(),
                setting: "service port".to_string(),
            });
        }
    }

    Ok(())
}

/// Cloud resource names are RFC 1035 labels: lowercase, digits, dashes.
/// Forge and role names feed directly into them.
fn is_resource_name(s: &str) -> bool {
    !s.is_empty()
        && s.starts_with(|c: char| c.is_ascii_lowercase())
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.ends_with('-')
}

#[cfg(test)]
mod tests;
