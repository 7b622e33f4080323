//! Parsing of the deployment-wide nodes: forge, provider, machine, ssh

use crate::error::{ConfigError, Result};
use crate::model::{MachineConfig, ProviderConfig, SshConfig};
use kdl::KdlNode;
use std::path::PathBuf;

/// Parse the `forge` node: name argument plus optional settings.
pub fn parse_forge(node: &KdlNode) -> Result<(String, Option<String>)> {
    let name = node
        .entries()
        .first()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| ConfigError::InvalidConfig("forge requires a name".to_string()))?
        .to_string();

    let mut admin_email = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "admin_email" | "admin-email" => {
                    admin_email = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_string())
                        .map(|s| s.to_string());
                }
                other => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "unknown setting in forge: \"{}\"",
                        other
                    )));
                }
            }
        }
    }

    Ok((name, admin_email))
}

/// Parse the `provider` node.
pub fn parse_provider(node: &KdlNode) -> Result<ProviderConfig> {
    let name = node
        .entries()
        .first()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| ConfigError::InvalidConfig("provider requires a name".to_string()))?
        .to_string();

    let mut provider = ProviderConfig {
        name,
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "project" => {
                    provider.project = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_string())
                        .unwrap_or("")
                        .to_string();
                }
                "region" => {
                    provider.region = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_string())
                        .map(|s| s.to_string());
                }
                "zone" => {
                    provider.zone = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_string())
                        .unwrap_or("")
                        .to_string();
                }
                other => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "unknown setting in provider: \"{}\"",
                        other
                    )));
                }
            }
        }
    }

    Ok(provider)
}

/// Parse the `machine` node. Absent settings keep their defaults.
pub fn parse_machine(node: &KdlNode) -> Result<MachineConfig> {
    let mut machine = MachineConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "type" | "machine_type" | "machine-type" => {
                    if let Some(value) = child.entries().first().and_then(|e| e.value().as_string())
                    {
                        machine.machine_type = value.to_string();
                    }
                }
                "boot_disk_size" | "boot-disk-size" => {
                    if let Some(value) = child.entries().first().and_then(|e| e.value().as_integer())
                    {
                        machine.boot_disk_size_gb = value as u32;
                    }
                }
                "image_family" | "image-family" => {
                    if let Some(value) = child.entries().first().and_then(|e| e.value().as_string())
                    {
                        machine.image_family = value.to_string();
                    }
                }
                other => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "unknown setting in machine: \"{}\"",
                        other
                    )));
                }
            }
        }
    }

    Ok(machine)
}

/// Parse the `ssh` node.
pub fn parse_ssh(node: &KdlNode) -> Result<SshConfig> {
    let mut ssh = SshConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "user" => {
                    ssh.user = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_string())
                        .unwrap_or("")
                        .to_string();
                }
                "public_key_file" | "public-key-file" => {
                    ssh.public_key_file = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_string())
                        .map(expand_tilde);
                }
                other => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "unknown setting in ssh: \"{}\"",
                        other
                    )));
                }
            }
        }
    }

    Ok(ssh)
}

/// Expand a leading `~/` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forge() {
        let kdl = r#"
            forge "acme-forge" {
                admin-email "ops@acme.dev"
            }
        "#;
        let doc: kdl::KdlDocument = kdl.parse().unwrap();
        let node = doc.nodes().first().unwrap();

        let (name, admin_email) = parse_forge(node).unwrap();
        assert_eq!(name, "acme-forge");
        assert_eq!(admin_email, Some("ops@acme.dev".to_string()));
    }

    #[test]
    fn test_parse_forge_without_name() {
        let kdl = "forge";
        let doc: kdl::KdlDocument = kdl.parse().unwrap();
        let node = doc.nodes().first().unwrap();

        assert!(parse_forge(node).is_err());
    }

    #[test]
    fn test_parse_provider() {
        let kdl = r#"
            provider "gcp" {
                project "acme-dev-infra"
                region "europe-west1"
                zone "europe-west1-b"
            }
        "#;
        let doc: kdl::KdlDocument = kdl.parse().unwrap();
        let node = doc.nodes().first().unwrap();

        let provider = parse_provider(node).unwrap();
        assert_eq!(provider.name, "gcp");
        assert_eq!(provider.project, "acme-dev-infra");
        assert_eq!(provider.region, Some("europe-west1".to_string()));
        assert_eq!(provider.zone, "europe-west1-b");
    }

    #[test]
    fn test_parse_machine_kebab_and_snake() {
        let kdl = r#"
            machine {
                type "e2-standard-4"
                boot-disk-size 60
                image_family "ubuntu-2404-lts"
            }
        "#;
        let doc: kdl::KdlDocument = kdl.parse().unwrap();
        let node = doc.nodes().first().unwrap();

        let machine = parse_machine(node).unwrap();
        assert_eq!(machine.machine_type, "e2-standard-4");
        assert_eq!(machine.boot_disk_size_gb, 60);
        assert_eq!(machine.image_family, "ubuntu-2404-lts");
    }

    #[test]
    fn test_parse_machine_defaults() {
        let kdl = "machine";
        let doc: kdl::KdlDocument = kdl.parse().unwrap();
        let node = doc.nodes().first().unwrap();

        let machine = parse_machine(node).unwrap();
        assert_eq!(machine.machine_type, "e2-standard-2");
        assert_eq!(machine.boot_disk_size_gb, 50);
    }

    #[test]
    fn test_parse_ssh() {
        let kdl = r#"
            ssh {
                user "forge"
                public-key-file "/keys/forge_ed25519.pub"
            }
        "#;
        let doc: kdl::KdlDocument = kdl.parse().unwrap();
        let node = doc.nodes().first().unwrap();

        let ssh = parse_ssh(node).unwrap();
        assert_eq!(ssh.user, "forge");
        assert_eq!(
            ssh.public_key_file,
            Some(PathBuf::from("/keys/forge_ed25519.pub"))
        );
    }

    #[test]
    fn test_unknown_setting_rejected() {
        let kdl = r#"
            provider "gcp" {
                projcet "typo"
            }
        "#;
        let doc: kdl::KdlDocument = kdl.parse().unwrap();
        let node = doc.nodes().first().unwrap();

        let err = parse_provider(node).unwrap_err();
        assert!(err.to_string().contains("projcet"));
    }
}
