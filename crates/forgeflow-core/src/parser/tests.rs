//! Whole-document parser tests

use super::*;
use crate::error::ConfigError;

const FULL_CONFIG: &str = r#"
forge "acme-forge" {
    admin-email "ops@acme.dev"
}

provider "gcp" {
    project "acme-dev-infra"
    region "europe-west1"
    zone "europe-west1-b"
}

machine {
    type "e2-standard-4"
    boot-disk-size 60
    image-family "ubuntu-2204-lts"
}

ssh {
    user "forge"
    public-key-file "/keys/forge_ed25519.pub"
}

host "ci" {
    domain "ci.acme.dev"
    service {
        image "jenkins/jenkins:lts-jdk17"
        port 8080
        volume "ci-home" "/var/jenkins_home"
        admin-password-file "/var/jenkins_home/secrets/initialAdminPassword"
    }
}

host "quality" {
    domain "quality.acme.dev"
    service {
        image "sonarqube:lts-community"
        port 9000
        volume "quality-data" "/opt/sonarqube/data"
        volume "quality-extensions" "/opt/sonarqube/extensions"
        env {
            SONAR_ES_BOOTSTRAP_CHECKS_DISABLE "true"
        }
    }
}

host "artifact" {
    domain "artifact.acme.dev"
    service {
        image "sonatype/nexus3:latest"
        port 8081
        volume "artifact-data" "/nexus-data"
        admin-password-file "/nexus-data/admin.password"
    }
}
"#;

#[test]
fn test_parse_full_config() {
    let config = parse_config(FULL_CONFIG).unwrap();

    assert_eq!(config.name, "acme-forge");
    assert_eq!(config.admin_email, Some("ops@acme.dev".to_string()));
    assert_eq!(config.provider.project, "acme-dev-infra");
    assert_eq!(config.provider.zone, "europe-west1-b");
    assert_eq!(config.machine.machine_type, "e2-standard-4");
    assert_eq!(config.machine.boot_disk_size_gb, 60);
    assert_eq!(config.ssh.user, "forge");
    assert_eq!(config.hosts.len(), 3);
    assert_eq!(config.roles(), vec!["ci", "quality", "artifact"]);

    let artifact = config.host("artifact").unwrap();
    assert_eq!(artifact.domain, "artifact.acme.dev");
    assert_eq!(artifact.service.port, 8081);
}

#[test]
fn test_missing_forge_node() {
    let kdl = r#"
        provider "gcp" {
            project "p"
            zone "z"
        }
    "#;
    let err = parse_config(kdl).unwrap_err();
    assert!(err.to_string().contains("forge"));
}

#[test]
fn test_unknown_top_level_node() {
    let kdl = r#"
        forge "acme"
        hosts "typo"
    "#;
    let err = parse_config(kdl).unwrap_err();
    assert!(err.to_string().contains("hosts"));
}

#[test]
fn test_duplicate_role_rejected() {
    let kdl = r#"
        forge "acme"
        provider "gcp" { project "p"; zone "z" }
        ssh { user "forge" }
        host "ci" {
            domain "a.acme.dev"
            service { image "jenkins/jenkins:lts"; port 8080 }
        }
        host "ci" {
            domain "b.acme.dev"
            service { image "jenkins/jenkins:lts"; port 8080 }
        }
    "#;
    let err = parse_config(kdl).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateRole(role) if role == "ci"));
}

#[test]
fn test_duplicate_domain_rejected() {
    let kdl = r#"
        forge "acme"
        provider "gcp" { project "p"; zone "z" }
        ssh { user "forge" }
        host "ci" {
            domain "same.acme.dev"
            service { image "jenkins/jenkins:lts"; port 8080 }
        }
        host "quality" {
            domain "same.acme.dev"
            service { image "sonarqube:lts-community"; port 9000 }
        }
    "#;
    let err = parse_config(kdl).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateDomain(d) if d == "same.acme.dev"));
}

#[test]
fn test_missing_provider_project() {
    let kdl = r#"
        forge "acme"
        provider "gcp" { zone "z" }
        ssh { user "forge" }
        host "ci" {
            domain "ci.acme.dev"
            service { image "jenkins/jenkins:lts"; port 8080 }
        }
    "#;
    let err = parse_config(kdl).unwrap_err();
    assert!(err.to_string().contains("project"));
}

#[test]
fn test_unsupported_provider() {
    let kdl = r#"
        forge "acme"
        provider "aws" { project "p"; zone "z" }
        ssh { user "forge" }
        host "ci" {
            domain "ci.acme.dev"
            service { image "jenkins/jenkins:lts"; port 8080 }
        }
    "#;
    let err = parse_config(kdl).unwrap_err();
    assert!(err.to_string().contains("unsupported provider"));
}

#[test]
fn test_host_without_service_image() {
    let kdl = r#"
        forge "acme"
        provider "gcp" { project "p"; zone "z" }
        ssh { user "forge" }
        host "ci" {
            domain "ci.acme.dev"
            service { port 8080 }
        }
    "#;
    let err = parse_config(kdl).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingSetting { ref host, ref setting } if host == "ci" && setting == "service image"
    ));
}

#[test]
fn test_no_hosts_rejected() {
    let kdl = r#"
        forge "acme"
        provider "gcp" { project "p"; zone "z" }
        ssh { user "forge" }
    "#;
    let err = parse_config(kdl).unwrap_err();
    assert!(err.to_string().contains("host"));
}

#[test]
fn test_forge_name_charset() {
    let kdl = r#"
        forge "Acme_Forge"
        provider "gcp" { project "p"; zone "z" }
        ssh { user "forge" }
        host "ci" {
            domain "ci.acme.dev"
            service { image "jenkins/jenkins:lts"; port 8080 }
        }
    "#;
    let err = parse_config(kdl).unwrap_err();
    assert!(err.to_string().contains("lowercase"));
}

#[test]
fn test_missing_ssh_user() {
    let kdl = r#"
        forge "acme"
        provider "gcp" { project "p"; zone "z" }
        host "ci" {
            domain "ci.acme.dev"
            service { image "jenkins/jenkins:lts"; port 8080 }
        }
    "#;
    let err = parse_config(kdl).unwrap_err();
    assert!(err.to_string().contains("user"));
}

#[test]
fn test_load_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forge.kdl");
    std::fs::write(&path, FULL_CONFIG).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.name, "acme-forge");
    assert_eq!(config.hosts.len(), 3);
}
