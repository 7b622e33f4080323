use crate::utils;
use colored::Colorize;
use forgeflow_cloud::InventoryStore;
use forgeflow_core::{ForgeConfig, HostConfig};
use forgeflow_setup::{
    ConfigStep, HostPlan, HostTask, SshSession, StepAction, WaitConfig, render_vhost, run_hosts,
    vhost_path,
};
use std::path::Path;

/// Installed on every host before anything else runs. certbot rides along
/// so `forge certs` finds it in place.
const BASE_PACKAGES: [&str; 4] = ["docker.io", "nginx", "certbot", "python3-certbot-nginx"];

pub async fn handle(
    config: &ForgeConfig,
    project_root: &Path,
    role: Option<&str>,
) -> anyhow::Result<()> {
    let store = InventoryStore::new(project_root);
    let inventory = store.load().await?;
    let selected = utils::select_hosts(config, &inventory, role)?;

    let mut tasks = Vec::new();
    for (host, entry) in &selected {
        tasks.push(HostTask {
            plan: HostPlan {
                role: host.role.clone(),
                steps: step_plan(host)?,
            },
            shell: Box::new(SshSession::new(&inventory.ssh_user, &entry.address)),
            wait: WaitConfig::default(),
        });
    }

    println!(
        "{}",
        format!(
            "Configuring {} host(s) as \"{}\"...",
            tasks.len(),
            inventory.ssh_user
        )
        .blue()
    );

    let report = run_hosts(&tasks).await;
    utils::render_report(&report);

    if !report.all_succeeded() {
        anyhow::bail!("{} host(s) failed configuration", report.failure_count());
    }
    println!("Next: {}", "forge certs".cyan());
    Ok(())
}

/// Ordered steps for one host. Declaration order is prerequisite order;
/// the runner stops a host at its first failure.
fn step_plan(host: &HostConfig) -> anyhow::Result<Vec<ConfigStep>> {
    let service = &host.service;

    let mut steps = vec![
        ConfigStep::new(
            "base-packages",
            "install docker, nginx and certbot",
            StepAction::EnsurePackages {
                packages: BASE_PACKAGES.iter().map(|p| p.to_string()).collect(),
            },
        ),
        ConfigStep::new(
            "docker-daemon",
            "enable and start docker",
            StepAction::EnsureService {
                unit: "docker".to_string(),
            },
        ),
    ];

    for volume in &service.volumes {
        steps.push(ConfigStep::new(
            format!("volume-{}", volume.name),
            format!("docker volume {}", volume.name),
            StepAction::EnsureDockerVolume {
                name: volume.name.clone(),
            },
        ));
    }

    // The container is named after the role; `forge credentials` and
    // `forge status` look it up by that name.
    steps.push(ConfigStep::new(
        "app-container",
        format!("run {} as \"{}\"", service.image, host.role),
        StepAction::EnsureContainer {
            name: host.role.clone(),
            image: service.image.clone(),
            port: service.port,
            volumes: service
                .volumes
                .iter()
                .map(|v| (v.name.clone(), v.path.clone()))
                .collect(),
            env: service.env.clone(),
        },
    ));

    steps.push(ConfigStep::new(
        "nginx-vhost",
        format!("proxy {} to 127.0.0.1:{}", host.domain, service.port),
        StepAction::PutFile {
            path: vhost_path(&host.role),
            content: render_vhost(&host.domain, service.port)?,
            reload: Some("sudo systemctl reload nginx".to_string()),
        },
    ));

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeflow_core::{ServiceConfig, VolumeMount};

    fn ci_host() -> HostConfig {
        HostConfig {
            role: "ci".to_string(),
            domain: "ci.acme.dev".to_string(),
            service: ServiceConfig {
                image: "jenkins/jenkins:lts-jdk17".to_string(),
                port: 8080,
                volumes: vec![VolumeMount {
                    name: "ci-home".to_string(),
                    path: "/var/jenkins_home".to_string(),
                }],
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_step_plan_order() {
        let steps = step_plan(&ci_host()).unwrap();
        let ids: Vec<&str> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "base-packages",
                "docker-daemon",
                "volume-ci-home",
                "app-container",
                "nginx-vhost"
            ]
        );
    }

    #[test]
    fn test_container_step_wires_the_service() {
        let steps = step_plan(&ci_host()).unwrap();
        let container = steps.iter().find(|s| s.id == "app-container").unwrap();
        match &container.action {
            StepAction::EnsureContainer {
                name,
                image,
                port,
                volumes,
                ..
            } => {
                assert_eq!(name, "ci");
                assert_eq!(image, "jenkins/jenkins:lts-jdk17");
                assert_eq!(*port, 8080);
                assert_eq!(
                    volumes,
                    &vec![("ci-home".to_string(), "/var/jenkins_home".to_string())]
                );
            }
            other => panic!("expected a container action, got {other:?}"),
        }
    }

    #[test]
    fn test_vhost_step_reloads_nginx_only_on_change() {
        let steps = step_plan(&ci_host()).unwrap();
        let vhost = steps.iter().find(|s| s.id == "nginx-vhost").unwrap();
        match &vhost.action {
            StepAction::PutFile { path, content, reload } => {
                assert_eq!(path, "/etc/nginx/conf.d/forge-ci.conf");
                assert!(content.contains("server_name ci.acme.dev;"));
                assert!(content.contains("proxy_pass http://127.0.0.1:8080;"));
                assert_eq!(reload.as_deref(), Some("sudo systemctl reload nginx"));
            }
            other => panic!("expected a file action, got {other:?}"),
        }
    }
}
