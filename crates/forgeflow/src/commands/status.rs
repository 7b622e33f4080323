use crate::utils;
use colored::Colorize;
use forgeflow_cloud::{InventoryStore, ProviderClient, ResourceKind};
use forgeflow_core::ForgeConfig;
use forgeflow_setup::{SshSession, list_containers};
use std::path::Path;
use std::time::Duration;

/// Reports, never repairs. Exits zero even when hosts are unhealthy so it
/// can run from cron without paging anyone.
pub async fn handle(config: &ForgeConfig, project_root: &Path) -> anyhow::Result<()> {
    let store = InventoryStore::new(project_root);
    let inventory = store.load().await?;
    let provider = utils::build_provider(config)?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    println!(
        "{}",
        format!(
            "Forge \"{}\" ({} hosts)",
            inventory.forge,
            config.hosts.len()
        )
        .bold()
    );

    let mut healthy = true;
    for host in &config.hosts {
        let Some(entry) = inventory.host(&host.role) else {
            println!("{} {} not provisioned", "⚠".yellow(), host.role.bold());
            healthy = false;
            continue;
        };
        println!("{} {} ({})", "•".cyan(), host.role.bold(), entry.address);

        // Instance state comes from the provider, not the inventory file.
        match provider
            .get_resource_state(ResourceKind::Instance, &entry.resource)
            .await
        {
            Ok(Some(state)) if state.is_ready() => {
                println!("    instance   {}", state.status.to_string().green());
            }
            Ok(Some(state)) => {
                println!("    instance   {}", state.status.to_string().yellow());
                healthy = false;
            }
            Ok(None) => {
                println!("    instance   {}", "missing".red());
                healthy = false;
            }
            Err(error) => {
                println!(
                    "    instance   {}",
                    format!("unknown ({})", first_line(&error.to_string())).yellow()
                );
                healthy = false;
            }
        }

        let shell = SshSession::new(&inventory.ssh_user, &entry.address);
        match list_containers(&shell).await {
            Ok(containers) => match containers.iter().find(|c| c.names == host.role) {
                Some(container) if container.is_running() => {
                    println!(
                        "    container  {}",
                        format!("running ({}, {})", container.image, container.status).green()
                    );
                }
                Some(container) => {
                    println!("    container  {}", container.state.yellow());
                    healthy = false;
                }
                None => {
                    println!("    container  {}", "absent; run `forge configure`".yellow());
                    healthy = false;
                }
            },
            Err(error) => {
                println!(
                    "    container  {}",
                    format!("unknown ({})", first_line(&error.to_string())).yellow()
                );
                healthy = false;
            }
        }

        // A 4xx still proves nginx and the app answer; only a 5xx or no
        // response counts against the host.
        match http.get(format!("http://{}/", entry.address)).send().await {
            Ok(response) if response.status().is_server_error() => {
                println!(
                    "    endpoint   {}",
                    format!("HTTP {}", response.status()).red()
                );
                healthy = false;
            }
            Ok(response) => {
                println!(
                    "    endpoint   {}",
                    format!("HTTP {}", response.status()).green()
                );
            }
            Err(_) => {
                println!("    endpoint   {}", "no response".red());
                healthy = false;
            }
        }
    }

    println!();
    if healthy {
        println!("{}", "✓ All hosts healthy".green().bold());
    } else {
        println!("{}", "⚠ Some hosts need attention".yellow().bold());
    }
    Ok(())
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}
