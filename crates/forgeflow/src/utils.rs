//! Shared command helpers

use colored::Colorize;
use forgeflow_cloud::{HostEntry, Inventory};
use forgeflow_cloud_gcp::GcpProvider;
use forgeflow_core::{ForgeConfig, HostConfig};
use forgeflow_setup::{ConfigReport, HostOutcome};
use std::time::Duration;

/// Build the provider named by the configuration.
pub fn build_provider(config: &ForgeConfig) -> anyhow::Result<GcpProvider> {
    // The parser rejects other providers; re-checked here so a future
    // provider cannot silently fall through to gcloud.
    if config.provider.name != "gcp" {
        anyhow::bail!("unsupported provider \"{}\"", config.provider.name);
    }

    let provider = GcpProvider::new(
        &config.provider.project,
        &config.provider.zone,
        format!("{}-", config.name),
    );

    if let Some(path) = &config.ssh.public_key_file {
        let key = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("cannot read SSH public key {}: {}", path.display(), e)
        })?;
        tracing::debug!("Loaded SSH public key from {}", path.display());
        Ok(provider.with_ssh_key(&config.ssh.user, key.trim()))
    } else {
        Ok(provider)
    }
}

/// Pair inventory entries with their host declarations, optionally
/// filtered to one role.
pub fn select_hosts<'a>(
    config: &'a ForgeConfig,
    inventory: &'a Inventory,
    role: Option<&str>,
) -> anyhow::Result<Vec<(&'a HostConfig, &'a HostEntry)>> {
    let mut selected = Vec::new();
    for host in &config.hosts {
        if role.is_some_and(|r| r != host.role) {
            continue;
        }
        let entry = inventory.host(&host.role).ok_or_else(|| {
            anyhow::anyhow!(
                "host \"{}\" is not in the inventory; run `forge provision` first",
                host.role
            )
        })?;
        selected.push((host, entry));
    }

    if selected.is_empty() {
        match role {
            Some(role) => anyhow::bail!(
                "no host with role \"{}\" (available: {})",
                role,
                config.roles().join(", ")
            ),
            None => anyhow::bail!("no hosts declared in forge.kdl"),
        }
    }
    Ok(selected)
}

/// Render a configuration report, one block per host.
pub fn render_report(report: &ConfigReport) {
    for host in &report.hosts {
        println!();
        match &host.outcome {
            HostOutcome::Completed { changed, unchanged } => {
                println!(
                    "{} {} ({}) {}",
                    "✓".green().bold(),
                    host.role.bold(),
                    host.target,
                    format_duration(host.duration).dimmed()
                );
                for line in changed {
                    println!("  {} {}", "▶".cyan(), line);
                }
                for line in unchanged {
                    println!("  {} {}", "•".dimmed(), line.dimmed());
                }
            }
            HostOutcome::Unreachable { error } => {
                println!(
                    "{} {} ({}) unreachable",
                    "⚠".yellow().bold(),
                    host.role.bold(),
                    host.target
                );
                println!("  {}", error.yellow());
            }
            HostOutcome::Failed { step, error, not_run } => {
                println!(
                    "{} {} ({}) failed at \"{}\"",
                    "✗".red().bold(),
                    host.role.bold(),
                    host.target,
                    step
                );
                println!("  {}", error.red());
                if !not_run.is_empty() {
                    println!("  {}", format!("not run: {}", not_run.join(", ")).dimmed());
                }
            }
        }
    }
    println!();
}

/// Print a failure with its cause and the way out.
pub fn error_block(title: &str, cause: &str, resolution: &str) {
    eprintln!();
    eprintln!("{} {}", "✗".red().bold(), title.red().bold());
    eprintln!();
    eprintln!("{}", "Cause:".yellow());
    for line in cause.lines() {
        eprintln!("  {}", line);
    }
    eprintln!();
    eprintln!("{}", "Resolution:".yellow());
    for line in resolution.lines() {
        eprintln!("  {}", line);
    }
    eprintln!();
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 60 {
        let minutes = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", minutes, secs)
    } else if total_secs >= 1 {
        format!("{}.{}s", total_secs, millis / 100)
    } else {
        format!("{}ms", millis)
    }
}
