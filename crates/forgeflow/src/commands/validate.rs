use colored::Colorize;
use forgeflow_core::ForgeConfig;
use std::path::Path;

/// Parsing already validated the file; this prints the resolved model so
/// default-filled fields and typos show up before any provider call.
pub fn handle(config: &ForgeConfig, config_path: &Path) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("✓ {} is valid", config_path.display()).green().bold()
    );
    println!();
    println!("forge     {}", config.name.cyan());
    if let Some(email) = &config.admin_email {
        println!("email     {email}");
    }
    println!(
        "provider  {} (project {}, zone {})",
        config.provider.name, config.provider.project, config.provider.zone
    );
    println!(
        "machine   {} / {}GB / {}",
        config.machine.machine_type, config.machine.boot_disk_size_gb, config.machine.image_family
    );
    println!("ssh       {}", config.ssh.user);
    println!();
    println!("{}", format!("hosts ({}):", config.hosts.len()).bold());
    for host in &config.hosts {
        println!("{} {} {}", "•".cyan(), host.role.bold(), host.domain);
        println!("    {} on port {}", host.service.image, host.service.port);
        for volume in &host.service.volumes {
            println!("    volume {} -> {}", volume.name, volume.path);
        }
    }
    Ok(())
}
