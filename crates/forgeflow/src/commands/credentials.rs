use colored::Colorize;
use forgeflow_cloud::InventoryStore;
use forgeflow_core::ForgeConfig;
use forgeflow_setup::{SshSession, read_container_file};
use std::path::Path;

pub async fn handle(config: &ForgeConfig, project_root: &Path, role: &str) -> anyhow::Result<()> {
    let host = config.host(role).ok_or_else(|| {
        anyhow::anyhow!(
            "no host with role \"{}\" (available: {})",
            role,
            config.roles().join(", ")
        )
    })?;
    let password_file = host.service.admin_password_file.as_deref().ok_or_else(|| {
        anyhow::anyhow!(
            "host \"{}\" does not declare an admin-password-file; its image manages credentials itself",
            role
        )
    })?;

    let store = InventoryStore::new(project_root);
    let inventory = store.load().await?;
    let entry = inventory.host(role).ok_or_else(|| {
        anyhow::anyhow!(
            "host \"{}\" is not in the inventory; run `forge provision` first",
            role
        )
    })?;

    let shell = SshSession::new(&inventory.ssh_user, &entry.address);
    let password = read_container_file(&shell, role, password_file).await?;
    if password.is_empty() {
        anyhow::bail!(
            "the password file {} is empty; the service may have rotated it after first login",
            password_file
        );
    }

    // Bare secret on stdout so it can be piped; context goes to stderr.
    eprintln!(
        "{}",
        format!("initial admin password for \"{}\":", role).dimmed()
    );
    println!("{password}");
    Ok(())
}
