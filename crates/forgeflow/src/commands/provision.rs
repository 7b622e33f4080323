use crate::resources;
use crate::utils;
use colored::Colorize;
use forgeflow_cloud::{
    Executor, HostEntry, Inventory, InventoryStore, OpKind, PlanMode, ProviderClient,
};
use forgeflow_core::ForgeConfig;
use std::path::Path;
use std::time::Duration;

pub async fn handle(
    config: &ForgeConfig,
    project_root: &Path,
    dry_run: bool,
    reconcile: bool,
) -> anyhow::Result<()> {
    let provider = utils::build_provider(config)?;

    let auth = provider.check_auth().await?;
    if !auth.authenticated {
        utils::error_block(
            "Not authenticated",
            auth.error.as_deref().unwrap_or("no active gcloud account"),
            "Run `gcloud auth login` and retry.",
        );
        anyhow::bail!("provider authentication failed");
    }
    if let Some(account) = &auth.account_info {
        println!("{} gcp as {}", "•".cyan(), account.bold());
    }

    println!("{}", "Observing current state...".blue());
    let observed = provider.list_resources().await?;

    let desired = resources::desired_resources(config)?;
    let mode = if reconcile {
        PlanMode::Reconcile
    } else {
        PlanMode::Provision
    };
    let plan = match forgeflow_cloud::plan(&desired, &observed, mode) {
        Ok(plan) => plan,
        Err(e) => {
            utils::error_block("Planning failed", &e.to_string(), "Nothing was changed.");
            anyhow::bail!("planning failed");
        }
    };

    println!();
    println!("{}", format!("Plan: {}", plan.summary()).bold());
    for op in &plan.operations {
        let marker = match op.kind {
            OpKind::Create => "+".green(),
            OpKind::Update => "~".yellow(),
            OpKind::Delete => "-".red(),
        };
        println!("  {} {}", marker, op.description);
    }
    for name in &plan.unchanged {
        println!("  {} {}", "•".dimmed(), format!("{} in sync", name).dimmed());
    }

    if dry_run {
        println!();
        println!("{}", "Dry run: nothing applied.".yellow());
        return Ok(());
    }

    let store = InventoryStore::new(project_root);
    let lock = store.acquire_lock().await?;

    println!();
    let executor = Executor::new(&provider);
    let outcome = match executor.apply(&plan, &desired).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let _ = lock.release().await;
            utils::error_block(
                "Provisioning failed",
                &e.to_string(),
                "Completed resources are kept. Fix the cause and re-run `forge provision`.",
            );
            anyhow::bail!("provisioning failed");
        }
    };

    for note in &outcome.notes {
        println!(
            "  {} {} ({})",
            "✓".green(),
            note.operation,
            utils::format_duration(Duration::from_millis(note.duration_ms)).dimmed()
        );
    }

    let mut inventory = Inventory::new(&config.name, &config.ssh.user);
    for instance in &outcome.instances {
        // Every desired instance carries a role label.
        let Some(role) = instance.role.clone() else {
            continue;
        };
        let domain = config
            .host(&role)
            .map(|h| h.domain.clone())
            .unwrap_or_default();
        inventory.set_host(
            role,
            HostEntry {
                resource: instance.name.clone(),
                address: instance.address.clone(),
                domain,
            },
        );
    }
    store.save(&inventory).await?;
    lock.release().await?;

    println!();
    println!(
        "{}",
        format!(
            "✓ Forge \"{}\" provisioned in {}",
            config.name,
            utils::format_duration(Duration::from_millis(outcome.duration_ms))
        )
        .green()
        .bold()
    );
    for (role, entry) in &inventory.hosts {
        println!(
            "  {} {} {} ({})",
            "•".cyan(),
            role.bold(),
            entry.address,
            entry.domain
        );
    }
    println!();
    println!("Next: {}", "forge configure".cyan());
    Ok(())
}
