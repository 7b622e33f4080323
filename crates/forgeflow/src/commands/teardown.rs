use crate::utils;
use colored::Colorize;
use forgeflow_cloud::{Executor, InventoryStore, PlanMode, ProviderClient, ResourceSet};
use forgeflow_core::ForgeConfig;
use std::path::Path;

pub async fn handle(
    config: &ForgeConfig,
    project_root: &Path,
    confirm: &str,
) -> anyhow::Result<()> {
    // The gate: no provider work of any kind until the token matches.
    if confirm != config.name {
        utils::error_block(
            "Teardown refused",
            &format!(
                "--confirm \"{}\" does not match the forge name \"{}\"",
                confirm, config.name
            ),
            &format!(
                "Run `forge teardown --confirm {}` to delete every forge-managed resource.",
                config.name
            ),
        );
        anyhow::bail!("confirmation token does not match");
    }

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

    println!("{}", "Observing current state...".blue());
    let observed = provider.list_resources().await?;

    // Teardown is a reconcile against an empty desired set.
    let desired = ResourceSet::new();
    let plan = forgeflow_cloud::plan(&desired, &observed, PlanMode::Reconcile)?;

    let store = InventoryStore::new(project_root);
    if !plan.has_changes() {
        println!("{}", "Nothing to delete.".dimmed());
        store.delete().await?;
        return Ok(());
    }

    println!();
    println!(
        "{}",
        format!("Deleting {} resource(s):", plan.operations.len()).bold()
    );
    for op in &plan.operations {
        println!("  {} {}", "-".red(), op.description);
    }
    println!();

    let lock = store.acquire_lock().await?;
    let executor = Executor::new(&provider);
    match executor.apply(&plan, &desired).await {
        Ok(outcome) => {
            for note in &outcome.notes {
                println!("  {} {}", "✓".green(), note.operation);
            }
        }
        Err(e) => {
            let _ = lock.release().await;
            utils::error_block(
                "Teardown failed",
                &e.to_string(),
                "Already-deleted resources stay gone. Re-run `forge teardown` to finish.",
            );
            anyhow::bail!("teardown failed");
        }
    }

    store.delete().await?;
    lock.release().await?;

    println!();
    println!(
        "{}",
        format!("✓ Forge \"{}\" torn down", config.name).green().bold()
    );
    Ok(())
}
