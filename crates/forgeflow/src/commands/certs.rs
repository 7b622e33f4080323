use crate::utils;
use colored::Colorize;
use forgeflow_cloud::InventoryStore;
use forgeflow_core::ForgeConfig;
use forgeflow_setup::{
    CertRequest, ConfigReport, HostOutcome, HostReport, SshSession, SystemDnsResolver,
    issue_certificate,
};
use futures_util::future::join_all;
use std::path::Path;
use std::time::Instant;

pub async fn handle(
    config: &ForgeConfig,
    project_root: &Path,
    role: Option<&str>,
) -> anyhow::Result<()> {
    let admin_email = config.admin_email.as_deref().ok_or_else(|| {
        anyhow::anyhow!("certificates need an admin-email in the forge block of forge.kdl")
    })?;

    let store = InventoryStore::new(project_root);
    let inventory = store.load().await?;
    let selected = utils::select_hosts(config, &inventory, role)?;

    println!(
        "{}",
        format!("Requesting certificates for {} domain(s)...", selected.len()).blue()
    );

    let resolver = SystemDnsResolver;
    let futures = selected.iter().map(|(host, entry)| {
        let request = CertRequest {
            domain: host.domain.clone(),
            admin_email: admin_email.to_string(),
            host_address: entry.address.clone(),
        };
        let shell = SshSession::new(&inventory.ssh_user, &entry.address);
        let role = host.role.clone();
        let resolver = &resolver;
        async move {
            let started = Instant::now();
            let outcome = match issue_certificate(&shell, resolver, &request).await {
                Ok(outcome) => {
                    let line = format!("certbot: {}", outcome.message());
                    if outcome.changed() {
                        HostOutcome::Completed {
                            changed: vec![line],
                            unchanged: vec![],
                        }
                    } else {
                        HostOutcome::Completed {
                            changed: vec![],
                            unchanged: vec![line],
                        }
                    }
                }
                Err(error) => HostOutcome::Failed {
                    step: "certificate".to_string(),
                    error: error.to_string(),
                    not_run: vec![],
                },
            };
            HostReport {
                role,
                target: request.domain.clone(),
                outcome,
                duration: started.elapsed(),
            }
        }
    });

    let report = ConfigReport::new(join_all(futures).await);
    utils::render_report(&report);

    if !report.all_succeeded() {
        anyhow::bail!(
            "{} domain(s) failed certificate issuance",
            report.failure_count()
        );
    }
    Ok(())
}
