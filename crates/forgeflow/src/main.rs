mod commands;
mod resources;
mod utils;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "forge")]
#[command(about = "Provision, configure and certify a small developer forge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update cloud resources to match forge.kdl
    Provision {
        /// Print the plan without applying it
        #[arg(long)]
        dry_run: bool,
        /// Also delete forge-scoped resources no longer declared
        #[arg(long)]
        reconcile: bool,
    },
    /// Install and start services on the provisioned hosts
    Configure {
        /// Limit the pass to one role
        #[arg(short, long)]
        role: Option<String>,
    },
    /// Obtain TLS certificates for the configured domains
    Certs {
        /// Limit the pass to one role
        #[arg(short, long)]
        role: Option<String>,
    },
    /// Show instance, container and endpoint health for every host
    Status,
    /// Print the initial admin password generated by a host's service
    Credentials {
        /// Host role, e.g. "ci"
        role: String,
    },
    /// Delete every forge-managed cloud resource
    Teardown {
        /// Forge name, typed out as confirmation
        #[arg(long)]
        confirm: String,
    },
    /// Parse forge.kdl and print the resolved model
    Validate,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    // Version needs no configuration file.
    if matches!(cli.command, Commands::Version) {
        println!("forgeflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let project_root = forgeflow_core::find_project_root()?;
    let config_path = forgeflow_core::config_path(&project_root)
        .ok_or_else(|| anyhow::anyhow!("no forge.kdl under {}", project_root.display()))?;
    let config = forgeflow_core::load_config(&config_path)?;

    match cli.command {
        Commands::Provision { dry_run, reconcile } => {
            commands::provision::handle(&config, &project_root, dry_run, reconcile).await
        }
        Commands::Configure { role } => {
            commands::configure::handle(&config, &project_root, role.as_deref()).await
        }
        Commands::Certs { role } => {
            commands::certs::handle(&config, &project_root, role.as_deref()).await
        }
        Commands::Status => commands::status::handle(&config, &project_root).await,
        Commands::Credentials { role } => {
            commands::credentials::handle(&config, &project_root, &role).await
        }
        Commands::Teardown { confirm } => {
            commands::teardown::handle(&config, &project_root, &confirm).await
        }
        Commands::Validate => commands::validate::handle(&config, &config_path),
        Commands::Version => unreachable!("Version is handled before config loading"),
    }
}
