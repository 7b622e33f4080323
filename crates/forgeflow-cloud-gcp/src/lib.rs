//! Google Cloud provider for ForgeFlow
//!
//! This crate implements the ProviderClient trait on top of the `gcloud`
//! CLI, letting ForgeFlow manage networks, firewall rules, and compute
//! instances on Google Cloud.
//!
//! # Requirements
//!
//! - `gcloud` CLI must be installed and configured
//! - Authentication is managed through `gcloud auth login`
//!
//! # Example
//!
//! ```ignore
//! use forgeflow_cloud::ProviderClient;
//! use forgeflow_cloud_gcp::GcpProvider;
//!
//! let provider = GcpProvider::new("acme-prod", "europe-west1-b", "acme-forge-")
//!     .with_ssh_key("ops", "ssh-ed25519 AAAA... ops@acme");
//!
//! // Check authentication
//! let auth = provider.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//!
//! // Observe the forge's resources
//! let observed = provider.list_resources().await?;
//! ```

pub mod error;
pub mod gcloud;
pub mod provider;

pub use error::{GcpError, Result};
pub use gcloud::{CreateInstanceConfig, FirewallInfo, Gcloud, InstanceInfo, NetworkInfo};
pub use provider::{GcpProvider, SshKeyEntry};
