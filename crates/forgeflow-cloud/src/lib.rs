//! ForgeFlow reconciliation engine
//!
//! This crate turns a desired resource set into an ordered plan and applies
//! it against a cloud provider, converging the provider toward the
//! declaration instead of replaying fixed steps.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   forge CLI                      │
//! │        (forge provision / teardown / ...)        │
//! └─────────────────┬───────────────────────────────┘
//!                   │ desired ResourceSet
//! ┌─────────────────▼───────────────────────────────┐
//! │               forgeflow-cloud                    │
//! │  ┌──────────────┐     ┌───────────────────┐     │
//! │  │   Planner    │────▶│     Executor      │     │
//! │  │ (pure diff)  │Plan │ (retry, re-check) │     │
//! │  └──────────────┘     └─────────┬─────────┘     │
//! │  ┌──────────────┐               │               │
//! │  │  Inventory   │      trait ProviderClient     │
//! │  └──────────────┘               │               │
//! └─────────────────────────────────┼───────────────┘
//!                                   │
//!                         ┌─────────▼─────────┐
//!                         │ forgeflow-cloud-  │
//!                         │       gcp         │
//!                         └───────────────────┘
//! ```
//!
//! The planner is a pure function; every provider interaction lives in the
//! executor behind the [`ProviderClient`] trait, which is what makes the
//! whole engine runnable against an in-memory fake.

pub mod error;
pub mod executor;
pub mod inventory;
pub mod plan;
pub mod provider;
pub mod resource;

// Re-exports
pub use error::{CloudError, Result};
pub use executor::{ApplyOutcome, Executor, OperationNote, PollConfig, ProvisionedInstance};
pub use inventory::{HostEntry, Inventory, InventoryLock, InventoryStore};
pub use plan::{OpKind, Operation, Plan, PlanMode, PlanSummary, plan};
pub use provider::{AuthStatus, ProviderClient, RetryConfig};
pub use resource::{
    ResourceKind, ResourceSet, ResourceShape, ResourceSpec, ResourceState, ResourceStatus,
};
