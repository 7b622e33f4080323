//! ForgeFlow core: configuration model and KDL parsing
//!
//! This crate defines the declarative model behind `forge.kdl`, the single
//! file that describes a forge deployment (provider, machine shape, SSH
//! access, and the hosts with their services), together with the parser,
//! validation, and project-root discovery.

pub mod discovery;
pub mod error;
pub mod model;
pub mod parser;

// Re-exports
pub use discovery::{config_path, find_project_root};
pub use error::{ConfigError, Result};
pub use model::{
    ForgeConfig, HostConfig, MachineConfig, ProviderConfig, ServiceConfig, SshConfig, VolumeMount,
};
pub use parser::{load_config, parse_config};
