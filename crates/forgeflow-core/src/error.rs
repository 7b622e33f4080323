use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("host \"{host}\" is missing required setting: {setting}")]
    MissingSetting { host: String, setting: String },

    #[error("duplicate host role: \"{0}\"")]
    DuplicateRole(String),

    #[error("duplicate domain: \"{0}\" (each host needs its own domain)")]
    DuplicateDomain(String),

    #[error(
        "project root not found\nsearched upward from: {0}\nhint: run inside a directory containing forge.kdl"
    )]
    ProjectRootNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
