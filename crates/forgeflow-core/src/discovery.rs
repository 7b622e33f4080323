//! Project root discovery
//!
//! A forge project is any directory containing `forge.kdl`, either directly
//! or under `.forgeflow/`.

use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Locate the project root.
///
/// Search order:
/// 1. `FORGEFLOW_PROJECT_ROOT` environment variable
/// 2. the current directory, then each parent, looking for `forge.kdl`
///    or `.forgeflow/forge.kdl`
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("FORGEFLOW_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking FORGEFLOW_PROJECT_ROOT");
        if config_path(&path).is_some() {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    let start_dir = std::env::current_dir()?;
    let mut current = start_dir.clone();
    debug!(start_dir = %start_dir.display(), "Searching for project root");

    loop {
        if config_path(&current).is_some() {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::ProjectRootNotFound(start_dir))
}

/// Path of the config file under a project root, if one exists.
///
/// `forge.kdl` at the root takes priority over `.forgeflow/forge.kdl`.
pub fn config_path(project_root: &Path) -> Option<PathBuf> {
    let root_file = project_root.join("forge.kdl");
    if root_file.exists() {
        return Some(root_file);
    }
    let hidden_file = project_root.join(".forgeflow/forge.kdl");
    if hidden_file.exists() {
        return Some(hidden_file);
    }
    None
}
