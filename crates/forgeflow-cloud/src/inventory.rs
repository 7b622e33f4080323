//! Inventory persistence
//!
//! The inventory records what a provisioning pass produced: one entry per
//! role with the instance name, address and domain, plus the SSH user the
//! configurator logs in with. It lives at `.forgeflow/inventory.json` as
//! pretty JSON so operators can read it directly. It holds no secrets.
//!
//! Saves are atomic: the new content goes to a temp file in the same
//! directory, then renames over the old file. A crashed save leaves the
//! previous inventory intact.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const INVENTORY_VERSION: u32 = 1;
const STATE_DIR: &str = ".forgeflow";
const INVENTORY_FILE: &str = "inventory.json";
const INVENTORY_TEMP: &str = "inventory.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// The provisioned fleet, by role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    /// Format version of this file.
    pub version: u32,

    /// Forge name the hosts belong to.
    pub forge: String,

    /// Login user for every host.
    pub ssh_user: String,

    /// Last modified timestamp.
    pub updated_at: DateTime<Utc>,

    /// Host entries keyed by role.
    pub hosts: BTreeMap<String, HostEntry>,
}

impl Inventory {
    pub fn new(forge: impl Into<String>, ssh_user: impl Into<String>) -> Self {
        Self {
            version: INVENTORY_VERSION,
            forge: forge.into(),
            ssh_user: ssh_user.into(),
            updated_at: Utc::now(),
            hosts: BTreeMap::new(),
        }
    }

    /// Add or replace the entry for a role.
    pub fn set_host(&mut self, role: impl Into<String>, entry: HostEntry) {
        self.hosts.insert(role.into(), entry);
        self.updated_at = Utc::now();
    }

    pub fn host(&self, role: &str) -> Option<&HostEntry> {
        self.hosts.get(role)
    }

    pub fn roles(&self) -> Vec<&str> {
        self.hosts.keys().map(|k| k.as_str()).collect()
    }
}

/// One provisioned host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Cloud resource name of the instance.
    pub resource: String,

    /// External address the configurator connects to.
    pub address: String,

    /// Domain the host serves.
    pub domain: String,
}

/// Reads and writes the inventory and its lock file.
pub struct InventoryStore {
    project_root: PathBuf,
}

impl InventoryStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Path of the inventory file.
    pub fn path(&self) -> PathBuf {
        self.state_dir().join(INVENTORY_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.state_dir().join(INVENTORY_TEMP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the inventory. Missing file is an error with a pointer to
    /// `forge provision`; use [`exists`](Self::exists) when absence is fine.
    pub async fn load(&self) -> Result<Inventory> {
        let path = self.path();
        if !path.exists() {
            return Err(CloudError::InventoryError(
                "no inventory found; run `forge provision` first".to_string(),
            ));
        }

        let content = fs::read_to_string(&path).await?;
        let inventory: Inventory = serde_json::from_str(&content)?;

        if inventory.version > INVENTORY_VERSION {
            return Err(CloudError::InventoryError(format!(
                "inventory version {} is newer than supported version {}",
                inventory.version, INVENTORY_VERSION
            )));
        }

        tracing::debug!("Loaded inventory with {} hosts", inventory.hosts.len());
        Ok(inventory)
    }

    /// Save atomically: write a sibling temp file, then rename over the
    /// real one.
    pub async fn save(&self, inventory: &Inventory) -> Result<()> {
        self.ensure_state_dir().await?;

        let temp = self.temp_path();
        let content = serde_json::to_string_pretty(inventory)?;
        fs::write(&temp, content).await?;
        fs::rename(&temp, self.path()).await?;

        tracing::debug!("Saved inventory with {} hosts", inventory.hosts.len());
        Ok(())
    }

    /// Remove the inventory file. Already absent is fine.
    pub async fn delete(&self) -> Result<()> {
        let path = self.path();
        if path.exists() {
            fs::remove_file(&path).await?;
            tracing::debug!("Deleted inventory");
        }
        Ok(())
    }

    /// Acquire the lock guarding provisioning passes.
    pub async fn acquire_lock(&self) -> Result<InventoryLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Stale after one hour; a crashed pass must not wedge the
            // project forever.
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "inventory is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired inventory lock");
        Ok(InventoryLock {
            lock_path,
            released: false,
        })
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the inventory lock
#[derive(Debug)]
pub struct InventoryLock {
    lock_path: PathBuf,
    released: bool,
}

impl InventoryLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released inventory lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for InventoryLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            // Drop cannot await; fall back to the blocking call.
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
