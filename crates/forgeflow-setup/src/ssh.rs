//! Remote command execution over SSH

use crate::error::{Result, SetupError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::sleep;

/// Output of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One host's shell. `Err` from `run` means the connection itself failed;
/// a nonzero remote exit is an `Ok` carrying that code.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Address or alias the shell connects to.
    fn target(&self) -> &str;

    async fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// SSH-backed shell. Non-interactive: BatchMode refuses password prompts
/// and unknown host keys are accepted on first contact.
pub struct SshSession {
    user: String,
    address: String,
    connect_timeout: Duration,
}

impl SshSession {
    pub fn new(user: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            address: address.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    fn target(&self) -> &str {
        &self.address
    }

    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let destination = self.destination();
        let connect_timeout = format!("ConnectTimeout={}", self.connect_timeout.as_secs());
        tracing::debug!("Running: ssh {} {}", destination, command);

        let output = Command::new("ssh")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(&connect_timeout)
            .arg(&destination)
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        // ssh itself exits 255 when the connection fails
        if exit_code == 255 {
            return Err(SetupError::ConnectionFailed {
                host: self.address.clone(),
                detail: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
        })
    }
}

/// Exponential backoff for SSH readiness.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_retries: 20,
            initial_delay_ms: 2000,
            max_delay_ms: 30000,
            multiplier: 1.5,
        }
    }
}

impl WaitConfig {
    /// Delay after `attempt` (0-indexed), in milliseconds.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        (delay as u64).min(self.max_delay_ms)
    }
}

/// Wait until the host answers a trivial command.
pub async fn wait_until_ready(shell: &dyn RemoteShell, config: &WaitConfig) -> Result<()> {
    let mut last_error = String::new();

    for attempt in 0..config.max_retries {
        match shell.run("true").await {
            Ok(output) if output.success() => return Ok(()),
            Ok(output) => {
                last_error = format!("probe exited {}", output.exit_code);
            }
            Err(err) => {
                last_error = err.to_string();
            }
        }

        if attempt + 1 < config.max_retries {
            let delay_ms = config.delay_for_attempt(attempt);
            tracing::debug!(
                "host {} not ready yet, retrying in {}ms",
                shell.target(),
                delay_ms
            );
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    Err(SetupError::ConnectivityTimeout {
        host: shell.target().to_string(),
        attempts: config.max_retries,
        cause: last_error,
    })
}

/// Wrap a value in single quotes for safe interpolation into a remote
/// command line.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
