//! Idempotent configuration steps
//!
//! Each step checks the host first and mutates only when the observed state
//! differs from the declared one. Re-running a completed plan yields a
//! sequence of `Unchanged` outcomes.

use crate::error::{Result, SetupError};
use crate::ssh::{CommandOutput, RemoteShell, shell_escape};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::BTreeMap;

/// One idempotent configuration unit.
#[derive(Debug, Clone)]
pub struct ConfigStep {
    /// Short stable identifier, e.g. "app-container".
    pub id: String,
    pub description: String,
    pub action: StepAction,
}

impl ConfigStep {
    pub fn new(id: impl Into<String>, description: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            action,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StepAction {
    /// Install apt packages that are missing.
    EnsurePackages { packages: Vec<String> },

    /// Enable and start a systemd unit.
    EnsureService { unit: String },

    /// Create a named docker volume if absent.
    EnsureDockerVolume { name: String },

    /// Run a container with the declared image and wiring. A container on a
    /// different image is recreated; a stopped one is started.
    EnsureContainer {
        name: String,
        image: String,
        /// Published on loopback only; nginx fronts it.
        port: u16,
        /// (volume name, mount path) pairs.
        volumes: Vec<(String, String)>,
        env: BTreeMap<String, String>,
    },

    /// Write a file when its content differs. `reload` runs only after a
    /// write.
    PutFile {
        path: String,
        content: String,
        reload: Option<String>,
    },
}

/// What a step did to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Changed(String),
    Unchanged(String),
}

impl StepOutcome {
    pub fn message(&self) -> &str {
        match self {
            StepOutcome::Changed(message) | StepOutcome::Unchanged(message) => message,
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, StepOutcome::Changed(_))
    }
}

/// Run one step against a host.
pub async fn run_step(shell: &dyn RemoteShell, step: &ConfigStep) -> Result<StepOutcome> {
    match &step.action {
        StepAction::EnsurePackages { packages } => ensure_packages(shell, packages).await,
        StepAction::EnsureService { unit } => ensure_service(shell, unit).await,
        StepAction::EnsureDockerVolume { name } => ensure_docker_volume(shell, name).await,
        StepAction::EnsureContainer {
            name,
            image,
            port,
            volumes,
            env,
        } => ensure_container(shell, name, image, *port, volumes, env).await,
        StepAction::PutFile {
            path,
            content,
            reload,
        } => put_file(shell, path, content, reload.as_deref()).await,
    }
}

/// Run a command that must succeed.
async fn run_checked(shell: &dyn RemoteShell, command: &str) -> Result<CommandOutput> {
    let output = shell.run(command).await?;
    if !output.success() {
        return Err(SetupError::CommandFailed {
            command: command.to_string(),
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

async fn ensure_packages(shell: &dyn RemoteShell, packages: &[String]) -> Result<StepOutcome> {
    let mut missing = Vec::new();
    for package in packages {
        let check = format!(
            "dpkg-query -W -f '${{Status}}' {} 2>/dev/null | grep -q 'install ok installed'",
            shell_escape(package)
        );
        let output = shell.run(&check).await?;
        if !output.success() {
            missing.push(package.clone());
        }
    }

    if missing.is_empty() {
        return Ok(StepOutcome::Unchanged(format!(
            "{} package(s) present",
            packages.len()
        )));
    }

    run_checked(shell, "sudo apt-get update -qq").await?;
    let install = format!(
        "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y -qq {}",
        missing
            .iter()
            .map(|package| shell_escape(package))
            .collect::<Vec<_>>()
            .join(" ")
    );
    run_checked(shell, &install).await?;

    Ok(StepOutcome::Changed(format!(
        "installed {}",
        missing.join(", ")
    )))
}

async fn ensure_service(shell: &dyn RemoteShell, unit: &str) -> Result<StepOutcome> {
    let escaped = shell_escape(unit);
    let active = shell
        .run(&format!("systemctl is-active --quiet {}", escaped))
        .await?;
    let enabled = shell
        .run(&format!("systemctl is-enabled --quiet {}", escaped))
        .await?;

    if active.success() && enabled.success() {
        return Ok(StepOutcome::Unchanged(format!("{} active", unit)));
    }

    run_checked(shell, &format!("sudo systemctl enable --now {}", escaped)).await?;
    Ok(StepOutcome::Changed(format!("{} enabled and started", unit)))
}

async fn ensure_docker_volume(shell: &dyn RemoteShell, name: &str) -> Result<StepOutcome> {
    let escaped = shell_escape(name);
    let inspect = shell
        .run(&format!(
            "sudo docker volume inspect {} >/dev/null 2>&1",
            escaped
        ))
        .await?;

    if inspect.success() {
        return Ok(StepOutcome::Unchanged(format!("volume {} present", name)));
    }

    run_checked(shell, &format!("sudo docker volume create {}", escaped)).await?;
    Ok(StepOutcome::Changed(format!("volume {} created", name)))
}

async fn ensure_container(
    shell: &dyn RemoteShell,
    name: &str,
    image: &str,
    port: u16,
    volumes: &[(String, String)],
    env: &BTreeMap<String, String>,
) -> Result<StepOutcome> {
    let escaped_name = shell_escape(name);
    let inspect = shell
        .run(&format!(
            "sudo docker inspect --format '{{{{.Config.Image}}}} {{{{.State.Running}}}}' {}",
            escaped_name
        ))
        .await?;

    if inspect.success() {
        let mut parts = inspect.stdout.split_whitespace();
        let current_image = parts.next().unwrap_or("");
        let running = parts.next() == Some("true");

        if current_image == image {
            if running {
                return Ok(StepOutcome::Unchanged(format!("{} running {}", name, image)));
            }
            run_checked(shell, &format!("sudo docker start {}", escaped_name)).await?;
            return Ok(StepOutcome::Changed(format!("{} started", name)));
        }

        // Image drift: replace the container. Named volumes keep the data.
        run_checked(shell, &format!("sudo docker rm -f {}", escaped_name)).await?;
        run_checked(shell, &docker_run_command(name, image, port, volumes, env)).await?;
        return Ok(StepOutcome::Changed(format!(
            "{} recreated with {}",
            name, image
        )));
    }

    run_checked(shell, &docker_run_command(name, image, port, volumes, env)).await?;
    Ok(StepOutcome::Changed(format!("{} created from {}", name, image)))
}

/// Build the `docker run` line for a service container.
fn docker_run_command(
    name: &str,
    image: &str,
    port: u16,
    volumes: &[(String, String)],
    env: &BTreeMap<String, String>,
) -> String {
    let mut command = format!(
        "sudo docker run -d --name {} --restart unless-stopped -p 127.0.0.1:{}:{}",
        shell_escape(name),
        port,
        port
    );

    for (volume, path) in volumes {
        command.push_str(&format!(
            " -v {}",
            shell_escape(&format!("{}:{}", volume, path))
        ));
    }

    for (key, value) in env {
        command.push_str(&format!(
            " -e {}={}",
            shell_escape(key),
            shell_escape(value)
        ));
    }

    command.push_str(&format!(" {}", shell_escape(image)));
    command
}

async fn put_file(
    shell: &dyn RemoteShell,
    path: &str,
    content: &str,
    reload: Option<&str>,
) -> Result<StepOutcome> {
    let encoded = BASE64.encode(content);
    let escaped_path = shell_escape(path);

    let current = shell
        .run(&format!("sudo base64 -w0 {} 2>/dev/null", escaped_path))
        .await?;
    if current.success() && current.stdout.trim() == encoded {
        return Ok(StepOutcome::Unchanged(format!("{} up to date", path)));
    }

    let write = format!(
        "echo {} | base64 -d | sudo tee {} >/dev/null",
        shell_escape(&encoded),
        escaped_path
    );
    run_checked(shell, &write).await?;

    if let Some(reload_command) = reload {
        run_checked(shell, reload_command).await?;
    }

    Ok(StepOutcome::Changed(format!("{} written", path)))
}
