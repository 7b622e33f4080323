//! Remote docker queries
//!
//! Status and credential reads go through the docker CLI on the host, one
//! JSON object per `docker ps` line.

use crate::error::{Result, SetupError};
use crate::ssh::{RemoteShell, shell_escape};
use serde::Deserialize;

/// One row of `docker ps --format '{{json .}}'`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerStatus {
    #[serde(default, rename = "ID")]
    pub id: String,
    #[serde(rename = "Names")]
    pub names: String,
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(default, rename = "State")]
    pub state: String,
    #[serde(default, rename = "Status")]
    pub status: String,
    #[serde(default, rename = "Ports")]
    pub ports: String,
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// List every container on the host, running or not.
pub async fn list_containers(shell: &dyn RemoteShell) -> Result<Vec<ContainerStatus>> {
    let output = shell
        .run("sudo docker ps --all --format '{{json .}}'")
        .await?;
    if !output.success() {
        return Err(SetupError::DockerOutput(output.stderr.trim().to_string()));
    }
    parse_container_lines(&output.stdout)
}

fn parse_container_lines(stdout: &str) -> Result<Vec<ContainerStatus>> {
    let mut containers = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        containers.push(serde_json::from_str(line)?);
    }
    Ok(containers)
}

/// Read a file from inside a running container.
pub async fn read_container_file(
    shell: &dyn RemoteShell,
    container: &str,
    path: &str,
) -> Result<String> {
    let command = format!(
        "sudo docker exec {} cat {}",
        shell_escape(container),
        shell_escape(path)
    );
    let output = shell.run(&command).await?;
    if !output.success() {
        return Err(SetupError::CommandFailed {
            command,
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output.stdout.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedShell;

    #[test]
    fn test_parse_container_lines() {
        let stdout = concat!(
            r#"{"ID":"9f1a","Names":"jenkins","Image":"jenkins/jenkins:lts-jdk17","State":"running","Status":"Up 2 hours","Ports":"127.0.0.1:8080->8080/tcp"}"#,
            "\n",
            r#"{"ID":"77b0","Names":"old-job","Image":"alpine:3","State":"exited","Status":"Exited (0) 3 days ago","Ports":""}"#,
            "\n\n",
        );

        let containers = parse_container_lines(stdout).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].names, "jenkins");
        assert!(containers[0].is_running());
        assert!(!containers[1].is_running());
    }

    #[tokio::test]
    async fn test_list_containers_surfaces_daemon_errors() {
        let shell = ScriptedShell::new("203.0.113.10").on(
            "docker ps",
            ScriptedShell::fail(1, "Cannot connect to the Docker daemon"),
        );

        let err = list_containers(&shell).await.unwrap_err();
        assert!(matches!(err, SetupError::DockerOutput(_)));
        assert!(err.to_string().contains("Docker daemon"));
    }

    #[tokio::test]
    async fn test_read_container_file_trims_output() {
        let shell = ScriptedShell::new("203.0.113.10").on(
            "docker exec 'jenkins' cat",
            ScriptedShell::ok("2f1d6e9a404b4f6f8a0f2f6f1d2c3b4a\n"),
        );

        let secret = read_container_file(
            &shell,
            "jenkins",
            "/var/jenkins_home/secrets/initialAdminPassword",
        )
        .await
        .unwrap();

        assert_eq!(secret, "2f1d6e9a404b4f6f8a0f2f6f1d2c3b4a");
    }

    #[tokio::test]
    async fn test_read_container_file_fails_when_absent() {
        let shell = ScriptedShell::new("203.0.113.10").on(
            "docker exec",
            ScriptedShell::fail(1, "No such file or directory"),
        );

        let err = read_container_file(&shell, "jenkins", "/nope").await.unwrap_err();
        assert!(matches!(err, SetupError::CommandFailed { .. }));
    }
}
