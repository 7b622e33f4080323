//! Thin wrapper around the `gcloud` CLI
//!
//! All provider traffic goes through `gcloud ... --format json`. Stdout is
//! decoded into the typed structs below; stderr from failed invocations is
//! classified into retryable and fatal errors.

use crate::error::{GcpError, Result};
use forgeflow_cloud::AuthStatus;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;

/// Client for the `gcloud` CLI, scoped to one project and zone.
#[derive(Debug, Clone)]
pub struct Gcloud {
    project: String,
    zone: String,
}

impl Gcloud {
    pub fn new(project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            zone: zone.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Run a gcloud command and return stdout. Always JSON output, never
    /// interactive.
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        tracing::debug!(
            "Running: gcloud {} --project {} --format json",
            args.join(" "),
            self.project
        );

        let output = Command::new("gcloud")
            .args(args)
            .arg("--project")
            .arg(&self.project)
            .arg("--format")
            .arg("json")
            .arg("--quiet")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GcpError::GcloudNotFound
                } else {
                    GcpError::IoError(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    // === Authentication ===

    /// Check that gcloud has an active account.
    pub async fn check_auth(&self) -> Result<AuthStatus> {
        let output = self
            .run_command(&["auth", "list", "--filter", "status:ACTIVE"])
            .await?;
        let accounts: Vec<AuthAccount> = parse_json_list(&output)?;

        match accounts.into_iter().next() {
            Some(account) => Ok(AuthStatus::ok(account.account)),
            None => Ok(AuthStatus::failed(
                "no active gcloud account; run `gcloud auth login`",
            )),
        }
    }

    // === Networks ===

    pub async fn list_networks(&self, prefix: &str) -> Result<Vec<NetworkInfo>> {
        let filter = format!("name~^{}", prefix);
        let output = self
            .run_command(&["compute", "networks", "list", "--filter", &filter])
            .await?;
        parse_json_list(&output)
    }

    pub async fn describe_network(&self, name: &str) -> Result<Option<NetworkInfo>> {
        match self
            .run_command(&["compute", "networks", "describe", name])
            .await
        {
            Ok(output) => Ok(Some(serde_json::from_str(output.trim())?)),
            Err(GcpError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_network(&self, name: &str, auto_subnets: bool) -> Result<NetworkInfo> {
        let subnet_mode = if auto_subnets { "auto" } else { "custom" };
        let output = self
            .run_command(&[
                "compute",
                "networks",
                "create",
                name,
                "--subnet-mode",
                subnet_mode,
            ])
            .await?;
        first_created(&output, name)
    }

    pub async fn delete_network(&self, name: &str) -> Result<()> {
        self.run_command(&["compute", "networks", "delete", name])
            .await?;
        Ok(())
    }

    // === Firewall rules ===

    pub async fn list_firewall_rules(&self, prefix: &str) -> Result<Vec<FirewallInfo>> {
        let filter = format!("name~^{}", prefix);
        let output = self
            .run_command(&["compute", "firewall-rules", "list", "--filter", &filter])
            .await?;
        parse_json_list(&output)
    }

    pub async fn describe_firewall_rule(&self, name: &str) -> Result<Option<FirewallInfo>> {
        match self
            .run_command(&["compute", "firewall-rules", "describe", name])
            .await
        {
            Ok(output) => Ok(Some(serde_json::from_str(output.trim())?)),
            Err(GcpError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_firewall_rule(
        &self,
        name: &str,
        network: &str,
        allowed_ports: &[u16],
        source_ranges: &[String],
    ) -> Result<FirewallInfo> {
        let allow = allowed_ports
            .iter()
            .map(|port| format!("tcp:{}", port))
            .collect::<Vec<_>>()
            .join(",");
        let ranges = source_ranges.join(",");
        let output = self
            .run_command(&[
                "compute",
                "firewall-rules",
                "create",
                name,
                "--network",
                network,
                "--direction",
                "INGRESS",
                "--allow",
                &allow,
                "--source-ranges",
                &ranges,
            ])
            .await?;
        first_created(&output, name)
    }

    pub async fn delete_firewall_rule(&self, name: &str) -> Result<()> {
        self.run_command(&["compute", "firewall-rules", "delete", name])
            .await?;
        Ok(())
    }

    // === Instances ===

    pub async fn list_instances(&self, prefix: &str) -> Result<Vec<InstanceInfo>> {
        let filter = format!("name~^{}", prefix);
        let output = self
            .run_command(&["compute", "instances", "list", "--filter", &filter])
            .await?;
        parse_json_list(&output)
    }

    pub async fn describe_instance(&self, name: &str) -> Result<Option<InstanceInfo>> {
        match self
            .run_command(&[
                "compute",
                "instances",
                "describe",
                name,
                "--zone",
                &self.zone,
            ])
            .await
        {
            Ok(output) => Ok(Some(serde_json::from_str(output.trim())?)),
            Err(GcpError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_instance(
        &self,
        name: &str,
        config: &CreateInstanceConfig,
    ) -> Result<InstanceInfo> {
        let args = instance_create_args(name, config);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_command(&refs).await?;
        first_created(&output, name)
    }

    pub async fn update_instance_labels(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let formatted = format_labels(labels);
        self.run_command(&[
            "compute",
            "instances",
            "update",
            name,
            "--zone",
            &self.zone,
            "--update-labels",
            &formatted,
        ])
        .await?;
        Ok(())
    }

    pub async fn delete_instance(&self, name: &str) -> Result<()> {
        self.run_command(&[
            "compute",
            "instances",
            "delete",
            name,
            "--zone",
            &self.zone,
        ])
        .await?;
        Ok(())
    }
}

/// Parameters for `gcloud compute instances create`.
#[derive(Debug, Clone)]
pub struct CreateInstanceConfig {
    pub machine_type: String,
    pub zone: String,
    pub network: String,
    pub image_family: String,
    pub boot_disk_size_gb: u32,
    pub labels: BTreeMap<String, String>,
    pub ssh_user: Option<String>,
    pub ssh_public_key: Option<String>,
}

/// Assemble the argument list for `gcloud compute instances create`.
fn instance_create_args(name: &str, config: &CreateInstanceConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "compute".into(),
        "instances".into(),
        "create".into(),
        name.into(),
        "--zone".into(),
        config.zone.clone(),
        "--machine-type".into(),
        config.machine_type.clone(),
        "--network".into(),
        config.network.clone(),
        "--image-family".into(),
        config.image_family.clone(),
        "--image-project".into(),
        image_project_for(&config.image_family).into(),
        "--boot-disk-size".into(),
        format!("{}GB", config.boot_disk_size_gb),
    ];

    if !config.labels.is_empty() {
        args.push("--labels".into());
        args.push(format_labels(&config.labels));
    }

    if let Some(user) = &config.ssh_user
        && let Some(key) = &config.ssh_public_key
    {
        args.push("--metadata".into());
        args.push(format!("ssh-keys={}:{}", user, key.trim()));
    }

    args
}

/// Image project hosting a given image family.
fn image_project_for(family: &str) -> &'static str {
    if family.starts_with("ubuntu") {
        "ubuntu-os-cloud"
    } else if family.starts_with("debian") {
        "debian-cloud"
    } else if family.starts_with("cos") {
        "cos-cloud"
    } else if family.starts_with("rocky") {
        "rocky-linux-cloud"
    } else {
        "debian-cloud"
    }
}

/// Render labels in the `key=value,key=value` form gcloud expects.
fn format_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

const TRANSIENT_MARKERS: [&str; 7] = [
    "httperror 500",
    "httperror 502",
    "httperror 503",
    "internal error",
    "backenderror",
    "connection reset",
    "temporarily unavailable",
];

/// Classify gcloud stderr into an error the executor can act on.
fn classify_stderr(stderr: &str) -> GcpError {
    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();

    if lower.contains("was not found") || lower.contains("httperror 404") {
        GcpError::NotFound(message)
    } else if (lower.contains("quota") && lower.contains("exceeded"))
        || lower.contains("ratelimitexceeded")
        || lower.contains("rate limit")
    {
        GcpError::QuotaExceeded(message)
    } else if TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        GcpError::Transient(message)
    } else if lower.contains("permission")
        || lower.contains("login required")
        || lower.contains("credential")
        || lower.contains("reauthentication")
    {
        GcpError::AuthenticationFailed(message)
    } else {
        GcpError::CommandFailed(message)
    }
}

/// List output is empty, `[]`, or a JSON array.
fn parse_json_list<T: serde::de::DeserializeOwned>(output: &str) -> Result<Vec<T>> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "[]" {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// `create` echoes the created resources as a one-element array; older
/// gcloud releases print a bare object.
fn first_created<T: serde::de::DeserializeOwned>(output: &str, name: &str) -> Result<T> {
    let trimmed = output.trim();
    if let Ok(list) = serde_json::from_str::<Vec<T>>(trimmed) {
        return list.into_iter().next().ok_or_else(|| {
            GcpError::InvalidResponse(format!("create returned no resource for \"{}\"", name))
        });
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// One credentialed account from `gcloud auth list`.
#[derive(Debug, Deserialize)]
pub struct AuthAccount {
    pub account: String,
    #[serde(default)]
    pub status: String,
}

/// VPC network as reported by gcloud.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub auto_create_subnetworks: bool,
    #[serde(default)]
    pub self_link: Option<String>,
}

/// Firewall rule as reported by gcloud.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallInfo {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub source_ranges: Vec<String>,
    #[serde(default)]
    pub allowed: Vec<AllowedRule>,
    #[serde(default)]
    pub self_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllowedRule {
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,
    #[serde(default)]
    pub ports: Vec<String>,
}

impl FirewallInfo {
    /// Network name, stripped of the self-link prefix.
    pub fn network_name(&self) -> &str {
        last_segment(&self.network)
    }

    /// TCP ports opened by the rule, sorted. Port ranges are skipped.
    pub fn tcp_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .allowed
            .iter()
            .filter(|rule| rule.ip_protocol.eq_ignore_ascii_case("tcp"))
            .flat_map(|rule| rule.ports.iter())
            .filter_map(|port| port.parse().ok())
            .collect();
        ports.sort_unstable();
        ports.dedup();
        ports
    }
}

/// Compute instance as reported by gcloud.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub machine_type: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    #[serde(default)]
    pub disks: Vec<AttachedDisk>,
    #[serde(default)]
    pub self_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default)]
    pub network: String,
    #[serde(rename = "networkIP", default)]
    pub network_ip: Option<String>,
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(rename = "natIP", default)]
    pub nat_ip: Option<String>,
    #[serde(rename = "type", default)]
    pub config_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    #[serde(default)]
    pub boot: bool,
    /// gcloud reports disk sizes as strings.
    #[serde(default)]
    pub disk_size_gb: Option<String>,
    #[serde(default)]
    pub licenses: Vec<String>,
}

impl InstanceInfo {
    pub fn is_running(&self) -> bool {
        self.status == "RUNNING"
    }

    pub fn machine_type_name(&self) -> &str {
        last_segment(&self.machine_type)
    }

    pub fn zone_name(&self) -> &str {
        last_segment(&self.zone)
    }

    /// Network of the first interface.
    pub fn network_name(&self) -> Option<&str> {
        self.network_interfaces
            .first()
            .map(|iface| last_segment(&iface.network))
    }

    pub fn internal_ip(&self) -> Option<&str> {
        self.network_interfaces
            .first()
            .and_then(|iface| iface.network_ip.as_deref())
    }

    /// Public address from the first NAT access config.
    pub fn external_ip(&self) -> Option<&str> {
        self.network_interfaces
            .first()
            .and_then(|iface| iface.access_configs.first())
            .and_then(|config| config.nat_ip.as_deref())
    }

    pub fn boot_disk_size_gb(&self) -> Option<u32> {
        self.disks
            .iter()
            .find(|disk| disk.boot)
            .and_then(|disk| disk.disk_size_gb.as_deref())
            .and_then(|size| size.parse().ok())
    }

    /// Image family of the boot disk, recovered from its license link.
    pub fn image_family(&self) -> Option<&str> {
        self.disks
            .iter()
            .find(|disk| disk.boot)
            .and_then(|disk| disk.licenses.first())
            .map(|license| last_segment(license))
    }
}

fn last_segment(link: &str) -> &str {
    link.rsplit('/').next().unwrap_or(link)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCE_JSON: &str = r#"{
        "id": "5558675309",
        "name": "acme-forge-ci",
        "status": "RUNNING",
        "machineType": "https://www.googleapis.com/compute/v1/projects/acme-prod/zones/europe-west1-b/machineTypes/e2-standard-2",
        "zone": "https://www.googleapis.com/compute/v1/projects/acme-prod/zones/europe-west1-b",
        "labels": {"forge": "acme-forge", "role": "ci"},
        "networkInterfaces": [{
            "network": "https://www.googleapis.com/compute/v1/projects/acme-prod/global/networks/acme-forge-net",
            "networkIP": "10.132.0.4",
            "accessConfigs": [{"natIP": "203.0.113.10", "type": "ONE_TO_ONE_NAT"}]
        }],
        "disks": [{
            "boot": true,
            "diskSizeGb": "50",
            "licenses": ["https://www.googleapis.com/compute/v1/projects/ubuntu-os-cloud/global/licenses/ubuntu-2204-lts"]
        }]
    }"#;

    #[test]
    fn test_instance_info_decodes() {
        let info: InstanceInfo = serde_json::from_str(INSTANCE_JSON).unwrap();

        assert_eq!(info.name, "acme-forge-ci");
        assert!(info.is_running());
        assert_eq!(info.machine_type_name(), "e2-standard-2");
        assert_eq!(info.zone_name(), "europe-west1-b");
        assert_eq!(info.network_name(), Some("acme-forge-net"));
        assert_eq!(info.internal_ip(), Some("10.132.0.4"));
        assert_eq!(info.external_ip(), Some("203.0.113.10"));
        assert_eq!(info.boot_disk_size_gb(), Some(50));
        assert_eq!(info.image_family(), Some("ubuntu-2204-lts"));
        assert_eq!(info.labels.get("role"), Some(&"ci".to_string()));
    }

    #[test]
    fn test_instance_without_address() {
        let info: InstanceInfo = serde_json::from_str(
            r#"{"name": "acme-forge-ci", "status": "PROVISIONING", "networkInterfaces": [{"network": "n"}]}"#,
        )
        .unwrap();

        assert!(!info.is_running());
        assert_eq!(info.external_ip(), None);
    }

    #[test]
    fn test_firewall_tcp_ports_sorted_and_ranges_skipped() {
        let info: FirewallInfo = serde_json::from_str(
            r#"{
                "name": "acme-forge-allow-web",
                "network": ".../networks/acme-forge-net",
                "sourceRanges": ["0.0.0.0/0"],
                "allowed": [
                    {"IPProtocol": "tcp", "ports": ["443", "80", "8000-8010"]},
                    {"IPProtocol": "udp", "ports": ["53"]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(info.tcp_ports(), vec![80, 443]);
        assert_eq!(info.network_name(), "acme-forge-net");
    }

    #[test]
    fn test_network_info_decodes() {
        let info: NetworkInfo = serde_json::from_str(
            r#"{"id": "42", "name": "acme-forge-net", "autoCreateSubnetworks": true}"#,
        )
        .unwrap();

        assert_eq!(info.name, "acme-forge-net");
        assert!(info.auto_create_subnetworks);
    }

    #[test]
    fn test_empty_list_output() {
        assert!(parse_json_list::<NetworkInfo>("").unwrap().is_empty());
        assert!(parse_json_list::<NetworkInfo>("[]").unwrap().is_empty());
        assert!(parse_json_list::<NetworkInfo>("[]\n").unwrap().is_empty());
    }

    #[test]
    fn test_first_created_accepts_array_and_object() {
        let from_array: NetworkInfo =
            first_created(r#"[{"name": "acme-forge-net"}]"#, "acme-forge-net").unwrap();
        assert_eq!(from_array.name, "acme-forge-net");

        let from_object: NetworkInfo =
            first_created(r#"{"name": "acme-forge-net"}"#, "acme-forge-net").unwrap();
        assert_eq!(from_object.name, "acme-forge-net");

        let err = first_created::<NetworkInfo>("[]", "acme-forge-net").unwrap_err();
        assert!(matches!(err, GcpError::InvalidResponse(_)));
    }

    #[test]
    fn test_classify_stderr() {
        let not_found = classify_stderr(
            "ERROR: (gcloud.compute.instances.describe) Could not fetch resource:\n - The resource 'projects/p/zones/z/instances/x' was not found",
        );
        assert!(matches!(not_found, GcpError::NotFound(_)));

        let quota = classify_stderr("ERROR: Quota 'CPUS' exceeded. Limit: 8.0 in region europe-west1.");
        assert!(matches!(quota, GcpError::QuotaExceeded(_)));

        let transient = classify_stderr("ERROR: HttpError 503 returned: backend unavailable");
        assert!(matches!(transient, GcpError::Transient(_)));

        let auth = classify_stderr("ERROR: (gcloud.compute.instances.create) Required 'compute.instances.create' permission");
        assert!(matches!(auth, GcpError::AuthenticationFailed(_)));

        let other = classify_stderr("ERROR: Invalid value for field 'resource.name'");
        assert!(matches!(other, GcpError::CommandFailed(_)));
    }

    #[test]
    fn test_instance_create_args() {
        let config = CreateInstanceConfig {
            machine_type: "e2-standard-2".to_string(),
            zone: "europe-west1-b".to_string(),
            network: "acme-forge-net".to_string(),
            image_family: "ubuntu-2204-lts".to_string(),
            boot_disk_size_gb: 50,
            labels: BTreeMap::from([
                ("role".to_string(), "ci".to_string()),
                ("forge".to_string(), "acme-forge".to_string()),
            ]),
            ssh_user: Some("ops".to_string()),
            ssh_public_key: Some("ssh-ed25519 AAAAC3Nza ops@acme\n".to_string()),
        };

        let args = instance_create_args("acme-forge-ci", &config);

        assert_eq!(args[..4], ["compute", "instances", "create", "acme-forge-ci"]);
        assert!(args.contains(&"--machine-type".to_string()));
        assert!(args.contains(&"e2-standard-2".to_string()));
        assert!(args.contains(&"--image-project".to_string()));
        assert!(args.contains(&"ubuntu-os-cloud".to_string()));
        assert!(args.contains(&"50GB".to_string()));
        assert!(args.contains(&"forge=acme-forge,role=ci".to_string()));
        assert!(args.contains(&"ssh-keys=ops:ssh-ed25519 AAAAC3Nza ops@acme".to_string()));
    }

    #[test]
    fn test_instance_create_args_without_ssh_key() {
        let config = CreateInstanceConfig {
            machine_type: "e2-standard-2".to_string(),
            zone: "europe-west1-b".to_string(),
            network: "acme-forge-net".to_string(),
            image_family: "debian-12".to_string(),
            boot_disk_size_gb: 20,
            labels: BTreeMap::new(),
            ssh_user: None,
            ssh_public_key: None,
        };

        let args = instance_create_args("acme-forge-ci", &config);

        assert!(args.contains(&"debian-cloud".to_string()));
        assert!(!args.contains(&"--labels".to_string()));
        assert!(!args.contains(&"--metadata".to_string()));
    }

    #[test]
    fn test_image_project_for() {
        assert_eq!(image_project_for("ubuntu-2204-lts"), "ubuntu-os-cloud");
        assert_eq!(image_project_for("debian-12"), "debian-cloud");
        assert_eq!(image_project_for("cos-stable"), "cos-cloud");
        assert_eq!(image_project_for("something-else"), "debian-cloud");
    }
}
