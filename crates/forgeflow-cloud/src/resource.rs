//! Resource model: desired specs and observed state
//!
//! A forge deployment is expressed as a set of `ResourceSpec`s (what should
//! exist) and reconciled against `ResourceState`s (what the provider
//! reports). Specs carry a typed shape per kind; everything in a shape is
//! immutable once provisioned. Labels are the only field updated in place.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kinds of cloud resources a forge manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    FirewallRule,
    Instance,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::FirewallRule => "firewall-rule",
            ResourceKind::Instance => "instance",
        }
    }

    /// Position in the teardown sequence. Instances go before the rules
    /// and the network that carry them.
    pub fn teardown_rank(&self) -> u8 {
        match self {
            ResourceKind::Instance => 0,
            ResourceKind::FirewallRule => 1,
            ResourceKind::Network => 2,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Desired definition of one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,

    /// Stable logical name, e.g. "acme-forge-ci". Doubles as the cloud
    /// resource name.
    pub name: String,

    /// Logical names this resource must exist after.
    pub depends_on: Vec<String>,

    /// Kind-specific immutable parameters.
    pub shape: ResourceShape,

    /// Labels attached to the resource. The only part that may change
    /// without recreating.
    pub labels: BTreeMap<String, String>,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, name: impl Into<String>, shape: ResourceShape) -> Self {
        Self {
            kind,
            name: name.into(),
            depends_on: Vec::new(),
            shape,
            labels: BTreeMap::new(),
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Whether every desired label is already present with the right value.
    /// Labels added by the provider or an operator do not count against.
    pub fn labels_satisfied_by(&self, observed: &BTreeMap<String, String>) -> bool {
        self.labels.iter().all(|(k, v)| observed.get(k) == Some(v))
    }
}

/// Kind-specific immutable parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResourceShape {
    Network {
        /// Whether the provider carves subnets automatically.
        auto_subnets: bool,
    },
    FirewallRule {
        /// Network the rule attaches to.
        network: String,
        /// TCP ports opened to the source ranges.
        allowed_ports: Vec<u16>,
        /// CIDR ranges allowed in.
        source_ranges: Vec<String>,
    },
    Instance {
        /// Network the instance joins.
        network: String,
        machine_type: String,
        boot_disk_size_gb: u32,
        image_family: String,
        zone: String,
    },
}

impl ResourceShape {
    /// First immutable field diverging between two shapes, as
    /// (field, self value, other value). `None` means the shapes match.
    pub fn diverging_field(&self, other: &ResourceShape) -> Option<(String, String, String)> {
        use ResourceShape::*;
        match (self, other) {
            (Network { auto_subnets: a }, Network { auto_subnets: b }) => {
                (a != b).then(|| ("auto-subnets".to_string(), a.to_string(), b.to_string()))
            }
            (
                FirewallRule {
                    network: n1,
                    allowed_ports: p1,
                    source_ranges: s1,
                },
                FirewallRule {
                    network: n2,
                    allowed_ports: p2,
                    source_ranges: s2,
                },
            ) => {
                if n1 != n2 {
                    Some(("network".to_string(), n1.clone(), n2.clone()))
                } else if p1 != p2 {
                    Some((
                        "allowed-ports".to_string(),
                        format!("{:?}", p1),
                        format!("{:?}", p2),
                    ))
                } else if s1 != s2 {
                    Some((
                        "source-ranges".to_string(),
                        format!("{:?}", s1),
                        format!("{:?}", s2),
                    ))
                } else {
                    None
                }
            }
            (
                Instance {
                    network: n1,
                    machine_type: m1,
                    boot_disk_size_gb: d1,
                    image_family: i1,
                    zone: z1,
                },
                Instance {
                    network: n2,
                    machine_type: m2,
                    boot_disk_size_gb: d2,
                    image_family: i2,
                    zone: z2,
                },
            ) => {
                if n1 != n2 {
                    Some(("network".to_string(), n1.clone(), n2.clone()))
                } else if m1 != m2 {
                    Some(("machine-type".to_string(), m1.clone(), m2.clone()))
                } else if d1 != d2 {
                    Some((
                        "boot-disk-size".to_string(),
                        d1.to_string(),
                        d2.to_string(),
                    ))
                } else if i1 != i2 {
                    Some(("image-family".to_string(), i1.clone(), i2.clone()))
                } else if z1 != z2 {
                    Some(("zone".to_string(), z1.clone(), z2.clone()))
                } else {
                    None
                }
            }
            _ => Some((
                "kind".to_string(),
                self.kind_name().to_string(),
                other.kind_name().to_string(),
            )),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ResourceShape::Network { .. } => "network",
            ResourceShape::FirewallRule { .. } => "firewall-rule",
            ResourceShape::Instance { .. } => "instance",
        }
    }
}

/// Ordered set of desired resources, indexed by logical name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSet {
    specs: Vec<ResourceSpec>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a spec. Names must be unique within the set.
    pub fn add(&mut self, spec: ResourceSpec) -> Result<()> {
        if self.get(&spec.name).is_some() {
            return Err(CloudError::InvalidResource(format!(
                "duplicate resource name: \"{}\"",
                spec.name
            )));
        }
        self.specs.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn by_kind(&self, kind: ResourceKind) -> Vec<&ResourceSpec> {
        self.specs.iter().filter(|s| s.kind == kind).collect()
    }
}

/// Observed state of one resource, as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub kind: ResourceKind,

    /// Cloud resource name. For forge-managed resources this equals the
    /// desired `ResourceSpec` name.
    pub name: String,

    /// Provider-assigned opaque identifier, when one exists.
    pub provider_id: Option<String>,

    pub status: ResourceStatus,

    /// Shape reconstructed from the provider's description. `None` when the
    /// provider cannot report it; divergence checks then pass.
    pub shape: Option<ResourceShape>,

    /// Labels currently on the resource.
    pub labels: BTreeMap<String, String>,

    /// Extra attributes (addresses, self links, ...).
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ResourceState {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            provider_id: None,
            status: ResourceStatus::Unknown,
            shape: None,
            labels: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_provider_id(mut self, id: impl Into<String>) -> Self {
        self.provider_id = Some(id.into());
        self
    }

    pub fn with_shape(mut self, shape: ResourceShape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// External address of an instance, once assigned.
    pub fn external_address(&self) -> Option<String> {
        self.get_attribute("external_ip")
    }

    /// Whether an instance is fully usable: running and reachable.
    pub fn is_ready(&self) -> bool {
        self.status == ResourceStatus::Ready
            && (self.kind != ResourceKind::Instance || self.external_address().is_some())
    }
}

/// Lifecycle status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Being brought up by the provider.
    Provisioning,
    /// Up and usable.
    Ready,
    /// Exists but is not running.
    Stopped,
    /// Being torn down.
    Terminating,
    /// No longer exists.
    Gone,
    /// Provider reports an error condition.
    Error,
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Provisioning => write!(f, "provisioning"),
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::Stopped => write!(f, "stopped"),
            ResourceStatus::Terminating => write!(f, "terminating"),
            ResourceStatus::Gone => write!(f, "gone"),
            ResourceStatus::Error => write!(f, "error"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}
