//! Plan computation: diffing desired resources against observed state
//!
//! The planner is a pure function over its inputs. It never talks to a
//! provider, which keeps it trivially testable and keeps every provider
//! call inside the executor.

use crate::error::{CloudError, Result};
use crate::resource::{ResourceKind, ResourceSet, ResourceState, ResourceStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How to treat observed resources with no desired counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Only create and update. Unreferenced resources are left alone.
    Provision,
    /// Full reconciliation: unreferenced forge-scoped resources are deleted.
    /// Teardown is a reconcile against an empty desired set.
    Reconcile,
}

/// A single planned operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    pub resource_kind: ResourceKind,
    pub name: String,
    pub description: String,

    /// Operation-specific details, e.g. the label set for updates.
    pub details: BTreeMap<String, serde_json::Value>,
}

/// What an operation does to its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Create => write!(f, "create"),
            OpKind::Update => write!(f, "update"),
            OpKind::Delete => write!(f, "delete"),
        }
    }
}

/// Ordered set of operations plus the resources found already in sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    /// Operations in execution order: deletes, then creates and updates in
    /// dependency order.
    pub operations: Vec<Operation>,

    /// Names of desired resources that need nothing.
    pub unchanged: Vec<String>,
}

impl Plan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_changes(&self) -> bool {
        !self.operations.is_empty()
    }

    pub fn operations_by_kind(&self, kind: OpKind) -> Vec<&Operation> {
        self.operations.iter().filter(|o| o.kind == kind).collect()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.operations_by_kind(OpKind::Create).len(),
            update: self.operations_by_kind(OpKind::Update).len(),
            delete: self.operations_by_kind(OpKind::Delete).len(),
            unchanged: self.unchanged.len(),
        }
    }
}

/// Counts per operation kind.
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub unchanged: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.unchanged
        )
    }
}

/// Diff desired against observed and produce an ordered plan.
///
/// Matching is by kind and name. A divergence on an immutable field is a
/// `PlanConflict`; label drift becomes an in-place update. Observed
/// resources reported as gone count as absent.
pub fn plan(desired: &ResourceSet, observed: &[ResourceState], mode: PlanMode) -> Result<Plan> {
    let observed_index: BTreeMap<(ResourceKind, &str), &ResourceState> = observed
        .iter()
        .filter(|s| s.status != ResourceStatus::Gone)
        .map(|s| ((s.kind, s.name.as_str()), s))
        .collect();

    let order = topo_order(desired)?;

    let mut operations = Vec::new();
    let mut unchanged = Vec::new();

    // Deletes go first so quota is free before anything new comes up.
    if mode == PlanMode::Reconcile {
        let mut doomed: Vec<&ResourceState> = observed_index
            .values()
            .filter(|s| desired.get(&s.name).is_none_or(|spec| spec.kind != s.kind))
            .copied()
            .collect();
        doomed.sort_by_key(|s| (s.kind.teardown_rank(), s.name.clone()));
        for state in doomed {
            operations.push(Operation {
                kind: OpKind::Delete,
                resource_kind: state.kind,
                name: state.name.clone(),
                description: format!("delete {} \"{}\"", state.kind, state.name),
                details: BTreeMap::new(),
            });
        }
    }

    for name in order {
        let spec = desired
            .get(&name)
            .ok_or_else(|| CloudError::ResourceNotFound(name.clone()))?;

        match observed_index.get(&(spec.kind, spec.name.as_str())) {
            None => {
                let description = match &spec.shape {
                    crate::resource::ResourceShape::Instance {
                        machine_type, zone, ..
                    } => format!(
                        "create {} \"{}\" ({} in {})",
                        spec.kind, spec.name, machine_type, zone
                    ),
                    _ => format!("create {} \"{}\"", spec.kind, spec.name),
                };
                operations.push(Operation {
                    kind: OpKind::Create,
                    resource_kind: spec.kind,
                    name: spec.name.clone(),
                    description,
                    details: BTreeMap::new(),
                });
            }
            Some(state) => {
                if let Some(observed_shape) = &state.shape
                    && let Some((field, desired_value, observed_value)) =
                        spec.shape.diverging_field(observed_shape)
                {
                    return Err(CloudError::PlanConflict {
                        resource: spec.name.clone(),
                        field,
                        observed: observed_value,
                        desired: desired_value,
                    });
                }

                if !spec.labels_satisfied_by(&state.labels) {
                    let mut details = BTreeMap::new();
                    details.insert(
                        "labels".to_string(),
                        serde_json::to_value(&spec.labels)?,
                    );
                    operations.push(Operation {
                        kind: OpKind::Update,
                        resource_kind: spec.kind,
                        name: spec.name.clone(),
                        description: format!("update labels on {} \"{}\"", spec.kind, spec.name),
                        details,
                    });
                } else {
                    unchanged.push(spec.name.clone());
                }
            }
        }
    }

    Ok(Plan {
        operations,
        unchanged,
    })
}

/// Kahn's algorithm over the declared dependencies.
///
/// Deterministic: among simultaneously ready resources the
/// lexicographically smallest name goes first. Reports unknown
/// dependencies and cycles as typed errors.
fn topo_order(desired: &ResourceSet) -> Result<Vec<String>> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for spec in desired.iter() {
        in_degree.entry(spec.name.as_str()).or_insert(0);
        for dep in &spec.depends_on {
            if desired.get(dep).is_none() {
                return Err(CloudError::UnknownDependency {
                    resource: spec.name.clone(),
                    dependency: dep.clone(),
                });
            }
            *in_degree.entry(spec.name.as_str()).or_insert(0) += 1;
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(spec.name.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();

    let mut order = Vec::with_capacity(desired.len());
    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        for dependent in dependents.get(name).into_iter().flatten() {
            let degree = in_degree
                .get_mut(dependent)
                .ok_or_else(|| CloudError::ResourceNotFound(dependent.to_string()))?;
            *degree -= 1;
            if *degree == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != desired.len() {
        let mut stuck: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(n, _)| *n)
            .collect();
        stuck.sort_unstable();
        return Err(CloudError::DependencyCycle(stuck.join(", ")));
    }

    Ok(order)
}
