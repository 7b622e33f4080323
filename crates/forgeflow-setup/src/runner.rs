//! Per-host execution
//!
//! Hosts run in parallel; within a host steps run in declared order and
//! stop at the first failure. One bad host never blocks the others.

use crate::report::{ConfigReport, HostOutcome, HostReport};
use crate::ssh::{RemoteShell, WaitConfig, wait_until_ready};
use crate::step::{ConfigStep, run_step};
use futures_util::future::join_all;
use std::time::Instant;

/// Steps for one host.
#[derive(Debug, Clone)]
pub struct HostPlan {
    pub role: String,
    pub steps: Vec<ConfigStep>,
}

/// A host plan bound to a live shell.
pub struct HostTask {
    pub plan: HostPlan,
    pub shell: Box<dyn RemoteShell>,
    pub wait: WaitConfig,
}

/// Configure every host, in parallel.
pub async fn run_hosts(tasks: &[HostTask]) -> ConfigReport {
    let outcomes = join_all(tasks.iter().map(run_host)).await;
    ConfigReport::new(outcomes)
}

/// Configure one host: wait for SSH, then walk the steps.
pub async fn run_host(task: &HostTask) -> HostReport {
    let started = Instant::now();
    let target = task.shell.target().to_string();

    if let Err(err) = wait_until_ready(task.shell.as_ref(), &task.wait).await {
        tracing::warn!("host {} unreachable: {}", task.plan.role, err);
        return HostReport {
            role: task.plan.role.clone(),
            target,
            outcome: HostOutcome::Unreachable {
                error: err.to_string(),
            },
            duration: started.elapsed(),
        };
    }

    let mut changed = Vec::new();
    let mut unchanged = Vec::new();

    for (index, step) in task.plan.steps.iter().enumerate() {
        tracing::debug!("[{}] step {}: {}", task.plan.role, step.id, step.description);

        match run_step(task.shell.as_ref(), step).await {
            Ok(outcome) => {
                let entry = format!("{}: {}", step.id, outcome.message());
                if outcome.changed() {
                    changed.push(entry);
                } else {
                    unchanged.push(entry);
                }
            }
            Err(err) => {
                let not_run = task.plan.steps[index + 1..]
                    .iter()
                    .map(|step| step.id.clone())
                    .collect();
                return HostReport {
                    role: task.plan.role.clone(),
                    target,
                    outcome: HostOutcome::Failed {
                        step: step.id.clone(),
                        error: err.to_string(),
                        not_run,
                    },
                    duration: started.elapsed(),
                };
            }
        }
    }

    HostReport {
        role: task.plan.role.clone(),
        target,
        outcome: HostOutcome::Completed { changed, unchanged },
        duration: started.elapsed(),
    }
}
