//! Aggregate results of a configuration pass

use std::time::Duration;

/// What happened on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOutcome {
    /// Every step ran. Entries are "step-id: message" lines.
    Completed {
        changed: Vec<String>,
        unchanged: Vec<String>,
    },
    /// The host never answered; no steps ran.
    Unreachable { error: String },
    /// A step failed; later steps were not attempted.
    Failed {
        step: String,
        error: String,
        not_run: Vec<String>,
    },
}

impl HostOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HostOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct HostReport {
    pub role: String,
    pub target: String,
    pub outcome: HostOutcome,
    pub duration: Duration,
}

/// Results of one pass over every host.
#[derive(Debug, Clone, Default)]
pub struct ConfigReport {
    pub hosts: Vec<HostReport>,
}

impl ConfigReport {
    pub fn new(hosts: Vec<HostReport>) -> Self {
        Self { hosts }
    }

    pub fn all_succeeded(&self) -> bool {
        self.hosts.iter().all(|host| host.outcome.is_success())
    }

    pub fn failure_count(&self) -> usize {
        self.hosts
            .iter()
            .filter(|host| !host.outcome.is_success())
            .count()
    }

    pub fn host(&self, role: &str) -> Option<&HostReport> {
        self.hosts.iter().find(|host| host.role == role)
    }
}
