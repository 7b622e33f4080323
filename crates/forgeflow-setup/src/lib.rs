//! Post-provision host configuration for ForgeFlow
//!
//! Takes hosts that already exist and drives them to the desired software
//! state over SSH. Each host gets an ordered list of idempotent steps;
//! hosts run in parallel and never block each other.
//!
//! ```text
//!   HostPlan (role + steps)
//!        |
//!        v
//!   run_hosts ──> wait_until_ready ──> step ──> step ──> ...   (per host)
//!        |
//!        v
//!   ConfigReport (one HostReport per host, success or not)
//! ```
//!
//! A step checks the current state of the host before acting, so reruns
//! converge instead of repeating work. Failures on one host are recorded
//! in its report while the other hosts continue.

pub mod certs;
pub mod docker;
pub mod error;
pub mod proxy;
pub mod report;
pub mod runner;
pub mod ssh;
pub mod step;

#[cfg(test)]
pub(crate) mod testing;

pub use certs::{CertRequest, DnsResolver, SystemDnsResolver, issue_certificate};
pub use docker::{ContainerStatus, list_containers, read_container_file};
pub use error::{Result, SetupError};
pub use proxy::{render_vhost, vhost_path};
pub use report::{ConfigReport, HostOutcome, HostReport};
pub use runner::{HostPlan, HostTask, run_host, run_hosts};
pub use ssh::{CommandOutput, RemoteShell, SshSession, WaitConfig, shell_escape, wait_until_ready};
pub use step::{ConfigStep, StepAction, StepOutcome, run_step};
