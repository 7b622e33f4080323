//! Host configuration error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error(
        "host \"{host}\" is unreachable after {attempts} attempt(s): {cause}\nhint: check that the firewall allows tcp:22 and the instance has finished booting"
    )]
    ConnectivityTimeout {
        host: String,
        attempts: u32,
        cause: String,
    },

    #[error("cannot connect to \"{host}\": {detail}")]
    ConnectionFailed { host: String, detail: String },

    #[error("step \"{step}\" failed on \"{host}\": {detail}")]
    StepFailed {
        host: String,
        step: String,
        detail: String,
    },

    #[error("remote command \"{command}\" exited {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error(
        "precondition unmet for \"{domain}\": {detail}\nhint: point the domain at the host address and re-run `forge certs`"
    )]
    PreconditionUnmet { domain: String, detail: String },

    #[error("DNS lookup failed for \"{domain}\": {detail}")]
    DnsLookupFailed { domain: String, detail: String },

    #[error("template render error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("unexpected docker output: {0}")]
    DockerOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SetupError>;
