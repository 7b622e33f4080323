//! Scripted in-memory shell for exercising steps without a host

use crate::error::{Result, SetupError};
use crate::ssh::{CommandOutput, RemoteShell};
use async_trait::async_trait;
use std::sync::Mutex;

/// Fake shell. The first rule whose needle is contained in the command
/// wins; commands with no matching rule succeed with empty output.
pub(crate) struct ScriptedShell {
    target: String,
    refuse_connection: bool,
    rules: Vec<(String, CommandOutput)>,
    log: Mutex<Vec<String>>,
}

impl ScriptedShell {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            refuse_connection: false,
            rules: Vec::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    /// A shell whose every call fails at the connection level.
    pub fn refusing(target: impl Into<String>) -> Self {
        let mut shell = Self::new(target);
        shell.refuse_connection = true;
        shell
    }

    pub fn on(mut self, needle: impl Into<String>, output: CommandOutput) -> Self {
        self.rules.push((needle.into(), output));
        self
    }

    pub fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn fail(code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code: code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.commands().iter().any(|command| command.contains(needle))
    }
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    fn target(&self) -> &str {
        &self.target
    }

    async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.log.lock().unwrap().push(command.to_string());

        if self.refuse_connection {
            return Err(SetupError::ConnectionFailed {
                host: self.target.clone(),
                detail: "connection refused".to_string(),
            });
        }

        for (needle, output) in &self.rules {
            if command.contains(needle) {
                return Ok(output.clone());
            }
        }

        Ok(CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}
