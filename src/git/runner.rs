use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tokio::process::Command;

use super::GitCommand;
use crate::error::{AppError, AppResult};

/// Outcome of one git invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Set when the process could not be run at all (spawn failure, timeout)
    pub error: Option<String>,
}

impl CommandOutput {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn errored(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Best available description of why the command failed
    pub fn failure_message(&self) -> String {
        if let Some(ref error) = self.error {
            return error.clone();
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        "command exited unsuccessfully".to_string()
    }

    /// Convert into trimmed stdout, or a `Command` error carrying stderr
    pub fn into_result(self, command: &GitCommand) -> AppResult<String> {
        if self.success {
            Ok(self.stdout.trim().to_string())
        } else {
            Err(AppError::command(
                command.to_command_line(),
                self.failure_message(),
            ))
        }
    }
}

/// Executes git commands against a working directory.
///
/// `token`, when given, authenticates HTTPS remotes for the single invocation.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(
        &self,
        command: &GitCommand,
        working_dir: &Path,
        token: Option<&str>,
    ) -> CommandOutput;
}

/// Runs the `git` binary as a child process
#[derive(Debug, Clone)]
pub struct ProcessCommandRunner {
    timeout: Option<Duration>,
}

impl ProcessCommandRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Default for ProcessCommandRunner {
    fn default() -> Self {
        Self::new(Some(Duration::from_secs(120)))
    }
}

/// `http.extraHeader` value for a token, in the form GitHub accepts for git over HTTPS
fn auth_header(token: &str) -> String {
    let credentials =
        base64::engine::general_purpose::STANDARD.encode(format!("x-access-token:{}", token));
    format!("AUTHORIZATION: basic {}", credentials)
}

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn execute(
        &self,
        command: &GitCommand,
        working_dir: &Path,
        token: Option<&str>,
    ) -> CommandOutput {
        tracing::debug!("Running `{}` in {:?}", command, working_dir);

        let mut cmd = Command::new("git");
        cmd.args(command.args())
            .current_dir(working_dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Passed through the environment so the token never shows up in argv
        if let Some(token) = token {
            cmd.env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", auth_header(token));
        }

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("`{}` timed out after {:?}", command, limit);
                    return CommandOutput::errored(format!(
                        "timed out after {} seconds",
                        limit.as_secs()
                    ));
                }
            },
            None => cmd.output().await,
        };

        match output {
            Ok(output) => CommandOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                error: None,
            },
            Err(e) => {
                tracing::error!("Failed to spawn git: {}", e);
                CommandOutput::errored(format!("git not available: {}", e))
            }
        }
    }
}
