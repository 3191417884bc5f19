//! Remote execution over SSH
//!
//! [`RemoteExecutor`] is the only way the rest of the crate touches a host.
//! [`SshExecutor`] implements it with the system `ssh` binary; tests use the
//! in-memory host from [`crate::testing`].

use std::process::{Output, Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::command::{write_stdin_to, Privilege, RemoteCommand};

/// ssh exits with 255 when the connection itself failed
const SSH_CONNECTION_FAILURE: i32 = 255;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("`{command}` exited with status {}: {}", code.map(|code| code.to_string()).unwrap_or_else(|| "unknown".to_string()), stderr.trim())]
    CommandFailed {
        /// Redacted shell text
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("host unreachable: {}", .0.trim())]
    Unreachable(String),

    #[error("failed to run ssh: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Command execution bound to one host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Host this executor talks to
    fn host(&self) -> &str;

    /// Run a command; any non-zero exit is an error
    async fn execute(&self, command: &RemoteCommand) -> Result<(), RemoteError>;

    /// Run a command and return its stdout verbatim
    async fn capture(&self, command: &RemoteCommand) -> Result<String, RemoteError>;

    /// Run a command and report whether it exited zero
    async fn test(&self, command: &RemoteCommand) -> Result<bool, RemoteError>;

    /// Write `content` to `remote_path`
    async fn upload(&self, content: &str, remote_path: &str, privilege: Privilege) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Login user; ssh's own default when unset
    pub user: Option<String>,
    /// ssh binary
    pub program: String,
    /// Extra arguments placed before the destination
    pub extra_args: Vec<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            user: None,
            program: "ssh".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl SshOptions {
    /// `user@host`, or just `host`
    pub fn destination(&self, host: &str) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, host),
            None => host.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SshExecutor {
    host: String,
    options: SshOptions,
}

impl SshExecutor {
    pub fn new(host: impl Into<String>, options: SshOptions) -> Self {
        Self {
            host: host.into(),
            options,
        }
    }

    async fn run(&self, command: &RemoteCommand) -> Result<Output, RemoteError> {
        tracing::debug!(host = %self.host, command = %command, "Running remote command");

        let mut child = Command::new(&self.options.program)
            .args(["-o", "BatchMode=yes"])
            .args(&self.options.extra_args)
            .arg(self.options.destination(&self.host))
            .arg(command.to_shell())
            .stdin(if command.input().is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin from a separate task so a chatty command can't deadlock
        // against a full stdout pipe.
        let writer = match (child.stdin.take(), command.input()) {
            (Some(mut stdin), Some(input)) => {
                let input = input.as_bytes().to_vec();
                Some(tokio::spawn(async move {
                    stdin.write_all(&input).await?;
                    stdin.shutdown().await
                }))
            }
            _ => None,
        };

        let output = child.wait_with_output().await?;
        if let Some(writer) = writer {
            // A command that exits without reading its input breaks the pipe;
            // its exit status is what matters.
            if let Ok(Err(err)) = writer.await {
                tracing::debug!(host = %self.host, "stdin not fully consumed: {}", err);
            }
        }

        if output.status.code() == Some(SSH_CONNECTION_FAILURE) {
            return Err(RemoteError::Unreachable(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(output)
    }

    fn failure(command: &RemoteCommand, output: &Output) -> RemoteError {
        RemoteError::CommandFailed {
            command: command.redacted(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&self, command: &RemoteCommand) -> Result<(), RemoteError> {
        let output = self.run(command).await?;
        if !output.status.success() {
            return Err(Self::failure(command, &output));
        }
        Ok(())
    }

    async fn capture(&self, command: &RemoteCommand) -> Result<String, RemoteError> {
        let output = self.run(command).await?;
        if !output.status.success() {
            return Err(Self::failure(command, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn test(&self, command: &RemoteCommand) -> Result<bool, RemoteError> {
        let output = self.run(command).await?;
        Ok(output.status.success())
    }

    async fn upload(&self, content: &str, remote_path: &str, privilege: Privilege) -> Result<(), RemoteError> {
        self.execute(&write_stdin_to(remote_path, content, privilege)).await
    }
}
