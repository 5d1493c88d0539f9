//! Thin wrapper around the external transfer tool.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use vaultmove_core::MoveConfig;

use crate::error::RemoteError;

/// Number of trailing diagnostic lines kept for error messages.
pub const DIAGNOSTIC_LINES: usize = 5;

/// Output of the `size --json` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSize {
    pub count: u64,
    pub bytes: u64,
}

/// Output of the `about --json` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSpace {
    pub total: u64,
    pub used: u64,
    #[serde(default)]
    pub free: Option<u64>,
}

impl RemoteSpace {
    /// Free bytes, as reported or derived from total and used.
    pub fn available(&self) -> u64 {
        self.free
            .unwrap_or_else(|| self.total.saturating_sub(self.used))
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// The last few non-blank lines of stderr.
    pub fn diagnostics(&self) -> String {
        last_lines(&self.stderr, DIAGNOSTIC_LINES)
    }
}

/// The external transfer tool (rclone-compatible).
#[derive(Debug, Clone)]
pub struct TransferTool {
    program: PathBuf,
    global_args: Vec<String>,
}

impl TransferTool {
    /// Create a tool wrapper for the given executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
        }
    }

    /// Create a tool wrapper from configuration.
    pub fn from_config(config: &MoveConfig) -> Self {
        Self::new(config.program.clone()).with_global_args(config.global_args.clone())
    }

    /// Arguments placed before every subcommand.
    pub fn with_global_args(mut self, args: Vec<String>) -> Self {
        self.global_args = args;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// A command for this tool with the global arguments applied.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.global_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Run a subcommand to completion and capture its output.
    pub async fn capture<I, S>(&self, args: I) -> Result<CommandOutput, RemoteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command();
        cmd.args(args);
        tracing::debug!(command = ?cmd.as_std(), "running transfer tool");

        let output = cmd.output().await.map_err(|source| RemoteError::Launch {
            program: self.program.clone(),
            source,
        })?;

        Ok(CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Like [`capture`](Self::capture), but kills the child on cancellation.
    pub async fn capture_cancellable<I, S>(
        &self,
        args: I,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, RemoteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        tokio::select! {
            output = self.capture(args) => output,
            _ = cancel.cancelled() => Err(RemoteError::Cancelled),
        }
    }

    /// Capture a subcommand and require a zero exit status.
    async fn capture_ok(&self, args: &[&str]) -> Result<CommandOutput, RemoteError> {
        let output = self.capture(args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(RemoteError::Exit {
                command: args.join(" "),
                status: describe_status(output.status),
                stderr: output.diagnostics(),
            })
        }
    }

    /// First line of `version`.
    pub async fn version(&self) -> Result<String, RemoteError> {
        let output = self.capture_ok(&["version"]).await?;
        Ok(output.stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    /// Remote identifiers known to the tool, e.g. `gdrive:`.
    pub async fn list_remotes(&self) -> Result<Vec<String>, RemoteError> {
        let output = self.capture_ok(&["listremotes"]).await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Total, used and free space of a remote.
    pub async fn remote_info(&self, remote: &str) -> Result<RemoteSpace, RemoteError> {
        let root = remote_root(remote);
        let args = ["about", root.as_str(), "--json"];
        let output = self.capture_ok(&args).await?;
        serde_json::from_str(&output.stdout).map_err(|source| RemoteError::Parse {
            command: args.join(" "),
            source,
        })
    }

    /// File count and bytes stored under a remote path.
    pub async fn size(
        &self,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Result<RemoteSize, RemoteError> {
        let args = ["size", destination, "--json"];
        let output = self.capture_cancellable(args, cancel).await?;
        if !output.success() {
            return Err(RemoteError::Exit {
                command: args.join(" "),
                status: describe_status(output.status),
                stderr: output.diagnostics(),
            });
        }
        serde_json::from_str(&output.stdout).map_err(|source| RemoteError::Parse {
            command: args.join(" "),
            source,
        })
    }

    /// Check that the tool runs, knows the remote and can reach it.
    ///
    /// Each command is bounded by `timeout`.
    pub async fn check_config(
        &self,
        remote: &str,
        timeout: Duration,
    ) -> Result<RemoteSpace, RemoteError> {
        let root = remote_root(remote);

        let remotes = tokio::time::timeout(timeout, self.list_remotes())
            .await
            .map_err(|_| RemoteError::Timeout {
                command: "listremotes".to_string(),
                seconds: timeout.as_secs(),
            })??;

        if !remotes.iter().any(|r| *r == root) {
            return Err(RemoteError::RemoteMissing {
                remote: root,
                available: if remotes.is_empty() {
                    "none".to_string()
                } else {
                    remotes.join(", ")
                },
            });
        }

        let space = tokio::time::timeout(timeout, self.remote_info(&root))
            .await
            .map_err(|_| RemoteError::Timeout {
                command: format!("about {root}"),
                seconds: timeout.as_secs(),
            })??;

        tracing::info!(remote = %root, free = space.available(), "transfer tool configuration ok");
        Ok(space)
    }
}

/// `gdrive` or `gdrive:` to `gdrive:`.
fn remote_root(remote: &str) -> String {
    format!("{}:", remote.trim_end_matches(':'))
}

/// Human-readable exit status.
pub fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "a terminating signal".to_string(),
    }
}

/// The last `n` non-blank lines of `text`, joined with `; `.
pub fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_lines() {
        assert_eq!(last_lines("a\n\nb\nc\n", 2), "b; c");
        assert_eq!(last_lines("", 5), "");
        assert_eq!(last_lines("only", 5), "only");
    }

    #[test]
    fn test_remote_root() {
        assert_eq!(remote_root("gdrive"), "gdrive:");
        assert_eq!(remote_root("gdrive:"), "gdrive:");
    }

    #[test]
    fn test_remote_space_available() {
        let space: RemoteSpace = serde_json::from_str(r#"{"total":100,"used":30}"#).unwrap();
        assert_eq!(space.available(), 70);

        let space: RemoteSpace =
            serde_json::from_str(r#"{"total":100,"used":30,"free":50,"trashed":5}"#).unwrap();
        assert_eq!(space.available(), 50);
    }

    #[test]
    fn test_remote_size_parse() {
        let size: RemoteSize =
            serde_json::from_str(r#"{"count":3,"bytes":42,"sizeless":0}"#).unwrap();
        assert_eq!(size, RemoteSize { count: 3, bytes: 42 });
        assert!(serde_json::from_str::<RemoteSize>(r#"{"total":1}"#).is_err());
    }
}
