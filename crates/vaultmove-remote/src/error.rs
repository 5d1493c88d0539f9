//! Errors from invoking the transfer tool.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while running a transfer tool command.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The tool could not be started (missing binary, permission denied).
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited unsuccessfully.
    #[error("`{command}` exited with {status}{}", detail(.stderr))]
    Exit {
        command: String,
        status: String,
        stderr: String,
    },

    /// The tool's output could not be understood.
    #[error("Unexpected output from `{command}`: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    /// The configured remote is not known to the tool.
    #[error("Remote {remote:?} is not configured (available: {available})")]
    RemoteMissing { remote: String, available: String },

    /// The command did not finish in time.
    #[error("`{command}` did not finish within {seconds}s")]
    Timeout { command: String, seconds: u64 },

    /// The command was cancelled.
    #[error("Cancelled")]
    Cancelled,
}

fn detail(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}
