//! Supervised `copy` of one folder.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use vaultmove_core::{IgnoreRuleSet, MoveConfig, Outcome, ProgressEvent};

use crate::progress::ProgressParser;
use crate::tool::{DIAGNOSTIC_LINES, TransferTool, describe_status};

/// Tuning flags for each copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    pub transfers: u32,
    pub stats_interval: String,
    pub extra_flags: Vec<String>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            transfers: 4,
            stats_interval: "2s".to_string(),
            extra_flags: Vec::new(),
        }
    }
}

impl TransferOptions {
    pub fn from_config(config: &MoveConfig) -> Self {
        Self {
            transfers: config.transfers,
            stats_interval: config.stats_interval.clone(),
            extra_flags: config.copy_flags.clone(),
        }
    }
}

/// How the supervision loop ended.
enum Exit {
    Status(std::io::Result<ExitStatus>),
    Cancelled,
}

/// Runs the transfer tool's `copy` for a folder and reports progress.
#[derive(Debug, Clone)]
pub struct TransferRunner {
    tool: TransferTool,
    options: TransferOptions,
}

impl TransferRunner {
    pub fn new(tool: TransferTool, options: TransferOptions) -> Self {
        Self { tool, options }
    }

    pub fn from_config(config: &MoveConfig) -> Self {
        Self::new(
            TransferTool::from_config(config),
            TransferOptions::from_config(config),
        )
    }

    /// Arguments of the `copy` subcommand.
    pub fn copy_args(
        &self,
        folder: &Path,
        destination: &str,
        exclude_from: Option<&Path>,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "copy".into(),
            folder.as_os_str().to_owned(),
            destination.into(),
        ];
        if let Some(file) = exclude_from {
            args.push("--exclude-from".into());
            args.push(file.as_os_str().to_owned());
        }
        args.push("--transfers".into());
        args.push(self.options.transfers.to_string().into());
        args.push("--stats".into());
        args.push(self.options.stats_interval.clone().into());
        args.push("--stats-one-line".into());
        args.push("--log-level".into());
        args.push("INFO".into());
        args.extend(self.options.extra_flags.iter().map(OsString::from));
        args
    }

    /// Copy `folder` to `destination`.
    ///
    /// Both output pipes are drained concurrently into one queue; every
    /// parsed line is handed to `on_event` in arrival order. Never fails:
    /// launch errors, nonzero exits and cancellation all become
    /// [`Outcome::Failure`].
    pub async fn transfer<F>(
        &self,
        folder: &Path,
        destination: &str,
        rules: &IgnoreRuleSet,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Outcome
    where
        F: FnMut(ProgressEvent),
    {
        if cancel.is_cancelled() {
            return Outcome::failure("transfer cancelled");
        }

        // Kept alive until the child exits.
        let exclude_file = if rules.is_empty() {
            None
        } else {
            match write_exclude_file(rules) {
                Ok(file) => Some(file),
                Err(err) => {
                    return Outcome::failure(format!("failed to write ignore rules: {err}"));
                }
            }
        };

        let mut cmd = self.tool.command();
        cmd.args(self.copy_args(
            folder,
            destination,
            exclude_file.as_ref().map(|f| f.path()),
        ))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        tracing::info!(
            folder = %folder.display(),
            destination,
            excludes = rules.len(),
            "starting transfer"
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(program = %self.tool.program().display(), error = %err, "failed to launch transfer tool");
                return Outcome::failure(format!(
                    "failed to launch {}: {err}",
                    self.tool.program().display()
                ));
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_lines(stderr, tx.clone()));
        }
        drop(tx);

        let mut diagnostics = VecDeque::with_capacity(DIAGNOSTIC_LINES);
        let mut handle = |line: String| {
            if let Some(event) = ProgressParser::parse(&line) {
                if let ProgressEvent::RawLine { line } = &event {
                    tracing::debug!(target: "vaultmove::transfer", "{line}");
                    if diagnostics.len() == DIAGNOSTIC_LINES {
                        diagnostics.pop_front();
                    }
                    diagnostics.push_back(line.clone());
                }
                on_event(event);
            }
        };

        let exit = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Exit::Cancelled,
                Some(line) = rx.recv() => handle(line),
                status = child.wait() => break Exit::Status(status),
            }
        };

        let status = match exit {
            Exit::Cancelled => {
                if let Err(err) = child.kill().await {
                    tracing::warn!(error = %err, "failed to kill transfer tool");
                }
                tracing::info!(folder = %folder.display(), "transfer cancelled");
                return Outcome::failure("transfer cancelled");
            }
            Exit::Status(Err(err)) => {
                return Outcome::failure(format!("failed waiting for transfer tool: {err}"));
            }
            Exit::Status(Ok(status)) => status,
        };

        // Lines still queued after exit.
        while let Some(line) = rx.recv().await {
            handle(line);
        }

        if status.success() {
            tracing::info!(folder = %folder.display(), destination, "transfer complete");
            Outcome::Success
        } else {
            let reason = describe_status(status);
            tracing::warn!(folder = %folder.display(), %reason, "transfer failed");
            if diagnostics.is_empty() {
                Outcome::failure(format!("transfer tool exited with {reason}"))
            } else {
                let detail: Vec<String> = diagnostics.into_iter().collect();
                Outcome::failure(format!(
                    "transfer tool exited with {reason}: {}",
                    detail.join("; ")
                ))
            }
        }
    }
}

fn write_exclude_file(rules: &IgnoreRuleSet) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("vaultmove-exclude-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(rules.to_filter_file().as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Forward every line of `reader` until EOF or the receiver is gone.
async fn drain_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "output pipe closed with error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_args_without_excludes() {
        let runner = TransferRunner::new(TransferTool::new("rclone"), TransferOptions::default());
        let args = runner.copy_args(Path::new("/data/Photos"), "gdrive:archived/Photos", None);
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(
            args,
            [
                "copy",
                "/data/Photos",
                "gdrive:archived/Photos",
                "--transfers",
                "4",
                "--stats",
                "2s",
                "--stats-one-line",
                "--log-level",
                "INFO",
            ]
        );
    }

    #[test]
    fn test_copy_args_with_excludes_and_flags() {
        let options = TransferOptions {
            transfers: 8,
            stats_interval: "1s".to_string(),
            extra_flags: vec!["--checksum".to_string()],
        };
        let runner = TransferRunner::new(TransferTool::new("rclone"), options);
        let args = runner.copy_args(Path::new("/a"), "r:b", Some(Path::new("/tmp/ex.txt")));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(&args[3..5], ["--exclude-from", "/tmp/ex.txt"]);
        assert_eq!(&args[5..7], ["--transfers", "8"]);
        assert_eq!(args.last().map(String::as_str), Some("--checksum"));
    }

    #[test]
    fn test_exclude_file_contents() {
        let rules = IgnoreRuleSet::new(["*.tmp", "cache/"]).unwrap();
        let file = write_exclude_file(&rules).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(text, "*.tmp\ncache/\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TransferRunner::new(
            TransferTool::new(dir.path().join("no-such-tool")),
            TransferOptions::default(),
        );
        let mut events = Vec::new();
        let outcome = runner
            .transfer(
                dir.path(),
                "r:x",
                &IgnoreRuleSet::empty(),
                &CancellationToken::new(),
                |e| events.push(e),
            )
            .await;

        let message = outcome.message().unwrap();
        assert!(message.starts_with("failed to launch"), "{message}");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = TransferRunner::new(TransferTool::new("rclone"), TransferOptions::default());
        let outcome = runner
            .transfer(Path::new("/"), "r:x", &IgnoreRuleSet::empty(), &cancel, |_| {})
            .await;
        assert_eq!(outcome, Outcome::failure("transfer cancelled"));
    }
}
