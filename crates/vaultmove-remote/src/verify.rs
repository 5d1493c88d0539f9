//! Post-transfer verification.

use std::ffi::OsStr;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use vaultmove_core::{MoveConfig, VerifyResult};

use crate::error::RemoteError;
use crate::tool::{TransferTool, describe_status};

/// Confirms a transfer with the tool's `size` and `check --one-way`.
///
/// Both commands are read-only. The check is run without ignore rules, so
/// local files that were excluded from the copy make it fail.
#[derive(Debug, Clone)]
pub struct Verifier {
    tool: TransferTool,
}

impl Verifier {
    pub fn new(tool: TransferTool) -> Self {
        Self { tool }
    }

    pub fn from_config(config: &MoveConfig) -> Self {
        Self::new(TransferTool::from_config(config))
    }

    pub async fn verify(
        &self,
        folder: &Path,
        destination: &str,
        cancel: &CancellationToken,
    ) -> VerifyResult {
        let size = match self.tool.size(destination, cancel).await {
            Ok(size) => size,
            Err(RemoteError::Cancelled) => return cancelled(),
            Err(err) => {
                tracing::warn!(destination, error = %err, "remote size query failed");
                return VerifyResult::CheckError {
                    message: format!("failed to query remote size: {err}"),
                };
            }
        };

        let args = [
            OsStr::new("check"),
            folder.as_os_str(),
            OsStr::new(destination),
            OsStr::new("--one-way"),
        ];
        let output = match self.tool.capture_cancellable(args, cancel).await {
            Ok(output) => output,
            Err(RemoteError::Cancelled) => return cancelled(),
            Err(err) => {
                tracing::warn!(destination, error = %err, "integrity check could not run");
                return VerifyResult::CheckError {
                    message: err.to_string(),
                };
            }
        };

        if !output.success() {
            let diagnostics = output.diagnostics();
            let reason = if diagnostics.is_empty() {
                format!("check exited with {}", describe_status(output.status))
            } else {
                diagnostics
            };
            tracing::warn!(folder = %folder.display(), destination, %reason, "verification mismatch");
            return VerifyResult::Mismatch { reason };
        }

        tracing::info!(
            folder = %folder.display(),
            destination,
            remote_files = size.count,
            remote_bytes = size.bytes,
            "verified"
        );
        VerifyResult::Verified {
            remote_files: size.count,
            remote_bytes: size.bytes,
        }
    }
}
fn cancelled() -> VerifyResult {
    VerifyResult::CheckError {
        message: "verification cancelled".to_string(),
    }
}

