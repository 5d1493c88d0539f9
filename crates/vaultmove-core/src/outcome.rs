//! Results produced by each pipeline stage.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisWarning;

/// Size analysis of one folder, produced once before its transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Files that will be transferred.
    pub file_count: u64,
    /// Files excluded by ignore rules.
    pub ignored_count: u64,
    /// Total bytes of the files that will be transferred.
    pub total_bytes: u64,
    /// Entries skipped because they could not be read.
    #[serde(default)]
    pub warnings: Vec<AnalysisWarning>,
}

impl AnalysisResult {
    /// Whether the folder contains nothing to transfer.
    pub fn is_empty(&self) -> bool {
        self.file_count == 0
    }
}

/// Terminal result of a transfer or deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure { message: String },
}

impl Outcome {
    /// Create a failure outcome.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// The failure message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failure { message } => Some(message),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure { message } => write!(f, "failed: {message}"),
        }
    }
}

/// Verdict of the post-transfer verification; the only delete gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum VerifyResult {
    /// Every local file is present and intact remotely.
    Verified { remote_files: u64, remote_bytes: u64 },
    /// The integrity check reported differences.
    Mismatch { reason: String },
    /// Verification could not be carried out.
    CheckError { message: String },
}

impl VerifyResult {
    /// Whether this verdict authorises deletion.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    /// Why verification did not pass, if it did not.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Verified { .. } => None,
            Self::Mismatch { reason } => Some(reason),
            Self::CheckError { message } => Some(message),
        }
    }
}

impl std::fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verified {
                remote_files,
                remote_bytes,
            } => write!(f, "verified ({remote_files} files, {remote_bytes} bytes remote)"),
            Self::Mismatch { reason } => write!(f, "mismatch: {reason}"),
            Self::CheckError { message } => write!(f, "check error: {message}"),
        }
    }
}

/// A file that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// The path that caused the error.
    pub path: PathBuf,
    /// A human-readable error message.
    pub message: String,
}

impl OperationError {
    /// Create a new operation error.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Record of a local deletion, including partial failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Entries (files and directories) found under the folder.
    pub entries_total: usize,
    /// Non-directory entries found under the folder.
    pub files_total: usize,
    /// Files removed individually.
    pub files_deleted: usize,
    /// Files that could not be removed.
    pub failures: Vec<OperationError>,
    /// Whether the folder is gone.
    pub outcome: Outcome,
}

impl DeleteReport {
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// Get a human-readable summary of the deletion.
    pub fn summary(&self) -> String {
        if self.failures.is_empty() {
            format!("Deleted {} files ({} entries)", self.files_deleted, self.entries_total)
        } else {
            format!(
                "Deleted {} of {} files, {} failed",
                self.files_deleted,
                self.files_total,
                self.failures.len()
            )
        }
    }
}
