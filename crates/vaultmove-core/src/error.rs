//! Error types for the verified-move pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::batch::BatchResult;
use crate::ignore::IgnoreError;
use crate::task::{TaskId, TaskState};

/// Errors that escape the orchestrator boundary.
///
/// Per-folder failures never appear here; they are recorded on the folder's
/// task and reported through the event stream.
#[derive(Debug, Error)]
pub enum MoveError {
    /// The transfer tool is missing, unconfigured or unauthenticated.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The batch contained no folders.
    #[error("No folders to move")]
    EmptyBatch,

    /// A folder does not exist or is not a directory.
    #[error("Not a usable folder: {path}: {reason}")]
    InvalidFolder { path: PathBuf, reason: String },

    /// Two folders of one batch map to the same remote destination.
    #[error("{first} and {second} would both be uploaded to {destination}")]
    DuplicateDestination {
        destination: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// One folder of a batch lies inside another.
    #[error("{inner} lies inside {outer}; move them in separate batches")]
    OverlappingFolders { outer: PathBuf, inner: PathBuf },

    /// The ignore rules could not be loaded.
    #[error(transparent)]
    IgnoreRules(#[from] IgnoreError),

    /// A task was asked to move backwards or skip a stage.
    #[error("Task {task}: illegal transition {from} -> {to}")]
    InvalidTransition {
        task: TaskId,
        from: TaskState,
        to: TaskState,
    },

    /// A task was asked to delete without its own verified upload.
    #[error("Task {task}: refusing to delete {path} without a verified upload")]
    UnverifiedDelete { task: TaskId, path: PathBuf },

    /// An internal error stopped the batch; unprocessed folders stay pending.
    #[error("Batch aborted: {reason}")]
    BatchAborted {
        reason: String,
        partial: Box<BatchResult>,
    },
}

impl MoveError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid folder error.
    pub fn invalid_folder(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidFolder {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is an internal invariant violation.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::UnverifiedDelete { .. }
        )
    }
}

/// Kind of analysis warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// The entry disappeared during the walk.
    Vanished,
    /// Error reading a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
}

/// Non-fatal problem encountered while analysing a folder.
///
/// The affected entry is excluded from the totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl AnalysisWarning {
    /// Create a new analysis warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from an I/O error, classifying it by kind.
    ///
    /// Errors that are neither a denied permission nor a vanished entry get
    /// `fallback`.
    pub fn from_io(
        path: impl Into<PathBuf>,
        error: &std::io::Error,
        fallback: WarningKind,
    ) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => WarningKind::PermissionDenied,
            std::io::ErrorKind::NotFound => WarningKind::Vanished,
            _ => fallback,
        };
        Self::new(path, error.to_string(), kind)
    }
}
