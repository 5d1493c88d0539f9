//! Events emitted while a batch runs.

use std::path::PathBuf;

use serde::Serialize;

use crate::outcome::{AnalysisResult, DeleteReport, Outcome, VerifyResult};
use crate::task::{TaskId, TaskState};

/// One parsed line of the transfer tool's status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Percent-progress line.
    Percent {
        percent: u8,
        speed: String,
        eta: String,
    },
    /// Any other non-blank line, kept for logging.
    RawLine { line: String },
}

impl ProgressEvent {
    pub fn percent(percent: u8, speed: impl Into<String>, eta: impl Into<String>) -> Self {
        Self::Percent {
            percent,
            speed: speed.into(),
            eta: eta.into(),
        }
    }

    pub fn raw(line: impl Into<String>) -> Self {
        Self::RawLine { line: line.into() }
    }
}

/// Something that happened to one folder of a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FolderEvent {
    /// The folder's pipeline started.
    Started {
        local_path: PathBuf,
        destination: String,
    },
    AnalysisComplete(AnalysisResult),
    /// Status output from the running transfer.
    Progress(ProgressEvent),
    TransferComplete(Outcome),
    VerifyComplete(VerifyResult),
    DeleteProgress { percent: u8, message: String },
    /// The folder was moved; the report lists any files left behind.
    FolderComplete(DeleteReport),
    /// The folder was not deleted.
    FolderFailed { state: TaskState, reason: String },
}

/// A folder event tagged with the task it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEvent {
    pub task: TaskId,
    pub event: FolderEvent,
}

impl BatchEvent {
    pub fn new(task: TaskId, event: FolderEvent) -> Self {
        Self { task, event }
    }
}
