//! Folder tasks and their state machine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::MoveError;
use crate::outcome::{AnalysisResult, DeleteReport, Outcome, VerifyResult};

/// Position of a task within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub usize);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0 + 1)
    }
}

/// Lifecycle state of a folder task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Analyzing,
    Transferring,
    Verifying,
    Deleting,
    Done,
    /// Uploaded but not verified; local files are kept.
    VerifiedButUnsafe,
    Failed,
}

impl TaskState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::VerifiedButUnsafe | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Pending, Analyzing)
            | (Analyzing, Transferring)
            | (Transferring, Verifying)
            | (Verifying, Deleting)
            | (Verifying, VerifiedButUnsafe)
            | (Deleting, Done) => true,
            (Pending | Analyzing | Transferring | Verifying, Failed) => true,
            _ => false,
        }
    }
}

/// One local folder slated for a verified move.
#[derive(Debug, Clone, Serialize)]
pub struct FolderTask {
    id: TaskId,
    local_path: PathBuf,
    remote_destination: String,
    state: TaskState,
    analysis: Option<AnalysisResult>,
    transfer_outcome: Option<Outcome>,
    verify_result: Option<VerifyResult>,
    delete_outcome: Option<Outcome>,
    delete_report: Option<DeleteReport>,
}

impl FolderTask {
    /// Create a pending task.
    ///
    /// The folder must exist and be a directory. Relative paths are made
    /// absolute against the current directory.
    pub fn new(
        id: TaskId,
        local_path: impl AsRef<Path>,
        remote_destination: impl Into<String>,
    ) -> Result<Self, MoveError> {
        let path = local_path.as_ref();
        let local_path = std::path::absolute(path)
            .map_err(|e| MoveError::invalid_folder(path, e.to_string()))?;

        match std::fs::metadata(&local_path) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(MoveError::invalid_folder(local_path, "not a directory")),
            Err(e) => return Err(MoveError::invalid_folder(local_path, e.to_string())),
        }

        Ok(Self {
            id,
            local_path,
            remote_destination: remote_destination.into(),
            state: TaskState::Pending,
            analysis: None,
            transfer_outcome: None,
            verify_result: None,
            delete_outcome: None,
            delete_report: None,
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn remote_destination(&self) -> &str {
        &self.remote_destination
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn transfer_outcome(&self) -> Option<&Outcome> {
        self.transfer_outcome.as_ref()
    }

    pub fn verify_result(&self) -> Option<&VerifyResult> {
        self.verify_result.as_ref()
    }

    pub fn delete_outcome(&self) -> Option<&Outcome> {
        self.delete_outcome.as_ref()
    }

    pub fn delete_report(&self) -> Option<&DeleteReport> {
        self.delete_report.as_ref()
    }

    /// Display name of the folder (its base name).
    pub fn name(&self) -> String {
        self.local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.local_path.display().to_string())
    }

    /// Whether the local files are guaranteed to still be in place.
    pub fn files_intact(&self) -> bool {
        !matches!(self.state, TaskState::Deleting | TaskState::Done)
    }

    /// Move to the next state.
    ///
    /// Entering `Deleting` additionally requires this task's own verify result
    /// to be `Verified`.
    pub fn advance(&mut self, next: TaskState) -> Result<(), MoveError> {
        if !self.state.can_transition_to(next) {
            return Err(MoveError::InvalidTransition {
                task: self.id,
                from: self.state,
                to: next,
            });
        }

        if next == TaskState::Deleting
            && !self.verify_result.as_ref().is_some_and(VerifyResult::is_verified)
        {
            return Err(MoveError::UnverifiedDelete {
                task: self.id,
                path: self.local_path.clone(),
            });
        }

        tracing::debug!(task = %self.id, from = %self.state, to = %next, "task transition");
        self.state = next;
        Ok(())
    }

    pub fn record_analysis(&mut self, analysis: AnalysisResult) {
        self.analysis = Some(analysis);
    }

    pub fn record_transfer(&mut self, outcome: Outcome) {
        self.transfer_outcome = Some(outcome);
    }

    pub fn record_verify(&mut self, result: VerifyResult) {
        self.verify_result = Some(result);
    }

    pub fn record_delete(&mut self, report: DeleteReport) {
        self.delete_outcome = Some(report.outcome.clone());
        self.delete_report = Some(report);
    }
}
