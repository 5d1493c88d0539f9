//! Batch-level aggregates.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::outcome::AnalysisResult;
use crate::task::{FolderTask, TaskState};

/// Final report of one batch, in the order the folders were supplied.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// Every task of the batch, including ones never started.
    pub folders: Vec<FolderTask>,
    /// True only if every folder reached `Done` and the batch ran to the end.
    pub all_succeeded: bool,
    /// Whether the batch was stopped by a cancellation.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    /// Build the result from the final task list.
    pub fn new(folders: Vec<FolderTask>, cancelled: bool, started_at: DateTime<Utc>) -> Self {
        let all_succeeded = !cancelled
            && !folders.is_empty()
            && folders.iter().all(|t| t.state() == TaskState::Done);

        Self {
            folders,
            all_succeeded,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Number of folders in the given state.
    pub fn count_in(&self, state: TaskState) -> usize {
        self.folders.iter().filter(|t| t.state() == state).count()
    }

    pub fn done_count(&self) -> usize {
        self.count_in(TaskState::Done)
    }

    pub fn failed_count(&self) -> usize {
        self.count_in(TaskState::Failed)
    }

    pub fn unsafe_count(&self) -> usize {
        self.count_in(TaskState::VerifiedButUnsafe)
    }

    pub fn pending_count(&self) -> usize {
        self.count_in(TaskState::Pending)
    }

    /// Bytes reclaimed locally, based on the analysed size of finished folders.
    pub fn bytes_freed(&self) -> u64 {
        self.folders
            .iter()
            .filter(|t| t.state() == TaskState::Done)
            .filter_map(|t| t.analysis())
            .map(|a| a.total_bytes)
            .sum()
    }

    /// Wall-clock duration of the batch.
    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// Upfront size estimate over all folders of a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchEstimate {
    /// Number of folders analysed.
    pub folders: usize,
    pub file_count: u64,
    pub ignored_count: u64,
    pub total_bytes: u64,
    /// Number of entries skipped during analysis.
    pub warning_count: usize,
    /// Time spent analysing.
    pub elapsed: Duration,
}

impl BatchEstimate {
    /// Add one folder's analysis to the totals.
    pub fn add(&mut self, analysis: &AnalysisResult) {
        self.folders += 1;
        self.file_count += analysis.file_count;
        self.ignored_count += analysis.ignored_count;
        self.total_bytes += analysis.total_bytes;
        self.warning_count += analysis.warnings.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_add() {
        let mut estimate = BatchEstimate::default();
        estimate.add(&AnalysisResult {
            file_count: 2,
            ignored_count: 1,
            total_bytes: 100,
            warnings: Vec::new(),
        });
        estimate.add(&AnalysisResult {
            file_count: 3,
            ignored_count: 0,
            total_bytes: 50,
            warnings: Vec::new(),
        });

        assert_eq!(estimate.folders, 2);
        assert_eq!(estimate.file_count, 5);
        assert_eq!(estimate.ignored_count, 1);
        assert_eq!(estimate.total_bytes, 150);
    }

    #[test]
    fn test_empty_batch_never_succeeds() {
        let result = BatchResult::new(Vec::new(), false, Utc::now());
        assert!(!result.all_succeeded);
    }
}
