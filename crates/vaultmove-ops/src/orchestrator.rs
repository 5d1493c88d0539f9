//! The verified-move state machine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vaultmove_core::{
    BatchEstimate, BatchEvent, BatchResult, FILES_INTACT, FolderEvent, FolderTask,
    IgnoreRuleSet, MoveConfig, MoveError, Outcome, TaskId, TaskState, VerifyResult,
};
use vaultmove_remote::{RemoteSpace, TransferRunner, TransferTool, Verifier};
use vaultmove_scan::SizeAnalyzer;

use crate::delete::LocalDeleter;

/// Internal failure that stops the batch.
struct Abort(String);

impl From<MoveError> for Abort {
    fn from(err: MoveError) -> Self {
        if err.is_invariant_violation() {
            Self(format!("invariant violated: {err}"))
        } else {
            Self(err.to_string())
        }
    }
}

/// A batch running on its own task.
#[derive(Debug)]
pub struct BatchHandle {
    /// Events in the order they happened. Closed when the batch ends.
    pub events: mpsc::UnboundedReceiver<BatchEvent>,
    /// Cancels the batch.
    pub cancel: CancellationToken,
    pub join: JoinHandle<Result<BatchResult, MoveError>>,
}

impl BatchHandle {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Moves folders to the remote one at a time: analyze, transfer, verify and
/// only then delete.
///
/// A folder is deleted only after its own verification returned `Verified`.
/// A failing folder never stops the batch; the remaining folders are still
/// processed. Only cancellation and internal errors end a batch early.
#[derive(Debug, Clone)]
pub struct MoveOrchestrator {
    config: MoveConfig,
    tool: TransferTool,
    analyzer: SizeAnalyzer,
    runner: TransferRunner,
    verifier: Verifier,
    deleter: LocalDeleter,
}

impl MoveOrchestrator {
    pub fn new(config: MoveConfig) -> Self {
        let tool = TransferTool::from_config(&config);
        Self {
            analyzer: SizeAnalyzer::new(),
            runner: TransferRunner::from_config(&config),
            verifier: Verifier::new(tool.clone()),
            deleter: LocalDeleter::from_config(&config),
            tool,
            config,
        }
    }

    /// Replace the local deleter.
    pub fn with_deleter(mut self, deleter: LocalDeleter) -> Self {
        self.deleter = deleter;
        self
    }

    pub fn config(&self) -> &MoveConfig {
        &self.config
    }

    pub fn tool(&self) -> &TransferTool {
        &self.tool
    }

    /// Sum up what moving `folders` would transfer.
    pub fn estimate(&self, folders: &[PathBuf], rules: &IgnoreRuleSet) -> BatchEstimate {
        self.analyzer.estimate(folders, rules)
    }

    /// Validate a batch and create its pending tasks.
    ///
    /// Fails if the batch is empty, a folder is unusable, two folders map
    /// to the same remote destination, or one folder lies inside another.
    /// Deleting the outer folder would otherwise remove the inner one before
    /// it is moved.
    pub fn plan(&self, folders: &[PathBuf]) -> Result<Vec<FolderTask>, MoveError> {
        if folders.is_empty() {
            return Err(MoveError::EmptyBatch);
        }

        let mut tasks = Vec::with_capacity(folders.len());
        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        let mut resolved: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(folders.len());

        for (index, folder) in folders.iter().enumerate() {
            let absolute = std::path::absolute(folder)
                .map_err(|e| MoveError::invalid_folder(folder, e.to_string()))?;
            let destination = self
                .config
                .destination_for(&absolute)
                .ok_or_else(|| MoveError::invalid_folder(&absolute, "folder has no name"))?;

            let task = FolderTask::new(TaskId(index), &absolute, destination.clone())?;

            if let Some(first) = seen.insert(destination.clone(), task.local_path().to_path_buf()) {
                return Err(MoveError::DuplicateDestination {
                    destination,
                    first,
                    second: task.local_path().to_path_buf(),
                });
            }

            let real = std::fs::canonicalize(task.local_path())
                .map_err(|e| MoveError::invalid_folder(task.local_path(), e.to_string()))?;
            for (other_real, other) in &resolved {
                if real.starts_with(other_real) {
                    return Err(MoveError::OverlappingFolders {
                        outer: other.clone(),
                        inner: task.local_path().to_path_buf(),
                    });
                }
                if other_real.starts_with(&real) {
                    return Err(MoveError::OverlappingFolders {
                        outer: task.local_path().to_path_buf(),
                        inner: other.clone(),
                    });
                }
            }
            resolved.push((real, task.local_path().to_path_buf()));
            tasks.push(task);
        }

        Ok(tasks)
    }

    /// Check that the transfer tool can reach the configured remote.
    pub async fn preflight(&self) -> Result<RemoteSpace, MoveError> {
        self.tool
            .check_config(&self.config.remote_name, self.config.preflight_timeout())
            .await
            .map_err(|err| MoveError::configuration(err.to_string()))
    }

    /// Verify an earlier upload of `folder` without changing anything.
    pub async fn verify_folder(
        &self,
        folder: &Path,
        cancel: &CancellationToken,
    ) -> Result<(String, VerifyResult), MoveError> {
        let task = self
            .plan(std::slice::from_ref(&folder.to_path_buf()))?
            .remove(0);
        let result = self
            .verifier
            .verify(task.local_path(), task.remote_destination(), cancel)
            .await;
        Ok((task.remote_destination().to_string(), result))
    }

    /// Run a batch to completion, reporting every step through `on_event`.
    ///
    /// Folders are processed sequentially in the given order. Errors are
    /// returned only for invalid batches, a failed configuration check, or an
    /// internal error; per-folder failures are recorded on the tasks.
    pub async fn run_batch<F>(
        &self,
        folders: &[PathBuf],
        rules: Arc<IgnoreRuleSet>,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<BatchResult, MoveError>
    where
        F: FnMut(BatchEvent) + Send,
    {
        let mut tasks = self.plan(folders)?;

        if self.config.preflight {
            self.preflight().await?;
        }

        let started_at = Utc::now();
        tracing::info!(folders = tasks.len(), rules = rules.len(), "batch started");

        for index in 0..tasks.len() {
            if cancel.is_cancelled() {
                tracing::info!(remaining = tasks.len() - index, "batch cancelled");
                break;
            }

            let outcome = self
                .run_folder(&mut tasks[index], &rules, cancel, &mut on_event)
                .await;
            if let Err(Abort(reason)) = outcome {
                tracing::error!(task = %TaskId(index), %reason, "batch aborted");
                let partial = BatchResult::new(tasks, cancel.is_cancelled(), started_at);
                return Err(MoveError::BatchAborted {
                    reason,
                    partial: Box::new(partial),
                });
            }
        }

        let result = BatchResult::new(tasks, cancel.is_cancelled(), started_at);
        tracing::info!(
            done = result.done_count(),
            failed = result.failed_count(),
            unverified = result.unsafe_count(),
            pending = result.pending_count(),
            "batch finished"
        );
        Ok(result)
    }

    /// Spawn [`run_batch`](Self::run_batch) on its own task.
    ///
    /// Events are buffered in an unbounded channel, so the batch never waits
    /// for the consumer.
    pub fn start_batch(self: Arc<Self>, folders: Vec<PathBuf>, rules: Arc<IgnoreRuleSet>) -> BatchHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let join = tokio::spawn(async move {
            self.run_batch(&folders, rules, &token, |event| {
                // The receiver may be gone; the batch still runs to the end.
                let _ = tx.send(event);
            })
            .await
        });

        BatchHandle {
            events: rx,
            cancel,
            join,
        }
    }

    /// One folder's pipeline. Errors are internal and abort the batch.
    async fn run_folder<F>(
        &self,
        task: &mut FolderTask,
        rules: &Arc<IgnoreRuleSet>,
        cancel: &CancellationToken,
        on_event: &mut F,
    ) -> Result<(), Abort>
    where
        F: FnMut(BatchEvent) + Send,
    {
        let id = task.id();
        let folder = task.local_path().to_path_buf();
        let destination = task.remote_destination().to_string();

        tracing::info!(task = %id, folder = %folder.display(), %destination, "folder started");
        on_event(BatchEvent::new(
            id,
            FolderEvent::Started {
                local_path: folder.clone(),
                destination: destination.clone(),
            },
        ));

        // Analyze
        task.advance(TaskState::Analyzing)?;
        let analyzer = self.analyzer.clone();
        let analysis = {
            let folder = folder.clone();
            let rules = Arc::clone(rules);
            tokio::task::spawn_blocking(move || analyzer.analyze(&folder, &rules))
                .await
                .map_err(|e| Abort(format!("analysis of {} failed: {e}", task.name())))?
        };
        task.record_analysis(analysis.clone());
        on_event(BatchEvent::new(id, FolderEvent::AnalysisComplete(analysis)));

        // Transfer
        task.advance(TaskState::Transferring)?;
        let outcome = self
            .runner
            .transfer(&folder, &destination, rules, cancel, |progress| {
                on_event(BatchEvent::new(id, FolderEvent::Progress(progress)));
            })
            .await;
        task.record_transfer(outcome.clone());
        on_event(BatchEvent::new(id, FolderEvent::TransferComplete(outcome.clone())));

        if let Outcome::Failure { message } = outcome {
            return self.fail(task, TaskState::Failed, format!("transfer failed: {message}"), on_event);
        }

        // Verify
        task.advance(TaskState::Verifying)?;
        let verdict = self.verifier.verify(&folder, &destination, cancel).await;
        task.record_verify(verdict.clone());
        on_event(BatchEvent::new(id, FolderEvent::VerifyComplete(verdict.clone())));

        if let Some(reason) = verdict.reason() {
            return self.fail(
                task,
                TaskState::VerifiedButUnsafe,
                format!("verification failed: {reason}"),
                on_event,
            );
        }

        // Delete
        task.advance(TaskState::Deleting)?;
        let report = {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let deleter = self.deleter.clone();
            let path = folder.clone();
            let mut join = tokio::task::spawn_blocking(move || {
                deleter.delete(&path, |percent, message| {
                    let _ = tx.send((percent, message));
                })
            });

            let joined = loop {
                tokio::select! {
                    Some((percent, message)) = rx.recv() => {
                        on_event(BatchEvent::new(id, FolderEvent::DeleteProgress { percent, message }));
                    }
                    joined = &mut join => break joined,
                }
            };
            while let Ok((percent, message)) = rx.try_recv() {
                on_event(BatchEvent::new(id, FolderEvent::DeleteProgress { percent, message }));
            }

            joined.map_err(|e| Abort(format!("deletion of {} failed: {e}", task.name())))?
        };

        task.record_delete(report.clone());
        task.advance(TaskState::Done)?;
        tracing::info!(task = %id, folder = %folder.display(), summary = %report.summary(), "folder moved");
        on_event(BatchEvent::new(id, FolderEvent::FolderComplete(report)));
        Ok(())
    }

    /// End a folder without deleting it.
    fn fail<F>(
        &self,
        task: &mut FolderTask,
        state: TaskState,
        detail: String,
        on_event: &mut F,
    ) -> Result<(), Abort>
    where
        F: FnMut(BatchEvent) + Send,
    {
        task.advance(state)?;
        let reason = format!("{detail}; {FILES_INTACT}");
        tracing::warn!(task = %task.id(), folder = %task.local_path().display(), %state, %reason, "folder not moved");
        on_event(BatchEvent::new(task.id(), FolderEvent::FolderFailed { state, reason }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn orchestrator() -> MoveOrchestrator {
        MoveOrchestrator::new(MoveConfig::default())
    }

    #[test]
    fn test_plan_rejects_empty_batch() {
        assert!(matches!(orchestrator().plan(&[]), Err(MoveError::EmptyBatch)));
    }

    #[test]
    fn test_plan_rejects_missing_folder() {
        let tmp = TempDir::new().unwrap();
        let err = orchestrator().plan(&[tmp.path().join("absent")]).unwrap_err();
        assert!(matches!(err, MoveError::InvalidFolder { .. }), "{err}");
    }

    #[test]
    fn test_plan_rejects_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, b"x").unwrap();
        let err = orchestrator().plan(&[file]).unwrap_err();
        assert!(matches!(err, MoveError::InvalidFolder { .. }), "{err}");
    }

    #[test]
    fn test_plan_rejects_duplicate_destination() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a/Photos");
        let b = tmp.path().join("b/Photos");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        let err = orchestrator().plan(&[a.clone(), b.clone()]).unwrap_err();
        match err {
            MoveError::DuplicateDestination {
                destination,
                first,
                second,
            } => {
                assert_eq!(destination, "gdrive:archived/Photos");
                assert_eq!(first, a);
                assert_eq!(second, b);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_plan_rejects_nested_folders() {
        let tmp = TempDir::new().unwrap();
        let outer = tmp.path().join("Archive");
        let inner = outer.join("2019");
        fs::create_dir_all(&inner).unwrap();

        for batch in [[outer.clone(), inner.clone()], [inner.clone(), outer.clone()]] {
            match orchestrator().plan(&batch).unwrap_err() {
                MoveError::OverlappingFolders {
                    outer: found_outer,
                    inner: found_inner,
                } => {
                    assert_eq!(found_outer, outer);
                    assert_eq!(found_inner, inner);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_plan_allows_sibling_prefix_names() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("data");
        let b = tmp.path().join("data-old");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();

        assert_eq!(orchestrator().plan(&[a, b]).unwrap().len(), 2);
    }

    #[test]
    fn test_invariant_violation_named_in_abort() {
        let Abort(reason) = Abort::from(MoveError::UnverifiedDelete {
            task: TaskId(3),
            path: PathBuf::from("/data"),
        });
        assert!(reason.starts_with("invariant violated:"), "{reason}");

        let Abort(reason) = Abort::from(MoveError::configuration("no remote"));
        assert!(!reason.starts_with("invariant violated:"), "{reason}");
    }

    #[test]
    fn test_plan_assigns_ids_in_order() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("one");
        let b = tmp.path().join("two");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();

        let tasks = orchestrator().plan(&[a, b]).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id(), TaskId(0));
        assert_eq!(tasks[1].remote_destination(), "gdrive:archived/two");
        assert!(tasks.iter().all(|t| t.state() == TaskState::Pending));
    }
}
