//! Local deletion with progress reporting.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jwalk::{Parallelism, WalkDir};

use vaultmove_core::{DeleteReport, MoveConfig, OperationError, Outcome};

/// Primitive used to remove a single non-directory entry.
pub type RemoveFn = Arc<dyn Fn(&Path) -> io::Result<()> + Send + Sync>;

/// Deletes a folder file by file, reporting progress every N files.
///
/// Individual failures are recorded and skipped. Directories are removed
/// bottom-up once their files are gone, so anything left behind keeps its
/// parent directories and the outcome becomes a failure naming the folder.
#[derive(Clone)]
pub struct LocalDeleter {
    progress_interval: usize,
    remove_file: RemoveFn,
}

impl fmt::Debug for LocalDeleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDeleter")
            .field("progress_interval", &self.progress_interval)
            .finish_non_exhaustive()
    }
}

impl Default for LocalDeleter {
    fn default() -> Self {
        Self::new(100)
    }
}

impl LocalDeleter {
    /// Create a deleter reporting every `progress_interval` files.
    pub fn new(progress_interval: usize) -> Self {
        Self {
            progress_interval: progress_interval.max(1),
            remove_file: Arc::new(|path| std::fs::remove_file(path)),
        }
    }

    pub fn from_config(config: &MoveConfig) -> Self {
        Self::new(config.delete_progress_interval)
    }

    /// Replace the file removal primitive.
    pub fn with_remover<F>(mut self, remove: F) -> Self
    where
        F: Fn(&Path) -> io::Result<()> + Send + Sync + 'static,
    {
        self.remove_file = Arc::new(remove);
        self
    }

    pub fn progress_interval(&self) -> usize {
        self.progress_interval
    }

    /// Delete `folder` and everything in it.
    ///
    /// `on_progress` receives a percentage and a message every
    /// `progress_interval` files and once more at the end. The percentage is
    /// taken over every enumerated entry, directories included, so it stays
    /// below 100 until the final call.
    pub fn delete<F>(&self, folder: &Path, mut on_progress: F) -> DeleteReport
    where
        F: FnMut(u8, String),
    {
        let mut files: Vec<PathBuf> = Vec::new();
        let mut dirs: Vec<(usize, PathBuf)> = Vec::new();
        let mut entries_total = 0;

        let walker = WalkDir::new(folder)
            .parallelism(Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(1);

        for entry in walker {
            match entry {
                Ok(entry) => {
                    entries_total += 1;
                    if entry.file_type().is_dir() {
                        dirs.push((entry.depth(), entry.path()));
                    } else {
                        files.push(entry.path());
                    }
                }
                Err(err) => {
                    tracing::warn!(folder = %folder.display(), error = %err, "failed to enumerate entry");
                }
            }
        }

        let files_total = files.len();
        let mut files_deleted = 0;
        let mut failures = Vec::new();

        tracing::info!(folder = %folder.display(), files = files_total, entries = entries_total, "deleting local folder");

        for (index, path) in files.iter().enumerate() {
            match (self.remove_file)(path) {
                Ok(()) => files_deleted += 1,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to delete file");
                    failures.push(OperationError::new(path, err.to_string()));
                }
            }

            let processed = index + 1;
            if processed % self.progress_interval == 0 && processed < files_total {
                let percent = percent_of(processed, entries_total);
                on_progress(percent, format!("Deleting... {percent}%"));
            }
        }

        // Deepest first, so every directory is empty when its turn comes.
        dirs.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, dir) in &dirs {
            if let Err(err) = std::fs::remove_dir(dir) {
                tracing::debug!(path = %dir.display(), error = %err, "directory not removed");
            }
        }

        let outcome = match std::fs::remove_dir(folder) {
            Ok(()) => Outcome::Success,
            Err(err) if failures.is_empty() => {
                Outcome::failure(format!("{} was not removed: {err}", folder.display()))
            }
            Err(_) => Outcome::failure(format!(
                "{} was not fully deleted: {} of {} files could not be removed",
                folder.display(),
                failures.len(),
                files_total
            )),
        };

        let report = DeleteReport {
            entries_total,
            files_total,
            files_deleted,
            failures,
            outcome,
        };

        on_progress(100, report.summary());
        tracing::info!(folder = %folder.display(), summary = %report.summary(), "deletion finished");
        report
    }
}

fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done * 100) / total).min(100) as u8
}
