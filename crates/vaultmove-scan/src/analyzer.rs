//! JWalk-based folder size analyzer.

use std::path::{Path, PathBuf};
use std::time::Instant;

use jwalk::{Parallelism, WalkDir};

use vaultmove_core::{AnalysisResult, AnalysisWarning, BatchEstimate, IgnoreRuleSet, WarningKind};

/// Counts the files and bytes a transfer of a folder will carry.
///
/// The walk is depth-first and sorted, so results are deterministic for an
/// unchanged folder. Symbolic links are never followed or counted.
#[derive(Debug, Clone, Default)]
pub struct SizeAnalyzer {
    _private: (),
}

impl SizeAnalyzer {
    /// Create a new analyzer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze one folder against a rule set.
    ///
    /// Never fails: unreadable entries become warnings and are excluded from
    /// the totals; an unreadable folder yields an empty result.
    pub fn analyze(&self, folder: &Path, rules: &IgnoreRuleSet) -> AnalysisResult {
        let mut result = AnalysisResult::default();

        let walker = WalkDir::new(folder)
            .parallelism(Parallelism::Serial)
            .sort(true)
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(0);

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let warning = walk_warning(&err, folder, WarningKind::ReadError);
                    tracing::debug!(path = %warning.path.display(), error = %err, "skipping unreadable entry");
                    result.warnings.push(warning);
                    continue;
                }
            };

            // Directories and symlinks are not transferred as files.
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(folder).unwrap_or(path.as_path());

            if let Some(rule) = rules.first_match(relative) {
                tracing::trace!(path = %relative.display(), rule, "ignored");
                result.ignored_count += 1;
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    result.file_count += 1;
                    result.total_bytes += metadata.len();
                }
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "file vanished during analysis");
                    result
                        .warnings
                        .push(walk_warning(&err, &path, WarningKind::MetadataError));
                }
            }
        }

        tracing::debug!(
            folder = %folder.display(),
            files = result.file_count,
            ignored = result.ignored_count,
            bytes = result.total_bytes,
            "analysis complete"
        );

        result
    }

    /// Analyze several folders and sum the results.
    pub fn estimate(&self, folders: &[PathBuf], rules: &IgnoreRuleSet) -> BatchEstimate {
        self.analyze_all(folders, rules).1
    }

    /// Analyze several folders, keeping each result alongside the sum.
    ///
    /// Results are in the order of `folders`.
    pub fn analyze_all(
        &self,
        folders: &[PathBuf],
        rules: &IgnoreRuleSet,
    ) -> (Vec<AnalysisResult>, BatchEstimate) {
        let start = Instant::now();
        let mut estimate = BatchEstimate::default();

        let results = folders
            .iter()
            .map(|folder| {
                let analysis = self.analyze(folder, rules);
                estimate.add(&analysis);
                analysis
            })
            .collect();

        estimate.elapsed = start.elapsed();
        (results, estimate)
    }
}

/// Classify a walk error, falling back to `path` when the error has none.
fn walk_warning(err: &jwalk::Error, path: &Path, fallback: WarningKind) -> AnalysisWarning {
    let path = err.path().unwrap_or(path);
    match err.io_error() {
        Some(io) => AnalysisWarning::from_io(path, io, fallback),
        None => AnalysisWarning::new(path, err.to_string(), fallback),
    }
}
