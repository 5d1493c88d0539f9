//! Folder size analysis for vaultmove.
//!
//! This crate walks local folders with jwalk and reports how many files and
//! bytes a transfer will carry once ignore rules are applied.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use vaultmove_scan::{IgnoreRuleSet, SizeAnalyzer};
//!
//! let rules = IgnoreRuleSet::new(["*.tmp", "cache/**"]).unwrap();
//! let result = SizeAnalyzer::new().analyze(Path::new("/path/to/folder"), &rules);
//!
//! println!("{} files, {} bytes", result.file_count, result.total_bytes);
//! println!("{} ignored", result.ignored_count);
//! ```

mod analyzer;

pub use analyzer::SizeAnalyzer;

// Re-export core types for convenience
pub use vaultmove_core::{AnalysisResult, AnalysisWarning, BatchEstimate, IgnoreRuleSet, WarningKind};
