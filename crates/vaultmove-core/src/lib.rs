//! Core types and traits for vaultmove.
//!
//! This crate provides the data model shared by every stage of the
//! verified-move pipeline: folder tasks and their state machine, per-stage
//! results, ignore rules, the event stream and configuration.

mod batch;
mod config;
mod error;
mod event;
mod ignore;
mod outcome;
mod task;

pub use batch::{BatchEstimate, BatchResult};
pub use config::{ConfigError, MoveConfig, MoveConfigBuilder, MoveConfigBuilderError};
pub use error::{AnalysisWarning, MoveError, WarningKind};
pub use event::{BatchEvent, FolderEvent, ProgressEvent};
pub use ignore::{IgnoreError, IgnoreRuleSet};
pub use outcome::{AnalysisResult, DeleteReport, OperationError, Outcome, VerifyResult};
pub use task::{FolderTask, TaskId, TaskState};

/// Reason appended to every report about a folder that was kept on disk.
pub const FILES_INTACT: &str = "not deleted, files intact";
