//! Verified moves for vaultmove.
//!
//! [`MoveOrchestrator`] drives each folder through analyze, transfer, verify
//! and delete, and [`LocalDeleter`] removes a folder once its upload has been
//! verified. Progress is reported as [`BatchEvent`]s, either through a
//! callback ([`MoveOrchestrator::run_batch`]) or a channel
//! ([`MoveOrchestrator::start_batch`]).

mod delete;
mod orchestrator;

pub use delete::{LocalDeleter, RemoveFn};
pub use orchestrator::{BatchHandle, MoveOrchestrator};

// Re-export core types for convenience
pub use vaultmove_core::{BatchEvent, BatchResult, FolderEvent, MoveError, TaskState};
