//! Transfer tool integration for vaultmove.
//!
//! Everything that talks to the external (rclone-compatible) transfer tool
//! lives here: the `copy` supervisor with its progress parser, the
//! `size`/`check` verifier, and the configuration and free-space queries.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//! use vaultmove_core::{IgnoreRuleSet, MoveConfig};
//! use vaultmove_remote::{TransferRunner, Verifier};
//!
//! # async fn run() {
//! let config = MoveConfig::default();
//! let cancel = CancellationToken::new();
//! let folder = Path::new("/data/Photos");
//!
//! let outcome = TransferRunner::from_config(&config)
//!     .transfer(folder, "gdrive:archived/Photos", &IgnoreRuleSet::empty(), &cancel, |event| {
//!         println!("{event:?}");
//!     })
//!     .await;
//!
//! if outcome.is_success() {
//!     let verdict = Verifier::from_config(&config)
//!         .verify(folder, "gdrive:archived/Photos", &cancel)
//!         .await;
//!     println!("{verdict}");
//! }
//! # }
//! ```

mod error;
mod progress;
mod tool;
mod transfer;
mod verify;

pub use error::RemoteError;
pub use progress::ProgressParser;
pub use tool::{CommandOutput, DIAGNOSTIC_LINES, RemoteSize, RemoteSpace, TransferTool};
pub use transfer::{TransferOptions, TransferRunner};
pub use verify::Verifier;
