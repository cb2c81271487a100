//! modelrepo core library.
//!
//! This crate stores a typed, cross-referenced model graph in a git working
//! tree as one file per object: export and import of the file tree, recovery
//! of objects that only survive in history, and per-object conflict
//! resolution after a merge.

pub mod cancel;
pub mod codec;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod export;
pub mod import;
pub mod model;
pub mod recovery;
pub mod repository;
pub mod vcs;

// Re-exports for convenience.
pub use cancel::CancelToken;
pub use config::RepoConfig;
pub use errors::CoreError;
pub use export::{export_model, ExportOptions, ExportSummary};
pub use import::{import_model, ImportedModel};
pub use model::{Model, ObjectId};
pub use recovery::{HistoricalRecovery, RecoveryOutcome, RecoveryReport};
pub use repository::ModelRepository;
pub use vcs::{GitClient, VersionControl};
