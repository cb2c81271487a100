//! Version-control collaborator.
//!
//! The engine never talks to git directly; it goes through
//! [`VersionControl`] so the decompose/recompose/resolve algorithms can be
//! driven by a test double. [`GitClient`] is the `git2` implementation.

pub mod git;

use std::collections::BTreeSet;
use std::fmt;
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::errors::VcsError;

pub use git::{CommitSignature, GitClient};

/// Working-tree status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkTreeStatus {
    Clean,
    Dirty,
}

/// Side of a merge conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ours,
    Theirs,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

/// Result classification of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    /// Merged (fast-forward or clean merge commit).
    Ok,
    /// Conflicts were left in the index and working tree.
    Conflicting,
    /// Nothing to merge.
    UpToDate,
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Conflicting => write!(f, "conflicting"),
            Self::UpToDate => write!(f, "up_to_date"),
        }
    }
}

/// What a merge produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub status: MergeStatus,
    /// Repository-relative paths in conflict (`/`-separated).
    pub conflicts: BTreeSet<String>,
    /// The ref that was merged in; "theirs" for conflict extraction.
    pub their_ref: String,
}

/// One commit visited during a history walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSnapshot {
    pub id: String,
    pub summary: String,
    /// Every blob path in the commit's tree (`/`-separated).
    pub files: Vec<String>,
}

/// Operations the engine needs from version control.
///
/// Callers serialize access to one working tree; implementations are not
/// expected to lock.
pub trait VersionControl {
    fn status(&self) -> Result<WorkTreeStatus, VcsError>;

    /// Commit everything in the working tree. `amend` rewrites HEAD.
    fn commit(&self, message: &str, amend: bool) -> Result<String, VcsError>;

    fn merge(&self, target_ref: &str) -> Result<MergeOutcome, VcsError>;

    /// Content of `path` at `reference`, or `None` if it does not exist there.
    fn resolve_file_at_ref(&self, path: &str, reference: &str) -> Result<Option<Vec<u8>>, VcsError>;

    /// Resolve every path in `paths` to `stage` in one operation.
    fn checkout_stage(&self, stage: Stage, paths: &BTreeSet<String>) -> Result<(), VcsError>;

    fn reset_hard(&self, reference: &str) -> Result<(), VcsError>;

    /// Visit commits newest-first starting at `from_ref` until the visitor
    /// breaks or history ends.
    fn walk_history(
        &self,
        from_ref: &str,
        visitor: &mut dyn FnMut(&CommitSnapshot) -> ControlFlow<()>,
    ) -> Result<(), VcsError>;
}
