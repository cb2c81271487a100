//! Error types for the modelrepo core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Graph errors (export / import)
// ---------------------------------------------------------------------------

/// Errors from building, exporting or importing a model graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A read or write on the working tree failed.
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A descriptor or object file could not be encoded or decoded.
    #[error("XML error in '{}': {source}", path.display())]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::DeError,
    },

    /// Two folders or objects share the same ID.
    #[error("duplicate object id '{0}'")]
    DuplicateId(String),

    /// An ID or type tag cannot be used on disk.
    #[error("invalid {kind} '{value}'")]
    InvalidName { kind: &'static str, value: String },

    /// A file's contents disagree with its file name.
    #[error("object file '{}' is inconsistent: {detail}", path.display())]
    InvalidObjectFile { path: PathBuf, detail: String },

    /// A handle or ID does not belong to this model.
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// A structural rule of the containment tree was violated.
    #[error("invalid containment: {0}")]
    InvalidContainment(String),

    /// An asset key falls outside the `images/` namespace.
    #[error("invalid asset key '{0}'")]
    InvalidAssetKey(String),

    /// An export worker panicked or was torn down unexpectedly.
    #[error("export worker failed: {0}")]
    WorkerFailed(String),
}

impl GraphError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn xml(path: impl Into<PathBuf>, source: quick_xml::DeError) -> Self {
        Self::Xml {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Version-control errors
// ---------------------------------------------------------------------------

/// Errors from the version-control collaborator.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// The repository is bare and has no working tree.
    #[error("repository has no working tree")]
    NoWorkingTree,

    /// Amending while a merge is being concluded would drop a parent.
    #[error("refusing to amend: a merge is in progress")]
    InvalidAmend,

    /// A path given for a stage checkout is not in conflict.
    #[error("path is not in conflict: {0}")]
    NotConflicted(String),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Recovery errors
// ---------------------------------------------------------------------------

/// Errors from historical object recovery.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The caller cancelled the history walk.
    #[error("history recovery cancelled")]
    Cancelled,

    /// History was exhausted without finding the object.
    #[error("object '{target}' referenced by '{source_id}' was never found in history")]
    PermanentlyUnresolved { target: String, source_id: String },

    /// Writing a restored file into the working tree failed.
    #[error("failed to restore '{path}': {source}")]
    RestoreFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Underlying version-control error.
    #[error("recovery VCS error: {0}")]
    Vcs(#[from] VcsError),

    /// Re-import after restoring failed.
    #[error("recovery re-import error: {0}")]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from the conflict resolution engine.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The requested conflict path was not found.
    #[error("conflict not found: {0}")]
    NotFound(String),

    /// A conflicting path has content on neither side.
    #[error("conflict on '{0}' has no content on either side")]
    EmptyConflict(String),

    /// The operator or policy aborted the resolution; the tree was reset.
    #[error("conflict resolution cancelled")]
    Cancelled,

    /// Amending right after a conflict resolution would orphan a merge parent.
    #[error("a commit that concludes a conflict resolution cannot be an amend")]
    InvalidAmend,

    /// The resolver was driven out of order.
    #[error("invalid resolution state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Underlying version-control error.
    #[error("conflict VCS error: {0}")]
    Vcs(#[from] VcsError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = GraphError::DuplicateId("e1".into());
        assert_eq!(err.to_string(), "duplicate object id 'e1'");

        let err = VcsError::RepositoryNotFound("/tmp/repo".into());
        assert_eq!(err.to_string(), "git repository not found at '/tmp/repo'");

        let err = RecoveryError::PermanentlyUnresolved {
            target: "e9".into(),
            source_id: "r1".into(),
        };
        assert!(err.to_string().contains("e9"));
        assert!(err.to_string().contains("r1"));

        let err = ConfigError::InvalidValue {
            field: "export.workers".into(),
            detail: "must be > 0".into(),
        };
        assert!(err.to_string().contains("export.workers"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = ConflictError::InvalidAmend.into();
        assert!(matches!(core_err, CoreError::Conflict(_)));

        let core_err: CoreError = VcsError::NoWorkingTree.into();
        assert!(matches!(core_err, CoreError::Vcs(_)));
    }
}
