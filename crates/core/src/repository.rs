//! Repository facade: one working tree, one version-control backend, one
//! configuration.

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::cancel::CancelToken;
use crate::config::RepoConfig;
use crate::conflict::ConflictResolver;
use crate::errors::CoreError;
use crate::export::{export_model, ExportSummary};
use crate::import::{import_model, ImportedModel};
use crate::model::{Model, UnresolvedReference};
use crate::recovery::{recover_and_reimport, RecoveryOutcome, RecoveryReport};
use crate::vcs::{GitClient, MergeOutcome, VersionControl, WorkTreeStatus};

/// Entry point for hosts that work with a model stored in version control.
pub struct ModelRepository<V: VersionControl> {
    root: PathBuf,
    vcs: V,
    config: RepoConfig,
}

impl ModelRepository<GitClient> {
    /// Open the git working tree named by `config.repository.path`.
    pub fn open(config: RepoConfig) -> Result<Self, CoreError> {
        let root = config.repository.path.clone();
        let vcs = GitClient::new(&root, config.signature())?;
        Ok(Self::new(root, vcs, config))
    }

    /// Create the working tree and an empty git repository in it.
    pub fn init(config: RepoConfig) -> Result<Self, CoreError> {
        let root = config.repository.path.clone();
        std::fs::create_dir_all(&root).map_err(crate::errors::VcsError::IoError)?;
        let vcs = GitClient::init(&root, config.signature())?;
        Ok(Self::new(root, vcs, config))
    }
}

impl<V: VersionControl> ModelRepository<V> {
    pub fn new(root: impl Into<PathBuf>, vcs: V, config: RepoConfig) -> Self {
        Self {
            root: root.into(),
            vcs,
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Write `model` into the working tree.
    pub async fn export_model(&self, model: &Model) -> Result<ExportSummary, CoreError> {
        Ok(export_model(model, &self.root, &self.config.export_options()).await?)
    }

    /// Read the working tree. `None` when no model has been exported yet.
    pub fn import_model(&self) -> Result<Option<ImportedModel>, CoreError> {
        Ok(import_model(&self.root)?)
    }

    /// Restore the targets of `unresolved` from history and re-import.
    pub fn recover_and_reimport(
        &self,
        unresolved: Vec<UnresolvedReference>,
        cancel: &CancelToken,
    ) -> Result<RecoveryOutcome, CoreError> {
        Ok(recover_and_reimport(
            &self.vcs,
            &self.root,
            unresolved,
            self.config.recovery_options(),
            cancel,
        )?)
    }

    /// Import, and recover from history if references dangle.
    #[instrument(skip_all, fields(root = %self.root.display()))]
    pub fn load_model(&self, cancel: &CancelToken) -> Result<Option<RecoveryOutcome>, CoreError> {
        let Some(imported) = self.import_model()? else {
            return Ok(None);
        };
        if imported.is_complete() {
            return Ok(Some(RecoveryOutcome {
                imported,
                report: RecoveryReport::default(),
            }));
        }
        info!(
            unresolved = imported.unresolved.len(),
            "model has dangling references, searching history"
        );
        self.recover_and_reimport(imported.unresolved, cancel)
            .map(Some)
    }

    pub fn merge(&self, target_ref: &str) -> Result<MergeOutcome, CoreError> {
        Ok(self.vcs.merge(target_ref)?)
    }

    /// Start resolving the conflicts a merge left behind.
    pub fn resolve_conflicts(
        &self,
        outcome: &MergeOutcome,
        cancel: &CancelToken,
    ) -> Result<ConflictResolver<'_, V>, CoreError> {
        Ok(ConflictResolver::from_merge(&self.vcs, outcome, cancel)?)
    }

    pub fn has_changes(&self) -> Result<bool, CoreError> {
        Ok(self.vcs.status()? == WorkTreeStatus::Dirty)
    }

    /// Commit the working tree. Returns `None` when there is nothing to
    /// commit and no amend was asked for.
    pub fn commit_changes(&self, message: &str, amend: bool) -> Result<Option<String>, CoreError> {
        if !amend && !self.has_changes()? {
            info!("working tree clean, nothing to commit");
            return Ok(None);
        }
        Ok(Some(self.vcs.commit(message, amend)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Container, FolderKind, ObjectId};

    fn sample() -> Model {
        let mut model = Model::new(ObjectId::new("m1").unwrap(), "Bank");
        let business = model
            .add_folder(None, ObjectId::new("fb").unwrap(), FolderKind::Business, "Business")
            .unwrap();
        let relations = model
            .add_folder(None, ObjectId::new("fr").unwrap(), FolderKind::Relations, "Relations")
            .unwrap();
        let clerk = model
            .add_object(Container::Folder(business), ObjectId::new("e1").unwrap(), "BusinessActor", "Clerk")
            .unwrap();
        let desk = model
            .add_object(Container::Folder(business), ObjectId::new("e2").unwrap(), "BusinessRole", "Desk")
            .unwrap();
        let rel = model
            .add_object(Container::Folder(relations), ObjectId::new("r1").unwrap(), "Assignment", "")
            .unwrap();
        model.set_reference(rel, "source", clerk).unwrap();
        model.set_reference(rel, "target", desk).unwrap();
        model
    }

    fn open(dir: &Path) -> ModelRepository<GitClient> {
        let mut config = RepoConfig::default();
        config.repository.path = dir.to_path_buf();
        ModelRepository::init(config).unwrap()
    }

    #[tokio::test]
    async fn test_export_commit_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(dir.path());
        assert!(repo.import_model().unwrap().is_none());
        assert_eq!(repo.commit_changes("nothing", false).unwrap(), None);

        repo.export_model(&sample()).await.unwrap();
        assert!(repo.has_changes().unwrap());
        assert!(repo.commit_changes("initial model", false).unwrap().is_some());
        assert!(!repo.has_changes().unwrap());

        // Re-exporting the same model changes nothing on disk.
        repo.export_model(&sample()).await.unwrap();
        assert!(!repo.has_changes().unwrap());
    }

    #[tokio::test]
    async fn test_load_model_recovers_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open(dir.path());
        repo.export_model(&sample()).await.unwrap();
        repo.commit_changes("initial model", false).unwrap();

        let lost = dir.path().join("model/Business/BusinessRole_e2.xml");
        std::fs::remove_file(&lost).unwrap();
        repo.commit_changes("lose e2", false).unwrap();

        let outcome = repo.load_model(&CancelToken::new()).unwrap().unwrap();
        assert!(outcome.imported.is_complete());
        assert_eq!(outcome.report.restored.len(), 1);
        assert_eq!(outcome.report.restored[0].name, "Desk");
        assert!(lost.is_file());

        let model = &outcome.imported.model;
        let r1 = model.find_object("r1").unwrap();
        let e2 = model.find_object("e2").unwrap();
        assert_eq!(model.object(r1).reference("target").unwrap().handle(), Some(e2));
    }
}
