//! Local Git repository operations via `git2`.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    ErrorCode, IndexAddOption, ObjectType, Oid, Repository, RepositoryState, ResetType, Signature,
    StatusOptions, TreeWalkMode, TreeWalkResult,
};
use tracing::{debug, info, instrument, warn};

use super::{CommitSnapshot, MergeOutcome, MergeStatus, Stage, VersionControl, WorkTreeStatus};
use crate::codec::repo_path_to_local;
use crate::errors::VcsError;

/// Author and committer identity used for every commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSignature {
    pub name: String,
    pub email: String,
}

impl Default for CommitSignature {
    fn default() -> Self {
        Self {
            name: "modelrepo".into(),
            email: "modelrepo@localhost".into(),
        }
    }
}

/// [`VersionControl`] over a `git2::Repository` with a working tree.
pub struct GitClient {
    repo: Repository,
    repo_path: PathBuf,
    signature: CommitSignature,
}

impl GitClient {
    /// Open an existing Git repository at `repo_path`.
    pub fn new<P: AsRef<Path>>(repo_path: P, signature: CommitSignature) -> Result<Self, VcsError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| VcsError::RepositoryNotFound(path.display().to_string()))?;
        if repo.is_bare() {
            return Err(VcsError::NoWorkingTree);
        }
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
            signature,
        })
    }

    /// Create a fresh repository at `repo_path`.
    pub fn init<P: AsRef<Path>>(repo_path: P, signature: CommitSignature) -> Result<Self, VcsError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "initializing git repository");
        let repo = Repository::init(path)?;
        Ok(Self {
            repo,
            repo_path: path.to_path_buf(),
            signature,
        })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Return the SHA of HEAD, or `None` before the first commit.
    pub fn head_sha(&self) -> Result<Option<String>, VcsError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?.id().to_string())),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn workdir(&self) -> Result<&Path, VcsError> {
        self.repo.workdir().ok_or(VcsError::NoWorkingTree)
    }

    fn find_commit(&self, reference: &str) -> Result<git2::Commit<'_>, VcsError> {
        let object = self
            .repo
            .revparse_single(reference)
            .map_err(|_| VcsError::RefNotFound(reference.to_string()))?;
        Ok(object.peel_to_commit()?)
    }

    fn signature(&self) -> Result<Signature<'static>, VcsError> {
        Ok(Signature::now(&self.signature.name, &self.signature.email)?)
    }

    fn merge_heads(&self) -> Result<Vec<Oid>, VcsError> {
        let mut heads = Vec::new();
        if self.repo.state() != RepositoryState::Merge {
            return Ok(heads);
        }
        let merge_head = self.repo.find_reference("MERGE_HEAD")?;
        heads.push(merge_head.peel_to_commit()?.id());
        Ok(heads)
    }

    fn conflicted_paths(&self) -> Result<BTreeSet<String>, VcsError> {
        let index = self.repo.index()?;
        let mut paths = BTreeSet::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref());
            if let Some(entry) = entry {
                paths.insert(String::from_utf8_lossy(&entry.path).into_owned());
            }
        }
        Ok(paths)
    }
}

impl VersionControl for GitClient {
    fn status(&self) -> Result<WorkTreeStatus, VcsError> {
        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(if statuses.is_empty() {
            WorkTreeStatus::Clean
        } else {
            WorkTreeStatus::Dirty
        })
    }

    /// Stage all changes, including deletions, and create a commit. While a
    /// merge is in progress the commit gets the merge heads as extra parents.
    #[instrument(skip(self, message))]
    fn commit(&self, message: &str, amend: bool) -> Result<String, VcsError> {
        let merge_heads = self.merge_heads()?;
        if amend && !merge_heads.is_empty() {
            return Err(VcsError::InvalidAmend);
        }

        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let signature = self.signature()?;

        let parent_commit = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };

        let oid = if amend {
            let head = parent_commit.ok_or_else(|| VcsError::RefNotFound("HEAD".into()))?;
            head.amend(
                Some("HEAD"),
                Some(&signature),
                Some(&signature),
                None,
                Some(message),
                Some(&tree),
            )?
        } else {
            let mut parents: Vec<git2::Commit<'_>> = parent_commit.into_iter().collect();
            for head in &merge_heads {
                parents.push(self.repo.find_commit(*head)?);
            }
            let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
            self.repo
                .commit(Some("HEAD"), &signature, &signature, message, &tree, &parent_refs)?
        };

        if !merge_heads.is_empty() {
            self.repo.cleanup_state()?;
        }
        info!(sha = %oid, amend, "created commit");
        Ok(oid.to_string())
    }

    #[instrument(skip(self))]
    fn merge(&self, target_ref: &str) -> Result<MergeOutcome, VcsError> {
        let target = self.find_commit(target_ref)?;
        let annotated = self.repo.find_annotated_commit(target.id())?;
        let (analysis, _) = self.repo.merge_analysis(&[&annotated])?;
        let outcome = |status, conflicts| MergeOutcome {
            status,
            conflicts,
            their_ref: target_ref.to_string(),
        };

        if analysis.is_up_to_date() {
            debug!("already up to date");
            return Ok(outcome(MergeStatus::UpToDate, BTreeSet::new()));
        }

        if analysis.is_unborn() || analysis.is_fast_forward() {
            let head_name = match self.repo.find_reference("HEAD")?.symbolic_target() {
                Some(name) => name.to_string(),
                None => "HEAD".to_string(),
            };
            let log = format!("modelrepo: fast-forward to {target_ref}");
            self.repo.reference(&head_name, target.id(), true, &log)?;
            self.repo.set_head(&head_name)?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::new().force()))?;
            info!(sha = %target.id(), "fast-forwarded");
            return Ok(outcome(MergeStatus::Ok, BTreeSet::new()));
        }

        self.repo.merge(&[&annotated], None, None)?;
        let conflicts = self.conflicted_paths()?;
        if !conflicts.is_empty() {
            warn!(count = conflicts.len(), "merge left conflicts");
            return Ok(outcome(MergeStatus::Conflicting, conflicts));
        }

        self.commit(&format!("Merge {target_ref}"), false)?;
        Ok(outcome(MergeStatus::Ok, BTreeSet::new()))
    }

    fn resolve_file_at_ref(&self, path: &str, reference: &str) -> Result<Option<Vec<u8>>, VcsError> {
        let commit = self.find_commit(reference)?;
        let tree = commit.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let object = entry.to_object(&self.repo)?;
        Ok(object.as_blob().map(|blob| blob.content().to_vec()))
    }

    /// Resolve every path in `paths` to `stage`. A side that deleted the file
    /// resolves to a deletion.
    #[instrument(skip(self, paths), fields(count = paths.len()))]
    fn checkout_stage(&self, stage: Stage, paths: &BTreeSet<String>) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let workdir = self.workdir()?.to_path_buf();
        let mut index = self.repo.index()?;

        let mut chosen: BTreeMap<String, Option<Oid>> = BTreeMap::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let path = [&conflict.our, &conflict.their, &conflict.ancestor]
                .into_iter()
                .flatten()
                .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
                .next();
            let Some(path) = path else { continue };
            if !paths.contains(&path) {
                continue;
            }
            let side = match stage {
                Stage::Ours => conflict.our,
                Stage::Theirs => conflict.their,
            };
            chosen.insert(path, side.map(|entry| entry.id));
        }

        if let Some(missing) = paths.iter().find(|p| !chosen.contains_key(*p)) {
            return Err(VcsError::NotConflicted(missing.clone()));
        }

        for (path, blob_id) in &chosen {
            let local = repo_path_to_local(&workdir, path);
            match blob_id {
                Some(id) => {
                    let blob = self.repo.find_blob(*id)?;
                    if let Some(parent) = local.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&local, blob.content())?;
                    index.add_path(Path::new(path))?;
                }
                None => {
                    if local.exists() {
                        std::fs::remove_file(&local)?;
                    }
                    index.remove_path(Path::new(path))?;
                }
            }
        }
        index.write()?;
        debug!(%stage, "checked out conflict stage");
        Ok(())
    }

    #[instrument(skip(self))]
    fn reset_hard(&self, reference: &str) -> Result<(), VcsError> {
        let object = self
            .repo
            .revparse_single(reference)
            .map_err(|_| VcsError::RefNotFound(reference.to_string()))?;
        let conflicted = self.conflicted_paths()?;
        self.repo.reset(&object, ResetType::Hard, None)?;
        self.repo.cleanup_state()?;

        // Files a merge brought in only as conflict stages are not tracked
        // at `reference` and survive the reset.
        let workdir = self.workdir()?;
        let tree = object.peel_to_tree()?;
        for path in conflicted {
            if tree.get_path(Path::new(&path)).is_ok() {
                continue;
            }
            let local = repo_path_to_local(workdir, &path);
            if local.is_file() {
                std::fs::remove_file(&local)?;
                debug!(%path, "removed leftover merge file");
            }
        }
        info!("reset working tree");
        Ok(())
    }

    fn walk_history(
        &self,
        from_ref: &str,
        visitor: &mut dyn FnMut(&CommitSnapshot) -> ControlFlow<()>,
    ) -> Result<(), VcsError> {
        if self.repo.is_empty()? {
            debug!("no history to walk");
            return Ok(());
        }
        let start = self.find_commit(from_ref)?;
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(start.id())?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;

        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            let mut files = Vec::new();
            commit.tree()?.walk(TreeWalkMode::PreOrder, |root, entry| {
                if entry.kind() == Some(ObjectType::Blob) {
                    if let Some(name) = entry.name() {
                        files.push(format!("{root}{name}"));
                    }
                }
                TreeWalkResult::Ok
            })?;
            let snapshot = CommitSnapshot {
                id: commit.id().to_string(),
                summary: commit.summary().unwrap_or("").to_string(),
                files,
            };
            if visitor(&snapshot).is_break() {
                break;
            }
        }
        Ok(())
    }
}
