//! Historical object recovery.
//!
//! When an import leaves references dangling, the missing objects are looked
//! up in version-control history. Commits are visited newest first and each
//! commit's whole tree is scanned for a file named `<Type>_<ID>.xml`; the
//! directory is not trusted because folders may have been renamed or moved
//! since. The nearest commit that still has the file wins, and the file is
//! restored at the path it had in that commit.
//!
//! Nested children (diagram nodes and the like) have no file of their own.
//! They are found inside the file of their top-level owner, and come back
//! with it, but only when that owner is itself gone from the working tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::codec::xml::{from_xml_bytes, ObjectDoc, ObjectHeader};
use crate::codec::{
    file_name_of, is_model_path, parse_object_file_name, repo_path_to_local, FOLDER_DESCRIPTOR,
    MODEL_DIR,
};
use crate::errors::{GraphError, RecoveryError, VcsError};
use crate::import::{import_model, ImportedModel};
use crate::model::{ObjectId, UnresolvedReference};
use crate::vcs::VersionControl;

/// Bounds on the history walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOptions {
    /// Recover/re-import rounds in [`recover_and_reimport`].
    pub max_rounds: usize,
    /// Commits visited per walk; 0 means the whole history.
    pub max_commits: usize,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            max_commits: 0,
        }
    }
}

/// An object file brought back from history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredObject {
    pub id: ObjectId,
    pub type_tag: String,
    pub name: String,
    /// Repository path the file was restored to.
    pub path: String,
    /// Commit the content was taken from.
    pub commit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub restored: Vec<RestoredObject>,
    /// References whose target no commit ever contained.
    pub permanently_unresolved: Vec<UnresolvedReference>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.restored.is_empty() && self.permanently_unresolved.is_empty()
    }

    /// One [`RecoveryError::PermanentlyUnresolved`] per lost reference.
    pub fn failures(&self) -> Vec<RecoveryError> {
        self.permanently_unresolved
            .iter()
            .map(|r| RecoveryError::PermanentlyUnresolved {
                target: r.target.to_string(),
                source_id: r.source.to_string(),
            })
            .collect()
    }

    /// Audit message listing what was restored.
    pub fn commit_message(&self) -> String {
        let mut message = format!("Restore {} object(s) from history\n", self.restored.len());
        if !self.restored.is_empty() {
            message.push('\n');
        }
        for object in &self.restored {
            let short: String = object.commit.chars().take(10).collect();
            let _ = writeln!(
                message,
                "- {} '{}' ({}) from {}",
                object.type_tag, object.name, object.id, short
            );
        }
        if !self.permanently_unresolved.is_empty() {
            let missing: BTreeSet<&str> = self
                .permanently_unresolved
                .iter()
                .map(|r| r.target.as_str())
                .collect();
            let _ = write!(
                message,
                "\nStill missing: {}\n",
                missing.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
        message
    }
}

/// A match found during the walk; content is fetched afterwards.
#[derive(Debug)]
struct Found {
    id: ObjectId,
    type_tag: String,
    /// Known up front for nested children, read from the file otherwise.
    name: Option<String>,
    path: String,
    commit: String,
}

/// Restores missing objects from history into the working tree at `root`.
pub struct HistoricalRecovery<'a, V: VersionControl + ?Sized> {
    vcs: &'a V,
    root: &'a Path,
    options: RecoveryOptions,
}

impl<'a, V: VersionControl + ?Sized> HistoricalRecovery<'a, V> {
    pub fn new(vcs: &'a V, root: &'a Path) -> Self {
        Self {
            vcs,
            root,
            options: RecoveryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RecoveryOptions) -> Self {
        self.options = options;
        self
    }

    /// Look up every distinct missing target and restore what history has.
    ///
    /// Nothing is written until the walk completes, so cancelling leaves the
    /// working tree as it was. A failed write removes the files already
    /// restored by this call.
    #[instrument(skip_all, fields(missing = unresolved.len()))]
    pub fn recover(
        &self,
        unresolved: &[UnresolvedReference],
        cancel: &CancelToken,
    ) -> Result<RecoveryReport, RecoveryError> {
        let mut pending: BTreeSet<ObjectId> = unresolved.iter().map(|r| r.target.clone()).collect();
        if pending.is_empty() {
            return Ok(RecoveryReport::default());
        }
        info!(targets = pending.len(), "searching history for missing objects");

        let found = self.walk(&mut pending, cancel)?;

        let mut planned: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        let mut candidates = Vec::new();
        for hit in found {
            let Some(content) = self.vcs.resolve_file_at_ref(&hit.path, &hit.commit)? else {
                warn!(path = %hit.path, commit = %hit.commit, "file listed in commit has no content");
                pending.insert(hit.id);
                continue;
            };
            let name = match hit.name {
                Some(name) => name,
                None => match from_xml_bytes::<ObjectHeader>(&content) {
                    Ok(header) => header.name,
                    Err(e) => {
                        warn!(path = %hit.path, error = %e, "restored file has an unreadable header");
                        String::new()
                    }
                },
            };
            self.plan_descriptors(&hit.path, &hit.commit, &mut planned)?;
            planned.insert(hit.path.clone(), content);
            candidates.push(RestoredObject {
                id: hit.id,
                type_tag: hit.type_tag,
                name,
                path: hit.path,
                commit: hit.commit,
            });
        }

        let written = self.write_all(&planned)?;
        let mut restored = Vec::with_capacity(candidates.len());
        for object in candidates {
            if written.contains(&object.path) {
                restored.push(object);
            } else {
                debug!(id = %object.id, path = %object.path, "not restored, target was occupied");
                pending.insert(object.id);
            }
        }

        let permanently_unresolved: Vec<UnresolvedReference> = unresolved
            .iter()
            .filter(|r| pending.contains(&r.target))
            .cloned()
            .collect();
        for reference in &permanently_unresolved {
            warn!(
                missing = %reference.target,
                source = %reference.source,
                "object could not be restored from history"
            );
        }
        info!(
            restored = restored.len(),
            unresolved = permanently_unresolved.len(),
            "history recovery finished"
        );
        Ok(RecoveryReport {
            restored,
            permanently_unresolved,
        })
    }

    fn walk(
        &self,
        pending: &mut BTreeSet<ObjectId>,
        cancel: &CancelToken,
    ) -> Result<Vec<Found>, RecoveryError> {
        let present = local_object_ids(self.root)?;
        let mut found = Vec::new();
        let mut examined: BTreeSet<String> = BTreeSet::new();
        let mut failure: Option<VcsError> = None;
        let mut visited = 0usize;
        let mut cancelled = false;
        let max_commits = self.options.max_commits;

        self.vcs.walk_history("HEAD", &mut |commit| {
            if cancel.is_cancelled() {
                cancelled = true;
                return ControlFlow::Break(());
            }
            if max_commits > 0 && visited >= max_commits {
                debug!(max_commits, "commit limit reached");
                return ControlFlow::Break(());
            }
            visited += 1;

            for path in &commit.files {
                if !is_model_path(path) {
                    continue;
                }
                let Some((type_tag, id)) = parse_object_file_name(file_name_of(path)) else {
                    continue;
                };
                if pending.remove(&id) {
                    debug!(%id, %path, commit = %commit.id, "found in history");
                    found.push(Found {
                        id,
                        type_tag,
                        name: None,
                        path: path.clone(),
                        commit: commit.id.clone(),
                    });
                }
            }

            // Owners gone from the working tree may hold missing children.
            // Each path is read once, at the newest commit that has it.
            for path in &commit.files {
                if pending.is_empty() {
                    break;
                }
                if !is_model_path(path) || !examined.insert(path.clone()) {
                    continue;
                }
                let Some((_, owner)) = parse_object_file_name(file_name_of(path)) else {
                    continue;
                };
                if present.contains(&owner) || repo_path_to_local(self.root, path).exists() {
                    continue;
                }
                let content = match self.vcs.resolve_file_at_ref(path, &commit.id) {
                    Ok(Some(content)) => content,
                    Ok(None) => continue,
                    Err(e) => {
                        failure = Some(e);
                        return ControlFlow::Break(());
                    }
                };
                let doc = match from_xml_bytes::<ObjectDoc>(&content) {
                    Ok(doc) => doc,
                    Err(e) => {
                        debug!(%path, error = %e, "skipping unreadable file in history");
                        continue;
                    }
                };
                for child in nested_children(&doc) {
                    let Ok(id) = ObjectId::new(child.id.as_str()) else {
                        continue;
                    };
                    if pending.remove(&id) {
                        debug!(%id, %path, commit = %commit.id, "found nested in history");
                        found.push(Found {
                            id,
                            type_tag: child.type_tag.clone(),
                            name: Some(child.name.clone()),
                            path: path.clone(),
                            commit: commit.id.clone(),
                        });
                    }
                }
            }

            if pending.is_empty() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;

        if let Some(e) = failure {
            return Err(e.into());
        }
        if cancelled {
            info!(visited, "history recovery cancelled");
            return Err(RecoveryError::Cancelled);
        }
        debug!(visited, found = found.len(), "history walk finished");
        Ok(found)
    }

    /// Queue descriptors of ancestor folders that are missing locally.
    fn plan_descriptors(
        &self,
        path: &str,
        commit: &str,
        planned: &mut BTreeMap<String, Vec<u8>>,
    ) -> Result<(), RecoveryError> {
        let mut dir = path;
        while let Some((parent, _)) = dir.rsplit_once('/') {
            let descriptor = format!("{parent}/{FOLDER_DESCRIPTOR}");
            if !planned.contains_key(&descriptor)
                && !repo_path_to_local(self.root, &descriptor).exists()
            {
                if let Some(content) = self.vcs.resolve_file_at_ref(&descriptor, commit)? {
                    debug!(%descriptor, "restoring folder descriptor");
                    planned.insert(descriptor, content);
                }
            }
            if parent == MODEL_DIR {
                break;
            }
            dir = parent;
        }
        Ok(())
    }

    /// Write every planned file and return the repository paths written.
    fn write_all(&self, planned: &BTreeMap<String, Vec<u8>>) -> Result<BTreeSet<String>, RecoveryError> {
        let mut done = BTreeSet::new();
        let mut written: Vec<PathBuf> = Vec::new();
        let mut created_dirs: Vec<PathBuf> = Vec::new();

        for (repo_path, content) in planned {
            let local = repo_path_to_local(self.root, repo_path);
            if local.exists() {
                warn!(path = %repo_path, "restore target already exists, leaving it alone");
                continue;
            }
            if let Err(source) = write_restored(&local, content, &mut created_dirs) {
                rollback(&written, &created_dirs);
                return Err(RecoveryError::RestoreFailed {
                    path: repo_path.clone(),
                    source,
                });
            }
            written.push(local);
            done.insert(repo_path.clone());
        }
        Ok(done)
    }
}

/// Every object nested below `doc`, depth first.
fn nested_children(doc: &ObjectDoc) -> Vec<&ObjectDoc> {
    let mut out = Vec::new();
    let mut stack: Vec<&ObjectDoc> = doc.children.iter().rev().collect();
    while let Some(child) = stack.pop() {
        out.push(child);
        stack.extend(child.children.iter().rev());
    }
    out
}

/// IDs of the object files currently under `root/model`.
fn local_object_ids(root: &Path) -> Result<BTreeSet<ObjectId>, RecoveryError> {
    let mut ids = BTreeSet::new();
    let mut dirs = vec![root.join(MODEL_DIR)];
    while let Some(dir) = dirs.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(GraphError::io(&dir, e).into()),
        };
        for entry in entries {
            let entry = entry.map_err(|e| GraphError::io(&dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            } else if let Some((_, id)) = entry
                .file_name()
                .to_str()
                .and_then(parse_object_file_name)
            {
                ids.insert(id);
            }
        }
    }
    Ok(ids)
}

fn write_restored(local: &Path, content: &[u8], created_dirs: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if let Some(parent) = local.parent() {
        let first_missing = parent
            .ancestors()
            .take_while(|dir| !dir.exists())
            .last()
            .map(Path::to_path_buf);
        std::fs::create_dir_all(parent)?;
        if let Some(dir) = first_missing {
            created_dirs.push(dir);
        }
    }
    std::fs::write(local, content)
}

fn rollback(written: &[PathBuf], created_dirs: &[PathBuf]) {
    for path in written {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not remove restored file");
        }
    }
    for dir in created_dirs.iter().rev() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            warn!(path = %dir.display(), error = %e, "could not remove restored directory");
        }
    }
}

/// The outcome of [`recover_and_reimport`].
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub imported: ImportedModel,
    pub report: RecoveryReport,
}

/// Restore missing objects, re-import from scratch, and repeat while the
/// restored objects point at further missing ones.
///
/// Stops when a round restores nothing, nothing is left unresolved, or
/// `options.max_rounds` is reached. Whatever is still dangling at the end is
/// reported in `report.permanently_unresolved`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn recover_and_reimport<V: VersionControl + ?Sized>(
    vcs: &V,
    root: &Path,
    unresolved: Vec<UnresolvedReference>,
    options: RecoveryOptions,
    cancel: &CancelToken,
) -> Result<RecoveryOutcome, RecoveryError> {
    let recovery = HistoricalRecovery::new(vcs, root).with_options(options);
    let mut report = RecoveryReport::default();
    let mut pending = unresolved;
    let mut latest: Option<ImportedModel> = None;

    for round in 1..=options.max_rounds.max(1) {
        if pending.is_empty() {
            break;
        }
        let step = recovery.recover(&pending, cancel)?;
        debug!(round, restored = step.restored.len(), "recovery round");
        let restored_any = !step.restored.is_empty();
        report.restored.extend(step.restored);
        if !restored_any {
            break;
        }
        let next = reimport(root)?;
        pending = next.unresolved.clone();
        latest = Some(next);
    }

    let imported = match latest {
        Some(imported) => imported,
        None => reimport(root)?,
    };
    report.permanently_unresolved = imported.unresolved.clone();
    Ok(RecoveryOutcome { imported, report })
}

fn reimport(root: &Path) -> Result<ImportedModel, RecoveryError> {
    let descriptor = root.join(MODEL_DIR).join(FOLDER_DESCRIPTOR);
    import_model(root)?.ok_or_else(|| {
        RecoveryError::Graph(GraphError::io(
            descriptor,
            std::io::Error::new(std::io::ErrorKind::NotFound, "model descriptor is missing"),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::xml::{to_xml, ObjectDoc};
    use crate::vcs::fake::FakeVcs;
    use crate::vcs::CommitSnapshot;

    fn object_xml(type_tag: &str, id: &str, name: &str) -> String {
        to_xml(&ObjectDoc {
            type_tag: type_tag.into(),
            id: id.into(),
            name: name.into(),
            asset: None,
            properties: Vec::new(),
            references: Vec::new(),
            children: Vec::new(),
        })
        .unwrap()
    }

    fn dangling(target: &str) -> UnresolvedReference {
        UnresolvedReference {
            source: ObjectId::new("r1").unwrap(),
            container: ObjectId::new("relations").unwrap(),
            field: "target".into(),
            target: ObjectId::new(target).unwrap(),
        }
    }

    fn commit(id: &str, files: &[&str]) -> CommitSnapshot {
        CommitSnapshot {
            id: id.into(),
            summary: format!("commit {id}"),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn seed_root(dir: &Path) {
        std::fs::create_dir_all(dir.join("model/Business")).unwrap();
        std::fs::write(dir.join("model/folder.xml"), "<model/>").unwrap();
        std::fs::write(dir.join("model/Business/folder.xml"), "<folder/>").unwrap();
    }

    #[test]
    fn test_nearest_commit_wins() {
        let dir = tempfile::tempdir().unwrap();
        seed_root(dir.path());
        let mut vcs = FakeVcs::default();
        vcs.history = vec![
            commit("c3", &["model/folder.xml"]),
            commit("c2", &["model/Business/Element_e2.xml"]),
            commit("c1", &["model/Business/Element_e2.xml"]),
        ];
        vcs.put("c2", "model/Business/Element_e2.xml", &object_xml("Element", "e2", "newer"));
        vcs.put("c1", "model/Business/Element_e2.xml", &object_xml("Element", "e2", "older"));

        let report = HistoricalRecovery::new(&vcs, dir.path())
            .recover(&[dangling("e2")], &CancelToken::new())
            .unwrap();
        assert_eq!(report.restored.len(), 1);
        assert_eq!(report.restored[0].commit, "c2");
        assert_eq!(report.restored[0].name, "newer");
        assert!(report.permanently_unresolved.is_empty());
        let text =
            std::fs::read_to_string(dir.path().join("model/Business/Element_e2.xml")).unwrap();
        assert!(text.contains("newer"));
    }

    #[test]
    fn test_moved_file_restores_old_folder_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        seed_root(dir.path());
        let mut vcs = FakeVcs::default();
        vcs.history = vec![commit(
            "c1",
            &["model/Business/f9/folder.xml", "model/Business/f9/Node_n1.xml"],
        )];
        vcs.put("c1", "model/Business/f9/Node_n1.xml", &object_xml("Node", "n1", "db"));
        vcs.put("c1", "model/Business/f9/folder.xml", "<folder id=\"f9\"/>");
        vcs.put("c1", "model/Business/folder.xml", "<folder id=\"old\"/>");

        let report = HistoricalRecovery::new(&vcs, dir.path())
            .recover(&[dangling("n1")], &CancelToken::new())
            .unwrap();
        assert_eq!(report.restored[0].path, "model/Business/f9/Node_n1.xml");
        assert!(dir.path().join("model/Business/f9/folder.xml").is_file());
        // Existing descriptors are left alone.
        assert_eq!(
            std::fs::read_to_string(dir.path().join("model/Business/folder.xml")).unwrap(),
            "<folder/>"
        );
    }

    #[test]
    fn test_missing_everywhere_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        seed_root(dir.path());
        let mut vcs = FakeVcs::default();
        vcs.history = vec![commit("c1", &["model/folder.xml", "images/e9.png"])];

        let report = HistoricalRecovery::new(&vcs, dir.path())
            .recover(&[dangling("e9"), dangling("e9")], &CancelToken::new())
            .unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(report.permanently_unresolved.len(), 2);
        assert!(matches!(
            &report.failures()[0],
            RecoveryError::PermanentlyUnresolved { target, source_id } if target == "e9" && source_id == "r1"
        ));
        assert!(report.commit_message().contains("Still missing: e9"));
    }

    #[test]
    fn test_cancel_leaves_tree_untouched() {
        let dir = tempfile::tempdir().unwrap();
        seed_root(dir.path());
        let mut vcs = FakeVcs::default();
        vcs.history = vec![commit("c1", &["model/Business/Element_e2.xml"])];
        vcs.put("c1", "model/Business/Element_e2.xml", &object_xml("Element", "e2", ""));

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = HistoricalRecovery::new(&vcs, dir.path()).recover(&[dangling("e2")], &cancel);
        assert!(matches!(result, Err(RecoveryError::Cancelled)));
        assert!(!dir.path().join("model/Business/Element_e2.xml").exists());
    }

    #[test]
    fn test_commit_limit_bounds_walk() {
        let dir = tempfile::tempdir().unwrap();
        seed_root(dir.path());
        let mut vcs = FakeVcs::default();
        vcs.history = vec![
            commit("c3", &[]),
            commit("c2", &[]),
            commit("c1", &["model/Business/Element_e2.xml"]),
        ];
        vcs.put("c1", "model/Business/Element_e2.xml", &object_xml("Element", "e2", ""));

        let options = RecoveryOptions {
            max_rounds: 1,
            max_commits: 2,
        };
        let report = HistoricalRecovery::new(&vcs, dir.path())
            .with_options(options)
            .recover(&[dangling("e2")], &CancelToken::new())
            .unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(report.permanently_unresolved.len(), 1);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        seed_root(dir.path());
        // A plain file where a restored folder must go.
        std::fs::write(dir.path().join("model/Old"), "blocker").unwrap();
        let mut vcs = FakeVcs::default();
        vcs.history = vec![commit(
            "c1",
            &["model/Business/Element_e2.xml", "model/Old/Element_e3.xml"],
        )];
        vcs.put("c1", "model/Business/Element_e2.xml", &object_xml("Element", "e2", ""));
        vcs.put("c1", "model/Old/Element_e3.xml", &object_xml("Element", "e3", ""));

        let result = HistoricalRecovery::new(&vcs, dir.path())
            .recover(&[dangling("e2"), dangling("e3")], &CancelToken::new());
        assert!(matches!(
            result,
            Err(RecoveryError::RestoreFailed { ref path, .. }) if path == "model/Old/Element_e3.xml"
        ));
        assert!(!dir.path().join("model/Business/Element_e2.xml").exists());
    }

    #[test]
    fn test_occupied_target_is_not_reported_as_restored() {
        let dir = tempfile::tempdir().unwrap();
        seed_root(dir.path());
        std::fs::write(dir.path().join("model/Business/Element_e2.xml"), "local edit").unwrap();
        let mut vcs = FakeVcs::default();
        vcs.history = vec![commit(
            "c1",
            &["model/Business/Element_e2.xml", "model/Business/Element_e3.xml"],
        )];
        vcs.put("c1", "model/Business/Element_e2.xml", &object_xml("Element", "e2", "old"));
        vcs.put("c1", "model/Business/Element_e3.xml", &object_xml("Element", "e3", "back"));

        let report = HistoricalRecovery::new(&vcs, dir.path())
            .recover(&[dangling("e2"), dangling("e3")], &CancelToken::new())
            .unwrap();
        assert_eq!(report.restored.len(), 1);
        assert_eq!(report.restored[0].id.as_str(), "e3");
        assert_eq!(report.permanently_unresolved.len(), 1);
        assert_eq!(report.permanently_unresolved[0].target.as_str(), "e2");
        assert!(!report.commit_message().contains("(e2) from"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("model/Business/Element_e2.xml")).unwrap(),
            "local edit"
        );
    }

    fn diagram_xml() -> String {
        let node = |id: &str, name: &str, children: Vec<ObjectDoc>| ObjectDoc {
            type_tag: "DiagramObject".into(),
            id: id.into(),
            name: name.into(),
            asset: None,
            properties: Vec::new(),
            references: Vec::new(),
            children,
        };
        to_xml(&ObjectDoc {
            type_tag: "DiagramModel".into(),
            id: "d1".into(),
            name: "Overview".into(),
            asset: None,
            properties: Vec::new(),
            references: Vec::new(),
            children: vec![node("n1", "outer", vec![node("n2", "inner", Vec::new())])],
        })
        .unwrap()
    }

    #[test]
    fn test_nested_child_comes_back_with_its_owner() {
        let dir = tempfile::tempdir().unwrap();
        seed_root(dir.path());
        let mut vcs = FakeVcs::default();
        vcs.history = vec![
            commit("c2", &["model/folder.xml"]),
            commit("c1", &["model/folder.xml", "model/Views/DiagramModel_d1.xml"]),
        ];
        vcs.put("c1", "model/Views/DiagramModel_d1.xml", &diagram_xml());

        let report = HistoricalRecovery::new(&vcs, dir.path())
            .recover(&[dangling("n2")], &CancelToken::new())
            .unwrap();
        assert_eq!(report.restored.len(), 1);
        let restored = &report.restored[0];
        assert_eq!(restored.id.as_str(), "n2");
        assert_eq!(restored.type_tag, "DiagramObject");
        assert_eq!(restored.name, "inner");
        assert_eq!(restored.path, "model/Views/DiagramModel_d1.xml");
        assert_eq!(restored.commit, "c1");
        assert!(dir.path().join("model/Views/DiagramModel_d1.xml").is_file());
    }

    #[test]
    fn test_nested_child_of_present_owner_stays_missing() {
        let dir = tempfile::tempdir().unwrap();
        seed_root(dir.path());
        // The owner was moved, its old path is free but its ID is taken.
        std::fs::write(
            dir.path().join("model/Business/DiagramModel_d1.xml"),
            "<object type=\"DiagramModel\" id=\"d1\"/>",
        )
        .unwrap();
        let mut vcs = FakeVcs::default();
        vcs.history = vec![commit("c1", &["model/Views/DiagramModel_d1.xml"])];
        vcs.put("c1", "model/Views/DiagramModel_d1.xml", &diagram_xml());

        let report = HistoricalRecovery::new(&vcs, dir.path())
            .recover(&[dangling("n1")], &CancelToken::new())
            .unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(report.permanently_unresolved[0].target.as_str(), "n1");
        assert!(!dir.path().join("model/Views").exists());
    }

    #[test]
    fn test_commit_message_lists_restored_objects() {
        let report = RecoveryReport {
            restored: vec![RestoredObject {
                id: ObjectId::new("e2").unwrap(),
                type_tag: "BusinessActor".into(),
                name: "Clerk".into(),
                path: "model/Business/BusinessActor_e2.xml".into(),
                commit: "0123456789abcdef".into(),
            }],
            permanently_unresolved: Vec::new(),
        };
        assert_eq!(
            report.commit_message(),
            "Restore 1 object(s) from history\n\n- BusinessActor 'Clerk' (e2) from 0123456789\n"
        );
    }
}
