//! Graph decomposer: writes a model as one file per object.
//!
//! The export works on a deep copy whose references are unbound to plain
//! IDs, so nothing done for serialization is visible on the caller's graph.
//! File writes fan out over a bounded pool of tokio tasks; the first failed
//! write cancels the rest and is returned to the caller.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::codec::xml::{to_xml, FolderDoc, ModelDoc, ObjectDoc};
use crate::codec::{self, FOLDER_DESCRIPTOR, IMAGES_DIR, MODEL_DIR};
use crate::errors::GraphError;
use crate::model::{assets, Container, FolderHandle, Model, ObjectHandle};

/// Knobs for [`export_model`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Maximum number of concurrent file writes.
    pub workers: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// What an export wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub folders: usize,
    pub objects: usize,
    pub assets: usize,
}

/// One independent file write.
#[derive(Debug, Clone)]
enum WriteJob {
    ModelDescriptor,
    Folder(FolderHandle),
    Object(ObjectHandle),
    Asset(String),
}

impl WriteJob {
    /// Relative path and encoded bytes for this job.
    fn encode(&self, model: &Model) -> Result<(PathBuf, Vec<u8>), GraphError> {
        let (path, text) = match self {
            Self::ModelDescriptor => {
                let path = Path::new(MODEL_DIR).join(FOLDER_DESCRIPTOR);
                let text = to_xml(&ModelDoc::from_model(model));
                (path, text)
            }
            Self::Folder(handle) => {
                let path = codec::folder_dir(model, *handle).join(FOLDER_DESCRIPTOR);
                let text = to_xml(&FolderDoc::from_folder(model.folder(*handle)));
                (path, text)
            }
            Self::Object(handle) => {
                let path = codec::object_path(model, *handle);
                let text = to_xml(&ObjectDoc::from_object(model, *handle));
                (path, text)
            }
            Self::Asset(key) => {
                let bytes = model
                    .assets
                    .get(key)
                    .ok_or_else(|| GraphError::InvalidAssetKey(key.clone()))?;
                return Ok((PathBuf::from(key), bytes.to_vec()));
            }
        };
        let text = text.map_err(|e| GraphError::xml(&path, e))?;
        Ok((path, text.into_bytes()))
    }
}

/// Write `model` under `dest/model` and `dest/images`.
///
/// Both subtrees are deleted and recreated, so files of deleted objects never
/// survive. The call either writes the complete tree or returns the first
/// error encountered.
#[instrument(skip(model, dest, options), fields(dest = %dest.display(), workers = options.workers))]
pub async fn export_model(
    model: &Model,
    dest: &Path,
    options: &ExportOptions,
) -> Result<ExportSummary, GraphError> {
    info!(objects = model.object_count(), "exporting model");

    clear_dir(&dest.join(MODEL_DIR)).await?;
    clear_dir(&dest.join(IMAGES_DIR)).await?;

    let mut snapshot = model.clone();
    snapshot.unbind_references();
    let snapshot = Arc::new(snapshot);

    let asset_keys = referenced_assets(&snapshot)?;
    create_directories(&snapshot, dest, &asset_keys).await?;

    let mut jobs = vec![WriteJob::ModelDescriptor];
    jobs.extend(snapshot.folders().map(|(handle, _)| WriteJob::Folder(handle)));
    let mut objects = 0;
    for (handle, object) in snapshot.objects() {
        if matches!(object.container(), Container::Folder(_)) {
            jobs.push(WriteJob::Object(handle));
        }
        objects += 1;
    }
    jobs.extend(asset_keys.iter().cloned().map(WriteJob::Asset));

    debug!(jobs = jobs.len(), "dispatching export writes");
    run_jobs(Arc::clone(&snapshot), dest, jobs, options.workers).await?;

    let summary = ExportSummary {
        folders: snapshot.folder_count(),
        objects,
        assets: asset_keys.len(),
    };
    info!(?summary, "export complete");
    Ok(summary)
}

/// Asset keys used by any object, deduplicated. Keys missing from the store
/// are skipped with a warning.
fn referenced_assets(model: &Model) -> Result<BTreeSet<String>, GraphError> {
    let mut keys = BTreeSet::new();
    for (_, object) in model.objects() {
        let Some(key) = object.asset.as_deref() else {
            continue;
        };
        assets::validate_key(key)?;
        if model.assets.contains(key) {
            keys.insert(key.to_string());
        } else {
            warn!(object = %object.id(), asset = key, "asset missing from store, not exported");
        }
    }
    Ok(keys)
}

async fn clear_dir(dir: &Path) -> Result<(), GraphError> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(dir = %dir.display(), "removed previous export");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GraphError::io(dir, e)),
    }
}

async fn create_directories(
    model: &Model,
    dest: &Path,
    asset_keys: &BTreeSet<String>,
) -> Result<(), GraphError> {
    let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
    dirs.insert(dest.join(MODEL_DIR));
    for (handle, _) in model.folders() {
        dirs.insert(dest.join(codec::folder_dir(model, handle)));
    }
    for key in asset_keys {
        if let Some(parent) = dest.join(key).parent() {
            dirs.insert(parent.to_path_buf());
        }
    }
    for dir in dirs {
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| GraphError::io(&dir, e))?;
    }
    Ok(())
}

/// Fan out `jobs` with at most `workers` in flight and join them all.
async fn run_jobs(
    snapshot: Arc<Model>,
    dest: &Path,
    jobs: Vec<WriteJob>,
    workers: usize,
) -> Result<(), GraphError> {
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let cancelled = Arc::new(AtomicBool::new(false));
    let mut set = JoinSet::new();

    for job in jobs {
        let permits = Arc::clone(&permits);
        let cancelled = Arc::clone(&cancelled);
        let snapshot = Arc::clone(&snapshot);
        let dest = dest.to_path_buf();
        set.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| GraphError::WorkerFailed(e.to_string()))?;
            if cancelled.load(Ordering::SeqCst) {
                return Ok(());
            }
            let (relative, bytes) = job.encode(&snapshot)?;
            let path = dest.join(&relative);
            fs::write(&path, bytes)
                .await
                .map_err(|e| GraphError::io(&path, e))
        });
    }

    let mut first_error: Option<GraphError> = None;
    while let Some(joined) = set.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => continue,
            Err(e) => Err(GraphError::WorkerFailed(e.to_string())),
        };
        if let Err(err) = outcome {
            if first_error.is_none() {
                warn!(error = %err, "export write failed, cancelling remaining writes");
                cancelled.store(true, Ordering::SeqCst);
                set.abort_all();
                first_error = Some(err);
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FolderKind, ObjectId};

    fn id(value: &str) -> ObjectId {
        ObjectId::new(value).unwrap()
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn test_business_element_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = Model::new(id("m1"), "Layout");
        let business = model.ensure_well_known_folder(FolderKind::Business).unwrap();
        model
            .add_object(Container::Folder(business), id("e1"), "Element", "Customer")
            .unwrap();

        let summary = export_model(&model, dir.path(), &ExportOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.objects, 1);
        assert_eq!(summary.folders, 1);
        assert!(dir.path().join("model/folder.xml").is_file());
        assert!(dir.path().join("model/Business/folder.xml").is_file());
        let element = read(&dir.path().join("model/Business/Element_e1.xml"));
        assert!(element.contains(r#"id="e1""#));
        assert!(element.contains(r#"name="Customer""#));
    }

    #[tokio::test]
    async fn test_references_written_as_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = Model::new(id("m1"), "Refs");
        let business = model.ensure_well_known_folder(FolderKind::Business).unwrap();
        let relations = model.ensure_well_known_folder(FolderKind::Relations).unwrap();
        let s = model
            .add_object(Container::Folder(business), id("s"), "BusinessActor", "Source")
            .unwrap();
        let t = model
            .add_object(Container::Folder(business), id("t"), "BusinessRole", "Target")
            .unwrap();
        let r = model
            .add_object(Container::Folder(relations), id("r"), "AssignmentRelationship", "")
            .unwrap();
        model.set_reference(r, "source", s).unwrap();
        model.set_reference(r, "target", t).unwrap();

        export_model(&model, dir.path(), &ExportOptions::default())
            .await
            .unwrap();

        let relation = read(&dir.path().join("model/Relations/AssignmentRelationship_r.xml"));
        assert!(relation.contains(r#"href="s""#));
        assert!(relation.contains(r#"href="t""#));
        assert!(!relation.contains("Source"));
        // The caller's graph is untouched.
        assert!(model.object(r).reference("source").unwrap().is_resolved());
        assert_eq!(model.object(s).referenced_by().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("model/Business/Element_gone.xml");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "old").unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/old.png"), "old").unwrap();
        std::fs::write(dir.path().join("README.md"), "keep").unwrap();

        let model = Model::new(id("m1"), "Empty");
        export_model(&model, dir.path(), &ExportOptions::default())
            .await
            .unwrap();

        assert!(!stale.exists());
        assert!(!dir.path().join("images/old.png").exists());
        assert!(dir.path().join("README.md").exists());
        assert!(dir.path().join("model/folder.xml").exists());
    }

    #[tokio::test]
    async fn test_assets_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = Model::new(id("m1"), "Images");
        let views = model.ensure_well_known_folder(FolderKind::Diagrams).unwrap();
        let key = model.assets.insert_image(b"\x89PNG fake".to_vec(), "png");
        for n in ["a", "b"] {
            let h = model
                .add_object(Container::Folder(views), id(n), "Image", n)
                .unwrap();
            model.object_mut(h).asset = Some(key.clone());
        }
        let orphan = model
            .add_object(Container::Folder(views), id("c"), "Image", "c")
            .unwrap();
        model.object_mut(orphan).asset = Some("images/missing.png".into());

        let summary = export_model(&model, dir.path(), &ExportOptions { workers: 2 })
            .await
            .unwrap();

        assert_eq!(summary.assets, 1);
        assert_eq!(
            std::fs::read(dir.path().join(&key)).unwrap(),
            b"\x89PNG fake".to_vec()
        );
        assert!(!dir.path().join("images/missing.png").exists());
    }

    #[tokio::test]
    async fn test_first_write_error_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = Model::new(id("m1"), "Clash");
        let business = model.ensure_well_known_folder(FolderKind::Business).unwrap();
        // A user folder whose directory name collides with an object file.
        model
            .add_folder(Some(business), id("Element_e1.xml"), FolderKind::User, "Clash")
            .unwrap();
        model
            .add_object(Container::Folder(business), id("e1"), "Element", "")
            .unwrap();
        for n in 0..20 {
            model
                .add_object(Container::Folder(business), id(&format!("x{n}")), "Element", "")
                .unwrap();
        }

        let err = export_model(&model, dir.path(), &ExportOptions { workers: 3 })
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Io { .. }), "got {err:?}");
    }
}
