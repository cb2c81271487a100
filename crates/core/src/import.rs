//! Graph recomposer: reads a file-per-object tree back into a [`Model`].
//!
//! Import runs in two passes. The load pass reads every descriptor and
//! object file, registers each ID in an [`IdentityTable`] and rebuilds the
//! containment tree from directory nesting; references are kept as
//! unresolved placeholders. The resolve pass then binds every placeholder
//! whose target is in the table and records the back-link on the target.
//! Targets that are not found are reported, never fatal.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::codec::xml::{from_xml_bytes, properties_to_map, FolderDoc, ModelDoc, ObjectDoc};
use crate::codec::{parse_object_file_name, FOLDER_DESCRIPTOR, IMAGES_DIR, MODEL_DIR};
use crate::errors::GraphError;
use crate::model::assets::IMAGES_PREFIX;
use crate::model::{
    Backlink, Container, CrossRef, Entry, FolderHandle, FolderKind, IdentityTable, Model,
    ObjectHandle, ObjectId, UnresolvedReference,
};

/// A freshly imported model and the references it could not bind.
#[derive(Debug, Clone)]
pub struct ImportedModel {
    pub model: Model,
    pub unresolved: Vec<UnresolvedReference>,
}

impl ImportedModel {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Import the tree under `source`.
///
/// Returns `Ok(None)` when `source/model/folder.xml` does not exist: an
/// uninitialized repository is not an error.
#[instrument(skip(source), fields(source = %source.display()))]
pub fn import_model(source: &Path) -> Result<Option<ImportedModel>, GraphError> {
    let model_dir = source.join(MODEL_DIR);
    let descriptor = model_dir.join(FOLDER_DESCRIPTOR);
    if !descriptor.is_file() {
        info!("no model descriptor found, nothing to import");
        return Ok(None);
    }

    let root: ModelDoc = read_doc(&descriptor)?;
    let model_id = parse_id(&root.id, &descriptor)?;
    let mut model = Model::new(model_id, root.name);
    model.attributes = properties_to_map(root.properties);

    let mut loader = Loader {
        model,
        table: IdentityTable::new(),
    };

    // Load pass: well-known folders in their fixed order.
    for kind in FolderKind::WELL_KNOWN {
        let Some(dir_name) = kind.dir_name() else {
            continue;
        };
        let dir = model_dir.join(dir_name);
        if dir.join(FOLDER_DESCRIPTOR).is_file() {
            loader.load_folder(&dir, None)?;
        }
    }
    for entry in sorted_entries(&model_dir)? {
        if entry.is_dir && FolderKind::from_dir_name(&entry.name).is_none() {
            warn!(dir = %entry.path.display(), "unknown top-level directory skipped");
        } else if !entry.is_dir && entry.name != FOLDER_DESCRIPTOR {
            debug!(file = %entry.path.display(), "file outside any folder skipped");
        }
    }

    let Loader { mut model, table } = loader;
    debug!(ids = table.len(), "load pass complete");

    // Resolve pass.
    let unresolved = resolve_references(&mut model, &table);

    load_assets(&mut model, &source.join(IMAGES_DIR))?;

    info!(
        folders = model.folder_count(),
        objects = model.object_count(),
        assets = model.assets.len(),
        unresolved = unresolved.len(),
        "import complete"
    );
    Ok(Some(ImportedModel { model, unresolved }))
}

// ---------------------------------------------------------------------------
// Load pass
// ---------------------------------------------------------------------------

struct Loader {
    model: Model,
    table: IdentityTable,
}

impl Loader {
    fn load_folder(&mut self, dir: &Path, parent: Option<FolderHandle>) -> Result<(), GraphError> {
        let descriptor = dir.join(FOLDER_DESCRIPTOR);
        let doc: FolderDoc = read_doc(&descriptor)?;
        let kind = FolderKind::parse(&doc.kind).ok_or_else(|| GraphError::InvalidObjectFile {
            path: descriptor.clone(),
            detail: format!("unknown folder kind '{}'", doc.kind),
        })?;
        let id = parse_id(&doc.id, &descriptor)?;

        let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let expected = kind.dir_name().unwrap_or(id.as_str());
        if dir_name != expected {
            warn!(dir = %dir.display(), expected, "folder directory name does not match descriptor");
        }

        let handle = self.model.add_folder(parent, id.clone(), kind, doc.name)?;
        self.model.folder_mut(handle).attributes = properties_to_map(doc.properties);
        self.table.put(id, Entry::Folder(handle))?;

        for entry in sorted_entries(dir)? {
            if entry.is_dir {
                if entry.path.join(FOLDER_DESCRIPTOR).is_file() {
                    self.load_folder(&entry.path, Some(handle))?;
                } else {
                    warn!(dir = %entry.path.display(), "directory without folder descriptor skipped");
                }
                continue;
            }
            if entry.name == FOLDER_DESCRIPTOR {
                continue;
            }
            match parse_object_file_name(&entry.name) {
                Some((type_tag, id)) => self.load_object_file(&entry.path, handle, &type_tag, &id)?,
                None => debug!(file = %entry.path.display(), "not an object file, skipped"),
            }
        }
        Ok(())
    }

    fn load_object_file(
        &mut self,
        path: &Path,
        folder: FolderHandle,
        type_tag: &str,
        id: &ObjectId,
    ) -> Result<(), GraphError> {
        let doc: ObjectDoc = read_doc(path)?;
        if doc.id != id.as_str() || doc.type_tag != type_tag {
            return Err(GraphError::InvalidObjectFile {
                path: path.to_path_buf(),
                detail: format!(
                    "file name says {type_tag} '{id}', content says {} '{}'",
                    doc.type_tag, doc.id
                ),
            });
        }
        self.insert_object(path, Container::Folder(folder), doc)?;
        Ok(())
    }

    fn insert_object(
        &mut self,
        path: &Path,
        container: Container,
        doc: ObjectDoc,
    ) -> Result<ObjectHandle, GraphError> {
        let id = parse_id(&doc.id, path)?;
        let handle = self
            .model
            .add_object(container, id.clone(), &doc.type_tag, doc.name)?;
        {
            let object = self.model.object_mut(handle);
            object.attributes = properties_to_map(doc.properties);
            object.asset = doc.asset;
        }
        for reference in doc.references {
            let target = parse_id(&reference.target, path)?;
            self.model
                .set_unresolved_reference(handle, &reference.name, target)?;
        }
        self.table.put(id, Entry::Object(handle))?;

        for child in doc.children {
            self.insert_object(path, Container::Object(handle), child)?;
        }
        Ok(handle)
    }
}

// ---------------------------------------------------------------------------
// Resolve pass
// ---------------------------------------------------------------------------

/// Bind every placeholder found in `table`; report the rest.
fn resolve_references(model: &mut Model, table: &IdentityTable) -> Vec<UnresolvedReference> {
    let mut backlinks: Vec<(ObjectHandle, Backlink)> = Vec::new();
    let mut missing: Vec<(ObjectHandle, String, ObjectId)> = Vec::new();

    for (index, object) in model.objects.iter_mut().enumerate() {
        let source = ObjectHandle(index);
        for (field, reference) in object.references.iter_mut() {
            let target = reference.target_id().clone();
            match table.get(&target) {
                Some(Entry::Object(handle)) => {
                    *reference = CrossRef::Resolved { target, handle };
                    backlinks.push((
                        handle,
                        Backlink {
                            source,
                            field: field.clone(),
                        },
                    ));
                }
                Some(Entry::Folder(_)) => {
                    warn!(source = %object.id, field = %field, target = %target, "reference points at a folder");
                    missing.push((source, field.clone(), target));
                }
                None => missing.push((source, field.clone(), target)),
            }
        }
    }

    for (target, link) in backlinks {
        model.objects[target.0].referenced_by.insert(link);
    }

    missing
        .into_iter()
        .map(|(source, field, target)| {
            let object = model.object(source);
            debug!(source = %object.id(), field = %field, target = %target, "unresolved reference");
            UnresolvedReference {
                source: object.id().clone(),
                container: model.container_id(object.container()).clone(),
                field,
                target,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

fn load_assets(model: &mut Model, images_dir: &Path) -> Result<(), GraphError> {
    if !images_dir.is_dir() {
        return Ok(());
    }
    let mut stack = vec![(images_dir.to_path_buf(), String::from(IMAGES_PREFIX))];
    while let Some((dir, prefix)) = stack.pop() {
        for entry in sorted_entries(&dir)? {
            let key = format!("{prefix}{}", entry.name);
            if entry.is_dir {
                stack.push((entry.path, format!("{key}/")));
            } else {
                let bytes = fs::read(&entry.path).map_err(|e| GraphError::io(&entry.path, e))?;
                model.assets.insert(key, bytes)?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct DirEntry {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

/// Directory entries sorted by name; names that are not UTF-8 are skipped.
fn sorted_entries(dir: &Path) -> Result<Vec<DirEntry>, GraphError> {
    let reader = fs::read_dir(dir).map_err(|e| GraphError::io(dir, e))?;
    let mut entries = Vec::new();
    for entry in reader {
        let entry = entry.map_err(|e| GraphError::io(dir, e))?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %path.display(), "non UTF-8 file name skipped");
            continue;
        };
        let is_dir = entry
            .file_type()
            .map_err(|e| GraphError::io(&path, e))?
            .is_dir();
        entries.push(DirEntry { name, path, is_dir });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<T, GraphError> {
    let bytes = fs::read(path).map_err(|e| GraphError::io(path, e))?;
    from_xml_bytes(&bytes).map_err(|e| GraphError::xml(path, e))
}

fn parse_id(value: &str, path: &Path) -> Result<ObjectId, GraphError> {
    ObjectId::new(value).map_err(|_| GraphError::InvalidObjectFile {
        path: path.to_path_buf(),
        detail: format!("invalid id '{value}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn model_descriptor(root: &Path) {
        write(root, "model/folder.xml", r#"<model id="m1" name="Test"/>"#);
    }

    fn folder(root: &Path, dir: &str, id: &str, kind: &str, name: &str) {
        write(
            root,
            &format!("{dir}/folder.xml"),
            &format!(r#"<folder id="{id}" kind="{kind}" name="{name}"/>"#),
        );
    }

    fn element(root: &Path, dir: &str, type_tag: &str, id: &str, refs: &[(&str, &str)]) {
        let refs: String = refs
            .iter()
            .map(|(name, href)| format!(r#"<reference name="{name}" href="{href}"/>"#))
            .collect();
        write(
            root,
            &format!("{dir}/{type_tag}_{id}.xml"),
            &format!(r#"<object type="{type_tag}" id="{id}" name="{id} name">{refs}</object>"#),
        );
    }

    #[test]
    fn test_nothing_to_import() {
        let dir = tempfile::tempdir().unwrap();
        assert!(import_model(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_folder_with_one_element() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        model_descriptor(root);
        folder(root, "model/Business", "f-bus", "business", "Business");
        element(root, "model/Business", "Element", "e1", &[]);

        let imported = import_model(root).unwrap().unwrap();
        assert!(imported.is_complete());
        let model = &imported.model;
        let business = model.well_known_folder(FolderKind::Business).unwrap();
        assert_eq!(model.folder(business).name, "Business");
        assert_eq!(model.folder(business).objects().len(), 1);
        let e1 = model.folder(business).objects()[0];
        assert_eq!(model.object(e1).id().as_str(), "e1");
        assert_eq!(model.object(e1).name, "e1 name");
    }

    #[test]
    fn test_forward_and_cyclic_references_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        model_descriptor(root);
        folder(root, "model/Business", "f-bus", "business", "Business");
        // "A" sorts before "B" so A's reference to B is a forward reference.
        element(root, "model/Business", "Element", "a", &[("peer", "b")]);
        element(root, "model/Business", "Element", "b", &[("peer", "a")]);

        let imported = import_model(root).unwrap().unwrap();
        assert!(imported.unresolved.is_empty());
        let model = &imported.model;
        let a = model.find_object("a").unwrap();
        let b = model.find_object("b").unwrap();
        assert_eq!(model.object(a).reference("peer").unwrap().handle(), Some(b));
        assert_eq!(model.object(b).reference("peer").unwrap().handle(), Some(a));
        assert_eq!(model.object(a).referenced_by().len(), 1);
        assert!(model.unresolved_references().is_empty());
    }

    #[test]
    fn test_missing_target_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        model_descriptor(root);
        folder(root, "model/Business", "f-bus", "business", "Business");
        folder(root, "model/Relations", "f-rel", "relations", "Relations");
        element(root, "model/Business", "Element", "s", &[]);
        element(
            root,
            "model/Relations",
            "Relationship",
            "r",
            &[("source", "s"), ("target", "gone")],
        );

        let imported = import_model(root).unwrap().unwrap();
        assert_eq!(imported.unresolved.len(), 1);
        let missing = &imported.unresolved[0];
        assert_eq!(missing.source.as_str(), "r");
        assert_eq!(missing.container.as_str(), "f-rel");
        assert_eq!(missing.field, "target");
        assert_eq!(missing.target.as_str(), "gone");

        let model = &imported.model;
        let r = model.find_object("r").unwrap();
        assert!(model.object(r).reference("source").unwrap().is_resolved());
        let target = model.object(r).reference("target").unwrap();
        assert!(!target.is_resolved());
        assert_eq!(target.target_id().as_str(), "gone");
    }

    #[test]
    fn test_user_folders_nest_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        model_descriptor(root);
        folder(root, "model/Application", "f-app", "application", "Application");
        folder(root, "model/Application/u1", "u1", "user", "Team");
        folder(root, "model/Application/u1/u2", "u2", "user", "Sub");
        element(root, "model/Application/u1/u2", "Component", "c1", &[]);
        write(root, "model/Application/u1/notes.txt", "ignored");
        write(root, "model/Stray/folder.txt", "ignored");

        let imported = import_model(root).unwrap().unwrap();
        let model = &imported.model;
        let u2 = model.find_folder("u2").unwrap();
        let u1 = model.folder(u2).parent().unwrap();
        assert_eq!(model.folder(u1).id().as_str(), "u1");
        assert_eq!(model.folder(u1).name, "Team");
        assert_eq!(model.folder(u2).objects().len(), 1);
        assert_eq!(model.top_folders().len(), 1);
    }

    #[test]
    fn test_top_level_folders_attach_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        model_descriptor(root);
        folder(root, "model/Views", "f-v", "diagrams", "Views");
        folder(root, "model/Strategy", "f-s", "strategy", "Strategy");
        folder(root, "model/Business", "f-b", "business", "Business");

        let imported = import_model(root).unwrap().unwrap();
        let kinds: Vec<FolderKind> = imported
            .model
            .top_folders()
            .iter()
            .map(|h| imported.model.folder(*h).kind())
            .collect();
        assert_eq!(
            kinds,
            vec![FolderKind::Strategy, FolderKind::Business, FolderKind::Diagrams]
        );
    }

    #[test]
    fn test_nested_children_register_ids() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        model_descriptor(root);
        folder(root, "model/Business", "f-b", "business", "Business");
        folder(root, "model/Views", "f-v", "diagrams", "Views");
        element(root, "model/Business", "Element", "e1", &[]);
        write(
            root,
            "model/Views/DiagramModel_v1.xml",
            r#"<object type="DiagramModel" id="v1" name="View">
  <child type="DiagramObject" id="n1" name="">
    <reference name="element" href="e1"/>
  </child>
</object>"#,
        );

        let imported = import_model(root).unwrap().unwrap();
        assert!(imported.is_complete());
        let model = &imported.model;
        let n1 = model.find_object("n1").unwrap();
        let e1 = model.find_object("e1").unwrap();
        assert_eq!(model.object(n1).reference("element").unwrap().handle(), Some(e1));
        assert_eq!(model.file_owner(n1), model.find_object("v1").unwrap());
    }

    #[test]
    fn test_file_name_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        model_descriptor(root);
        folder(root, "model/Business", "f-b", "business", "Business");
        write(
            root,
            "model/Business/Element_e1.xml",
            r#"<object type="Element" id="e2" name=""/>"#,
        );

        let err = import_model(root).unwrap_err();
        assert!(matches!(err, GraphError::InvalidObjectFile { .. }), "got {err:?}");
    }

    #[test]
    fn test_duplicate_ids_across_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        model_descriptor(root);
        folder(root, "model/Business", "f-b", "business", "Business");
        folder(root, "model/Business/u1", "u1", "user", "Team");
        element(root, "model/Business", "Element", "e1", &[]);
        element(root, "model/Business/u1", "Element", "e1", &[]);

        let err = import_model(root).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateId(_)), "got {err:?}");
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        model_descriptor(root);
        folder(root, "model/Business", "f-b", "business", "Business");
        write(root, "model/Business/Element_e1.xml", "<object type=");

        assert!(matches!(
            import_model(root).unwrap_err(),
            GraphError::Xml { .. }
        ));
    }

    #[test]
    fn test_assets_loaded_with_namespaced_keys() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        model_descriptor(root);
        write(root, "images/logo.png", "png");
        write(root, "images/icons/small.png", "small");

        let imported = import_model(root).unwrap().unwrap();
        assert_eq!(imported.model.assets.get("images/logo.png"), Some(&b"png"[..]));
        assert_eq!(
            imported.model.assets.get("images/icons/small.png"),
            Some(&b"small"[..])
        );
    }
}
