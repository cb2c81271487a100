//! In-memory model graph.
//!
//! A [`Model`] owns every folder and object in two arenas and hands out
//! copyable handles. Cross-references are stored as [`CrossRef`] values that
//! carry the target ID and, once bound, the target's handle, so cyclic graphs
//! need no shared ownership. The inverse side of each bound reference is kept
//! as a [`Backlink`] on the target.

pub mod assets;
pub mod identity;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

pub use assets::AssetStore;
pub use identity::{Entry, IdentityTable, ObjectId};

use crate::errors::GraphError;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Arena index of a folder inside one [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FolderHandle(pub(crate) usize);

/// Arena index of an object inside one [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectHandle(pub(crate) usize);

/// Where an object lives in the containment tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Folder(FolderHandle),
    /// Nested child stored inline in its parent object's file.
    Object(ObjectHandle),
}

// ---------------------------------------------------------------------------
// Folder kinds
// ---------------------------------------------------------------------------

/// Well-known top-level folder kinds plus user-created folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderKind {
    Strategy,
    Business,
    Application,
    Technology,
    Motivation,
    ImplementationMigration,
    Other,
    Relations,
    Diagrams,
    User,
}

impl FolderKind {
    /// Well-known kinds in the order they are attached on import.
    pub const WELL_KNOWN: [FolderKind; 9] = [
        Self::Strategy,
        Self::Business,
        Self::Application,
        Self::Technology,
        Self::Motivation,
        Self::ImplementationMigration,
        Self::Other,
        Self::Relations,
        Self::Diagrams,
    ];

    pub fn is_well_known(self) -> bool {
        self != Self::User
    }

    /// Fixed directory name of a well-known folder.
    pub fn dir_name(self) -> Option<&'static str> {
        match self {
            Self::Strategy => Some("Strategy"),
            Self::Business => Some("Business"),
            Self::Application => Some("Application"),
            Self::Technology => Some("Technology"),
            Self::Motivation => Some("Motivation"),
            Self::ImplementationMigration => Some("Implementation_Migration"),
            Self::Other => Some("Other"),
            Self::Relations => Some("Relations"),
            Self::Diagrams => Some("Views"),
            Self::User => None,
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::WELL_KNOWN
            .into_iter()
            .find(|kind| kind.dir_name() == Some(name))
    }

    /// Display name given to a freshly created well-known folder.
    pub fn default_name(self) -> &'static str {
        match self {
            Self::ImplementationMigration => "Implementation & Migration",
            Self::Diagrams => "Views",
            Self::User => "New Folder",
            other => other.dir_name().unwrap_or("Folder"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strategy => "strategy",
            Self::Business => "business",
            Self::Application => "application",
            Self::Technology => "technology",
            Self::Motivation => "motivation",
            Self::ImplementationMigration => "implementation_migration",
            Self::Other => "other",
            Self::Relations => "relations",
            Self::Diagrams => "diagrams",
            Self::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::WELL_KNOWN
            .into_iter()
            .chain(std::iter::once(Self::User))
            .find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for FolderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A folder in the containment tree.
#[derive(Debug, Clone)]
pub struct Folder {
    pub(crate) id: ObjectId,
    pub name: String,
    pub(crate) kind: FolderKind,
    pub attributes: BTreeMap<String, String>,
    pub(crate) parent: Option<FolderHandle>,
    pub(crate) folders: Vec<FolderHandle>,
    pub(crate) objects: Vec<ObjectHandle>,
}

impl Folder {
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn kind(&self) -> FolderKind {
        self.kind
    }

    pub fn parent(&self) -> Option<FolderHandle> {
        self.parent
    }

    pub fn folders(&self) -> &[FolderHandle] {
        &self.folders
    }

    pub fn objects(&self) -> &[ObjectHandle] {
        &self.objects
    }

    /// Directory name on disk: fixed for well-known kinds, the ID otherwise.
    pub fn dir_name(&self) -> &str {
        self.kind.dir_name().unwrap_or(self.id.as_str())
    }
}

/// A named pointer from one object to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossRef {
    /// Bound to a live object in the same model.
    Resolved { target: ObjectId, handle: ObjectHandle },
    /// Only the target ID is known.
    Unresolved(ObjectId),
}

impl CrossRef {
    pub fn target_id(&self) -> &ObjectId {
        match self {
            Self::Resolved { target, .. } => target,
            Self::Unresolved(target) => target,
        }
    }

    pub fn handle(&self) -> Option<ObjectHandle> {
        match self {
            Self::Resolved { handle, .. } => Some(*handle),
            Self::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    /// Drop the handle, keep the ID.
    pub fn unbind(&mut self) {
        if let Self::Resolved { target, .. } = self {
            *self = Self::Unresolved(target.clone());
        }
    }
}

/// Inverse side of a bound reference: `source.field` points at this object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Backlink {
    pub source: ObjectHandle,
    pub field: String,
}

/// A model element, relationship, diagram or nested diagram node.
#[derive(Debug, Clone)]
pub struct ModelObject {
    pub(crate) id: ObjectId,
    pub(crate) type_tag: String,
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub(crate) references: BTreeMap<String, CrossRef>,
    pub(crate) children: Vec<ObjectHandle>,
    pub(crate) container: Container,
    pub(crate) referenced_by: BTreeSet<Backlink>,
    /// Key into the model's [`AssetStore`].
    pub asset: Option<String>,
}

impl ModelObject {
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn references(&self) -> &BTreeMap<String, CrossRef> {
        &self.references
    }

    pub fn reference(&self, field: &str) -> Option<&CrossRef> {
        self.references.get(field)
    }

    pub fn children(&self) -> &[ObjectHandle] {
        &self.children
    }

    pub fn container(&self) -> Container {
        self.container
    }

    pub fn referenced_by(&self) -> &BTreeSet<Backlink> {
        &self.referenced_by
    }
}

/// Type tags end up in file names (`<Type>_<ID>.xml`), so they are plain
/// ASCII identifiers without underscores.
pub fn validate_type_tag(tag: &str) -> Result<(), GraphError> {
    let mut chars = tag.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(GraphError::InvalidName {
            kind: "type tag",
            value: tag.to_string(),
        })
    }
}

/// A cross-reference whose target was not present when the model was loaded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnresolvedReference {
    /// The referencing object.
    pub source: ObjectId,
    /// The folder or object containing the referencing object.
    pub container: ObjectId,
    /// Name of the reference field.
    pub field: String,
    /// The missing target.
    pub target: ObjectId,
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// The whole design model: root attributes, containment tree and assets.
///
/// Cloning produces an independent deep copy.
#[derive(Debug, Clone)]
pub struct Model {
    id: ObjectId,
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub(crate) top_folders: Vec<FolderHandle>,
    pub(crate) folders: Vec<Folder>,
    pub(crate) objects: Vec<ModelObject>,
    pub(crate) index: HashMap<ObjectId, Entry>,
    pub assets: AssetStore,
}

impl Model {
    pub fn new(id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            attributes: BTreeMap::new(),
            top_folders: Vec::new(),
            folders: Vec::new(),
            objects: Vec::new(),
            index: HashMap::new(),
            assets: AssetStore::new(),
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    // -- lookup -------------------------------------------------------------

    /// # Panics
    ///
    /// Panics if `handle` was issued by a different model.
    pub fn folder(&self, handle: FolderHandle) -> &Folder {
        &self.folders[handle.0]
    }

    pub fn folder_mut(&mut self, handle: FolderHandle) -> &mut Folder {
        &mut self.folders[handle.0]
    }

    /// # Panics
    ///
    /// Panics if `handle` was issued by a different model.
    pub fn object(&self, handle: ObjectHandle) -> &ModelObject {
        &self.objects[handle.0]
    }

    pub fn object_mut(&mut self, handle: ObjectHandle) -> &mut ModelObject {
        &mut self.objects[handle.0]
    }

    pub fn get_object(&self, handle: ObjectHandle) -> Option<&ModelObject> {
        self.objects.get(handle.0)
    }

    pub fn find(&self, id: &str) -> Option<Entry> {
        self.index.get(id).copied()
    }

    pub fn find_object(&self, id: &str) -> Option<ObjectHandle> {
        match self.find(id)? {
            Entry::Object(handle) => Some(handle),
            Entry::Folder(_) => None,
        }
    }

    pub fn find_folder(&self, id: &str) -> Option<FolderHandle> {
        match self.find(id)? {
            Entry::Folder(handle) => Some(handle),
            Entry::Object(_) => None,
        }
    }

    pub fn top_folders(&self) -> &[FolderHandle] {
        &self.top_folders
    }

    pub fn well_known_folder(&self, kind: FolderKind) -> Option<FolderHandle> {
        self.top_folders
            .iter()
            .copied()
            .find(|handle| self.folder(*handle).kind == kind)
    }

    pub fn folders(&self) -> impl Iterator<Item = (FolderHandle, &Folder)> {
        self.folders
            .iter()
            .enumerate()
            .map(|(i, folder)| (FolderHandle(i), folder))
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectHandle, &ModelObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, object)| (ObjectHandle(i), object))
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// ID of a folder or object acting as a container.
    pub fn container_id(&self, container: Container) -> &ObjectId {
        match container {
            Container::Folder(handle) => &self.folder(handle).id,
            Container::Object(handle) => &self.object(handle).id,
        }
    }

    /// The top-level object whose file stores `handle` (itself if it is not
    /// a nested child).
    pub fn file_owner(&self, mut handle: ObjectHandle) -> ObjectHandle {
        while let Container::Object(parent) = self.object(handle).container {
            handle = parent;
        }
        handle
    }

    /// The folder whose directory holds the file that stores `handle`.
    pub fn owning_folder(&self, mut handle: ObjectHandle) -> FolderHandle {
        loop {
            match self.object(handle).container {
                Container::Folder(folder) => return folder,
                Container::Object(parent) => handle = parent,
            }
        }
    }

    // -- construction -------------------------------------------------------

    /// Add a folder. Well-known kinds are top-level only and unique; user
    /// folders need a parent.
    pub fn add_folder(
        &mut self,
        parent: Option<FolderHandle>,
        id: ObjectId,
        kind: FolderKind,
        name: impl Into<String>,
    ) -> Result<FolderHandle, GraphError> {
        match (parent, kind.is_well_known()) {
            (None, true) => {
                if self.well_known_folder(kind).is_some() {
                    return Err(GraphError::InvalidContainment(format!(
                        "model already has a {kind} folder"
                    )));
                }
            }
            (Some(parent), false) => {
                self.check_folder(parent)?;
            }
            (Some(_), true) => {
                return Err(GraphError::InvalidContainment(format!(
                    "{kind} folder must be top-level"
                )));
            }
            (None, false) => {
                return Err(GraphError::InvalidContainment(
                    "user folders need a parent folder".into(),
                ));
            }
        }
        self.claim_id(&id, Entry::Folder(FolderHandle(self.folders.len())))?;

        let handle = FolderHandle(self.folders.len());
        self.folders.push(Folder {
            id,
            name: name.into(),
            kind,
            attributes: BTreeMap::new(),
            parent,
            folders: Vec::new(),
            objects: Vec::new(),
        });
        match parent {
            Some(parent) => self.folders[parent.0].folders.push(handle),
            None => self.top_folders.push(handle),
        }
        Ok(handle)
    }

    /// Return the well-known folder of `kind`, creating it with a fresh ID.
    pub fn ensure_well_known_folder(&mut self, kind: FolderKind) -> Result<FolderHandle, GraphError> {
        if let Some(handle) = self.well_known_folder(kind) {
            return Ok(handle);
        }
        self.add_folder(None, ObjectId::generate(), kind, kind.default_name())
    }

    /// Add an object under a folder or as a nested child of another object.
    pub fn add_object(
        &mut self,
        container: Container,
        id: ObjectId,
        type_tag: &str,
        name: impl Into<String>,
    ) -> Result<ObjectHandle, GraphError> {
        validate_type_tag(type_tag)?;
        match container {
            Container::Folder(folder) => self.check_folder(folder)?,
            Container::Object(parent) => self.check_object(parent)?,
        }
        self.claim_id(&id, Entry::Object(ObjectHandle(self.objects.len())))?;

        let handle = ObjectHandle(self.objects.len());
        self.objects.push(ModelObject {
            id,
            type_tag: type_tag.to_string(),
            name: name.into(),
            attributes: BTreeMap::new(),
            references: BTreeMap::new(),
            children: Vec::new(),
            container,
            referenced_by: BTreeSet::new(),
            asset: None,
        });
        match container {
            Container::Folder(folder) => self.folders[folder.0].objects.push(handle),
            Container::Object(parent) => self.objects[parent.0].children.push(handle),
        }
        Ok(handle)
    }

    // -- references ---------------------------------------------------------

    /// Bind `source.field` to `target` and record the back-link.
    pub fn set_reference(
        &mut self,
        source: ObjectHandle,
        field: &str,
        target: ObjectHandle,
    ) -> Result<(), GraphError> {
        self.check_object(source)?;
        self.check_object(target)?;
        self.remove_reference(source, field);
        let target_id = self.objects[target.0].id.clone();
        self.objects[source.0].references.insert(
            field.to_string(),
            CrossRef::Resolved {
                target: target_id,
                handle: target,
            },
        );
        self.objects[target.0].referenced_by.insert(Backlink {
            source,
            field: field.to_string(),
        });
        Ok(())
    }

    /// Record `source.field` as pointing at an ID that is not in this model.
    pub fn set_unresolved_reference(
        &mut self,
        source: ObjectHandle,
        field: &str,
        target: ObjectId,
    ) -> Result<(), GraphError> {
        self.check_object(source)?;
        self.remove_reference(source, field);
        self.objects[source.0]
            .references
            .insert(field.to_string(), CrossRef::Unresolved(target));
        Ok(())
    }

    /// Remove `source.field`, dropping the back-link if it was bound.
    pub fn remove_reference(&mut self, source: ObjectHandle, field: &str) -> Option<CrossRef> {
        let old = self.objects.get_mut(source.0)?.references.remove(field)?;
        if let Some(target) = old.handle() {
            self.objects[target.0].referenced_by.remove(&Backlink {
                source,
                field: field.to_string(),
            });
        }
        Some(old)
    }

    /// Turn every bound reference back into its ID form and clear all
    /// back-links.
    pub fn unbind_references(&mut self) {
        for object in &mut self.objects {
            object.referenced_by.clear();
            for reference in object.references.values_mut() {
                reference.unbind();
            }
        }
    }

    /// All references currently holding only a target ID.
    pub fn unresolved_references(&self) -> Vec<UnresolvedReference> {
        let mut out = Vec::new();
        for object in &self.objects {
            for (field, reference) in &object.references {
                if let CrossRef::Unresolved(target) = reference {
                    out.push(UnresolvedReference {
                        source: object.id.clone(),
                        container: self.container_id(object.container).clone(),
                        field: field.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        out
    }

    // -- internals ----------------------------------------------------------

    fn claim_id(&mut self, id: &ObjectId, entry: Entry) -> Result<(), GraphError> {
        if id == &self.id || self.index.contains_key(id) {
            return Err(GraphError::DuplicateId(id.to_string()));
        }
        self.index.insert(id.clone(), entry);
        Ok(())
    }

    fn check_folder(&self, handle: FolderHandle) -> Result<(), GraphError> {
        if handle.0 < self.folders.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownObject(format!("folder #{}", handle.0)))
        }
    }

    fn check_object(&self, handle: ObjectHandle) -> Result<(), GraphError> {
        if handle.0 < self.objects.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownObject(format!("object #{}", handle.0)))
        }
    }
}
