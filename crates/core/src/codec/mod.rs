//! On-disk layout and per-file encoding.
//!
//! ```text
//! <root>/
//!   model/
//!     folder.xml                      model descriptor
//!     Business/                       well-known folder (fixed name)
//!       folder.xml
//!       Element_e1.xml                one file per top-level object
//!       id-7f3a.../                   user folder (named by ID)
//!         folder.xml
//!   images/
//!     <sha256>.png                    deduplicated assets
//! ```

pub mod xml;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::model::{Folder, FolderHandle, Model, ObjectHandle, ObjectId};

pub use xml::{FolderDoc, ModelDoc, ObjectDoc, ObjectHeader, PropertyDoc, ReferenceDoc};

pub const MODEL_DIR: &str = "model";
pub const IMAGES_DIR: &str = "images";
pub const FOLDER_DESCRIPTOR: &str = "folder.xml";
pub const OBJECT_EXTENSION: &str = "xml";

fn object_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z][A-Za-z0-9]*)_([A-Za-z0-9._-]+)\.xml$")
            .expect("valid object file regex")
    })
}

/// `<Type>_<ID>.xml`
pub fn object_file_name(type_tag: &str, id: &ObjectId) -> String {
    format!("{type_tag}_{id}.{OBJECT_EXTENSION}")
}

/// Split an object file name into its type tag and ID.
pub fn parse_object_file_name(file_name: &str) -> Option<(String, ObjectId)> {
    let caps = object_file_re().captures(file_name)?;
    let type_tag = caps.get(1)?.as_str().to_string();
    let id = ObjectId::new(caps.get(2)?.as_str()).ok()?;
    Some((type_tag, id))
}

/// Last component of a `/`-separated repository path.
pub fn file_name_of(repo_path: &str) -> &str {
    repo_path.rsplit('/').next().unwrap_or(repo_path)
}

/// Directory of `folder` relative to the export root, e.g. `model/Business/f1`.
pub fn folder_dir(model: &Model, folder: FolderHandle) -> PathBuf {
    let mut chain: Vec<&Folder> = Vec::new();
    let mut cursor = Some(folder);
    while let Some(handle) = cursor {
        let current = model.folder(handle);
        chain.push(current);
        cursor = current.parent();
    }
    let mut dir = PathBuf::from(MODEL_DIR);
    for folder in chain.iter().rev() {
        dir.push(folder.dir_name());
    }
    dir
}

/// File path of a top-level object relative to the export root.
pub fn object_path(model: &Model, object: ObjectHandle) -> PathBuf {
    let owner = model.object(model.file_owner(object));
    folder_dir(model, model.owning_folder(object)).join(object_file_name(&owner.type_tag, &owner.id))
}

/// Join a `/`-separated repository path onto a local directory.
pub fn repo_path_to_local(root: &Path, repo_path: &str) -> PathBuf {
    repo_path
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// True if a repository path lies inside the `model/` subtree.
pub fn is_model_path(repo_path: &str) -> bool {
    repo_path.starts_with("model/")
}
