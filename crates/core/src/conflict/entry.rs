//! Per-path conflict records.
//!
//! Each side of a conflicting file is read only far enough to show what it
//! is: the identity and display attributes of the object or folder it
//! describes. References are not resolved.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::xml::{from_xml_bytes, ObjectHeader};
use crate::codec::{file_name_of, is_model_path, parse_object_file_name, FOLDER_DESCRIPTOR};
use crate::errors::ConflictError;
use crate::model::assets::IMAGES_PREFIX;
use crate::model::ObjectId;
use crate::vcs::Stage;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which side of the merge wins for one path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    Ours,
    Theirs,
}

impl Choice {
    pub fn stage(self) -> Stage {
        match self {
            Self::Ours => Stage::Ours,
            Self::Theirs => Stage::Theirs,
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

/// How the two sides of a path relate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Our side deleted the file, theirs kept it.
    DeletedByUs,
    /// Their side deleted the file, ours kept it.
    DeletedByThem,
    /// Both sides present with different content.
    Modified,
    /// Both sides present with identical bytes.
    Identical,
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeletedByUs => write!(f, "deleted_by_us"),
            Self::DeletedByThem => write!(f, "deleted_by_them"),
            Self::Modified => write!(f, "modified"),
            Self::Identical => write!(f, "identical"),
        }
    }
}

/// What a conflicting file describes on one side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SideKind {
    Object {
        id: ObjectId,
        type_tag: String,
        name: String,
    },
    Folder {
        id: ObjectId,
        name: String,
    },
    Asset,
    /// A file outside the model layout.
    Other,
}

impl fmt::Display for SideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object { id, type_tag, name } if name.is_empty() => write!(f, "{type_tag} ({id})"),
            Self::Object { id, type_tag, name } => write!(f, "{type_tag} '{name}' ({id})"),
            Self::Folder { id, name } => write!(f, "folder '{name}' ({id})"),
            Self::Asset => write!(f, "asset"),
            Self::Other => write!(f, "file"),
        }
    }
}

/// One side of a conflicting path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSide {
    pub kind: SideKind,
    pub content: Vec<u8>,
}

impl ConflictSide {
    /// Classify `content` found at `path`.
    pub fn from_content(path: &str, content: Vec<u8>) -> Self {
        Self {
            kind: classify(path, &content),
            content,
        }
    }
}

/// A conflicting path with both sides and the current decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEntry {
    pub path: String,
    pub ours: Option<ConflictSide>,
    pub theirs: Option<ConflictSide>,
    pub choice: Choice,
}

impl ConflictEntry {
    /// Build an entry with the default choice: ours if present, else theirs.
    pub fn new(
        path: impl Into<String>,
        ours: Option<ConflictSide>,
        theirs: Option<ConflictSide>,
    ) -> Result<Self, ConflictError> {
        let path = path.into();
        let choice = match (&ours, &theirs) {
            (None, None) => return Err(ConflictError::EmptyConflict(path)),
            (Some(_), _) => Choice::Ours,
            (None, Some(_)) => Choice::Theirs,
        };
        Ok(Self {
            path,
            ours,
            theirs,
            choice,
        })
    }

    pub fn status(&self) -> ConflictStatus {
        match (&self.ours, &self.theirs) {
            (None, _) => ConflictStatus::DeletedByUs,
            (Some(_), None) => ConflictStatus::DeletedByThem,
            (Some(ours), Some(theirs)) if ours.content == theirs.content => ConflictStatus::Identical,
            (Some(_), Some(_)) => ConflictStatus::Modified,
        }
    }

    pub fn default_choice(&self) -> Choice {
        if self.ours.is_some() {
            Choice::Ours
        } else {
            Choice::Theirs
        }
    }

    pub fn side(&self, choice: Choice) -> Option<&ConflictSide> {
        match choice {
            Choice::Ours => self.ours.as_ref(),
            Choice::Theirs => self.theirs.as_ref(),
        }
    }

    /// Display label from whichever side is present, ours first.
    pub fn describe(&self) -> String {
        self.ours
            .as_ref()
            .or(self.theirs.as_ref())
            .map(|side| side.kind.to_string())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// `id`/`name` attributes shared by the model and folder descriptors.
#[derive(Debug, Deserialize)]
struct DescriptorHeader {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name", default)]
    name: String,
}

fn classify(path: &str, content: &[u8]) -> SideKind {
    if path.starts_with(IMAGES_PREFIX) {
        return SideKind::Asset;
    }
    if !is_model_path(path) {
        return SideKind::Other;
    }

    let file_name = file_name_of(path);
    if file_name == FOLDER_DESCRIPTOR {
        return from_xml_bytes::<DescriptorHeader>(content)
            .ok()
            .and_then(|header| {
                let id = ObjectId::new(header.id).ok()?;
                Some(SideKind::Folder {
                    id,
                    name: header.name,
                })
            })
            .unwrap_or(SideKind::Other);
    }

    let header = from_xml_bytes::<ObjectHeader>(content).ok().and_then(|header| {
        let id = ObjectId::new(header.id).ok()?;
        Some(SideKind::Object {
            id,
            type_tag: header.type_tag,
            name: header.name,
        })
    });
    if let Some(kind) = header {
        return kind;
    }

    // Unreadable content: fall back to what the file name says.
    match parse_object_file_name(file_name) {
        Some((type_tag, id)) => SideKind::Object {
            id,
            type_tag,
            name: String::new(),
        },
        None => SideKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(path: &str, content: &str) -> Option<ConflictSide> {
        Some(ConflictSide::from_content(path, content.as_bytes().to_vec()))
    }

    const OBJECT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<object type="BusinessActor" id="e1" name="Clerk">
  <property key="documentation" value="desk"/>
</object>
"#;

    #[test]
    fn test_deleted_by_us_defaults_to_theirs() {
        let path = "model/Business/BusinessActor_e1.xml";
        let entry = ConflictEntry::new(path, None, side(path, OBJECT)).unwrap();
        assert_eq!(entry.status(), ConflictStatus::DeletedByUs);
        assert_eq!(entry.choice, Choice::Theirs);
        assert_eq!(entry.describe(), "BusinessActor 'Clerk' (e1)");
    }

    #[test]
    fn test_statuses_and_defaults() {
        let path = "model/Business/BusinessActor_e1.xml";
        let gone = ConflictEntry::new(path, side(path, OBJECT), None).unwrap();
        assert_eq!(gone.status(), ConflictStatus::DeletedByThem);
        assert_eq!(gone.choice, Choice::Ours);

        let edited = OBJECT.replace("desk", "counter");
        let modified = ConflictEntry::new(path, side(path, OBJECT), side(path, &edited)).unwrap();
        assert_eq!(modified.status(), ConflictStatus::Modified);
        assert_eq!(modified.default_choice(), Choice::Ours);

        let same = ConflictEntry::new(path, side(path, OBJECT), side(path, OBJECT)).unwrap();
        assert_eq!(same.status(), ConflictStatus::Identical);
    }

    #[test]
    fn test_empty_conflict_rejected() {
        assert!(matches!(
            ConflictEntry::new("model/x.xml", None, None),
            Err(ConflictError::EmptyConflict(p)) if p == "model/x.xml"
        ));
    }

    #[test]
    fn test_classify_descriptors_and_assets() {
        let folder = r#"<folder id="f1" kind="user" name="Team"/>"#;
        assert_eq!(
            classify("model/Business/f1/folder.xml", folder.as_bytes()),
            SideKind::Folder {
                id: ObjectId::new("f1").unwrap(),
                name: "Team".into()
            }
        );
        let model = r#"<model id="m1" name="Bank"/>"#;
        assert!(matches!(
            classify("model/folder.xml", model.as_bytes()),
            SideKind::Folder { name, .. } if name == "Bank"
        ));
        assert_eq!(classify("images/ab.png", b"\x89PNG"), SideKind::Asset);
        assert_eq!(classify("README.md", b"hi"), SideKind::Other);
    }

    #[test]
    fn test_classify_falls_back_to_file_name() {
        let kind = classify("model/Business/Node_n1.xml", b"<<<<<<< HEAD");
        assert_eq!(
            kind,
            SideKind::Object {
                id: ObjectId::new("n1").unwrap(),
                type_tag: "Node".into(),
                name: String::new()
            }
        );
        assert_eq!(kind.to_string(), "Node (n1)");
    }
}
