//! Stable object identity and the per-import lookup table.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{FolderHandle, ObjectHandle};
use crate::errors::GraphError;

/// A stable, file-name-safe identifier for a folder or object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Validate and wrap an existing identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, GraphError> {
        let value = value.into();
        if is_valid_id(&value) {
            Ok(Self(value))
        } else {
            Err(GraphError::InvalidName { kind: "object id", value })
        }
    }

    /// Assign a fresh unique identifier.
    pub fn generate() -> Self {
        Self(format!("id-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_id(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ObjectId {
    type Error = GraphError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What an ID points at inside one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Folder(FolderHandle),
    Object(ObjectHandle),
}

/// ID -> handle map populated during the load pass of an import.
///
/// Every folder and object is registered before any cross-reference is
/// resolved, so forward references resolve regardless of visit order. There
/// is no removal; the table lives for one import.
#[derive(Debug, Default)]
pub struct IdentityTable {
    entries: HashMap<ObjectId, Entry>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`. A second registration of the same ID is an error.
    pub fn put(&mut self, id: ObjectId, entry: Entry) -> Result<(), GraphError> {
        use std::collections::hash_map::Entry as Slot;
        match self.entries.entry(id) {
            Slot::Occupied(slot) => Err(GraphError::DuplicateId(slot.key().to_string())),
            Slot::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &ObjectId) -> Option<Entry> {
        self.entries.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
