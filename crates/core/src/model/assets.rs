//! Binary assets (embedded images) referenced by model objects.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::errors::GraphError;

/// Namespace every asset key lives under, both in memory and on disk.
pub const IMAGES_PREFIX: &str = "images/";

/// Content store for binary assets, keyed by namespaced path
/// (`images/<name>`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetStore {
    assets: BTreeMap<String, Vec<u8>>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store image bytes under a content-derived key and return the key.
    ///
    /// Identical content always maps to the same key.
    pub fn insert_image(&mut self, bytes: Vec<u8>, extension: &str) -> String {
        let digest = hex::encode(Sha256::digest(&bytes));
        let extension = extension.trim_start_matches('.');
        let key = if extension.is_empty() {
            format!("{IMAGES_PREFIX}{digest}")
        } else {
            format!("{IMAGES_PREFIX}{digest}.{extension}")
        };
        self.assets.entry(key.clone()).or_insert(bytes);
        key
    }

    /// Store bytes under an explicit key (used when loading from disk).
    pub fn insert(&mut self, key: impl Into<String>, bytes: Vec<u8>) -> Result<(), GraphError> {
        let key = key.into();
        validate_key(&key)?;
        self.assets.insert(key, bytes);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.assets.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.assets.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.assets.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Asset keys must stay inside `images/` once joined onto a directory.
pub fn validate_key(key: &str) -> Result<(), GraphError> {
    let Some(rest) = key.strip_prefix(IMAGES_PREFIX) else {
        return Err(GraphError::InvalidAssetKey(key.to_string()));
    };
    let escapes = rest
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == ".." || part.contains('\\'));
    if escapes {
        return Err(GraphError::InvalidAssetKey(key.to_string()));
    }
    Ok(())
}
