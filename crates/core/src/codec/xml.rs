//! XML documents for descriptors and object files.
//!
//! Output is deterministic: the XML declaration, two-space indentation, `\n`
//! line endings, a trailing newline, and properties/references in sorted key
//! order. Re-encoding an unchanged model gives byte-identical files.

use std::collections::BTreeMap;

use quick_xml::DeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::{Folder, Model, ModelObject, ObjectHandle};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// `model/folder.xml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "model")]
pub struct ModelDoc {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "property", default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyDoc>,
}

/// `folder.xml` inside every folder directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "folder")]
pub struct FolderDoc {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@kind")]
    pub kind: String,
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "property", default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyDoc>,
}

/// One object file; nested children are inlined as `<child>` elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "object")]
pub struct ObjectDoc {
    #[serde(rename = "@type")]
    pub type_tag: String,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@asset", default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(rename = "property", default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyDoc>,
    #[serde(rename = "reference", default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceDoc>,
    #[serde(rename = "child", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ObjectDoc>,
}

/// A key/value property. The value is an attribute so that indentation
/// never touches its surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDoc {
    #[serde(rename = "@key")]
    pub key: String,
    #[serde(rename = "@value", default)]
    pub value: String,
}

/// A cross-reference written as an ID pointer, never an inline copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDoc {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@href")]
    pub target: String,
}

/// Identity and display attributes of an object file, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectHeader {
    #[serde(rename = "@type")]
    pub type_tag: String,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@name", default)]
    pub name: String,
}

// ---------------------------------------------------------------------------
// Model -> documents
// ---------------------------------------------------------------------------

fn properties(attributes: &BTreeMap<String, String>) -> Vec<PropertyDoc> {
    attributes
        .iter()
        .map(|(key, value)| PropertyDoc {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

pub(crate) fn properties_to_map(properties: Vec<PropertyDoc>) -> BTreeMap<String, String> {
    properties.into_iter().map(|p| (p.key, p.value)).collect()
}

impl ModelDoc {
    pub fn from_model(model: &Model) -> Self {
        Self {
            id: model.id().to_string(),
            name: model.name.clone(),
            properties: properties(&model.attributes),
        }
    }
}

impl FolderDoc {
    pub fn from_folder(folder: &Folder) -> Self {
        Self {
            id: folder.id().to_string(),
            kind: folder.kind().as_str().to_string(),
            name: folder.name.clone(),
            properties: properties(&folder.attributes),
        }
    }
}

impl ObjectDoc {
    /// Encode `handle` and its nested children.
    pub fn from_object(model: &Model, handle: ObjectHandle) -> Self {
        let object: &ModelObject = model.object(handle);
        Self {
            type_tag: object.type_tag().to_string(),
            id: object.id().to_string(),
            name: object.name.clone(),
            asset: object.asset.clone(),
            properties: properties(&object.attributes),
            references: object
                .references()
                .iter()
                .map(|(field, reference)| ReferenceDoc {
                    name: field.clone(),
                    target: reference.target_id().to_string(),
                })
                .collect(),
            children: object
                .children()
                .iter()
                .map(|child| Self::from_object(model, *child))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialize a document with the canonical formatting.
pub fn to_xml<T: Serialize>(doc: &T) -> Result<String, DeError> {
    let mut body = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut body);
    serializer.indent(' ', 2);
    doc.serialize(serializer)?;

    let mut out = String::with_capacity(XML_DECLARATION.len() + body.len() + 2);
    out.push_str(XML_DECLARATION);
    out.push('\n');
    out.push_str(&body);
    out.push('\n');
    Ok(out)
}

pub fn from_xml<T: DeserializeOwned>(text: &str) -> Result<T, DeError> {
    quick_xml::de::from_str(text)
}

/// Decode raw file bytes. A UTF-8 BOM is tolerated.
pub fn from_xml_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DeError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DeError::Custom(format!("file is not valid UTF-8: {e}")))?;
    from_xml(text)
}
