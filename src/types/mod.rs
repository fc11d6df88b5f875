//! Identifiers and document types shared by every layer.
//!
//! Two identifiers exist for each document: the caller-supplied [`DocId`] and the
//! internal [`RowId`] assigned by the orchestrator. Only `RowId` joins the vector
//! index with the content database.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A single search result: column name to JSON value.
pub type ResultRow = Map<String, Value>;

/// Internal row identifier.
///
/// Row ids are zero-based, assigned in insertion order and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
pub struct RowId(pub u32);

impl RowId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Converts to little-endian bytes for storage.
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied document identifier.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
#[serde(untagged)]
pub enum DocId {
    Int(i64),
    Str(String),
}

impl DocId {
    pub fn to_json(&self) -> Value {
        match self {
            DocId::Int(value) => Value::from(*value),
            DocId::Str(value) => Value::String(value.clone()),
        }
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocId::Int(value) => write!(f, "{value}"),
            DocId::Str(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for DocId {
    fn from(value: i64) -> Self {
        DocId::Int(value)
    }
}

impl From<i32> for DocId {
    fn from(value: i32) -> Self {
        DocId::Int(i64::from(value))
    }
}

impl From<u32> for DocId {
    fn from(value: u32) -> Self {
        DocId::Int(i64::from(value))
    }
}

impl From<usize> for DocId {
    fn from(value: usize) -> Self {
        DocId::Int(value as i64)
    }
}

impl From<&str> for DocId {
    fn from(value: &str) -> Self {
        DocId::Str(value.to_string())
    }
}

impl From<String> for DocId {
    fn from(value: String) -> Self {
        DocId::Str(value)
    }
}

/// Document content: plain text or a structured object carrying a `text` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Object(Map<String, Value>),
}

impl Content {
    /// Text used for embedding and for the `text` column.
    ///
    /// Objects expose their `text` field; objects without one have no text.
    pub fn text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Object(object) => object.get("text").and_then(Value::as_str),
        }
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Text(value.to_string())
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Text(value)
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Content::Text(text),
            Value::Object(object) => Content::Object(object),
            other => Content::Text(other.to_string()),
        }
    }
}

/// A document to index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl Document {
    pub fn new(id: impl Into<DocId>, content: impl Into<Content>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// Metadata stored alongside the row.
    ///
    /// Object content contributes all of its fields; explicit data wins on conflicts.
    pub fn metadata(&self) -> Option<Map<String, Value>> {
        let mut merged = match &self.content {
            Content::Object(object) => object.clone(),
            Content::Text(_) => Map::new(),
        };
        if let Some(data) = &self.data {
            for (key, value) in data {
                merged.insert(key.clone(), value.clone());
            }
        }
        if merged.is_empty() && matches!(self.content, Content::Text(_)) && self.data.is_none() {
            None
        } else {
            Some(merged)
        }
    }
}

impl<I, C> From<(I, C, Option<Value>)> for Document
where
    I: Into<DocId>,
    C: Into<Content>,
{
    fn from((id, content, data): (I, C, Option<Value>)) -> Self {
        let data = match data {
            Some(Value::Object(map)) => Some(map),
            Some(Value::Null) | None => None,
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Some(map)
            }
        };
        Self {
            id: id.into(),
            content: content.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doc_id_conversions() {
        assert_eq!(DocId::from(4usize), DocId::Int(4));
        assert_eq!(DocId::from("abc"), DocId::Str("abc".to_string()));
        assert_eq!(DocId::from(7i64).to_json(), json!(7));
        assert_eq!(DocId::from("x").to_string(), "x");
    }

    #[test]
    fn test_doc_id_untagged_json() {
        let ids: Vec<DocId> = serde_json::from_str(r#"[1, "two"]"#).unwrap();
        assert_eq!(ids, vec![DocId::Int(1), DocId::Str("two".to_string())]);
    }

    #[test]
    fn test_object_content_text_and_metadata() {
        let doc = Document::from((
            6usize,
            json!({"date": "2021-01-01", "text": "Baby panda", "flag": 1}),
            None,
        ));
        assert_eq!(doc.content.text(), Some("Baby panda"));

        let metadata = doc.metadata().unwrap();
        assert_eq!(metadata["flag"], json!(1));
        assert_eq!(metadata["date"], json!("2021-01-01"));
    }

    #[test]
    fn test_text_document_without_data_has_no_metadata() {
        let doc = Document::new(0usize, "plain text");
        assert!(doc.metadata().is_none());

        let mut data = Map::new();
        data.insert("lang".to_string(), json!("en"));
        let doc = doc.with_data(data);
        assert_eq!(doc.metadata().unwrap()["lang"], json!("en"));
    }

    #[test]
    fn test_row_id_bytes() {
        let row = RowId::new(513);
        assert_eq!(RowId::from_bytes(row.to_bytes()), row);
        assert!(RowId::new(1) < RowId::new(2));
    }
}
