//! Core data models used throughout Template Chunker.
//!
//! These types represent the template documents read from JSON, the chunks
//! produced by the packer, and the lookup index built over them. Field names
//! serialize in camelCase to match the template format consumed by the
//! retrieval side.
//!
//! Unknown keys on documents, sections and fields are kept in an `extra`
//! map so that a chunked document round-trips everything it was given.
//! Optional keys are `Option<Option<_>>`: `None` when the key is absent,
//! `Some(None)` when it is an explicit `null`. Both serialize back the way
//! they were read, which keeps size estimates faithful to the input.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A template document: the root input of the packer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub sections: Vec<Section>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Keep an explicit `null` apart from a missing key.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A named group of fields. The unit of atomic placement unless oversized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: String,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub tags: Option<Option<Vec<String>>>,
    pub fields: Vec<Field>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Section {
    pub fn description(&self) -> Option<&str> {
        self.description.as_ref().and_then(|d| d.as_deref())
    }

    /// The section's tags; empty when absent or `null`.
    pub fn tags(&self) -> &[String] {
        self.tags
            .as_ref()
            .and_then(|t| t.as_deref())
            .unwrap_or_default()
    }
}

/// A single labeled input definition within a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub required: Option<Option<bool>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub ai_hints: Option<Option<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Field {
    pub fn description(&self) -> Option<&str> {
        self.description.as_ref().and_then(|d| d.as_deref())
    }

    pub fn is_required(&self) -> bool {
        self.required == Some(Some(true))
    }

    pub fn ai_hints(&self) -> Option<&Value> {
        self.ai_hints.as_ref().and_then(|h| h.as_ref())
    }
}

/// A bounded-size partition of a document's sections.
///
/// `start_line`/`end_line` are an estimated, chunk-local line range: every
/// chunk starts at line 1. They size chunks and feed statistics; they are
/// not offsets into the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// `chunk-NNN`, 1-based, in emission order.
    pub id: String,
    pub title: String,
    pub start_line: usize,
    pub end_line: usize,
    pub tags: Vec<String>,
    pub content: ChunkContent,
    /// Filled by the indexer; `null` straight out of the packer.
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Estimated number of lines covered by this chunk.
    pub fn line_span(&self) -> usize {
        (self.end_line + 1).saturating_sub(self.start_line)
    }

    /// Total number of fields across this chunk's sections.
    pub fn field_count(&self) -> usize {
        self.content.sections.iter().map(|s| s.fields.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkContent {
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<OverlapContext>,
}

/// Trailing fields of the previous chunk, attached for continuity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapContext {
    pub from: String,
    pub fields: Vec<Field>,
}

/// Lookup tables over a chunk sequence. Always rebuilt in full.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkIndex {
    pub by_tag: BTreeMap<String, Vec<String>>,
    pub by_section: BTreeMap<String, Vec<String>>,
    pub by_id: BTreeMap<String, Chunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub total_chunks: usize,
    /// The `max_chunk_size` the document was packed with.
    pub chunk_size: usize,
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub chunked_at: String,
}

/// The packer's output: the input document's own fields, shallow-merged
/// with the chunking metadata, the chunks and their index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkedDocument {
    pub name: String,
    pub sections: Vec<Section>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    pub metadata: ChunkMetadata,
    pub chunks: Vec<Chunk>,
    pub index: ChunkIndex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_deserializes_camel_case_and_extras() {
        let json = r#"{
            "id": "f1",
            "label": "Tenant name",
            "type": "text",
            "required": true,
            "aiHints": ["full legal name"],
            "options": ["a", "b"]
        }"#;
        let field: Field = serde_json::from_str(json).unwrap();
        assert_eq!(field.field_type, "text");
        assert!(field.is_required());
        assert_eq!(field.ai_hints(), Some(&serde_json::json!(["full legal name"])));
        assert_eq!(field.extra.get("options"), Some(&serde_json::json!(["a", "b"])));
    }

    #[test]
    fn test_section_tags_default_to_empty() {
        let json = r#"{ "id": "s1", "name": "Parties", "fields": [] }"#;
        let section: Section = serde_json::from_str(json).unwrap();
        assert!(section.tags().is_empty());
        assert!(section.description.is_none());

        // An absent key stays absent on the way out.
        let value = serde_json::to_value(&section).unwrap();
        assert!(value.get("tags").is_none());
        assert!(value.get("description").is_none());
    }

    #[test]
    fn test_explicit_nulls_survive_round_trip() {
        let json = serde_json::json!({
            "id": "s1",
            "name": "Parties",
            "description": null,
            "tags": null,
            "fields": [
                { "id": "f1", "label": "Tenant", "type": "text",
                  "description": null, "required": null, "aiHints": null }
            ]
        });
        let section: Section = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(section.description, Some(None));
        assert_eq!(section.description(), None);
        assert!(section.tags().is_empty());
        assert_eq!(section.fields[0].required, Some(None));
        assert!(!section.fields[0].is_required());
        assert_eq!(section.fields[0].ai_hints(), None);

        assert_eq!(serde_json::to_value(&section).unwrap(), json);
    }

    #[test]
    fn test_document_without_sections_is_rejected() {
        let err = serde_json::from_str::<Document>(r#"{ "name": "lease" }"#).unwrap_err();
        assert!(err.to_string().contains("sections"));
    }

    #[test]
    fn test_non_array_fields_is_rejected() {
        let json = r#"{ "name": "lease", "sections": [{ "id": "s", "name": "S", "fields": 3 }] }"#;
        assert!(serde_json::from_str::<Document>(json).is_err());
    }

    #[test]
    fn test_chunk_serializes_null_embedding_and_camel_case() {
        let chunk = Chunk {
            id: "chunk-001".to_string(),
            title: "Parties".to_string(),
            start_line: 1,
            end_line: 12,
            tags: vec![],
            content: ChunkContent::default(),
            embedding: None,
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["startLine"], 1);
        assert_eq!(value["endLine"], 12);
        assert!(value["embedding"].is_null());
        assert!(value["content"].get("context").is_none());
        assert_eq!(chunk.line_span(), 12);
    }
}
