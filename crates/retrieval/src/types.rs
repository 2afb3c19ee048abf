//! Shared types for the retrieval subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single indexed document.
///
/// `source` and `text` are pulled out of the stored entry; every other field
/// survives round trips through the flattened metadata map. Document identity
/// is positional: the index assigns ids by insertion order and that order is
/// significant (stable tie-break during retrieval).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Where the document came from (file name, page, guide section)
    #[serde(default = "default_source")]
    pub source: String,

    /// Document body used for both indexing and context blocks
    #[serde(default)]
    pub text: String,

    /// Remaining entry fields, preserved verbatim
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_source() -> String {
    "unknown".to_string()
}

impl Document {
    /// Assemble a document from a metadata map plus the indexed text.
    ///
    /// A `text` field already present in the metadata wins over the passage
    /// text, mirroring how packs may carry pre-rendered bodies.
    pub fn from_parts(mut metadata: serde_json::Map<String, serde_json::Value>, text: String) -> Self {
        let source = match metadata.remove("source") {
            Some(serde_json::Value::String(s)) => s,
            _ => default_source(),
        };
        let text = match metadata.remove("text") {
            Some(serde_json::Value::String(s)) => s,
            _ => text,
        };
        Self {
            source,
            text,
            metadata,
        }
    }
}

/// One retrieval hit: similarity score plus the matching document.
///
/// Serialized as `{score, doc}` to match the retrieve endpoint payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub score: f32,
    #[serde(rename = "doc")]
    pub document: Document,
}

/// Metadata record persisted alongside the index artifacts.
///
/// `model_name` and `tokenizer_version` identify the generation stack the
/// index was built for, so a stale index can be detected after a model swap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexMeta {
    pub model_name: Option<String>,
    pub tokenizer_version: Option<String>,
    #[serde(default)]
    pub document_count: usize,
    #[serde(default)]
    pub built_at: Option<DateTime<Utc>>,
}
