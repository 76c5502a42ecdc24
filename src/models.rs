//! Request and response types shared by the clients, the composer, and the
//! HTTP server.
//!
//! Every type here lives for a single request. Upstream payloads are parsed
//! leniently (unknown fields ignored); open-ended maps are carried through
//! untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use uuid::Uuid;

/// Body of `POST /api/query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
}

/// Retrieval parameters.
///
/// `filter` is an opaque predicate tree built from `$eq`, `$in`, `$nin`,
/// `$and` and `$or` nodes. It is forwarded to the retrieval service as-is
/// and never interpreted here, beyond requiring a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank: Option<bool>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filter: None,
            rerank: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub text: String,
    pub score: f64,
    pub document_id: String,
    #[serde(default)]
    pub document_metadata: Map<String, Value>,
}

/// Chunks in the order the retrieval service returned them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    #[serde(default)]
    pub scored_chunks: Vec<ScoredChunk>,
}

impl RetrievalResponse {
    pub fn texts(&self) -> Vec<String> {
        self.scored_chunks.iter().map(|c| c.text.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scored_chunks.is_empty()
    }
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Replaces the default template verbatim; passages are not inserted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl GenerationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filter: None,
            rerank: None,
            model: None,
            system_prompt: None,
        }
    }

    pub fn retrieval_request(&self) -> RetrievalRequest {
        RetrievalRequest {
            query: self.query.clone(),
            filter: self.filter.clone(),
            rerank: self.rerank,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub response: String,
}

/// Document metadata. `title` and `scope` are the common keys; anything
/// else is kept in `extra`. No value is type-checked: a list-valued `scope`
/// or a numeric `title` passes through as sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentMetadata {
    /// `title` when it is a string.
    pub fn title(&self) -> Option<&str> {
        self.title.as_ref().and_then(Value::as_str)
    }

    /// `scope` when it is a string.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_ref().and_then(Value::as_str)
    }
}

/// Mirror of the retrieval service's document record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: String,
    pub name: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default)]
    pub chunk_count: u64,
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentUploadResponse {
    pub id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub message: String,
}

/// A file already materialized on local disk, ready to be forwarded.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: Option<String>,
    pub metadata: Option<DocumentMetadata>,
    pub mode: String,
}
