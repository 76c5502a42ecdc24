//! Collaborator traits.
//!
//! The composer and the HTTP server only ever see these traits, so tests
//! (and alternative backends) can substitute fakes for the hosted services.
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌───────────────┐
//! │ Retriever  │   │ Generator  │   │ DocumentStore │
//! │  (Ragie)   │   │  (OpenAI)  │   │    (Ragie)    │
//! └─────┬──────┘   └─────┬──────┘   └───────┬───────┘
//!       └───────┬────────┘                  │
//!               ▼                           │
//!           Composer                        │
//!               └──────────┬────────────────┘
//!                          ▼
//!                    HTTP server
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    DocumentStatus, DocumentUpload, DocumentUploadResponse, RetrievalRequest, RetrievalResponse,
    SyncResponse,
};

/// Fetches scored chunks for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// One retrieval call. Chunks come back in upstream order.
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResponse>;
}

/// Chat-completion backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Send a `system` message followed by a `user` message and return the
    /// first completion's text unchanged.
    async fn complete(&self, model: &str, system_prompt: &str, user: &str) -> Result<String>;
}

/// Document lifecycle operations owned by the retrieval service.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upload(&self, upload: &DocumentUpload) -> Result<DocumentUploadResponse>;

    async fn status(&self, document_id: &str) -> Result<DocumentStatus>;

    /// Ask the service to sync a connection now. Returns its message.
    async fn sync(&self, connection_id: &str) -> Result<SyncResponse>;
}
