//! Document upload, status lookup, and connection sync against the Ragie
//! API.
//!
//! Each operation is one upstream call. Uploads are sent as
//! `multipart/form-data` with the parts `file`, `metadata` (a JSON string,
//! only when given) and `mode`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::error::{RelayError, Result};
use crate::models::{
    DocumentStatus, DocumentUpload, DocumentUploadResponse, SyncResponse,
};
use crate::retrieval::SERVICE;
use crate::traits::DocumentStore;
use crate::upstream::{bearer, check_status, join_url};

#[derive(Clone)]
pub struct DocumentClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl DocumentClient {
    pub fn new(config: &RetrievalConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: api_key.into(),
            http: Client::new(),
        }
    }

    /// Builds the multipart form. The file part streams from disk rather
    /// than being read into memory.
    async fn upload_form(upload: &DocumentUpload) -> Result<Form> {
        if !tokio::fs::try_exists(&upload.path).await? {
            return Err(RelayError::NotFound(format!(
                "upload file {}",
                upload.path.display()
            )));
        }

        let file = tokio::fs::File::open(&upload.path).await?;
        let length = file.metadata().await?.len();
        let body = Body::wrap_stream(ReaderStream::new(file));
        let mut file =
            Part::stream_with_length(body, length).file_name(upload.file_name.clone());
        if let Some(content_type) = &upload.content_type {
            file = file.mime_str(content_type)?;
        }

        let mut form = Form::new().part("file", file).text("mode", upload.mode.clone());
        if let Some(metadata) = &upload.metadata {
            form = form.text("metadata", serde_json::to_string(metadata)?);
        }
        Ok(form)
    }
}

#[async_trait]
impl DocumentStore for DocumentClient {
    async fn upload(&self, upload: &DocumentUpload) -> Result<DocumentUploadResponse> {
        let form = Self::upload_form(upload).await?;
        let url = join_url(&self.base_url, &["documents"])?;

        debug!(url = %url, file = %upload.file_name, mode = %upload.mode, "uploading document");

        let response = bearer(self.http.post(url), &self.api_key)
            .multipart(form)
            .send()
            .await?;
        let response = check_status(SERVICE, response).await?;
        let created: DocumentUploadResponse = response.json().await?;

        info!(id = %created.id, status = %created.status, "document uploaded");
        Ok(created)
    }

    async fn status(&self, document_id: &str) -> Result<DocumentStatus> {
        let url = join_url(&self.base_url, &["documents", document_id])?;
        debug!(url = %url, "fetching document status");

        let response = bearer(self.http.get(url), &self.api_key).send().await?;
        let response = check_status(SERVICE, response).await?;
        Ok(response.json().await?)
    }

    async fn sync(&self, connection_id: &str) -> Result<SyncResponse> {
        let url = join_url(&self.base_url, &["connections", connection_id, "sync"])?;
        debug!(url = %url, "triggering connection sync");

        let response = bearer(self.http.post(url), &self.api_key).send().await?;
        let response = check_status(SERVICE, response).await?;
        let synced: SyncResponse = response.json().await?;

        info!(connection = connection_id, message = %synced.message, "connection sync requested");
        Ok(synced)
    }
}
