//! Ragie retrieval client.
//!
//! Sends `POST {base_url}/retrievals` with a bearer token and parses the
//! `scored_chunks` list. A response without the list counts as zero chunks.
//! There is no retry: a non-success status is returned to the caller as
//! [`RelayError::Upstream`](crate::error::RelayError::Upstream).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::models::{RetrievalRequest, RetrievalResponse};
use crate::traits::Retriever;
use crate::upstream::{bearer, check_status, join_url};

pub(crate) const SERVICE: &str = "Ragie";

#[derive(Clone)]
pub struct RetrievalClient {
    base_url: String,
    api_key: String,
    default_rerank: bool,
    http: Client,
}

impl RetrievalClient {
    pub fn new(config: &RetrievalConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: api_key.into(),
            default_rerank: config.rerank,
            http: Client::new(),
        }
    }

    /// JSON body for `/retrievals`. An unset `rerank` takes the configured
    /// default; an unset filter is left out entirely.
    pub fn request_body(&self, request: &RetrievalRequest) -> Value {
        let mut body = json!({
            "query": request.query,
            "rerank": request.rerank.unwrap_or(self.default_rerank),
        });
        if let Some(filter) = &request.filter {
            body["filter"] = Value::Object(filter.clone());
        }
        body
    }
}

#[async_trait]
impl Retriever for RetrievalClient {
    async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResponse> {
        let url = join_url(&self.base_url, &["retrievals"])?;
        let body = self.request_body(request);

        debug!(url = %url, query = %request.query, "sending retrieval request");

        let response = bearer(self.http.post(url), &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(SERVICE, response).await?;
        let parsed: RetrievalResponse = response.json().await?;

        info!(
            chunks = parsed.scored_chunks.len(),
            "received retrieval response"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(rerank: bool) -> RetrievalClient {
        let config = RetrievalConfig {
            rerank,
            ..Default::default()
        };
        RetrievalClient::new(&config, "test-key")
    }

    #[test]
    fn body_applies_default_rerank() {
        let body = client(true).request_body(&RetrievalRequest::new("refund policy"));
        assert_eq!(body, json!({"query": "refund policy", "rerank": true}));

        let body = client(false).request_body(&RetrievalRequest::new("refund policy"));
        assert_eq!(body["rerank"], false);
    }

    #[test]
    fn body_keeps_explicit_rerank_and_filter() {
        let request: RetrievalRequest = serde_json::from_value(json!({
            "query": "q",
            "rerank": false,
            "filter": {"$or": [{"scope": {"$eq": "a"}}, {"scope": {"$in": ["b", "c"]}}]}
        }))
        .unwrap();
        let body = client(true).request_body(&request);
        assert_eq!(body["rerank"], false);
        assert_eq!(
            body["filter"],
            json!({"$or": [{"scope": {"$eq": "a"}}, {"scope": {"$in": ["b", "c"]}}]})
        );
    }
}
