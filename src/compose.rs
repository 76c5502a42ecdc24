//! Retrieval-then-generation composition.
//!
//! ```text
//! GenerationRequest
//!        │  query / filter / rerank
//!        ▼
//!   Retriever::retrieve ──── empty ───▶ NO_RELEVANT_INFORMATION
//!        │ chunks (upstream order)
//!        ▼
//!   system prompt (override, or default template + passages)
//!        │
//!        ▼
//!   Generator::complete(model, prompt, query)
//! ```
//!
//! Nothing is retried and nothing is cached; errors from either call are
//! returned as-is.

use std::sync::Arc;
use tracing::debug;

use crate::config::{Config, Credentials};
use crate::error::Result;
use crate::generation::{
    generate_answer, select_system_prompt, GenerationClient, LEGACY_QUERY_PROMPT,
    NO_RELEVANT_INFORMATION,
};
use crate::models::{GenerationRequest, GenerationResponse, RetrievalRequest, RetrievalResponse};
use crate::retrieval::RetrievalClient;
use crate::traits::{Generator, Retriever};

pub struct Composer {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    model: String,
    query_model: String,
}

impl Composer {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        model: impl Into<String>,
        query_model: impl Into<String>,
    ) -> Self {
        Self {
            retriever,
            generator,
            model: model.into(),
            query_model: query_model.into(),
        }
    }

    /// Composer wired to the hosted Ragie and OpenAI clients.
    pub fn from_config(config: &Config, credentials: &Credentials) -> Self {
        Self::new(
            Arc::new(RetrievalClient::new(
                &config.retrieval,
                credentials.ragie_api_key.clone(),
            )),
            Arc::new(GenerationClient::new(
                &config.generation,
                credentials.openai_api_key.clone(),
            )),
            config.generation.model.clone(),
            config.generation.query_model.clone(),
        )
    }

    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResponse> {
        self.retriever.retrieve(request).await
    }

    /// The `/api/query` flow: default retrieval settings, space-joined
    /// passages in the legacy template, query model.
    pub async fn query(&self, text: &str) -> Result<GenerationResponse> {
        let retrieved = self.retriever.retrieve(&RetrievalRequest::new(text)).await?;
        let passages = retrieved.texts();
        let response = generate_answer(
            self.generator.as_ref(),
            &self.query_model,
            LEGACY_QUERY_PROMPT,
            text,
            &passages,
            " ",
        )
        .await?;
        Ok(GenerationResponse { response })
    }

    /// The `/api/generate` flow.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let retrieved = self.retriever.retrieve(&request.retrieval_request()).await?;
        if retrieved.is_empty() {
            debug!(query = %request.query, "retrieval returned no chunks");
            return Ok(GenerationResponse {
                response: NO_RELEVANT_INFORMATION.to_string(),
            });
        }

        let passages = retrieved.texts();
        let system_prompt = select_system_prompt(request.system_prompt.as_deref(), &passages);
        let model = request.model.as_deref().unwrap_or(&self.model);

        debug!(model, passages = passages.len(), "composing generation");

        let response = self
            .generator
            .complete(model, &system_prompt, &request.query)
            .await?;
        Ok(GenerationResponse { response })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::models::ScoredChunk;
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::sync::Mutex;

    struct FakeRetriever {
        chunks: Vec<ScoredChunk>,
        fail: bool,
        seen: Mutex<Vec<RetrievalRequest>>,
    }

    impl FakeRetriever {
        fn with_texts(texts: &[&str]) -> Self {
            Self {
                chunks: texts
                    .iter()
                    .enumerate()
                    .map(|(i, t)| ScoredChunk {
                        text: t.to_string(),
                        score: 1.0 - i as f64 * 0.1,
                        document_id: format!("doc-{}", i),
                        document_metadata: Map::new(),
                    })
                    .collect(),
                fail: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::with_texts(&[])
            }
        }
    }

    #[async_trait]
    impl Retriever for FakeRetriever {
        async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResponse> {
            self.seen.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(RelayError::upstream("Ragie", 503, "backend unavailable"));
            }
            Ok(RetrievalResponse {
                scored_chunks: self.chunks.clone(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        calls: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        async fn complete(&self, model: &str, system_prompt: &str, user: &str) -> Result<String> {
            self.calls.lock().unwrap().push((
                model.to_string(),
                system_prompt.to_string(),
                user.to_string(),
            ));
            Ok("generated".to_string())
        }
    }

    fn composer(
        retriever: Arc<FakeRetriever>,
        generator: Arc<RecordingGenerator>,
    ) -> Composer {
        Composer::new(retriever, generator, "gpt-4o", "gpt-4")
    }

    #[tokio::test]
    async fn passages_keep_upstream_order() {
        let retriever = Arc::new(FakeRetriever::with_texts(&["zeta", "alpha", "mu"]));
        let generator = Arc::new(RecordingGenerator::default());
        let composer = composer(retriever, generator.clone());

        let response = composer
            .generate(&GenerationRequest::new("order?"))
            .await
            .unwrap();
        assert_eq!(response.response, "generated");

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (model, prompt, user) = &calls[0];
        assert_eq!(model, "gpt-4o");
        assert_eq!(user, "order?");
        assert!(prompt.contains("zeta\nalpha\nmu"));
    }

    #[tokio::test]
    async fn empty_retrieval_never_generates() {
        let retriever = Arc::new(FakeRetriever::with_texts(&[]));
        let generator = Arc::new(RecordingGenerator::default());
        let composer = composer(retriever, generator.clone());

        let response = composer.generate(&GenerationRequest::new("hi")).await.unwrap();
        assert_eq!(response.response, NO_RELEVANT_INFORMATION);

        let response = composer.query("hi").await.unwrap();
        assert_eq!(response.response, NO_RELEVANT_INFORMATION);

        assert!(generator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn override_prompt_skips_passages() {
        let retriever = Arc::new(FakeRetriever::with_texts(&["confidential passage"]));
        let generator = Arc::new(RecordingGenerator::default());
        let composer = composer(retriever, generator.clone());

        let mut request = GenerationRequest::new("summarize");
        request.system_prompt = Some("You are terse.".to_string());
        request.model = Some("gpt-4o-mini".to_string());
        composer.generate(&request).await.unwrap();

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls[0].0, "gpt-4o-mini");
        assert_eq!(calls[0].1, "You are terse.");
    }

    #[tokio::test]
    async fn filter_and_rerank_reach_the_retriever() {
        let retriever = Arc::new(FakeRetriever::with_texts(&["x"]));
        let generator = Arc::new(RecordingGenerator::default());
        let composer = composer(retriever.clone(), generator);

        let request: GenerationRequest = serde_json::from_value(json!({
            "query": "q",
            "filter": {"scope": {"$nin": ["archive"]}},
            "rerank": false
        }))
        .unwrap();
        composer.generate(&request).await.unwrap();

        let seen = retriever.seen.lock().unwrap();
        assert_eq!(seen[0], request.retrieval_request());
    }

    #[tokio::test]
    async fn query_flow_uses_query_model_and_spaces() {
        let retriever = Arc::new(FakeRetriever::with_texts(&["one", "two"]));
        let generator = Arc::new(RecordingGenerator::default());
        let composer = composer(retriever.clone(), generator.clone());

        composer.query("count").await.unwrap();

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls[0].0, "gpt-4");
        assert_eq!(
            calls[0].1,
            LEGACY_QUERY_PROMPT.replace("{{chunks}}", "one two")
        );
        assert!(!calls[0].1.contains("==="));
        assert_eq!(retriever.seen.lock().unwrap()[0], RetrievalRequest::new("count"));
    }

    #[tokio::test]
    async fn retrieval_failure_propagates() {
        let retriever = Arc::new(FakeRetriever::failing());
        let generator = Arc::new(RecordingGenerator::default());
        let composer = composer(retriever, generator.clone());

        let err = composer
            .generate(&GenerationRequest::new("anything"))
            .await
            .unwrap_err();
        assert_eq!(err.upstream_status(), Some(503));
        assert!(generator.calls.lock().unwrap().is_empty());
    }
}
