//! OpenAI chat-completion client and system-prompt assembly.
//!
//! The default template is filled with the retrieved passages at the
//! [`CHUNKS_PLACEHOLDER`]. A caller-supplied system prompt is used verbatim
//! and never receives passages. The `/api/query` path has its own shorter
//! template, [`LEGACY_QUERY_PROMPT`].
//!
//! When there are no passages at all, [`generate_answer`] returns
//! [`NO_RELEVANT_INFORMATION`] without contacting the model.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::error::{RelayError, Result};
use crate::traits::Generator;
use crate::upstream::{bearer, check_status, join_url};

const SERVICE: &str = "OpenAI";

/// Answer returned when retrieval found nothing.
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found for your query.";

pub const CHUNKS_PLACEHOLDER: &str = "{{chunks}}";

pub const DEFAULT_SYSTEM_PROMPT: &str = "These are very important to follow:

You are a professional but friendly AI assistant helping the user with the information shown below.

Answer informally, directly, and concisely without a heading or greeting but include everything relevant.
Use richtext Markdown when appropriate including bold, italic, paragraphs, and lists when helpful.
If using LaTeX, use double $$ as delimiter instead of single $. Use $$...$$ instead of parentheses.
Organize information into multiple sections or points when appropriate.
Don't include raw item IDs or other raw fields from the source.
Don't use XML or other markup unless requested by the user.

Here is all of the information available to answer the user:
===
{{chunks}}
===

If the user asked for a search and there are no results, make sure to let the user know that you couldn't find anything,
and what they might be able to do to find the information they need.

END SYSTEM INSTRUCTIONS";

/// Template for the `/api/query` path. Passages are joined with spaces.
pub const LEGACY_QUERY_PROMPT: &str = "You are a helpful AI assistant. Use the following information to answer the user's question. If the information is not sufficient to answer the question, say so.

Retrieved information:
{{chunks}}";

/// Fill `template` with `passages` joined by `separator`.
pub fn render_system_prompt(template: &str, passages: &[String], separator: &str) -> String {
    template.replace(CHUNKS_PLACEHOLDER, &passages.join(separator))
}

/// The override if one was given, else the default template with
/// newline-joined passages.
pub fn select_system_prompt(system_prompt: Option<&str>, passages: &[String]) -> String {
    match system_prompt {
        Some(prompt) => prompt.to_string(),
        None => render_system_prompt(DEFAULT_SYSTEM_PROMPT, passages, "\n"),
    }
}

/// Renders `template` with already retrieved passages and completes.
pub async fn generate_answer(
    generator: &dyn Generator,
    model: &str,
    template: &str,
    query: &str,
    passages: &[String],
    separator: &str,
) -> Result<String> {
    if passages.is_empty() {
        debug!("no passages, skipping generation");
        return Ok(NO_RELEVANT_INFORMATION.to_string());
    }

    let system_prompt = render_system_prompt(template, passages, separator);
    generator.complete(model, &system_prompt, query).await
}

#[derive(Clone)]
pub struct GenerationClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl GenerationClient {
    pub fn new(config: &GenerationConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: api_key.into(),
            http: Client::new(),
        }
    }
}

#[async_trait]
impl Generator for GenerationClient {
    async fn complete(&self, model: &str, system_prompt: &str, user: &str) -> Result<String> {
        let url = join_url(&self.base_url, &["chat", "completions"])?;
        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user},
            ],
        });

        debug!(url = %url, model, "sending chat completion request");

        let response = bearer(self.http.post(url), &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(SERVICE, response).await?;
        let json: Value = response.json().await?;
        let text = parse_completion(&json)?;

        info!(model, chars = text.len(), "received chat completion");
        Ok(text)
    }
}

/// Pulls `choices[0].message.content` out of a chat-completion response.
fn parse_completion(json: &Value) -> Result<String> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            RelayError::upstream(SERVICE, 200, "invalid completion response: no choices")
        })?;

    choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            RelayError::upstream(SERVICE, 200, "invalid completion response: missing content")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UnreachableGenerator;

    #[async_trait]
    impl Generator for UnreachableGenerator {
        async fn complete(&self, _: &str, _: &str, _: &str) -> Result<String> {
            panic!("generator must not be called");
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn complete(&self, model: &str, system_prompt: &str, user: &str) -> Result<String> {
            Ok(format!("{}|{}|{}", model, system_prompt, user))
        }
    }

    #[test]
    fn template_mentions_required_rules() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains(CHUNKS_PLACEHOLDER));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("without a heading or greeting"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("Markdown"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("double $$"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("raw item IDs"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("couldn't find anything"));
    }

    #[test]
    fn legacy_template_has_placeholder_last() {
        assert!(LEGACY_QUERY_PROMPT.ends_with(CHUNKS_PLACEHOLDER));
        assert!(LEGACY_QUERY_PROMPT.contains("not sufficient to answer the question, say so"));
    }

    #[test]
    fn render_substitutes_in_order() {
        let passages = vec!["first".to_string(), "second".to_string()];
        let prompt = render_system_prompt("ctx: {{chunks}}.", &passages, "\n");
        assert_eq!(prompt, "ctx: first\nsecond.");
        let prompt = render_system_prompt("ctx: {{chunks}}.", &passages, " ");
        assert_eq!(prompt, "ctx: first second.");
    }

    #[test]
    fn override_is_used_verbatim() {
        let passages = vec!["secret passage".to_string()];
        let prompt = select_system_prompt(Some("Answer in French."), &passages);
        assert_eq!(prompt, "Answer in French.");

        let prompt = select_system_prompt(Some("Literal {{chunks}} stays"), &passages);
        assert_eq!(prompt, "Literal {{chunks}} stays");
    }

    #[test]
    fn default_prompt_joins_with_newlines() {
        let passages = vec!["alpha".to_string(), "beta".to_string()];
        let prompt = select_system_prompt(None, &passages);
        assert!(prompt.contains("===\nalpha\nbeta\n==="));
        assert!(!prompt.contains(CHUNKS_PLACEHOLDER));
    }

    #[tokio::test]
    async fn empty_passages_short_circuit() {
        let answer = generate_answer(
            &UnreachableGenerator,
            "gpt-4",
            LEGACY_QUERY_PROMPT,
            "hi",
            &[],
            " ",
        )
            .await
            .unwrap();
        assert_eq!(answer, NO_RELEVANT_INFORMATION);
    }

    #[tokio::test]
    async fn passages_reach_the_generator() {
        let passages = vec!["one".to_string(), "two".to_string()];
        let answer = generate_answer(
            &EchoGenerator,
            "gpt-4",
            LEGACY_QUERY_PROMPT,
            "question",
            &passages,
            " ",
        )
        .await
        .unwrap();
        assert!(answer.starts_with("gpt-4|You are a helpful AI assistant."));
        assert!(answer.contains("Retrieved information:\none two|"));
        assert!(!answer.contains("Markdown"));
        assert!(answer.ends_with("|question"));
    }

    #[test]
    fn parses_first_choice_verbatim() {
        let json = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "  **Answer**\n"}},
                {"message": {"role": "assistant", "content": "ignored"}}
            ]
        });
        assert_eq!(parse_completion(&json).unwrap(), "  **Answer**\n");
    }

    #[test]
    fn missing_choices_is_an_error() {
        let err = parse_completion(&json!({"choices": []})).unwrap_err();
        assert!(err.to_string().contains("no choices"));

        let err = parse_completion(&json!({"choices": [{"message": {}}]})).unwrap_err();
        assert!(err.to_string().contains("missing content"));
    }
}
