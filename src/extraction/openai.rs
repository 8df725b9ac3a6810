//! OpenAI-compatible chat-completions client for extraction calls.
//!
//! Every call carries a bounded request timeout and a limited retry count
//! with exponential backoff; only transient failures (429, 5xx, timeouts)
//! are retried.

use crate::config::ExtractionConfig;
use crate::error::{NovelGraphError, Result};
use crate::extraction::{parser, CharacterSketch, ExtractionService, GraphPayload};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const RELATIONSHIP_SYSTEM_PROMPT: &str = "\
You analyze narrative fiction. Extract the main characters and the \
relationships between them from the text, and answer with JSON only, in \
exactly this shape:
{
    \"nodes\": [
        {\"id\": 1, \"name\": \"character name\", \"description\": \"short description\", \"importance\": 3}
    ],
    \"edges\": [
        {\"source_id\": 1, \"target_id\": 2, \"source_name\": \"name\", \"target_name\": \"name\",
         \"relation\": \"relation type\", \"description\": \"short description\", \"importance\": 3}
    ]
}
Rules: every character has a unique id; edges are directed from source to \
target; importance is an integer from 1 (minor) to 5 (central); output \
valid JSON with no extra commentary.";

const CHARACTER_SYSTEM_PROMPT: &str = "\
You analyze narrative fiction. Extract the characters that appear in the \
text, and answer with JSON only, in exactly this shape:
{
    \"characters\": [
        {\"name\": \"character name\", \"aliases\": [\"nickname\"],
         \"description\": \"short description\", \"importance\": 3}
    ]
}
Rules: importance is an integer from 1 (minor) to 5 (central); output valid \
JSON with no extra commentary.";

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Extraction client against an OpenAI-compatible chat completions endpoint
pub struct OpenAiExtractor {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: usize,
}

impl OpenAiExtractor {
    pub fn new(
        api_base: &str,
        api_key: String,
        model: String,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NovelGraphError::Extraction(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature: 0.2,
            max_tokens: 2000,
            max_retries,
        })
    }

    /// Build a client from configuration, resolving the API key from the
    /// environment variable the config names.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            NovelGraphError::Config(format!(
                "Environment variable {} not set",
                config.api_key_env
            ))
        })?;
        let mut extractor = Self::new(
            &config.api_base,
            api_key,
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        extractor.temperature = config.temperature;
        extractor.max_tokens = config.max_tokens;
        Ok(extractor)
    }

    async fn chat_once(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NovelGraphError::Extraction("Request timed out".to_string())
                } else {
                    NovelGraphError::Extraction(format!("Network error: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(NovelGraphError::Extraction(format!(
                "Extraction API error {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| NovelGraphError::Extraction(format!("Failed to parse response: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| NovelGraphError::Extraction("Empty completion response".to_string()))
    }

    /// Chat with retry. Transient failures (429, 5xx, timeout) back off
    /// exponentially up to `max_retries`; everything else returns at once.
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.chat_once(system_prompt, user_prompt).await {
                Ok(content) => {
                    log::debug!(
                        "Extraction call took {:?} (attempt {})",
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(content);
                }
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    log::warn!("Retry {}/{} after error: {}", attempt + 1, self.max_retries, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(e: &NovelGraphError) -> bool {
    let msg = e.to_string();
    msg.contains("timed out")
        || msg.contains("429")
        || msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("504")
}

fn relationship_user_prompt(text: &str, hint_names: Option<&[String]>) -> String {
    match hint_names {
        Some(names) if !names.is_empty() => format!(
            "Extract the relationships between these characters only: {}. \
             Nodes may be omitted from the answer.\n\nText:\n\n{}",
            names.join(", "),
            text
        ),
        _ => format!("Extract the character relationships from this text:\n\n{}", text),
    }
}

#[async_trait]
impl ExtractionService for OpenAiExtractor {
    async fn extract_relationships(
        &self,
        text: &str,
        hint_names: Option<&[String]>,
    ) -> Result<GraphPayload> {
        let user_prompt = relationship_user_prompt(text, hint_names);
        let content = self.chat(RELATIONSHIP_SYSTEM_PROMPT, &user_prompt).await?;
        parser::parse_graph_payload(&content)
    }

    async fn extract_characters(&self, text: &str) -> Result<Vec<CharacterSketch>> {
        let user_prompt = format!("Extract the characters from this text:\n\n{}", text);
        let content = self.chat(CHARACTER_SYSTEM_PROMPT, &user_prompt).await?;
        parser::parse_character_sketches(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_extractor() -> OpenAiExtractor {
        OpenAiExtractor::new(
            "https://api.example.com/v1/",
            "test-key".to_string(),
            "gpt-4o-mini".to_string(),
            Duration::from_secs(5),
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let extractor = test_extractor();
        assert_eq!(extractor.api_base, "https://api.example.com/v1");
    }

    #[test]
    fn test_user_prompt_without_hints() {
        let prompt = relationship_user_prompt("some text", None);
        assert!(prompt.contains("some text"));
        assert!(!prompt.contains("only:"));
    }

    #[test]
    fn test_user_prompt_with_hints() {
        let names = vec!["Lin Xi".to_string(), "Qin Yu".to_string()];
        let prompt = relationship_user_prompt("some text", Some(names.as_slice()));
        assert!(prompt.contains("Lin Xi, Qin Yu"));
        assert!(prompt.contains("some text"));
    }

    #[test]
    fn test_empty_hint_list_treated_as_no_hints() {
        let empty: Vec<String> = Vec::new();
        let prompt = relationship_user_prompt("some text", Some(empty.as_slice()));
        assert!(!prompt.contains("only:"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&NovelGraphError::Extraction(
            "Extraction API error 429 Too Many Requests: slow down".into()
        )));
        assert!(is_transient(&NovelGraphError::Extraction(
            "Extraction API error 503 Service Unavailable: busy".into()
        )));
        assert!(is_transient(&NovelGraphError::Extraction(
            "Request timed out".into()
        )));
        assert!(!is_transient(&NovelGraphError::Extraction(
            "Extraction API error 401 Unauthorized: bad key".into()
        )));
    }

    #[test]
    fn test_chat_response_deserialization() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("hello")
        );
    }
}
