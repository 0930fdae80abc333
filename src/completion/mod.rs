// Completion module
// Chat-completion client and sanitising of raw model output


use async_trait::async_trait;
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CompletionConfig;
use crate::http::{JsonClient, ProviderError, normalize_base_url};
use crate::{CourseRagError, Result};

static REASONING_TRACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// A chat model that turns messages into raw (unsanitised) text
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    endpoint: String,
    model: String,
    http: JsonClient,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionClient {
    #[inline]
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let http = JsonClient::new(
            Duration::from_secs(config.timeout_secs),
            config.api_key.clone(),
        );

        if !http.has_credentials() {
            warn!("No API key configured for completion provider at {}", base_url);
        }

        Ok(Self {
            endpoint: format!("{}/chat/completions", base_url),
            model: config.model.clone(),
            http,
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionModel for ChatCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            request.messages.len()
        );

        let response: ChatResponse = self
            .http
            .post(self.endpoint.clone(), &body)
            .await
            .map_err(CourseRagError::Completion)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| {
                CourseRagError::Completion(ProviderError::MalformedResponse(
                    "response contained no message content".to_string(),
                ))
            })
    }
}

/// Remove `<think>...</think>` reasoning blocks and surrounding whitespace.
///
/// An unclosed `<think>` tag is left in place; the text is returned with the trace visible.
#[inline]
pub fn strip_reasoning(raw: &str) -> String {
    REASONING_TRACE.replace_all(raw, "").trim().to_string()
}
