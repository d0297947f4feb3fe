//! Chat model seam used by the mapper, with the Mistral chat completions backend.

use crate::config::Config;
use crate::mistral::MistralApi;
use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Low temperature keeps extraction close to deterministic.
pub const EXTRACTION_TEMPERATURE: f32 = 0.1;
pub const EXTRACTION_MAX_TOKENS: u32 = 4000;

/// A chat model that answers with a JSON object.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send `messages` and return the raw text of the first choice.
    async fn complete_json(&self, messages: Vec<Message>) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Clone)]
pub struct MistralChatClient {
    api: MistralApi,
    model: String,
}

impl MistralChatClient {
    pub fn new(config: &Config, client: Client) -> Result<Self> {
        Ok(Self {
            api: MistralApi::new(config, client)?,
            model: config.chat_model.clone(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn request<'a>(&'a self, messages: &'a [Message]) -> JsonChatRequest<'a> {
        JsonChatRequest {
            model: &self.model,
            messages,
            temperature: EXTRACTION_TEMPERATURE,
            max_tokens: EXTRACTION_MAX_TOKENS,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

#[async_trait::async_trait]
impl LanguageModel for MistralChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete_json(&self, messages: Vec<Message>) -> Result<String> {
        debug!(
            "Chat completion: model={} messages={}",
            self.model,
            messages.len()
        );
        let completion: Completion = self
            .api
            .post_json("chat/completions", &self.request(&messages), "Mistral chat")
            .await?;

        if let Some(usage) = &completion.usage {
            info!(
                "Chat completion used {} tokens ({} prompt + {} completion)",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(completion.into_text())
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TokenUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl Completion {
    /// Content of the first choice; empty when the model returned none.
    fn into_text(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default()
    }
}
