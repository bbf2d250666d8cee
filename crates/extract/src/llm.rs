use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub usage: Usage,
    /// The history passed in, followed by this exchange.
    pub history: Vec<ChatMessage>,
}

impl ModelResponse {
    pub fn new(prompt: &str, history: &[ChatMessage], text: String, usage: Usage) -> Self {
        let mut extended = history.to_vec();
        extended.push(ChatMessage::user(prompt));
        extended.push(ChatMessage::assistant(text.clone()));

        Self {
            text,
            usage,
            history: extended,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    /// Only a bare `Y` continues; anything else stops the loop.
    pub fn from_answer(answer: &str) -> Self {
        if answer.trim() == "Y" {
            YesNo::Yes
        } else {
            YesNo::No
        }
    }
}

/// The language model as seen by the extraction engine.
///
/// `history` is never mutated by the model; each response carries the
/// extended history for the next call.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, prompt: &str, history: &[ChatMessage]) -> Result<ModelResponse>;

    /// Single-token continuation check.
    async fn classify_yes_no(&self, prompt: &str, history: &[ChatMessage]) -> Result<YesNo>;
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(base_url: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            model,
            client,
        })
    }

    async fn send(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        options: Option<OllamaOptions>,
    ) -> Result<(String, Usage)> {
        let url = format!("{}/api/chat", self.base_url);

        let user = ChatMessage::user(prompt);
        let mut messages: Vec<&ChatMessage> = history.iter().collect();
        messages.push(&user);

        let request = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options,
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let ollama_response: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        let usage = Usage {
            input_tokens: ollama_response.prompt_eval_count,
            output_tokens: ollama_response.eval_count,
        };
        Ok((ollama_response.message.content, usage))
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(
            "http://localhost:11434".to_string(),
            "llama3".to_string(),
        )
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn chat(&self, prompt: &str, history: &[ChatMessage]) -> Result<ModelResponse> {
        let (text, usage) = self.send(prompt, history, None).await?;
        Ok(ModelResponse::new(prompt, history, text, usage))
    }

    async fn classify_yes_no(&self, prompt: &str, history: &[ChatMessage]) -> Result<YesNo> {
        let (text, _) = self
            .send(prompt, history, Some(OllamaOptions { num_predict: 1 }))
            .await?;
        Ok(YesNo::from_answer(&text))
    }
}
