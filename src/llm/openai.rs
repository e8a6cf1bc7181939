//! OpenAI-compatible chat completions backend (Groq, OpenRouter, local servers)

use super::{LanguageModel, ModelRequest};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub struct OpenAiCompatibleBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiCompatibleBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: crate::config::DEFAULT_LLM_BASE_URL.to_string(),
            model: model.into(),
            max_tokens,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

fn user_content(request: &ModelRequest) -> Value {
    match &request.image {
        None => Value::String(request.prompt.clone()),
        Some(image) => json!([
            {
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{};base64,{}", image.media_type, image.data_base64)
                }
            },
            {"type": "text", "text": request.prompt}
        ]),
    }
}

fn reply_text(response: ChatResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default()
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn query(&self, request: &ModelRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: user_content(request),
            }],
            max_tokens: self.max_tokens,
        };

        tracing::debug!(model = %self.model, url = %self.base_url, "Sending chat completion request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Error::Llm {
                reason: format!("Chat completion returned {}: {}", status, error_body),
            });
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(reply_text(chat_response).trim().to_string())
    }
}
