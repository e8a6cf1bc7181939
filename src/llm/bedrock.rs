//! AWS Bedrock backend (Anthropic messages format)

use super::{LanguageModel, ModelRequest};
use crate::config::AwsCredentials;
use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::primitives::Blob;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

pub struct BedrockBackend {
    client: aws_sdk_bedrockruntime::Client,
    model_id: String,
    max_tokens: u32,
}

impl BedrockBackend {
    pub fn new(
        client: aws_sdk_bedrockruntime::Client,
        model_id: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            model_id: model_id.into(),
            max_tokens,
        }
    }

    pub async fn from_credentials(
        credentials: &AwsCredentials,
        model_id: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        let sdk_config = crate::aws::sdk_config(credentials).await;
        Self::new(
            aws_sdk_bedrockruntime::Client::new(&sdk_config),
            model_id,
            max_tokens,
        )
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    anthropic_version: &'static str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

fn request_body(request: &ModelRequest, max_tokens: u32) -> Result<Vec<u8>> {
    let mut content = Vec::with_capacity(2);
    if let Some(image) = &request.image {
        content.push(ContentBlock::Image {
            source: ImageSource {
                kind: "base64",
                media_type: &image.media_type,
                data: &image.data_base64,
            },
        });
    }
    content.push(ContentBlock::Text {
        text: &request.prompt,
    });

    let body = MessagesRequest {
        anthropic_version: ANTHROPIC_VERSION,
        max_tokens,
        messages: vec![Message {
            role: "user",
            content,
        }],
    };
    Ok(serde_json::to_vec(&body)?)
}

fn parse_reply(body: &[u8]) -> Result<String> {
    let response: MessagesResponse = serde_json::from_slice(body)?;
    response
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| Error::Llm {
            reason: "Invalid Bedrock response format".to_string(),
        })
}

#[async_trait]
impl LanguageModel for BedrockBackend {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn query(&self, request: &ModelRequest) -> Result<String> {
        let body = request_body(request, self.max_tokens)?;

        tracing::debug!(model = %self.model_id, "Invoking Bedrock model");

        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| Error::Llm {
                reason: format!("Bedrock API call failed: {}", DisplayErrorContext(&e)),
            })?;

        parse_reply(response.body().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImageAttachment;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    #[test]
    fn test_text_only_body() {
        let body = request_body(&ModelRequest::text("hola"), 2048).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "anthropic_version": "bedrock-2023-05-31",
                "max_tokens": 2048,
                "messages": [{
                    "role": "user",
                    "content": [{"type": "text", "text": "hola"}]
                }]
            })
        );
    }

    #[test]
    fn test_image_block_precedes_text() {
        let request = ModelRequest::text("hola").with_image(ImageAttachment {
            media_type: "image/png".to_string(),
            data_base64: "AAAA".to_string(),
        });
        let body = request_body(&request, 512).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        let content = &value["messages"][0]["content"];
        assert_eq!(
            content[0],
            json!({
                "type": "image",
                "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}
            })
        );
        assert_eq!(content[1]["type"], "text");
    }

    #[test]
    fn test_reply_is_trimmed() {
        let body = br#"{"content": [{"type": "text", "text": "  {\"a\": \"1\"}\n"}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "{\"a\": \"1\"}");
    }

    #[test]
    fn test_reply_without_content() {
        for body in [&br#"{"content": []}"#[..], &br#"{"id": "x"}"#[..]] {
            match parse_reply(body) {
                Err(Error::Llm { reason }) => assert_eq!(reason, "Invalid Bedrock response format"),
                other => panic!("unexpected: {:?}", other.map(|_| ())),
            }
        }
    }
}
