//! Language model access and response cleanup
//!
//! A [`LanguageModel`] turns one request into raw text. The
//! [`LanguageModelClient`] wraps a backend and turns that text into
//! [`FieldValueMap`] entries through the shared cleanup in [`response`].

mod bedrock;
mod openai;
pub mod response;

pub use bedrock::BedrockBackend;
pub use openai::OpenAiCompatibleBackend;
pub use response::{clean_response, JsonExtraction};

use crate::error::{Error, Result};
use crate::fields::FieldValueMap;
use crate::ocr::encode_png;
use async_trait::async_trait;
use base64::Engine;
use image::DynamicImage;

/// Base64 image sent alongside the prompt
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub media_type: String,
    pub data_base64: String,
}

impl ImageAttachment {
    /// Encode an image as a base64 PNG attachment
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let png = encode_png(image)?;
        Ok(Self {
            media_type: "image/png".to_string(),
            data_base64: base64::engine::general_purpose::STANDARD.encode(png),
        })
    }
}

/// One model request
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    pub image: Option<ImageAttachment>,
}

impl ModelRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }
}

/// A model backend returning raw response text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Send one request and return the raw reply text
    async fn query(&self, request: &ModelRequest) -> Result<String>;
}

/// Sends prompts to a backend and parses the reply into field values
pub struct LanguageModelClient {
    backend: Box<dyn LanguageModel>,
    extraction: JsonExtraction,
}

impl LanguageModelClient {
    pub fn new(backend: Box<dyn LanguageModel>) -> Self {
        Self {
            backend,
            extraction: JsonExtraction::default(),
        }
    }

    pub fn with_extraction(mut self, extraction: JsonExtraction) -> Self {
        self.extraction = extraction;
        self
    }

    pub fn extraction(&self) -> JsonExtraction {
        self.extraction
    }

    /// Send a text-only prompt
    pub async fn send_prompt(&self, prompt: &str) -> Result<FieldValueMap> {
        self.send_request(&ModelRequest::text(prompt)).await
    }

    /// Send a request and clean the reply into field values
    pub async fn send_request(&self, request: &ModelRequest) -> Result<FieldValueMap> {
        tracing::info!(
            backend = self.backend.name(),
            prompt_chars = request.prompt.len(),
            with_image = request.image.is_some(),
            "Querying language model"
        );

        let raw = self.backend.query(request).await?;
        if raw.trim().is_empty() {
            tracing::error!(backend = self.backend.name(), "Empty response from LLM");
            return Err(Error::EmptyModelResponse);
        }
        tracing::debug!(chars = raw.len(), "Raw model response received");

        clean_response(&raw, self.extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns the same reply to every request
    struct CannedModel(String);

    impl CannedModel {
        fn new(reply: &str) -> Self {
            Self(reply.to_string())
        }
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        fn name(&self) -> &str {
            "canned"
        }

        async fn query(&self, _request: &ModelRequest) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_send_prompt_parses_reply() {
        let client = LanguageModelClient::new(Box::new(CannedModel::new(
            "Sure!\n{\"nombre\": \"ANA\", \"dni\": \"12345678Z\"}",
        )));
        let values = client.send_prompt("fill").await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["nombre"], "ANA");
    }

    #[tokio::test]
    async fn test_blank_reply_is_empty_response() {
        let client = LanguageModelClient::new(Box::new(CannedModel::new("   ")));
        assert!(matches!(
            client.send_prompt("fill").await,
            Err(Error::EmptyModelResponse)
        ));
    }

    #[tokio::test]
    async fn test_greedy_mode_is_honored() {
        let client = LanguageModelClient::new(Box::new(CannedModel::new(
            r#"{"a":"1"} and {"b":"2"}"#,
        )))
        .with_extraction(JsonExtraction::Greedy);
        assert_eq!(client.extraction(), JsonExtraction::Greedy);
        assert!(matches!(
            client.send_prompt("fill").await,
            Err(Error::MalformedJson { .. })
        ));
    }

    #[test]
    fn test_image_attachment_is_png_base64() {
        let image = DynamicImage::new_rgb8(2, 2);
        let attachment = ImageAttachment::from_image(&image).unwrap();
        assert_eq!(attachment.media_type, "image/png");
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&attachment.data_base64)
            .unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }
}
