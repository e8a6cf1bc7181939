//! AWS Rekognition text detection backend

use super::{encode_png, join_line_detections, Detection, DetectionKind, TextRecognizer};
use crate::config::AwsCredentials;
use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{Image, TextDetection, TextTypes};
use image::{DynamicImage, RgbImage};

/// Cloud OCR through Rekognition `DetectText`
pub struct RekognitionRecognizer {
    client: aws_sdk_rekognition::Client,
    threshold: f32,
}

impl RekognitionRecognizer {
    pub fn new(client: aws_sdk_rekognition::Client, threshold: f32) -> Self {
        Self { client, threshold }
    }

    /// Build a client from explicit credentials
    pub async fn from_credentials(credentials: &AwsCredentials, threshold: f32) -> Self {
        let sdk_config = crate::aws::sdk_config(credentials).await;
        Self::new(aws_sdk_rekognition::Client::new(&sdk_config), threshold)
    }
}

/// Map a Rekognition detection; its confidence is a percentage.
fn to_detection(raw: &TextDetection) -> Option<Detection> {
    let kind = match raw.r#type()? {
        TextTypes::Line => DetectionKind::Line,
        TextTypes::Word => DetectionKind::Word,
        _ => return None,
    };
    Some(Detection {
        kind,
        confidence: raw.confidence().unwrap_or(0.0) / 100.0,
        text: raw.detected_text().unwrap_or_default().to_string(),
    })
}

#[async_trait]
impl TextRecognizer for RekognitionRecognizer {
    fn name(&self) -> &str {
        "rekognition"
    }

    async fn recognize_text(&self, image: &RgbImage) -> Result<String> {
        let png = encode_png(&DynamicImage::ImageRgb8(image.clone()))?;
        tracing::debug!(bytes = png.len(), "Sending image to Rekognition");

        let response = self
            .client
            .detect_text()
            .image(Image::builder().bytes(Blob::new(png)).build())
            .send()
            .await
            .map_err(|e| Error::Ocr {
                reason: format!(
                    "Rekognition DetectText failed: {}",
                    aws_sdk_rekognition::error::DisplayErrorContext(&e)
                ),
            })?;

        let detections: Vec<Detection> = response
            .text_detections()
            .iter()
            .filter_map(to_detection)
            .collect();
        tracing::debug!(count = detections.len(), "Rekognition detections");

        Ok(join_line_detections(&detections, self.threshold))
    }
}
