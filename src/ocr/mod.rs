//! Image text extraction
//!
//! [`ImageTextExtractor`] owns the load -> preprocess -> recognize flow and
//! delegates the recognition call to a [`TextRecognizer`] chosen at
//! construction time:
//! - [`RekognitionRecognizer`]: AWS Rekognition `DetectText`
//! - [`TesseractRecognizer`]: local `tesseract` binary
//! - `OnnxRecognizer`: local ONNX models (feature `onnx-ocr`)

mod image_io;
#[cfg(feature = "onnx-ocr")]
mod onnx;
mod rekognition;
mod tesseract;

pub use image_io::{encode_png, load_dynamic_image};
#[cfg(feature = "onnx-ocr")]
pub use onnx::OnnxRecognizer;
pub use rekognition::RekognitionRecognizer;
pub use tesseract::TesseractRecognizer;

use crate::error::{Error, Result};
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use std::path::Path;

/// Granularity of one OCR output unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionKind {
    Line,
    Word,
}

/// One OCR engine output unit
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub kind: DetectionKind,
    /// Confidence in 0-1
    pub confidence: f32,
    pub text: String,
}

/// Keep line detections strictly above `threshold` and join them with
/// newlines, in the order the engine returned them.
pub fn join_line_detections(detections: &[Detection], threshold: f32) -> String {
    detections
        .iter()
        .filter(|d| d.kind == DetectionKind::Line && d.confidence > threshold)
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A recognition backend
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Recognize the text in an RGB image
    async fn recognize_text(&self, image: &RgbImage) -> Result<String>;
}

/// Loads an image, normalizes it to RGB and runs a recognizer on it
pub struct ImageTextExtractor {
    recognizer: Box<dyn TextRecognizer>,
    image: Option<DynamicImage>,
}

impl ImageTextExtractor {
    pub fn new(recognizer: Box<dyn TextRecognizer>) -> Self {
        Self {
            recognizer,
            image: None,
        }
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }

    /// Decode an image from disk, replacing any previously loaded one
    pub fn load_image<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.image = Some(load_dynamic_image(path.as_ref())?);
        Ok(())
    }

    /// Use an already decoded image
    pub fn set_image(&mut self, image: DynamicImage) {
        self.image = Some(image);
    }

    pub fn image(&self) -> Option<&DynamicImage> {
        self.image.as_ref()
    }

    /// Convert the loaded image to RGB when it is in another color mode
    pub fn preprocess(&mut self) {
        if let Some(image) = self.image.take() {
            let image = if matches!(image, DynamicImage::ImageRgb8(_)) {
                image
            } else {
                tracing::debug!(color = ?image.color(), "Converting image to RGB");
                DynamicImage::ImageRgb8(image.to_rgb8())
            };
            self.image = Some(image);
        }
    }

    /// Run the recognizer on the loaded image
    pub async fn recognize_text(&self) -> Result<String> {
        let image = self.image.as_ref().ok_or(Error::ImageNotLoaded)?;
        let rgb = match image {
            DynamicImage::ImageRgb8(rgb) => rgb.clone(),
            other => other.to_rgb8(),
        };
        self.recognizer.recognize_text(&rgb).await
    }

    /// Load, preprocess and recognize in one call
    pub async fn process_image<P: AsRef<Path>>(&mut self, path: P) -> Result<String> {
        self.load_image(path)?;
        self.preprocess();

        tracing::info!(backend = self.recognizer.name(), "Running OCR");
        let text = self.recognize_text().await?;
        tracing::debug!(chars = text.len(), "OCR finished");
        Ok(text)
    }
}
