//! Local Tesseract backend

use super::{encode_png, TextRecognizer};
use crate::error::{Error, Result};
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use std::io::Write;

/// OCR with the `tesseract` command line tool
pub struct TesseractRecognizer {
    language: String,
    binary: String,
}

impl TesseractRecognizer {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            binary: "tesseract".to_string(),
        }
    }

    /// Use a specific tesseract executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Check whether the tesseract binary can be run
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize_text(&self, image: &RgbImage) -> Result<String> {
        let png = encode_png(&DynamicImage::ImageRgb8(image.clone()))?;

        let mut input = tempfile::Builder::new()
            .prefix("form-autofill-")
            .suffix(".png")
            .tempfile()?;
        input.write_all(&png)?;
        input.flush()?;

        let output = tokio::process::Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .await
            .map_err(|e| Error::Ocr {
                reason: format!("Failed to run {}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ocr {
                reason: format!("tesseract exited with {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
