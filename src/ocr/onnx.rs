//! Local ONNX text detection + recognition backend

use super::{encode_png, join_line_detections, Detection, DetectionKind, TextRecognizer};
use crate::config::OnnxModelPaths;
use crate::error::{Error, Result};
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use oar_ocr::pipeline::{OAROCRBuilder, OAROCR};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// OCR with a local detection/recognition model pair
pub struct OnnxRecognizer {
    pipeline: Arc<Mutex<OAROCR>>,
    threshold: f32,
}

impl OnnxRecognizer {
    pub fn new(models: &OnnxModelPaths, threshold: f32) -> Result<Self> {
        let (Some(det), Some(rec), Some(dict)) = (
            models.detection_model.as_ref(),
            models.recognition_model.as_ref(),
            models.char_dict.as_ref(),
        ) else {
            return Err(Error::InvalidConfig {
                reason: "ONNX_DET_MODEL, ONNX_REC_MODEL and ONNX_CHAR_DICT are required for the onnx OCR backend".to_string(),
            });
        };

        let pipeline = OAROCRBuilder::new(
            det.to_string_lossy().into_owned(),
            rec.to_string_lossy().into_owned(),
            dict.to_string_lossy().into_owned(),
        )
        .text_detection_batch_size(1)
        .text_recognition_batch_size(1)
        .text_rec_score_thresh(0.0)
        .build()
        .map_err(|e| Error::Ocr {
            reason: format!("Failed to build OCR pipeline: {}", e),
        })?;

        Ok(Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            threshold,
        })
    }
}

#[async_trait]
impl TextRecognizer for OnnxRecognizer {
    fn name(&self) -> &str {
        "onnx"
    }

    async fn recognize_text(&self, image: &RgbImage) -> Result<String> {
        // The pipeline reads its input from disk
        let png = encode_png(&DynamicImage::ImageRgb8(image.clone()))?;
        let mut input = tempfile::Builder::new().suffix(".png").tempfile()?;
        input.write_all(&png)?;

        let pipeline = Arc::clone(&self.pipeline);

        // Inference is CPU-bound
        let result = tokio::task::spawn_blocking(move || {
            let mut pipeline = pipeline.lock().map_err(|_| Error::Ocr {
                reason: "OCR pipeline lock poisoned".to_string(),
            })?;
            pipeline.predict(input.path()).map_err(|e| Error::Ocr {
                reason: format!("OCR inference failed: {}", e),
            })
        })
        .await
        .map_err(|e| Error::Ocr {
            reason: format!("Task join error: {}", e),
        })??;

        let detections: Vec<Detection> = result
            .rec_texts
            .iter()
            .zip(result.rec_scores.iter())
            .map(|(text, score)| Detection {
                kind: DetectionKind::Line,
                confidence: *score,
                text: text.to_string(),
            })
            .collect();

        Ok(join_line_detections(&detections, self.threshold))
    }
}
